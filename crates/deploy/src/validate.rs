//! Pre-execution gate.
//!
//! [`validate_plan`] is the only place a run may fail without an on-chain
//! side effect. It resolves every artifact, type-checks constructor
//! arguments against the constructor ABI and checks that back-references and
//! the authorization link point at earlier steps of the plan.

use std::collections::HashSet;

use alloy_core::dyn_abi::{DynSolType, DynSolValue, Specifier};

use crate::{
    artifact::{Artifact, ArtifactResolver},
    error::DeployError,
    linker::GrantorInterface,
    plan::{ConstructorArg, DeploymentPlan},
};

/// Step name used in errors about the plan as a whole.
const PLAN: &str = "<plan>";

/// A constructor argument after type checking.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedArg {
    Value(DynSolValue),
    /// Address produced by the named earlier step.
    Ref { step: String },
}

#[derive(Debug, Clone)]
pub struct ValidatedStep {
    pub name: String,
    pub artifact: Artifact,
    pub args: Vec<TypedArg>,
}

#[derive(Debug, Clone)]
pub struct ValidatedLink {
    pub grantor: String,
    pub grantee: String,
    pub interface: GrantorInterface,
}

/// A plan that passed validation, with its artifacts already resolved.
#[derive(Debug, Clone)]
pub struct ValidatedPlan {
    pub steps: Vec<ValidatedStep>,
    pub link: Option<ValidatedLink>,
    pub fingerprint: String,
}

/// Validate `plan` against the artifacts available from `resolver`.
pub fn validate_plan<R: ArtifactResolver>(
    plan: &DeploymentPlan,
    resolver: &R,
) -> Result<ValidatedPlan, DeployError> {
    if plan.steps.is_empty() {
        return Err(DeployError::validation(PLAN, "plan has no steps"));
    }

    let mut seen = HashSet::new();
    for step in &plan.steps {
        if !seen.insert(step.name.as_str()) {
            return Err(DeployError::validation(&step.name, "duplicate step name"));
        }
    }

    let mut steps = Vec::with_capacity(plan.steps.len());
    for (position, step) in plan.steps.iter().enumerate() {
        // Back-references are checked before touching the resolver
        for arg in &step.args {
            if let ConstructorArg::Ref { step: target } = arg {
                check_reference(plan, position, &step.name, target)?;
            }
        }

        let artifact = resolver
            .resolve(step.contract_name())
            .map_err(|e| DeployError::validation(&step.name, e.to_string()))?;

        if !artifact.is_deployable() {
            return Err(DeployError::validation(
                &step.name,
                format!(
                    "contract `{}` has no bytecode (interface or abstract contract?)",
                    artifact.contract_name
                ),
            ));
        }

        let args = type_arguments(&step.name, &step.args, &artifact)?;

        steps.push(ValidatedStep {
            name: step.name.clone(),
            artifact,
            args,
        });
    }

    let link = match &plan.link {
        None => None,
        Some(link) => {
            let grantor = steps
                .iter()
                .find(|s| s.name == link.grantor)
                .ok_or_else(|| {
                    DeployError::validation(
                        &link.grantor,
                        "authorization grantor is not a step of the plan",
                    )
                })?;
            if plan.position(&link.grantee).is_none() {
                return Err(DeployError::validation(
                    &link.grantee,
                    "authorization grantee is not a step of the plan",
                ));
            }

            let interface = GrantorInterface::from_abi(&link.mode, &grantor.artifact.abi)
                .map_err(|reason| DeployError::validation(&link.grantor, reason))?;

            Some(ValidatedLink {
                grantor: link.grantor.clone(),
                grantee: link.grantee.clone(),
                interface,
            })
        }
    };

    let fingerprint = plan
        .fingerprint()
        .map_err(|e| DeployError::validation(PLAN, format!("{e:#}")))?;

    tracing::debug!(steps = steps.len(), has_link = link.is_some(), "Plan validated");

    Ok(ValidatedPlan {
        steps,
        link,
        fingerprint,
    })
}

fn check_reference(
    plan: &DeploymentPlan,
    position: usize,
    step: &str,
    target: &str,
) -> Result<(), DeployError> {
    match plan.position(target) {
        Some(target_position) if target_position < position => Ok(()),
        Some(target_position) if target_position == position => Err(DeployError::validation(
            step,
            format!("argument references its own step `{target}`"),
        )),
        Some(_) => Err(DeployError::validation(
            step,
            format!("argument references later step `{target}`"),
        )),
        None => Err(DeployError::validation(
            step,
            format!("argument references unknown step `{target}`"),
        )),
    }
}

fn type_arguments(
    step: &str,
    args: &[ConstructorArg],
    artifact: &Artifact,
) -> Result<Vec<TypedArg>, DeployError> {
    let inputs = artifact
        .abi
        .constructor
        .as_ref()
        .map(|c| c.inputs.as_slice())
        .unwrap_or_default();

    if inputs.len() != args.len() {
        return Err(DeployError::validation(
            step,
            format!(
                "constructor of `{}` takes {} argument(s), plan gives {}",
                artifact.contract_name,
                inputs.len(),
                args.len()
            ),
        ));
    }

    inputs
        .iter()
        .zip(args)
        .enumerate()
        .map(|(index, (param, arg))| {
            let ty = param.resolve().map_err(|e| {
                DeployError::validation(
                    step,
                    format!("constructor parameter {index} has unsupported type: {e}"),
                )
            })?;

            match arg {
                ConstructorArg::Ref { step: target } => {
                    if ty != DynSolType::Address {
                        return Err(DeployError::validation(
                            step,
                            format!(
                                "argument {index} references `{target}` but the parameter is \
                                 `{ty}`, not `address`"
                            ),
                        ));
                    }
                    Ok(TypedArg::Ref {
                        step: target.clone(),
                    })
                }
                ConstructorArg::Literal(value) => {
                    let text = ConstructorArg::literal_text(value);
                    ty.coerce_str(&text).map(TypedArg::Value).map_err(|e| {
                        DeployError::validation(
                            step,
                            format!("argument {index} `{text}` is not a valid `{ty}`: {e}"),
                        )
                    })
                }
            }
        })
        .collect()
}

//! Run orchestration: validate, deploy every step, then link.

use alloy_core::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::{
    artifact::ArtifactResolver,
    confirm::ConfirmationWaiter,
    error::DeployError,
    ledger::Ledger,
    linker::{AuthorizationOutcome, Linker},
    plan::DeploymentPlan,
    sequencer::{Deployments, Sequencer},
    signer::Signer,
    validate::{ValidatedPlan, validate_plan},
};

/// Outcome of a run. On failure this is the partial result: exactly the
/// steps that were confirmed before the error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub plan_fingerprint: String,
    pub deployer: Address,
    pub deployments: Deployments,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization: Option<AuthorizationOutcome>,
}

/// A failed run with whatever it completed.
#[derive(Debug, thiserror::Error)]
#[error("run aborted after {} confirmed deployment(s)", .partial.deployments.len())]
pub struct RunError {
    pub partial: RunResult,
    #[source]
    pub error: DeployError,
}

/// Runs deployment plans against one ledger with one deployer identity.
pub struct Orchestrator<L, R> {
    ledger: L,
    resolver: R,
    signer: Signer,
    waiter: ConfirmationWaiter,
}

impl<L: Ledger, R: ArtifactResolver> Orchestrator<L, R> {
    pub fn new(ledger: L, resolver: R, signer: Signer) -> Self {
        Self {
            ledger,
            resolver,
            signer,
            waiter: ConfirmationWaiter::default(),
        }
    }

    pub fn with_waiter(mut self, waiter: ConfirmationWaiter) -> Self {
        self.waiter = waiter;
        self
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn deployer(&self) -> Address {
        self.signer.address()
    }

    /// Check a plan without touching the ledger.
    pub fn validate(&self, plan: &DeploymentPlan) -> Result<ValidatedPlan, DeployError> {
        validate_plan(plan, &self.resolver)
    }

    /// Linker sharing this orchestrator's ledger, identity and confirmation settings.
    pub fn linker(&self) -> Linker<'_, L> {
        Linker::new(&self.ledger, &self.signer, self.waiter)
    }

    /// Execute `plan`: validation, then every deployment in order, then the
    /// authorization link if the plan declares one.
    pub async fn run(&self, plan: &DeploymentPlan) -> Result<RunResult, RunError> {
        match self.validate(plan) {
            Ok(validated) => self.run_validated(&validated).await,
            Err(error) => Err(RunError {
                partial: RunResult {
                    plan_fingerprint: String::new(),
                    deployer: self.signer.address(),
                    deployments: Deployments::new(),
                    authorization: None,
                },
                error,
            }),
        }
    }

    /// Execute a plan that already passed validation. Artifacts are not read
    /// again.
    pub async fn run_validated(&self, validated: &ValidatedPlan) -> Result<RunResult, RunError> {
        let mut result = RunResult {
            plan_fingerprint: validated.fingerprint.clone(),
            deployer: self.signer.address(),
            deployments: Deployments::new(),
            authorization: None,
        };

        tracing::info!(
            deployer = %result.deployer,
            steps = validated.steps.len(),
            fingerprint = %result.plan_fingerprint,
            "Starting deployment"
        );

        let sequencer = Sequencer::new(&self.ledger, &self.signer, self.waiter);
        if let Err(error) = sequencer.run(validated, &mut result.deployments).await {
            tracing::error!(
                completed = result.deployments.len(),
                error = &error as &dyn std::error::Error,
                "Deployment aborted"
            );
            return Err(RunError {
                partial: result,
                error,
            });
        }

        if let Some(link) = &validated.link {
            // Validation guarantees both ends are steps, and every step is now deployed
            let (Some(grantor), Some(grantee)) = (
                result.deployments.address_of(&link.grantor),
                result.deployments.address_of(&link.grantee),
            ) else {
                let error = DeployError::validation(
                    &link.grantor,
                    "authorization link endpoints were not deployed",
                );
                return Err(RunError {
                    partial: result,
                    error,
                });
            };

            match self.linker().link(&link.interface, grantor, grantee).await {
                Ok(outcome) => result.authorization = Some(outcome),
                Err(error) => {
                    tracing::error!(
                        %grantor,
                        %grantee,
                        error = &error as &dyn std::error::Error,
                        "Authorization failed"
                    );
                    return Err(RunError {
                        partial: result,
                        error,
                    });
                }
            }
        }

        tracing::info!(
            deployed = result.deployments.len(),
            linked = result.authorization.is_some(),
            "Deployment complete"
        );

        Ok(result)
    }
}

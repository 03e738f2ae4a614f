//! Deployment Sequencer.
//!
//! Runs validated steps one at a time with a single deployer identity. A step
//! is submitted only after every earlier step is confirmed, so back-references
//! always resolve to addresses that are durably on chain.

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, B256, Bytes},
};
use serde::{Deserialize, Serialize};

use crate::{
    confirm::ConfirmationWaiter,
    error::DeployError,
    ledger::{Ledger, TxRequest},
    signer::Signer,
    validate::{TypedArg, ValidatedPlan, ValidatedStep},
};

/// A confirmed deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedContract {
    pub step: String,
    pub contract: String,
    pub address: Address,
    pub tx_hash: B256,
    pub block_number: u64,
}

/// Confirmed deployments of a run, in plan order.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, derive_more::Deref,
)]
#[serde(transparent)]
pub struct Deployments(Vec<DeployedContract>);

impl Deployments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, step: &str) -> Option<&DeployedContract> {
        self.0.iter().find(|d| d.step == step)
    }

    pub fn address_of(&self, step: &str) -> Option<Address> {
        self.get(step).map(|d| d.address)
    }

    pub(crate) fn record(&mut self, deployed: DeployedContract) {
        self.0.push(deployed);
    }
}

/// Executes the deployment steps of a [`ValidatedPlan`].
pub struct Sequencer<'a, L> {
    ledger: &'a L,
    signer: &'a Signer,
    waiter: ConfirmationWaiter,
}

impl<'a, L: Ledger> Sequencer<'a, L> {
    pub fn new(ledger: &'a L, signer: &'a Signer, waiter: ConfirmationWaiter) -> Self {
        Self {
            ledger,
            signer,
            waiter,
        }
    }

    /// Deploy every step in order, recording each into `deployments` as soon
    /// as it is confirmed. Stops at the first failure; `deployments` then
    /// holds exactly the steps that completed.
    pub async fn run(
        &self,
        plan: &ValidatedPlan,
        deployments: &mut Deployments,
    ) -> Result<(), DeployError> {
        for (index, step) in plan.steps.iter().enumerate() {
            tracing::info!(
                step = %step.name,
                contract = %step.artifact.contract_name,
                index = index + 1,
                total = plan.steps.len(),
                "Deploying"
            );

            let deployed = self.deploy_step(step, deployments).await?;

            tracing::info!(
                step = %deployed.step,
                address = %deployed.address,
                tx_hash = %deployed.tx_hash,
                block = deployed.block_number,
                "Deployed"
            );

            deployments.record(deployed);
        }

        Ok(())
    }

    async fn deploy_step(
        &self,
        step: &ValidatedStep,
        deployments: &Deployments,
    ) -> Result<DeployedContract, DeployError> {
        let init_code = init_code(step, deployments)?;

        let wrap = |source| DeployError::Step {
            step: step.name.clone(),
            source,
        };

        let handle = self
            .ledger
            .submit(TxRequest::Deploy { init_code }, self.signer)
            .await
            .map_err(wrap)?;

        tracing::debug!(step = %step.name, tx_hash = %handle.hash, "Deployment submitted");

        let (address, receipt) = self
            .waiter
            .wait_for_deployment(self.ledger, &handle)
            .await
            .map_err(wrap)?;

        Ok(DeployedContract {
            step: step.name.clone(),
            contract: step.artifact.contract_name.clone(),
            address,
            tx_hash: receipt.tx_hash,
            block_number: receipt.block_number,
        })
    }
}

/// Bytecode followed by the ABI-encoded constructor arguments, with
/// back-references replaced by recorded addresses.
fn init_code(step: &ValidatedStep, deployments: &Deployments) -> Result<Bytes, DeployError> {
    let values = step
        .args
        .iter()
        .map(|arg| match arg {
            TypedArg::Value(value) => Ok(value.clone()),
            TypedArg::Ref { step: target } => deployments
                .address_of(target)
                .map(DynSolValue::Address)
                .ok_or_else(|| {
                    DeployError::validation(
                        &step.name,
                        format!("step `{target}` has no recorded address"),
                    )
                }),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut code = step.artifact.bytecode.to_vec();
    if !values.is_empty() {
        code.extend(DynSolValue::Tuple(values).abi_encode_params());
    }
    Ok(code.into())
}

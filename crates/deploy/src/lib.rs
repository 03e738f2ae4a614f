//! arbor-deploy - Contract deployment and authorization linking.
//!
//! This crate deploys an ordered plan of contracts, wiring each constructor to
//! the addresses of earlier deployments, and then links a grantor contract to
//! a grantee with a one-shot or settable authorization.

mod artifact;
pub use artifact::{Artifact, ArtifactError, ArtifactResolver, DirectoryResolver, InMemoryResolver};

mod config;
pub use config::{
    ArborConfig, ConfirmationConfig, DEFAULT_CONFIG_FILE, DEFAULT_GAS_PRICE_WEI, GasPricePolicy,
    KnownNetwork, MIN_GAS_MULTIPLIER_PERCENT, NetworkConfig, RetryConfig,
};

mod confirm;
pub use confirm::ConfirmationWaiter;

mod error;
pub use error::{DeployError, ErrorKind};

mod ledger;
pub use ledger::{Ledger, LedgerError, Receipt, TxHandle, TxRequest, TxStatus};

mod linker;
pub use linker::{AuthorizationOutcome, GrantorInterface, Linker, query_status};

pub mod memory;
pub use memory::InMemoryLedger;

mod plan;
pub use plan::{
    AuthorizationLink, AuthorizationMode, ConstructorArg, DEFAULT_ONE_SHOT_GRANT,
    DEFAULT_SETTABLE_GRANT, DEFAULT_SETTABLE_STATUS, DeploymentPlan, DeploymentStep,
};

pub mod rpc;
pub use rpc::RpcLedger;

mod runner;
pub use runner::{Orchestrator, RunError, RunResult};

mod sequencer;
pub use sequencer::{DeployedContract, Deployments, Sequencer};

mod signer;
pub use signer::{Signer, TxSignature};

mod tx;
pub use tx::LegacyTransaction;

mod validate;
pub use validate::{TypedArg, ValidatedLink, ValidatedPlan, ValidatedStep, validate_plan};

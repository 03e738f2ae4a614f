//! Error taxonomy of a deployment run.

use alloy_core::primitives::{Address, B256};

use crate::ledger::LedgerError;

/// Broad class of a [`DeployError`], used by callers that only care about
/// how a run failed, not where.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorKind {
    /// Rejected before any transaction was submitted.
    PlanValidation,
    /// Transport failure, or no inclusion observed in time.
    Network,
    /// The ledger executed the transaction and it reverted.
    RevertedTransaction,
    /// The node dropped a submitted transaction.
    Dropped,
    /// A settable grant succeeded but the follow-up query disagreed.
    ConsistencyFailure,
    /// Everything else (ABI encoding, signing, unsupported operations).
    Other,
}

/// Errors surfaced by the orchestrator.
///
/// Every variant raised after validation names where it happened: the step
/// for deployments, grantor and grantee addresses for authorization calls.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("invalid plan at step `{step}`: {reason}")]
    PlanValidation { step: String, reason: String },

    #[error("step `{step}` failed")]
    Step {
        step: String,
        #[source]
        source: LedgerError,
    },

    #[error("authorization call on {grantor} for {grantee} failed")]
    Authorization {
        grantor: Address,
        grantee: Address,
        #[source]
        source: LedgerError,
    },

    #[error("status of {grantee} on {grantor} reads authorized={observed} after {tx_hash}")]
    Consistency {
        grantor: Address,
        grantee: Address,
        tx_hash: B256,
        observed: bool,
    },

    #[error("abi error in {context}: {reason}")]
    Abi { context: String, reason: String },

    #[error("{operation} is not supported by {mode} authorization")]
    Unsupported {
        operation: &'static str,
        mode: &'static str,
    },
}

impl DeployError {
    pub(crate) fn validation(step: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PlanValidation {
            step: step.into(),
            reason: reason.into(),
        }
    }

    /// The ledger failure underneath, if any.
    pub fn ledger_error(&self) -> Option<&LedgerError> {
        match self {
            DeployError::Step { source, .. } | DeployError::Authorization { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DeployError::PlanValidation { .. } => ErrorKind::PlanValidation,
            DeployError::Consistency { .. } => ErrorKind::ConsistencyFailure,
            DeployError::Abi { .. } | DeployError::Unsupported { .. } => ErrorKind::Other,
            DeployError::Step { source, .. } | DeployError::Authorization { source, .. } => {
                match source {
                    LedgerError::Network(_)
                    | LedgerError::Timeout { .. }
                    | LedgerError::Rpc { .. } => ErrorKind::Network,
                    LedgerError::Reverted { .. } => ErrorKind::RevertedTransaction,
                    LedgerError::Dropped { .. } => ErrorKind::Dropped,
                    LedgerError::MissingContractAddress { .. }
                    | LedgerError::Signing(_)
                    | LedgerError::ChainMismatch { .. } => ErrorKind::Other,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_follows_ledger_source() {
        let err = DeployError::Step {
            step: "TokenX".to_string(),
            source: LedgerError::Network("timeout".to_string()),
        };
        assert_eq!(err.kind(), ErrorKind::Network);

        let err = DeployError::Authorization {
            grantor: Address::ZERO,
            grantee: Address::ZERO,
            source: LedgerError::Reverted {
                tx_hash: None,
                reason: Some("already authorized".to_string()),
            },
        };
        assert_eq!(err.kind(), ErrorKind::RevertedTransaction);
        assert!(err.ledger_error().is_some());
    }

    #[test]
    fn test_step_error_names_step_and_cause_once() {
        let err = DeployError::Step {
            step: "MarketY".to_string(),
            source: LedgerError::Reverted {
                tx_hash: None,
                reason: Some("bad token".to_string()),
            },
        };
        // The cause is reported once, as the source
        assert_eq!(err.to_string(), "step `MarketY` failed");
        assert_eq!(
            std::error::Error::source(&err).map(ToString::to_string),
            Some("transaction reverted: bad token".to_string())
        );
        assert_eq!(
            format!("{:#}", anyhow::Error::from(err)),
            "step `MarketY` failed: transaction reverted: bad token"
        );
    }

    #[test]
    fn test_kind_display_is_kebab_case() {
        assert_eq!(ErrorKind::RevertedTransaction.to_string(), "reverted-transaction");
        assert_eq!(ErrorKind::PlanValidation.to_string(), "plan-validation");
    }
}

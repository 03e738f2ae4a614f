//! Ledger client interface used by the orchestrator.
//!
//! The orchestrator never talks to a node directly: it submits [`TxRequest`]s
//! through a [`Ledger`] and polls their [`TxStatus`] until inclusion. The
//! JSON-RPC implementation lives in [`crate::rpc`], a deterministic in-memory
//! one in [`crate::memory`].

use std::{future::Future, time::Duration};

use alloy_core::primitives::{Address, B256, Bytes};
use serde::{Deserialize, Serialize};

use crate::signer::Signer;

/// A transaction the orchestrator wants on chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxRequest {
    /// Contract creation with the given init code (bytecode + encoded constructor args).
    Deploy { init_code: Bytes },
    /// Call to an existing contract.
    Call { to: Address, data: Bytes },
}

impl TxRequest {
    /// The call target, `None` for contract creation.
    pub fn to(&self) -> Option<Address> {
        match self {
            TxRequest::Deploy { .. } => None,
            TxRequest::Call { to, .. } => Some(*to),
        }
    }

    /// The transaction input data.
    pub fn input(&self) -> &Bytes {
        match self {
            TxRequest::Deploy { init_code } => init_code,
            TxRequest::Call { data, .. } => data,
        }
    }
}

/// Handle to a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHandle {
    pub hash: B256,
}

/// Receipt of an included transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: B256,
    pub block_number: u64,
    pub success: bool,
    /// Set for successful contract creations.
    pub contract_address: Option<Address>,
    pub gas_used: u64,
}

/// Inclusion status of a submitted transaction as reported by the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    /// Known to the node but not yet included.
    Pending,
    /// The node does not know the transaction (dropped or not yet propagated).
    Unknown,
    /// Included in a block.
    Included(Receipt),
}

/// Errors reported by a ledger client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// Transport failure while talking to the node. Safe to retry for reads.
    #[error("network error: {0}")]
    Network(String),

    /// The transaction (or its gas estimation) reverted.
    #[error("transaction reverted: {}", .reason.as_deref().unwrap_or("no reason given"))]
    Reverted {
        tx_hash: Option<B256>,
        reason: Option<String>,
    },

    /// The node no longer knows a transaction it accepted.
    #[error("transaction {tx_hash} was dropped")]
    Dropped { tx_hash: B256 },

    /// Inclusion was not observed within the confirmation timeout.
    #[error("transaction {tx_hash} not included after {waited:?}")]
    Timeout { tx_hash: B256, waited: Duration },

    /// A successful creation receipt without a contract address.
    #[error("receipt for {tx_hash} carries no contract address")]
    MissingContractAddress { tx_hash: B256 },

    /// The node answered with a JSON-RPC error that is not a revert.
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The deployer identity could not sign.
    #[error("signing failed: {0}")]
    Signing(String),

    /// The node serves a different chain than configured.
    #[error("node reports chain id {actual}, expected {expected}")]
    ChainMismatch { expected: u64, actual: u64 },
}

impl LedgerError {
    /// Whether the failure is a transport hiccup that a bounded retry may fix.
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Network(_))
    }
}

/// Access to the underlying ledger.
///
/// Implementations must not retry [`Ledger::submit`]: a grant call is not
/// guaranteed to be idempotent.
pub trait Ledger: Send + Sync {
    /// Sign `request` with `signer` and hand it to the ledger.
    fn submit(
        &self,
        request: TxRequest,
        signer: &Signer,
    ) -> impl Future<Output = Result<TxHandle, LedgerError>> + Send;

    /// Current inclusion status of a submitted transaction.
    fn status(&self, handle: &TxHandle)
    -> impl Future<Output = Result<TxStatus, LedgerError>> + Send;

    /// Best-effort revert reason for a failed receipt.
    fn revert_reason(&self, receipt: &Receipt) -> impl Future<Output = Option<String>> + Send;

    /// Read-only call against the latest state.
    fn call(
        &self,
        to: Address,
        data: Bytes,
    ) -> impl Future<Output = Result<Bytes, LedgerError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_network_errors_are_transient() {
        assert!(LedgerError::Network("connection reset".to_string()).is_transient());
        assert!(
            !LedgerError::Reverted {
                tx_hash: None,
                reason: None
            }
            .is_transient()
        );
        assert!(
            !LedgerError::Rpc {
                code: -32000,
                message: "nonce too low".to_string()
            }
            .is_transient()
        );
    }

    #[test]
    fn test_revert_display_includes_reason() {
        let err = LedgerError::Reverted {
            tx_hash: None,
            reason: Some("already authorized".to_string()),
        };
        assert_eq!(err.to_string(), "transaction reverted: already authorized");

        let err = LedgerError::Reverted {
            tx_hash: None,
            reason: None,
        };
        assert_eq!(err.to_string(), "transaction reverted: no reason given");
    }
}

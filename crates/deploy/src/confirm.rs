//! Inclusion polling.

use std::time::Duration;

use alloy_core::primitives::Address;
use tokio::time::Instant;

use crate::{
    config::ConfirmationConfig,
    ledger::{Ledger, LedgerError, Receipt, TxHandle, TxStatus},
};

/// Polls a [`Ledger`] until a submitted transaction is included, dropped or
/// the timeout elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationWaiter {
    poll_interval: Duration,
    timeout: Duration,
    drop_grace_polls: u32,
}

impl Default for ConfirmationWaiter {
    fn default() -> Self {
        Self::new(&ConfirmationConfig::default())
    }
}

impl ConfirmationWaiter {
    pub fn new(config: &ConfirmationConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            timeout: config.timeout(),
            drop_grace_polls: config.drop_grace_polls,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_drop_grace_polls(mut self, polls: u32) -> Self {
        self.drop_grace_polls = polls;
        self
    }

    /// Wait until `handle` is included and succeeded.
    ///
    /// A failed receipt becomes [`LedgerError::Reverted`] with the reason the
    /// ledger can recover. Transport errors while polling are logged and
    /// polling continues until the timeout.
    pub async fn wait_for_receipt<L: Ledger>(
        &self,
        ledger: &L,
        handle: &TxHandle,
    ) -> Result<Receipt, LedgerError> {
        let start = Instant::now();
        let mut unknown_polls = 0u32;

        loop {
            match ledger.status(handle).await {
                Ok(TxStatus::Included(receipt)) if receipt.success => {
                    tracing::debug!(
                        tx_hash = %handle.hash,
                        block = receipt.block_number,
                        gas_used = receipt.gas_used,
                        "Transaction included"
                    );
                    return Ok(receipt);
                }
                Ok(TxStatus::Included(receipt)) => {
                    let reason = ledger.revert_reason(&receipt).await;
                    tracing::debug!(tx_hash = %handle.hash, ?reason, "Transaction reverted");
                    return Err(LedgerError::Reverted {
                        tx_hash: Some(handle.hash),
                        reason,
                    });
                }
                Ok(TxStatus::Pending) => unknown_polls = 0,
                Ok(TxStatus::Unknown) => {
                    unknown_polls += 1;
                    if unknown_polls > self.drop_grace_polls {
                        return Err(LedgerError::Dropped {
                            tx_hash: handle.hash,
                        });
                    }
                }
                Err(e) if e.is_transient() => {
                    tracing::warn!(
                        tx_hash = %handle.hash,
                        error = %e,
                        "Status poll failed, retrying..."
                    );
                }
                Err(e) => return Err(e),
            }

            let waited = start.elapsed();
            if waited >= self.timeout {
                return Err(LedgerError::Timeout {
                    tx_hash: handle.hash,
                    waited,
                });
            }

            tracing::trace!(tx_hash = %handle.hash, ?waited, "Waiting for inclusion");
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Wait for a contract creation and return the created address.
    pub async fn wait_for_deployment<L: Ledger>(
        &self,
        ledger: &L,
        handle: &TxHandle,
    ) -> Result<(Address, Receipt), LedgerError> {
        let receipt = self.wait_for_receipt(ledger, handle).await?;
        let address = receipt
            .contract_address
            .ok_or(LedgerError::MissingContractAddress {
                tx_hash: handle.hash,
            })?;
        Ok((address, receipt))
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, sync::Mutex};

    use alloy_core::primitives::{B256, Bytes};

    use super::*;
    use crate::{ledger::TxRequest, signer::Signer};

    /// Answers status polls from a script; the last entry repeats.
    struct ScriptedLedger {
        statuses: Mutex<VecDeque<Result<TxStatus, LedgerError>>>,
        polls: Mutex<usize>,
    }

    impl ScriptedLedger {
        fn new(statuses: Vec<Result<TxStatus, LedgerError>>) -> Self {
            Self {
                statuses: Mutex::new(statuses.into()),
                polls: Mutex::new(0),
            }
        }

        fn polls(&self) -> usize {
            *self.polls.lock().unwrap()
        }
    }

    impl Ledger for ScriptedLedger {
        async fn submit(&self, _: TxRequest, _: &Signer) -> Result<TxHandle, LedgerError> {
            unimplemented!("not used by the waiter")
        }

        async fn status(&self, _: &TxHandle) -> Result<TxStatus, LedgerError> {
            *self.polls.lock().unwrap() += 1;
            let mut statuses = self.statuses.lock().unwrap();
            if statuses.len() > 1 {
                statuses.pop_front().unwrap()
            } else {
                statuses.front().cloned().unwrap()
            }
        }

        async fn revert_reason(&self, _: &Receipt) -> Option<String> {
            Some("already authorized".to_string())
        }

        async fn call(&self, _: Address, _: Bytes) -> Result<Bytes, LedgerError> {
            unimplemented!("not used by the waiter")
        }
    }

    fn receipt(success: bool, contract_address: Option<Address>) -> Receipt {
        Receipt {
            tx_hash: B256::repeat_byte(0x11),
            block_number: 7,
            success,
            contract_address,
            gas_used: 21_000,
        }
    }

    fn waiter() -> ConfirmationWaiter {
        ConfirmationWaiter::default()
            .with_poll_interval(Duration::from_millis(1))
            .with_timeout(Duration::from_secs(5))
            .with_drop_grace_polls(2)
    }

    fn handle() -> TxHandle {
        TxHandle {
            hash: B256::repeat_byte(0x11),
        }
    }

    #[tokio::test]
    async fn test_waits_through_pending_and_network_errors() {
        let ledger = ScriptedLedger::new(vec![
            Ok(TxStatus::Pending),
            Err(LedgerError::Network("connection reset".to_string())),
            Ok(TxStatus::Pending),
            Ok(TxStatus::Included(receipt(true, None))),
        ]);

        let receipt = waiter().wait_for_receipt(&ledger, &handle()).await.unwrap();
        assert_eq!(receipt.block_number, 7);
        assert_eq!(ledger.polls(), 4);
    }

    #[tokio::test]
    async fn test_failed_receipt_is_revert_with_reason() {
        let ledger = ScriptedLedger::new(vec![Ok(TxStatus::Included(receipt(false, None)))]);

        let err = waiter().wait_for_receipt(&ledger, &handle()).await.unwrap_err();
        assert_eq!(
            err,
            LedgerError::Reverted {
                tx_hash: Some(handle().hash),
                reason: Some("already authorized".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_beyond_grace_is_dropped() {
        let ledger = ScriptedLedger::new(vec![Ok(TxStatus::Pending), Ok(TxStatus::Unknown)]);

        let err = waiter().wait_for_receipt(&ledger, &handle()).await.unwrap_err();
        assert_eq!(
            err,
            LedgerError::Dropped {
                tx_hash: handle().hash,
            }
        );
        // One pending poll, then grace + 1 unknown polls
        assert_eq!(ledger.polls(), 4);
    }

    #[tokio::test]
    async fn test_rpc_error_is_not_retried() {
        let ledger = ScriptedLedger::new(vec![Err(LedgerError::Rpc {
            code: -32601,
            message: "method not found".to_string(),
        })]);

        let err = waiter().wait_for_receipt(&ledger, &handle()).await.unwrap_err();
        assert!(matches!(err, LedgerError::Rpc { code: -32601, .. }));
        assert_eq!(ledger.polls(), 1);
    }

    #[tokio::test]
    async fn test_timeout() {
        let ledger = ScriptedLedger::new(vec![Ok(TxStatus::Pending)]);

        let err = waiter()
            .with_timeout(Duration::from_millis(20))
            .wait_for_receipt(&ledger, &handle())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_deployment_requires_contract_address() {
        let address = Address::repeat_byte(0xaa);
        let ledger =
            ScriptedLedger::new(vec![Ok(TxStatus::Included(receipt(true, Some(address))))]);
        let (deployed, _) = waiter().wait_for_deployment(&ledger, &handle()).await.unwrap();
        assert_eq!(deployed, address);

        let ledger = ScriptedLedger::new(vec![Ok(TxStatus::Included(receipt(true, None)))]);
        let err = waiter()
            .wait_for_deployment(&ledger, &handle())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::MissingContractAddress { .. }));
    }
}

//! Deterministic in-memory ledger.
//!
//! Simulates just enough of an EVM chain to exercise the orchestrator:
//! contract creation with CREATE addresses, per-sender nonces, delayed
//! inclusion, and grantor contracts with one-shot or settable authorization.
//! Grantor behaviour is attached to artifacts by bytecode prefix with
//! [`InMemoryLedger::register_authority`].

use std::{
    collections::{HashMap, HashSet},
    sync::{Mutex, MutexGuard},
};

use alloy_core::primitives::{Address, B256, Bytes, Selector, U256, keccak256};

use crate::{
    ledger::{Ledger, LedgerError, Receipt, TxHandle, TxRequest, TxStatus},
    signer::Signer,
};

/// Revert reason of a repeated one-shot grant.
pub const ALREADY_AUTHORIZED: &str = "already authorized";

const GAS_PER_TX: u64 = 21_000;

fn selector(signature: &str) -> Selector {
    Selector::from_slice(&keccak256(signature.as_bytes())[..4])
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AuthorityKind {
    OneShot {
        grant: Selector,
    },
    Settable {
        grant: Selector,
        status: Selector,
        revoke: Option<Selector>,
    },
}

/// Authorization behaviour of a simulated grantor contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authority {
    kind: AuthorityKind,
    effective: bool,
}

impl Authority {
    /// Grant accepted once per contract; any later grant reverts.
    pub fn one_shot(grant: &str) -> Self {
        Self {
            kind: AuthorityKind::OneShot {
                grant: selector(grant),
            },
            effective: true,
        }
    }

    /// Grant and revoke settable any number of times, with a status query.
    /// Signatures are canonical, e.g. `"authorizeMinter(address)"`.
    pub fn settable(grant: &str, status: &str, revoke: Option<&str>) -> Self {
        Self {
            kind: AuthorityKind::Settable {
                grant: selector(grant),
                status: selector(status),
                revoke: revoke.map(selector),
            },
            effective: true,
        }
    }

    /// Calls succeed but leave the authorization state untouched.
    pub fn without_effect(mut self) -> Self {
        self.effective = false;
        self
    }
}

/// Observable ledger activity, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
    Submitted {
        tx_hash: B256,
        from: Address,
        to: Option<Address>,
    },
    Included {
        tx_hash: B256,
        block_number: u64,
        success: bool,
        contract_address: Option<Address>,
    },
    Call {
        to: Address,
    },
}

#[derive(Debug)]
enum SubmissionFault {
    Fail(LedgerError),
    Drop,
}

#[derive(Debug)]
struct Contract {
    authority: Option<Authority>,
    granted_once: bool,
    authorized: HashSet<Address>,
}

#[derive(Debug)]
struct PendingTx {
    from: Address,
    nonce: u64,
    request: TxRequest,
    polls_left: u32,
    dropped: bool,
    outcome: Option<(Receipt, Option<String>)>,
}

#[derive(Debug, Default)]
struct State {
    block_number: u64,
    submissions: usize,
    nonces: HashMap<Address, u64>,
    authorities: Vec<(Bytes, Authority)>,
    contracts: HashMap<Address, Contract>,
    transactions: HashMap<B256, PendingTx>,
    faults: HashMap<usize, SubmissionFault>,
    journal: Vec<LedgerEvent>,
}

/// A [`Ledger`] kept entirely in memory.
#[derive(Debug)]
pub struct InMemoryLedger {
    chain_id: u64,
    confirmation_polls: u32,
    state: Mutex<State>,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            chain_id: 31337,
            confirmation_polls: 0,
            state: Mutex::new(State::default()),
        }
    }

    /// Number of `Pending` status answers before a transaction is included.
    pub fn with_confirmation_polls(mut self, polls: u32) -> Self {
        self.confirmation_polls = polls;
        self
    }

    /// Contracts created from init code starting with `bytecode` behave as
    /// grantors with `authority`.
    pub fn register_authority(&self, bytecode: Bytes, authority: Authority) {
        self.state().authorities.push((bytecode, authority));
    }

    /// Make the `index`-th submission (0-based) fail with `error` before it
    /// reaches the ledger.
    pub fn fail_submission(&self, index: usize, error: LedgerError) {
        self.state()
            .faults
            .insert(index, SubmissionFault::Fail(error));
    }

    /// Accept the `index`-th submission (0-based) but never include it.
    pub fn drop_submission(&self, index: usize) {
        self.state().faults.insert(index, SubmissionFault::Drop);
    }

    pub fn journal(&self) -> Vec<LedgerEvent> {
        self.state().journal.clone()
    }

    /// Number of transactions that reached the ledger.
    pub fn submitted_count(&self) -> usize {
        self.state()
            .journal
            .iter()
            .filter(|e| matches!(e, LedgerEvent::Submitted { .. }))
            .count()
    }

    pub fn is_deployed(&self, address: Address) -> bool {
        self.state().contracts.contains_key(&address)
    }

    /// Authorization state of a grantor, whatever its mode.
    pub fn is_authorized(&self, grantor: Address, grantee: Address) -> bool {
        self.state()
            .contracts
            .get(&grantor)
            .is_some_and(|c| c.authorized.contains(&grantee))
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock leaves the simulation unusable anyway
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn tx_hash(&self, from: Address, nonce: u64, request: &TxRequest) -> B256 {
        let mut preimage = Vec::with_capacity(8 + 20 + 8 + request.input().len());
        preimage.extend_from_slice(&self.chain_id.to_be_bytes());
        preimage.extend_from_slice(from.as_slice());
        preimage.extend_from_slice(&nonce.to_be_bytes());
        preimage.extend_from_slice(request.input());
        keccak256(&preimage)
    }
}

impl State {
    /// Apply an included transaction and produce its receipt.
    fn execute(&mut self, tx_hash: B256, tx: &PendingTx) -> (Receipt, Option<String>) {
        self.block_number += 1;

        let (success, contract_address, reason) = match &tx.request {
            TxRequest::Deploy { init_code } => {
                let address = tx.from.create(tx.nonce);
                let authority = self
                    .authorities
                    .iter()
                    .find(|(bytecode, _)| init_code.starts_with(bytecode))
                    .map(|(_, authority)| authority.clone());
                self.contracts.insert(address, Contract {
                    authority,
                    granted_once: false,
                    authorized: HashSet::new(),
                });
                (true, Some(address), None)
            }
            TxRequest::Call { to, data } => match self.call_contract(*to, data) {
                Ok(()) => (true, None, None),
                Err(reason) => (false, None, reason),
            },
        };

        let receipt = Receipt {
            tx_hash,
            block_number: self.block_number,
            success,
            contract_address,
            gas_used: GAS_PER_TX,
        };

        self.journal.push(LedgerEvent::Included {
            tx_hash,
            block_number: self.block_number,
            success,
            contract_address,
        });

        (receipt, reason)
    }

    /// State-changing call. `Err` carries the revert reason.
    fn call_contract(&mut self, to: Address, data: &[u8]) -> Result<(), Option<String>> {
        let contract = self.contracts.get_mut(&to).ok_or(None)?;
        let authority = contract.authority.as_ref().ok_or(None)?;
        let (selector, account) = decode_address_call(data).ok_or(None)?;

        match &authority.kind {
            AuthorityKind::OneShot { grant } if *grant == selector => {
                if contract.granted_once {
                    return Err(Some(ALREADY_AUTHORIZED.to_string()));
                }
                if authority.effective {
                    contract.granted_once = true;
                    contract.authorized.insert(account);
                }
                Ok(())
            }
            AuthorityKind::Settable { grant, .. } if *grant == selector => {
                if authority.effective {
                    contract.authorized.insert(account);
                }
                Ok(())
            }
            AuthorityKind::Settable {
                revoke: Some(revoke),
                ..
            } if *revoke == selector => {
                if authority.effective {
                    contract.authorized.remove(&account);
                }
                Ok(())
            }
            _ => Err(None),
        }
    }

    /// Read-only call. Only settable status queries answer.
    fn view(&self, to: Address, data: &[u8]) -> Option<Bytes> {
        let contract = self.contracts.get(&to)?;
        let (selector, account) = decode_address_call(data)?;
        match contract.authority.as_ref().map(|a| &a.kind) {
            Some(AuthorityKind::Settable { status, .. }) if *status == selector => {
                let authorized = contract.authorized.contains(&account);
                Some(Bytes::from(
                    U256::from(authorized as u8).to_be_bytes::<32>().to_vec(),
                ))
            }
            _ => None,
        }
    }
}

/// Split `selector ++ abi.encode(address)` call data.
fn decode_address_call(data: &[u8]) -> Option<(Selector, Address)> {
    if data.len() != 4 + 32 {
        return None;
    }
    Some((
        Selector::from_slice(&data[..4]),
        Address::from_slice(&data[16..36]),
    ))
}

impl Ledger for InMemoryLedger {
    async fn submit(&self, request: TxRequest, signer: &Signer) -> Result<TxHandle, LedgerError> {
        let from = signer.address();
        let mut state = self.state();

        let index = state.submissions;
        state.submissions += 1;
        let dropped = match state.faults.remove(&index) {
            Some(SubmissionFault::Fail(error)) => return Err(error),
            Some(SubmissionFault::Drop) => true,
            None => false,
        };

        let nonce = *state.nonces.get(&from).unwrap_or(&0);
        state.nonces.insert(from, nonce + 1);

        let tx_hash = self.tx_hash(from, nonce, &request);
        state.journal.push(LedgerEvent::Submitted {
            tx_hash,
            from,
            to: request.to(),
        });
        state.transactions.insert(tx_hash, PendingTx {
            from,
            nonce,
            request,
            polls_left: self.confirmation_polls,
            dropped,
            outcome: None,
        });

        Ok(TxHandle { hash: tx_hash })
    }

    async fn status(&self, handle: &TxHandle) -> Result<TxStatus, LedgerError> {
        let mut state = self.state();

        let Some(mut tx) = state.transactions.remove(&handle.hash) else {
            return Ok(TxStatus::Unknown);
        };

        let status = if tx.dropped {
            TxStatus::Unknown
        } else if let Some((receipt, _)) = &tx.outcome {
            TxStatus::Included(receipt.clone())
        } else if tx.polls_left > 0 {
            tx.polls_left -= 1;
            TxStatus::Pending
        } else {
            let outcome = state.execute(handle.hash, &tx);
            let receipt = outcome.0.clone();
            tx.outcome = Some(outcome);
            TxStatus::Included(receipt)
        };

        state.transactions.insert(handle.hash, tx);
        Ok(status)
    }

    async fn revert_reason(&self, receipt: &Receipt) -> Option<String> {
        self.state()
            .transactions
            .get(&receipt.tx_hash)
            .and_then(|tx| tx.outcome.as_ref())
            .and_then(|(_, reason)| reason.clone())
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, LedgerError> {
        let mut state = self.state();
        state.journal.push(LedgerEvent::Call { to });
        state.view(to, &data).ok_or(LedgerError::Reverted {
            tx_hash: None,
            reason: None,
        })
    }
}

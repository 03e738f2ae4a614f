//! Authorization Linker.
//!
//! Issues the capability grant from a grantor contract to a grantee contract.
//! One-shot grantors accept the grant exactly once: the linker never pre-checks
//! and a revert is surfaced as is. Settable grantors expose a status query: the
//! linker skips the grant when the pair is already authorized and verifies the
//! status after granting or revoking.

use alloy_core::{
    dyn_abi::{DynSolValue, FunctionExt, JsonAbiExt},
    json_abi::{Function, JsonAbi},
    primitives::{Address, B256, Bytes},
};
use serde::{Deserialize, Serialize};

use crate::{
    confirm::ConfirmationWaiter,
    error::DeployError,
    ledger::{Ledger, LedgerError, TxRequest},
    plan::AuthorizationMode,
    signer::Signer,
};

/// Grantor functions resolved from its ABI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantorInterface {
    OneShot {
        grant: Function,
    },
    Settable {
        grant: Function,
        status: Function,
        revoke: Option<Function>,
    },
}

impl GrantorInterface {
    /// Resolve the functions named by `mode` in the grantor ABI.
    ///
    /// Grant, status and revoke must take a single `address`; status must
    /// return a single `bool`.
    pub fn from_abi(mode: &AuthorizationMode, abi: &JsonAbi) -> Result<Self, String> {
        match mode {
            AuthorizationMode::OneShot { grant } => Ok(Self::OneShot {
                grant: find_address_function(abi, grant)?,
            }),
            AuthorizationMode::Settable {
                grant,
                status,
                revoke,
            } => {
                let grant = find_address_function(abi, grant)?;
                let status = find_address_function(abi, status)?;
                if status.outputs.len() != 1 || status.outputs[0].ty != "bool" {
                    return Err(format!(
                        "status function `{}` must return a single bool",
                        status.signature()
                    ));
                }
                Ok(Self::Settable {
                    grant,
                    status,
                    revoke: revoke
                        .as_deref()
                        .map(|name| find_address_function(abi, name))
                        .transpose()?,
                })
            }
        }
    }

    pub fn mode_name(&self) -> &'static str {
        match self {
            GrantorInterface::OneShot { .. } => "one-shot",
            GrantorInterface::Settable { .. } => "settable",
        }
    }

    fn grant(&self) -> &Function {
        match self {
            GrantorInterface::OneShot { grant } | GrantorInterface::Settable { grant, .. } => grant,
        }
    }
}

fn find_address_function(abi: &JsonAbi, name: &str) -> Result<Function, String> {
    let overloads = abi
        .function(name)
        .ok_or_else(|| format!("grantor has no function `{name}`"))?;

    overloads
        .iter()
        .find(|f| f.inputs.len() == 1 && f.inputs[0].ty == "address")
        .cloned()
        .ok_or_else(|| format!("grantor function `{name}` must take a single address"))
}

/// Result of linking a grantor to a grantee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum AuthorizationOutcome {
    /// A grant transaction was confirmed.
    Granted {
        grantor: Address,
        grantee: Address,
        tx_hash: B256,
        /// Whether a status query confirmed the grant (settable only).
        verified: bool,
    },
    /// A settable grantor already authorized the grantee; nothing was sent.
    AlreadyAuthorized { grantor: Address, grantee: Address },
}

/// Issues authorization calls with the run's deployer identity.
pub struct Linker<'a, L> {
    ledger: &'a L,
    signer: &'a Signer,
    waiter: ConfirmationWaiter,
}

impl<'a, L: Ledger> Linker<'a, L> {
    pub fn new(ledger: &'a L, signer: &'a Signer, waiter: ConfirmationWaiter) -> Self {
        Self {
            ledger,
            signer,
            waiter,
        }
    }

    /// Authorize `grantee` on `grantor` according to the grantor's mode.
    pub async fn link(
        &self,
        interface: &GrantorInterface,
        grantor: Address,
        grantee: Address,
    ) -> Result<AuthorizationOutcome, DeployError> {
        tracing::info!(
            %grantor,
            %grantee,
            mode = interface.mode_name(),
            "Linking authorization"
        );

        match interface {
            GrantorInterface::OneShot { .. } => {
                let tx_hash = self.grant(interface, grantor, grantee).await?;
                Ok(AuthorizationOutcome::Granted {
                    grantor,
                    grantee,
                    tx_hash,
                    verified: false,
                })
            }
            GrantorInterface::Settable { .. } => {
                if self.status(interface, grantor, grantee).await? {
                    tracing::info!(%grantor, %grantee, "Grantee already authorized, skipping");
                    return Ok(AuthorizationOutcome::AlreadyAuthorized { grantor, grantee });
                }

                let tx_hash = self.grant(interface, grantor, grantee).await?;
                self.verify(interface, grantor, grantee, tx_hash, true).await?;

                Ok(AuthorizationOutcome::Granted {
                    grantor,
                    grantee,
                    tx_hash,
                    verified: true,
                })
            }
        }
    }

    /// Send one grant transaction and wait for it. Never retried.
    pub async fn grant(
        &self,
        interface: &GrantorInterface,
        grantor: Address,
        grantee: Address,
    ) -> Result<B256, DeployError> {
        self.send(interface.grant(), grantor, grantee).await
    }

    /// Read the authorization state. Settable grantors only.
    pub async fn status(
        &self,
        interface: &GrantorInterface,
        grantor: Address,
        grantee: Address,
    ) -> Result<bool, DeployError> {
        query_status(self.ledger, interface, grantor, grantee).await
    }

    /// Clear the authorization and verify it is gone. Settable grantors with a
    /// revoke function only.
    pub async fn revoke(
        &self,
        interface: &GrantorInterface,
        grantor: Address,
        grantee: Address,
    ) -> Result<B256, DeployError> {
        let GrantorInterface::Settable {
            revoke: Some(revoke),
            ..
        } = interface
        else {
            return Err(DeployError::Unsupported {
                operation: "revoke",
                mode: match interface {
                    GrantorInterface::OneShot { .. } => "one-shot",
                    GrantorInterface::Settable { .. } => "settable without a revoke function",
                },
            });
        };

        tracing::info!(%grantor, %grantee, "Revoking authorization");
        let tx_hash = self.send(revoke, grantor, grantee).await?;
        self.verify(interface, grantor, grantee, tx_hash, false).await?;
        Ok(tx_hash)
    }

    async fn send(
        &self,
        function: &Function,
        grantor: Address,
        grantee: Address,
    ) -> Result<B256, DeployError> {
        let data = encode_address_call(function, grantee)?;
        let wrap = |source: LedgerError| DeployError::Authorization {
            grantor,
            grantee,
            source,
        };

        let handle = self
            .ledger
            .submit(TxRequest::Call { to: grantor, data }, self.signer)
            .await
            .map_err(wrap)?;

        tracing::debug!(
            %grantor,
            function = %function.signature(),
            tx_hash = %handle.hash,
            "Authorization call submitted"
        );

        let receipt = self
            .waiter
            .wait_for_receipt(self.ledger, &handle)
            .await
            .map_err(wrap)?;

        tracing::info!(
            %grantor,
            %grantee,
            function = %function.name,
            tx_hash = %receipt.tx_hash,
            block = receipt.block_number,
            "Authorization call confirmed"
        );

        Ok(receipt.tx_hash)
    }

    async fn verify(
        &self,
        interface: &GrantorInterface,
        grantor: Address,
        grantee: Address,
        tx_hash: B256,
        expected: bool,
    ) -> Result<(), DeployError> {
        let observed = self.status(interface, grantor, grantee).await?;
        if observed != expected {
            return Err(DeployError::Consistency {
                grantor,
                grantee,
                tx_hash,
                observed,
            });
        }
        Ok(())
    }
}

/// Read the authorization state of a settable grantor. Needs no signer.
pub async fn query_status<L: Ledger>(
    ledger: &L,
    interface: &GrantorInterface,
    grantor: Address,
    grantee: Address,
) -> Result<bool, DeployError> {
    let GrantorInterface::Settable { status, .. } = interface else {
        return Err(DeployError::Unsupported {
            operation: "status query",
            mode: interface.mode_name(),
        });
    };

    let data = encode_address_call(status, grantee)?;
    let output = ledger
        .call(grantor, data)
        .await
        .map_err(|source| DeployError::Authorization {
            grantor,
            grantee,
            source,
        })?;

    let decoded = status
        .abi_decode_output(&output, true)
        .map_err(|e| DeployError::Abi {
            context: format!("{} on {grantor}", status.signature()),
            reason: e.to_string(),
        })?;

    match decoded.as_slice() {
        [DynSolValue::Bool(authorized)] => {
            tracing::debug!(%grantor, %grantee, authorized, "Authorization status");
            Ok(*authorized)
        }
        other => Err(DeployError::Abi {
            context: format!("{} on {grantor}", status.signature()),
            reason: format!("expected a single bool, got {other:?}"),
        }),
    }
}

fn encode_address_call(function: &Function, account: Address) -> Result<Bytes, DeployError> {
    function
        .abi_encode_input(&[DynSolValue::Address(account)])
        .map(Bytes::from)
        .map_err(|e| DeployError::Abi {
            context: function.signature(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abi(signatures: &[&str]) -> JsonAbi {
        JsonAbi::parse(signatures.iter().copied()).unwrap()
    }

    #[test]
    fn test_one_shot_interface() {
        let interface = GrantorInterface::from_abi(
            &AuthorizationMode::one_shot(),
            &abi(&["function authorizeOnce(address minter)"]),
        )
        .unwrap();

        assert_eq!(interface.mode_name(), "one-shot");
        assert_eq!(interface.grant().signature(), "authorizeOnce(address)");
    }

    #[test]
    fn test_settable_interface() {
        let interface = GrantorInterface::from_abi(
            &AuthorizationMode::Settable {
                grant: "authorizeMinter".to_string(),
                status: "isMinterAuthorized".to_string(),
                revoke: Some("revokeMinter".to_string()),
            },
            &abi(&[
                "function authorizeMinter(address)",
                "function isMinterAuthorized(address) view returns (bool)",
                "function revokeMinter(address)",
            ]),
        )
        .unwrap();

        let GrantorInterface::Settable { status, revoke, .. } = interface else {
            panic!("expected a settable interface");
        };
        assert_eq!(status.name, "isMinterAuthorized");
        assert_eq!(revoke.unwrap().name, "revokeMinter");
    }

    #[test]
    fn test_overload_with_address_is_picked() {
        let interface = GrantorInterface::from_abi(
            &AuthorizationMode::one_shot(),
            &abi(&[
                "function authorizeOnce(address minter, uint256 cap)",
                "function authorizeOnce(address minter)",
            ]),
        )
        .unwrap();
        assert_eq!(interface.grant().inputs.len(), 1);
    }

    #[test]
    fn test_interface_errors() {
        let err =
            GrantorInterface::from_abi(&AuthorizationMode::one_shot(), &abi(&[])).unwrap_err();
        assert!(err.contains("no function `authorizeOnce`"));

        let err = GrantorInterface::from_abi(
            &AuthorizationMode::one_shot(),
            &abi(&["function authorizeOnce(uint256)"]),
        )
        .unwrap_err();
        assert!(err.contains("single address"));

        let err = GrantorInterface::from_abi(
            &AuthorizationMode::settable(),
            &abi(&[
                "function authorizeMinter(address)",
                "function isMinterAuthorized(address) view returns (uint256)",
            ]),
        )
        .unwrap_err();
        assert!(err.contains("single bool"));
    }

    #[test]
    fn test_call_encoding() {
        let function = abi(&["function authorizeOnce(address)"])
            .function("authorizeOnce")
            .unwrap()[0]
            .clone();
        let data = encode_address_call(&function, Address::repeat_byte(0x42)).unwrap();

        assert_eq!(data.len(), 4 + 32);
        assert_eq!(&data[..4], function.selector().as_slice());
        assert_eq!(&data[16..], Address::repeat_byte(0x42).as_slice());
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = AuthorizationOutcome::AlreadyAuthorized {
            grantor: Address::ZERO,
            grantee: Address::ZERO,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "already-authorized");
    }
}

//! Deployer identity.

use std::fmt;

use alloy_core::primitives::{Address, B256, U256, keccak256};
use k256::ecdsa::SigningKey;

use crate::ledger::LedgerError;

/// A recoverable secp256k1 signature over a 32-byte hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxSignature {
    pub r: U256,
    pub s: U256,
    /// Recovery id (0 or 1).
    pub recovery_id: u8,
}

/// Signing credential used for every transaction of a run.
///
/// Only the derived address is ever printed.
#[derive(Clone)]
pub struct Signer {
    key: SigningKey,
    address: Address,
}

impl Signer {
    /// Create a signer from a 32-byte hex private key (with or without 0x prefix).
    pub fn from_private_key(private_key_hex: &str) -> Result<Self, LedgerError> {
        let private_key_hex = private_key_hex.trim();
        let private_key_hex = private_key_hex
            .strip_prefix("0x")
            .unwrap_or(private_key_hex);

        let private_key_bytes: [u8; 32] = hex::decode(private_key_hex)
            .map_err(|e| LedgerError::Signing(format!("private key is not valid hex: {e}")))?
            .try_into()
            .map_err(|_| LedgerError::Signing("private key must be exactly 32 bytes".to_string()))?;

        let key = SigningKey::from_bytes(&private_key_bytes.into())
            .map_err(|e| LedgerError::Signing(format!("invalid secp256k1 private key: {e}")))?;

        // Uncompressed point: 0x04 marker followed by the 64-byte public key
        let public_key_point = key.verifying_key().to_encoded_point(false);
        let hash = keccak256(&public_key_point.as_bytes()[1..]);
        let address = Address::from_slice(&hash[12..]);

        Ok(Self { key, address })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign a prehashed message.
    pub fn sign_hash(&self, hash: &B256) -> Result<TxSignature, LedgerError> {
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(hash.as_slice())
            .map_err(|e| LedgerError::Signing(e.to_string()))?;

        let bytes = signature.to_bytes();
        Ok(TxSignature {
            r: U256::from_be_slice(&bytes[..32]),
            s: U256::from_be_slice(&bytes[32..]),
            recovery_id: recovery_id.to_byte(),
        })
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// First default Anvil / Hardhat account.
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_address_derivation() {
        let signer = Signer::from_private_key(DEV_KEY).unwrap();
        assert_eq!(
            signer.address(),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
                .parse::<Address>()
                .unwrap()
        );
    }

    #[test]
    fn test_prefix_is_optional() {
        let with = Signer::from_private_key(DEV_KEY).unwrap();
        let without = Signer::from_private_key(DEV_KEY.trim_start_matches("0x")).unwrap();
        assert_eq!(with.address(), without.address());
    }

    #[test]
    fn test_invalid_keys_rejected() {
        assert!(Signer::from_private_key("0x1234").is_err());
        assert!(Signer::from_private_key("not-hex").is_err());
        assert!(Signer::from_private_key(&format!("0x{}", "00".repeat(32))).is_err());
    }

    #[test]
    fn test_debug_hides_key() {
        let signer = Signer::from_private_key(DEV_KEY).unwrap();
        let debug = format!("{signer:?}");
        assert!(!debug.contains("ac0974bec39a17e36ba4a6b4d238ff944bacb478"));
        assert!(debug.contains("address"));
    }
}

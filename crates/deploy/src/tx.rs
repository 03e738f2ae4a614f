//! EIP-155 legacy transaction encoding.

use alloy_core::{
    primitives::{Address, B256, Bytes, U256, keccak256},
    rlp::{EMPTY_STRING_CODE, Encodable, Header},
};

use crate::signer::TxSignature;

/// A legacy (type 0) transaction with EIP-155 replay protection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    /// `None` for contract creation.
    pub to: Option<Address>,
    pub value: U256,
    pub input: Bytes,
    pub chain_id: u64,
}

impl LegacyTransaction {
    fn fields_length(&self) -> usize {
        self.nonce.length()
            + self.gas_price.length()
            + self.gas_limit.length()
            + self.to.map_or(1, |to| to.length())
            + self.value.length()
            + self.input.length()
    }

    fn encode_fields(&self, out: &mut Vec<u8>) {
        self.nonce.encode(out);
        self.gas_price.encode(out);
        self.gas_limit.encode(out);
        match self.to {
            Some(to) => to.encode(out),
            None => out.push(EMPTY_STRING_CODE),
        }
        self.value.encode(out);
        self.input.encode(out);
    }

    /// Hash signed by the sender: `keccak(rlp([..fields, chain_id, 0, 0]))`.
    pub fn signing_hash(&self) -> B256 {
        let payload_length = self.fields_length() + self.chain_id.length() + 2;

        let mut out = Vec::with_capacity(payload_length + 4);
        Header {
            list: true,
            payload_length,
        }
        .encode(&mut out);
        self.encode_fields(&mut out);
        self.chain_id.encode(&mut out);
        0u8.encode(&mut out);
        0u8.encode(&mut out);

        keccak256(&out)
    }

    /// Raw signed transaction, ready for `eth_sendRawTransaction`.
    pub fn encode_signed(&self, signature: &TxSignature) -> Bytes {
        let v = u64::from(signature.recovery_id) + self.chain_id * 2 + 35;
        let payload_length =
            self.fields_length() + v.length() + signature.r.length() + signature.s.length();

        let mut out = Vec::with_capacity(payload_length + 4);
        Header {
            list: true,
            payload_length,
        }
        .encode(&mut out);
        self.encode_fields(&mut out);
        v.encode(&mut out);
        signature.r.encode(&mut out);
        signature.s.encode(&mut out);

        out.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::Signer;

    /// The worked example from EIP-155.
    fn eip155_example() -> LegacyTransaction {
        LegacyTransaction {
            nonce: 9,
            gas_price: 20_000_000_000,
            gas_limit: 21_000,
            to: Some(
                "0x3535353535353535353535353535353535353535"
                    .parse()
                    .unwrap(),
            ),
            value: U256::from(1_000_000_000_000_000_000u128),
            input: Bytes::new(),
            chain_id: 1,
        }
    }

    #[test]
    fn test_eip155_signing_hash() {
        assert_eq!(
            eip155_example().signing_hash(),
            "0xdaf5a779ae972f972197303d7b574746c7ef83eadac0f2791ad23db92e4c8e53"
                .parse::<B256>()
                .unwrap()
        );
    }

    #[test]
    fn test_eip155_signed_encoding() {
        let signer = Signer::from_private_key(
            "0x4646464646464646464646464646464646464646464646464646464646464646",
        )
        .unwrap();
        let tx = eip155_example();
        let signature = signer.sign_hash(&tx.signing_hash()).unwrap();

        assert_eq!(
            hex::encode(tx.encode_signed(&signature)),
            "f86c098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a76400008025a028ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276a067cbe9d8997f761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b6d83"
        );
    }

    #[test]
    fn test_creation_encodes_empty_recipient() {
        let tx = LegacyTransaction {
            to: None,
            input: Bytes::from_static(&[0x60, 0x80]),
            ..eip155_example()
        };
        let signer = Signer::from_private_key(
            "0x4646464646464646464646464646464646464646464646464646464646464646",
        )
        .unwrap();
        let raw = tx.encode_signed(&signer.sign_hash(&tx.signing_hash()).unwrap());

        // nonce, gas price and gas limit come first; the recipient slot is the empty string
        let prefix = hex::decode("098504a817c800825208").unwrap();
        let start = 2;
        assert_eq!(&raw[start..start + prefix.len()], prefix.as_slice());
        assert_eq!(raw[start + prefix.len()], EMPTY_STRING_CODE);
    }
}

//! RLP framing for raw Ethereum-style transactions, built on the
//! `rlp` crate (parity-common).

use rlp::RlpStream;

/// Transaction fields in the legacy (pre-EIP-1559) shape this facade
/// supports: `(nonce, gasPrice, gasLimit, to, value, data, chainId, 0, 0)`
/// for signing, with the trailing three replaced by `(v, r, s)` once
/// signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub nonce: u64,
    pub gas_price: Vec<u8>,
    pub gas_limit: u64,
    /// `None` encodes as the empty RLP string (contract creation).
    pub to: Option<[u8; 20]>,
    pub value: Vec<u8>,
    pub data: Vec<u8>,
    pub chain_id: u64,
}

fn encode_unsigned(tx: &Transaction, stream: &mut RlpStream) {
    stream.begin_list(9);
    stream.append(&tx.nonce);
    stream.append(&trim_leading_zeros(&tx.gas_price));
    stream.append(&tx.gas_limit);
    match &tx.to {
        Some(addr) => {
            stream.append(&addr.as_slice());
        }
        None => {
            stream.append_empty_data();
        }
    }
    stream.append(&trim_leading_zeros(&tx.value));
    stream.append(&tx.data);
    stream.append(&tx.chain_id);
    stream.append_empty_data();
    stream.append_empty_data();
}

fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first_nonzero = bytes.iter().position(|&b| b != 0);
    match first_nonzero {
        Some(idx) => &bytes[idx..],
        None => &[],
    }
}

/// The RLP payload that gets Keccak-256 hashed and ECDSA-signed.
pub fn signing_payload(tx: &Transaction) -> Vec<u8> {
    let mut stream = RlpStream::new();
    encode_unsigned(tx, &mut stream);
    stream.out().to_vec()
}

/// The final RLP payload with `(v, r, s)` appended in place of the
/// EIP-155 placeholder fields, ready for broadcast by an external
/// collaborator.
pub fn signed_payload(tx: &Transaction, v: u64, r: &[u8; 32], s: &[u8; 32]) -> Vec<u8> {
    let mut stream = RlpStream::new();
    stream.begin_list(9);
    stream.append(&tx.nonce);
    stream.append(&trim_leading_zeros(&tx.gas_price));
    stream.append(&tx.gas_limit);
    match &tx.to {
        Some(addr) => {
            stream.append(&addr.as_slice());
        }
        None => {
            stream.append_empty_data();
        }
    }
    stream.append(&trim_leading_zeros(&tx.value));
    stream.append(&tx.data);
    stream.append(&v);
    stream.append(&trim_leading_zeros(r));
    stream.append(&trim_leading_zeros(s));
    stream.out().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx() -> Transaction {
        Transaction {
            nonce: 9,
            gas_price: hex::decode("04a817c800").unwrap(),
            gas_limit: 21000,
            to: Some([0x35; 20]),
            value: hex::decode("0de0b6b3a7640000").unwrap(),
            data: vec![],
            chain_id: 1,
        }
    }

    #[test]
    fn signing_payload_is_nine_element_list() {
        let tx = sample_tx();
        let payload = signing_payload(&tx);
        // A 9-element RLP list always starts with a list-length prefix byte
        // (0xc0 + len, or 0xf7 + len-of-len for longer lists).
        assert!(payload[0] >= 0xc0);
    }

    #[test]
    fn contract_creation_encodes_empty_to() {
        let mut tx = sample_tx();
        tx.to = None;
        let payload = signing_payload(&tx);
        assert!(!payload.is_empty());
    }

    #[test]
    fn leading_zeros_are_trimmed_from_value_fields() {
        let mut tx = sample_tx();
        tx.value = vec![0, 0, 1];
        let payload = signing_payload(&tx);
        let mut with_zeros = sample_tx();
        with_zeros.value = vec![1];
        let payload2 = signing_payload(&with_zeros);
        assert_eq!(payload, payload2);
    }

    #[test]
    fn signed_payload_differs_from_signing_payload() {
        let tx = sample_tx();
        let unsigned = signing_payload(&tx);
        let signed = signed_payload(&tx, 37, &[1u8; 32], &[2u8; 32]);
        assert_ne!(unsigned, signed);
    }
}

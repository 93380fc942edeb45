//! EVM keys and legacy EIP-155 transaction signing
//!
//! Transactions are RLP-encoded through `alloy-rlp`; the secp256k1
//! signature itself comes from `libsecp256k1`.

use alloy_primitives::{hex, keccak256, Address, Bytes, B256, U256};
use alloy_rlp::{RlpDecodable, RlpEncodable};
use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroizing;

use crate::application::wallet_pool::WalletError;
use crate::ports::chain::{EvmTransaction, SignedTx, UnsignedTx};

/// What an EIP-155 signature commits to: the transaction fields followed by
/// `(chain_id, 0, 0)`
#[derive(Debug, RlpEncodable)]
struct SigningPayload {
    nonce: u64,
    gas_price: u128,
    gas_limit: u64,
    to: Address,
    value: u128,
    data: Bytes,
    chain_id: u64,
    empty_r: u8,
    empty_s: u8,
}

/// A signed legacy transaction as it goes on the wire
#[derive(Debug, PartialEq, RlpEncodable, RlpDecodable)]
struct SignedLegacy {
    nonce: u64,
    gas_price: u128,
    gas_limit: u64,
    to: Address,
    value: u128,
    data: Bytes,
    v: u64,
    r: U256,
    s: U256,
}

fn signing_payload(tx: &EvmTransaction) -> Vec<u8> {
    alloy_rlp::encode(SigningPayload {
        nonce: tx.nonce,
        gas_price: tx.gas_price,
        gas_limit: tx.gas_limit,
        to: tx.to,
        value: tx.value,
        data: Bytes::copy_from_slice(&tx.data),
        chain_id: tx.chain_id,
        empty_r: 0,
        empty_s: 0,
    })
}

pub fn signing_hash(tx: &EvmTransaction) -> B256 {
    keccak256(signing_payload(tx))
}

fn secret_key(secret: &[u8]) -> Result<libsecp256k1::SecretKey, WalletError> {
    libsecp256k1::SecretKey::parse_slice(secret)
        .map_err(|e| WalletError::InvalidKey(format!("secp256k1: {:?}", e)))
}

fn address_of_key(key: &libsecp256k1::SecretKey) -> Address {
    let public = libsecp256k1::PublicKey::from_secret_key(key).serialize();
    Address::from_raw_public_key(&public[1..])
}

/// Generate a fresh key, returning (checksummed address, 32-byte secret)
pub fn generate() -> (String, Zeroizing<Vec<u8>>) {
    loop {
        let mut secret = Zeroizing::new(vec![0u8; 32]);
        OsRng.fill_bytes(&mut secret);
        if let Ok(key) = libsecp256k1::SecretKey::parse_slice(&secret) {
            return (address_of_key(&key).to_checksum(None), secret);
        }
    }
}

pub fn address_of(secret: &[u8]) -> Result<String, WalletError> {
    Ok(address_of_key(&secret_key(secret)?).to_checksum(None))
}

/// Sign a legacy transaction with EIP-155 replay protection
pub fn sign(secret: &[u8], tx: UnsignedTx) -> Result<SignedTx, WalletError> {
    let tx = match tx {
        UnsignedTx::Evm(tx) => tx,
        UnsignedTx::Solana { .. } => {
            return Err(WalletError::SigningError(
                "Solana transaction handed to an EVM key".to_string(),
            ))
        }
    };

    let key = secret_key(secret)?;
    let message = libsecp256k1::Message::parse(&signing_hash(&tx).0);
    let (signature, recovery_id) = libsecp256k1::sign(&message, &key);
    let sig = signature.serialize();

    let raw = alloy_rlp::encode(SignedLegacy {
        nonce: tx.nonce,
        gas_price: tx.gas_price,
        gas_limit: tx.gas_limit,
        to: tx.to,
        value: tx.value,
        data: Bytes::from(tx.data),
        v: recovery_id.serialize() as u64 + tx.chain_id * 2 + 35,
        r: U256::from_be_slice(&sig[..32]),
        s: U256::from_be_slice(&sig[32..]),
    });
    let tx_hash = hex::encode_prefixed(keccak256(&raw));
    Ok(SignedTx { raw, tx_hash })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use alloy_rlp::Decodable;

    fn eip155_example() -> EvmTransaction {
        EvmTransaction {
            nonce: 9,
            gas_price: 20_000_000_000,
            gas_limit: 21_000,
            to: Address::repeat_byte(0x35),
            value: 1_000_000_000_000_000_000,
            data: vec![],
            chain_id: 1,
        }
    }

    #[test]
    fn test_eip155_signing_payload() {
        let tx = eip155_example();
        assert_eq!(
            hex::encode(signing_payload(&tx)),
            "ec098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a764000080018080"
        );
        assert_eq!(
            hex::encode(signing_hash(&tx)),
            "daf5a779ae972f972197303d7b574746c7ef83eadac0f2791ad23db92e4c8e53"
        );
    }

    #[test]
    fn test_address_derivation() {
        let secret = [0x46u8; 32];
        assert_eq!(
            address_of(&secret).unwrap(),
            "0x9d8A62f656a8d1615C1294fd71e9CFb3E4855A4F"
        );
    }

    #[test]
    fn test_signature_recovers_sender() {
        let secret = [0x46u8; 32];
        let tx = eip155_example();
        let signed = sign(&secret, UnsignedTx::Evm(tx.clone())).unwrap();

        // 0xf86c: list of 108 bytes
        assert_eq!(&signed.raw[..2], &[0xf8, 0x6c]);
        assert_eq!(signed.tx_hash, hex::encode_prefixed(keccak256(&signed.raw)));

        let decoded = SignedLegacy::decode(&mut signed.raw.as_slice()).unwrap();
        assert_eq!(decoded.nonce, 9);
        assert_eq!(decoded.to, address!("3535353535353535353535353535353535353535"));
        assert!(decoded.v == 37 || decoded.v == 38);

        let mut sig = [0u8; 64];
        sig[..32].copy_from_slice(&decoded.r.to_be_bytes::<32>());
        sig[32..].copy_from_slice(&decoded.s.to_be_bytes::<32>());
        let recovered = libsecp256k1::recover(
            &libsecp256k1::Message::parse(&signing_hash(&tx).0),
            &libsecp256k1::Signature::parse_standard(&sig).unwrap(),
            &libsecp256k1::RecoveryId::parse((decoded.v - 37) as u8).unwrap(),
        )
        .unwrap();
        assert_eq!(
            Address::from_raw_public_key(&recovered.serialize()[1..]),
            address!("9d8A62f656a8d1615C1294fd71e9CFb3E4855A4F")
        );
    }

    #[test]
    fn test_generate_round_trips() {
        let (address, secret) = generate();
        assert_eq!(secret.len(), 32);
        assert_eq!(address_of(&secret).unwrap(), address);
    }

    #[test]
    fn test_rejects_solana_payload() {
        let result = sign(
            &[0x46u8; 32],
            UnsignedTx::Solana {
                payer: solana_sdk::pubkey::Pubkey::new_unique(),
                instructions: vec![],
                recent_blockhash: solana_sdk::hash::Hash::default(),
            },
        );
        assert!(result.is_err());
    }
}

//! Solana keys and transaction signing
//!
//! Secrets are 64-byte ed25519 keypair encodings (the `solana-keygen`
//! layout). Callers own the secret buffer and are expected to zero it.

use solana_sdk::{
    signature::{Keypair, Signer},
    transaction::Transaction,
};
use zeroize::Zeroizing;

use crate::application::wallet_pool::WalletError;
use crate::ports::chain::{SignedTx, UnsignedTx};

/// Generate a fresh keypair, returning (address, secret bytes)
pub fn generate() -> (String, Zeroizing<Vec<u8>>) {
    let keypair = Keypair::new();
    let secret = Zeroizing::new(keypair.to_bytes().to_vec());
    (keypair.pubkey().to_string(), secret)
}

/// Address of a secret
pub fn address_of(secret: &[u8]) -> Result<String, WalletError> {
    Ok(keypair_from(secret)?.pubkey().to_string())
}

fn keypair_from(secret: &[u8]) -> Result<Keypair, WalletError> {
    Keypair::try_from(secret).map_err(|e| WalletError::InvalidKey(e.to_string()))
}

/// Sign a prepared Solana transaction
pub fn sign(secret: &[u8], tx: UnsignedTx) -> Result<SignedTx, WalletError> {
    let (payer, instructions, recent_blockhash) = match tx {
        UnsignedTx::Solana {
            payer,
            instructions,
            recent_blockhash,
        } => (payer, instructions, recent_blockhash),
        UnsignedTx::Evm(_) => {
            return Err(WalletError::SigningError(
                "EVM transaction handed to a Solana key".to_string(),
            ))
        }
    };

    let keypair = keypair_from(secret)?;
    if keypair.pubkey() != payer {
        return Err(WalletError::SigningError(format!(
            "payer {} does not match signing key {}",
            payer,
            keypair.pubkey()
        )));
    }

    let mut transaction = Transaction::new_with_payer(&instructions, Some(&payer));
    transaction
        .try_sign(&[&keypair], recent_blockhash)
        .map_err(|e| WalletError::SigningError(e.to_string()))?;

    let raw = bincode::serialize(&transaction)
        .map_err(|e| WalletError::SigningError(format!("Failed to serialize: {}", e)))?;

    Ok(SignedTx {
        raw,
        tx_hash: transaction.signatures[0].to_string(),
    })
}

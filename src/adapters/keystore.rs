//! Encrypted Wallet Storage
//!
//! One JSON file per wallet at `<store_dir>/<chain_id>/<address>.json`
//! holding the secret key sealed with AES-256-GCM. The 32-byte pool key
//! lives in its own file (mode 0600) or comes from `SNIPER_WALLET_KEY`.
//!
//! Sealed format: `base64(nonce[12] || ciphertext || tag[16])`.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use zeroize::Zeroizing;

/// Environment variable carrying a base64 pool key
pub const WALLET_KEY_ENV: &str = "SNIPER_WALLET_KEY";

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum KeystoreError {
    #[error("Keystore I/O failed for {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("Invalid wallet key: {0}")]
    InvalidKey(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Wallet file {path} is corrupted: {reason}")]
    Corrupted { path: PathBuf, reason: String },
}

fn io_error(path: &Path, e: std::io::Error) -> KeystoreError {
    KeystoreError::Io {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

/// AES-256-GCM cipher under the pool key
pub struct KeyCipher {
    cipher: Aes256Gcm,
}

impl fmt::Debug for KeyCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyCipher(..)")
    }
}

impl KeyCipher {
    pub fn from_bytes(key: &[u8]) -> Result<Self, KeystoreError> {
        if key.len() != KEY_LEN {
            return Err(KeystoreError::InvalidKey(format!(
                "expected {} bytes, got {}",
                KEY_LEN,
                key.len()
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| KeystoreError::InvalidKey(e.to_string()))?;
        Ok(Self { cipher })
    }

    pub fn from_base64(encoded: &str) -> Result<Self, KeystoreError> {
        let key = Zeroizing::new(
            BASE64
                .decode(encoded.trim())
                .map_err(|e| KeystoreError::InvalidKey(e.to_string()))?,
        );
        Self::from_bytes(&key)
    }

    /// Resolve the pool key: an explicit base64 override wins, otherwise the
    /// key file is read, or created with a fresh random key.
    pub fn resolve(override_key: Option<&str>, key_file: &Path) -> Result<Self, KeystoreError> {
        if let Some(encoded) = override_key.filter(|k| !k.trim().is_empty()) {
            tracing::info!("Using wallet key from {}", WALLET_KEY_ENV);
            return Self::from_base64(encoded);
        }

        if key_file.exists() {
            let encoded = Zeroizing::new(fs::read_to_string(key_file).map_err(|e| io_error(key_file, e))?);
            return Self::from_base64(&encoded);
        }

        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        OsRng.fill_bytes(&mut key[..]);
        let encoded = Zeroizing::new(BASE64.encode(&key[..]));
        write_private(key_file, encoded.as_bytes())?;
        tracing::warn!("Created new wallet key file: {}", key_file.display());

        Self::from_bytes(&key[..])
    }

    /// `resolve` with the override taken from the environment
    pub fn load_or_create(key_file: &Path) -> Result<Self, KeystoreError> {
        let override_key = std::env::var(WALLET_KEY_ENV).ok().map(Zeroizing::new);
        Self::resolve(override_key.as_deref().map(String::as_str), key_file)
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, KeystoreError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| KeystoreError::Encryption(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(sealed))
    }

    pub fn decrypt(&self, sealed: &str) -> Result<Zeroizing<Vec<u8>>, KeystoreError> {
        let bytes = BASE64
            .decode(sealed.trim())
            .map_err(|e| KeystoreError::Decryption(e.to_string()))?;
        if bytes.len() <= NONCE_LEN {
            return Err(KeystoreError::Decryption("sealed secret too short".into()));
        }

        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map(Zeroizing::new)
            .map_err(|_| KeystoreError::Decryption("authentication failed (wrong key or tampered file)".into()))
    }
}

/// Write a file readable by the owner only
fn write_private(path: &Path, contents: &[u8]) -> Result<(), KeystoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path).map_err(|e| io_error(path, e))?;
    file.write_all(contents).map_err(|e| io_error(path, e))?;
    file.sync_all().map_err(|e| io_error(path, e))
}

/// On-disk wallet record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredWallet {
    pub address: String,
    pub chain_id: String,
    pub encrypted_secret: String,
    pub created_at: DateTime<Utc>,
}

/// Directory of encrypted wallet files
#[derive(Debug)]
pub struct Keystore {
    dir: PathBuf,
    cipher: KeyCipher,
}

impl Keystore {
    pub fn new(dir: impl Into<PathBuf>, cipher: KeyCipher) -> Self {
        Self {
            dir: dir.into(),
            cipher,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn wallet_path(&self, chain_id: &str, address: &str) -> PathBuf {
        self.dir.join(chain_id).join(format!("{}.json", address))
    }

    /// Seal and persist a new wallet secret
    pub fn store(&self, chain_id: &str, address: &str, secret: &[u8]) -> Result<StoredWallet, KeystoreError> {
        let wallet = StoredWallet {
            address: address.to_string(),
            chain_id: chain_id.to_string(),
            encrypted_secret: self.cipher.encrypt(secret)?,
            created_at: Utc::now(),
        };

        let path = self.wallet_path(chain_id, address);
        let content = serde_json::to_string_pretty(&wallet).map_err(|e| KeystoreError::Corrupted {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        write_private(&path, content.as_bytes())?;

        tracing::info!("Wallet stored: {} ({})", address, chain_id);
        Ok(wallet)
    }

    /// All wallets of a chain, oldest first. A file that does not parse is
    /// a hard error.
    pub fn load_chain(&self, chain_id: &str) -> Result<Vec<StoredWallet>, KeystoreError> {
        let chain_dir = self.dir.join(chain_id);
        if !chain_dir.exists() {
            return Ok(Vec::new());
        }

        let mut wallets = Vec::new();
        for entry in fs::read_dir(&chain_dir).map_err(|e| io_error(&chain_dir, e))? {
            let path = entry.map_err(|e| io_error(&chain_dir, e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let content = fs::read_to_string(&path).map_err(|e| io_error(&path, e))?;
            let wallet: StoredWallet = serde_json::from_str(&content).map_err(|e| KeystoreError::Corrupted {
                path: path.clone(),
                reason: e.to_string(),
            })?;
            if wallet.chain_id != chain_id {
                return Err(KeystoreError::Corrupted {
                    path,
                    reason: format!("chain mismatch: {}", wallet.chain_id),
                });
            }
            wallets.push(wallet);
        }

        wallets.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.address.cmp(&b.address)));
        Ok(wallets)
    }

    /// Decrypt a wallet's sealed secret
    pub fn open_secret(&self, sealed: &str) -> Result<Zeroizing<Vec<u8>>, KeystoreError> {
        self.cipher.decrypt(sealed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn cipher() -> KeyCipher {
        KeyCipher::from_bytes(&[7u8; KEY_LEN]).unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let cipher = cipher();
        let secret = b"a wallet secret that must survive".to_vec();

        let sealed = cipher.encrypt(&secret).unwrap();
        assert!(!sealed.contains("wallet secret"));
        assert_eq!(cipher.decrypt(&sealed).unwrap().as_slice(), secret.as_slice());
    }

    #[test]
    fn test_nonce_is_fresh_per_encryption() {
        let cipher = cipher();
        assert_ne!(cipher.encrypt(b"same").unwrap(), cipher.encrypt(b"same").unwrap());
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = cipher().encrypt(b"secret").unwrap();
        let other = KeyCipher::from_bytes(&[8u8; KEY_LEN]).unwrap();
        assert!(matches!(other.decrypt(&sealed), Err(KeystoreError::Decryption(_))));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let cipher = cipher();
        let mut bytes = BASE64.decode(cipher.encrypt(b"secret").unwrap()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert!(cipher.decrypt(&BASE64.encode(bytes)).is_err());
        assert!(cipher.decrypt("AAAA").is_err());
    }

    #[test]
    fn test_key_length_checked() {
        assert!(matches!(KeyCipher::from_bytes(&[1u8; 16]), Err(KeystoreError::InvalidKey(_))));
        assert!(KeyCipher::from_base64("not base64!").is_err());
    }

    #[test]
    fn test_key_file_created_once() {
        let dir = tempdir().unwrap();
        let key_file = dir.path().join("keys").join("wallet.key");

        let first = KeyCipher::resolve(None, &key_file).unwrap();
        assert!(key_file.exists());
        let sealed = first.encrypt(b"secret").unwrap();

        // second resolve reads the same key back
        let second = KeyCipher::resolve(None, &key_file).unwrap();
        assert_eq!(second.decrypt(&sealed).unwrap().as_slice(), b"secret");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&key_file).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_override_key_wins() {
        let dir = tempdir().unwrap();
        let key_file = dir.path().join("wallet.key");
        let encoded = BASE64.encode([9u8; KEY_LEN]);

        let cipher = KeyCipher::resolve(Some(&encoded), &key_file).unwrap();
        assert!(!key_file.exists());

        let sealed = cipher.encrypt(b"secret").unwrap();
        let same = KeyCipher::from_bytes(&[9u8; KEY_LEN]).unwrap();
        assert_eq!(same.decrypt(&sealed).unwrap().as_slice(), b"secret");
    }

    #[test]
    fn test_store_and_load_wallets() {
        let dir = tempdir().unwrap();
        let keystore = Keystore::new(dir.path(), cipher());

        keystore.store("solana", "AddrOne", &[1u8; 64]).unwrap();
        keystore.store("solana", "AddrTwo", &[2u8; 64]).unwrap();
        keystore.store("ethereum", "0xabc", &[3u8; 32]).unwrap();

        assert!(keystore.wallet_path("solana", "AddrOne").exists());

        let wallets = keystore.load_chain("solana").unwrap();
        assert_eq!(wallets.len(), 2);
        let one = wallets.iter().find(|w| w.address == "AddrOne").unwrap();
        assert_eq!(keystore.open_secret(&one.encrypted_secret).unwrap().as_slice(), &[1u8; 64]);

        assert_eq!(keystore.load_chain("bsc").unwrap().len(), 0);
    }

    #[test]
    fn test_corrupted_wallet_file_is_hard_error() {
        let dir = tempdir().unwrap();
        let keystore = Keystore::new(dir.path(), cipher());
        keystore.store("solana", "AddrOne", &[1u8; 64]).unwrap();

        fs::write(keystore.wallet_path("solana", "Broken"), "{ not json").unwrap();
        assert!(matches!(
            keystore.load_chain("solana"),
            Err(KeystoreError::Corrupted { .. })
        ));
    }
}

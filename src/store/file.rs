//! Encrypted-file fallback for machines without an OS keyring.
//!
//! Each key is one JSON envelope holding an AES-256-GCM ciphertext. The key
//! is derived from a passphrase compiled into the binary, so this keeps
//! secrets out of casual view but is not a security boundary.

use std::path::PathBuf;

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::SecretBackend;
use crate::config::FILE_KEYRING_PASSPHRASE;
use crate::error::AuthError;
use crate::util::fs::{atomic_write, ftl_home, normalize_label, read_optional, remove_if_exists};

const ENVELOPE_VERSION: u32 = 1;
const KDF_ROUNDS: u32 = 10_000;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

/// File-backed [`SecretBackend`] storing one encrypted file per key.
#[derive(Debug, Clone)]
pub struct EncryptedFileKeyring {
    dir: PathBuf,
    passphrase: String,
}

impl EncryptedFileKeyring {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            passphrase: FILE_KEYRING_PASSPHRASE.to_string(),
        }
    }

    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = passphrase.into();
        self
    }

    /// `~/.ftl/keyring`
    pub fn default_dir() -> PathBuf {
        ftl_home().join("keyring")
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", normalize_label(key)))
    }

    fn cipher(&self, salt: &[u8]) -> Result<Aes256Gcm, AuthError> {
        let mut key = [0u8; 32];
        pbkdf2::pbkdf2_hmac::<Sha256>(self.passphrase.as_bytes(), salt, KDF_ROUNDS, &mut key);
        Aes256Gcm::new_from_slice(&key)
            .map_err(|e| AuthError::Storage(format!("invalid file keyring key: {e}")))
    }

    fn seal(&self, plaintext: &str) -> Result<Envelope, AuthError> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher(&salt)?
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| AuthError::Storage("failed to encrypt secret".to_string()))?;
        Ok(Envelope {
            version: ENVELOPE_VERSION,
            salt: STANDARD.encode(salt),
            nonce: STANDARD.encode(nonce),
            ciphertext: STANDARD.encode(ciphertext),
        })
    }

    fn open(&self, envelope: &Envelope) -> Result<String, AuthError> {
        if envelope.version != ENVELOPE_VERSION {
            return Err(AuthError::Storage(format!(
                "unsupported file keyring version {}",
                envelope.version
            )));
        }
        let salt = decode_field(&envelope.salt, "salt")?;
        let nonce = decode_field(&envelope.nonce, "nonce")?;
        if nonce.len() != NONCE_LEN {
            return Err(AuthError::Storage("corrupt file keyring nonce".to_string()));
        }
        let ciphertext = decode_field(&envelope.ciphertext, "ciphertext")?;
        let plaintext = self
            .cipher(&salt)?
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
            .map_err(|_| AuthError::Storage("failed to decrypt secret".to_string()))?;
        String::from_utf8(plaintext)
            .map_err(|_| AuthError::Storage("decrypted secret is not UTF-8".to_string()))
    }
}

impl SecretBackend for EncryptedFileKeyring {
    fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
        let Some(raw) = read_optional(&self.path_for(key))? else {
            return Ok(None);
        };
        let envelope: Envelope = serde_json::from_str(&raw)
            .map_err(|e| AuthError::Storage(format!("corrupt file keyring entry {key}: {e}")))?;
        self.open(&envelope).map(Some)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AuthError> {
        let envelope = self.seal(value)?;
        let data = serde_json::to_vec_pretty(&envelope)?;
        atomic_write(&self.path_for(key), &data)
    }

    fn delete(&self, key: &str) -> Result<(), AuthError> {
        remove_if_exists(&self.path_for(key))
    }

    fn name(&self) -> &str {
        "file"
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u32,
    salt: String,
    nonce: String,
    ciphertext: String,
}

fn decode_field(value: &str, field: &str) -> Result<Vec<u8>, AuthError> {
    STANDARD
        .decode(value)
        .map_err(|_| AuthError::Storage(format!("corrupt file keyring {field}")))
}

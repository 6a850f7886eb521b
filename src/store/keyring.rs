//! OS keyring backend (Keychain, Secret Service, Credential Manager).

use std::sync::OnceLock;

use ::keyring::Entry;

use super::SecretBackend;
use crate::error::AuthError;

static KEYRING_AVAILABLE: OnceLock<bool> = OnceLock::new();

/// Secrets stored in the platform's native credential store under a fixed
/// service name, one entry per key.
#[derive(Debug, Clone)]
pub struct OsKeyring {
    service: String,
}

impl OsKeyring {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Whether a keyring backend answers at all. Probed once per process.
    pub fn is_available() -> bool {
        *KEYRING_AVAILABLE.get_or_init(check_availability)
    }

    fn entry(&self, key: &str) -> Result<Entry, AuthError> {
        Entry::new(&self.service, key)
            .map_err(|e| AuthError::Storage(format!("failed to open keyring entry {key}: {e}")))
    }
}

fn check_availability() -> bool {
    match Entry::new("ftl-cli-probe", "availability-check") {
        Ok(entry) => match entry.get_password() {
            Ok(_) | Err(::keyring::Error::NoEntry) => true,
            Err(
                ::keyring::Error::NoStorageAccess(_) | ::keyring::Error::PlatformFailure(_),
            ) => false,
            Err(_) => true,
        },
        Err(_) => false,
    }
}

impl SecretBackend for OsKeyring {
    fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(::keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(AuthError::Storage(format!("failed to read {key}: {e}"))),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AuthError> {
        self.entry(key)?
            .set_password(value)
            .map_err(|e| AuthError::Storage(format!("failed to write {key}: {e}")))
    }

    fn delete(&self, key: &str) -> Result<(), AuthError> {
        match self.entry(key)?.delete_password() {
            Ok(()) | Err(::keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(AuthError::Storage(format!("failed to delete {key}: {e}"))),
        }
    }

    fn name(&self) -> &str {
        "keyring"
    }
}

//! Credential persistence on top of an OS-level secret store.

pub mod file;
pub mod keyring;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use strum::{AsRefStr, Display, EnumString};
use tracing::debug;

use crate::config::{ACTOR_TYPE_KEY, CREDENTIALS_KEY, KEYRING_SERVICE, M2M_CONFIG_KEY};
use crate::error::AuthError;
use crate::m2m::M2MConfig;
use crate::token::Credentials;

pub use self::file::EncryptedFileKeyring;
pub use self::keyring::OsKeyring;

/// Whether the stored identity is an interactive user or a machine client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum ActorType {
    User,
    Machine,
}

/// Raw string secrets addressed by a fixed key.
pub trait SecretBackend: Send + Sync {
    /// `Ok(None)` when nothing is stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>, AuthError>;
    fn set(&self, key: &str, value: &str) -> Result<(), AuthError>;
    /// Deleting a missing key succeeds.
    fn delete(&self, key: &str) -> Result<(), AuthError>;
    fn name(&self) -> &str;
}

/// Storage for the single active identity, the M2M configuration and the
/// actor-type tag.
///
/// Missing entries surface as [`AuthError::NotLoggedIn`] or
/// [`AuthError::NotConfigured`], never as a storage failure.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<Credentials, AuthError>;
    /// Overwrites any previously stored credentials.
    fn save(&self, creds: &Credentials) -> Result<(), AuthError>;
    fn delete(&self) -> Result<(), AuthError>;
    fn exists(&self) -> bool;

    /// Store a bare access token, as machine flows have nothing else.
    fn store_token(&self, token: &str, expires_in: Option<u64>) -> Result<(), AuthError> {
        self.save(&Credentials::from_access_token(token, expires_in))
    }

    fn get_m2m_config(&self) -> Result<M2MConfig, AuthError>;
    fn store_m2m_config(&self, config: &M2MConfig) -> Result<(), AuthError>;
    fn set_actor_type(&self, actor: ActorType) -> Result<(), AuthError>;
    fn get_actor_type(&self) -> Result<ActorType, AuthError>;
}

/// [`CredentialStore`] serializing every value as JSON into a [`SecretBackend`].
///
/// Nothing is cached: each call goes to the backend.
///
/// # Example
/// ```no_run
/// use ftl_auth::store::{CredentialStore, KeyringStore, OsKeyring};
///
/// let store = KeyringStore::new(OsKeyring::new("ftl-cli"));
/// if store.exists() {
///     let creds = store.load()?;
///     println!("logged in to {}", creds.issuer_domain);
/// }
/// # Ok::<(), ftl_auth::AuthError>(())
/// ```
#[derive(Clone)]
pub struct KeyringStore {
    backend: Arc<dyn SecretBackend>,
}

impl std::fmt::Debug for KeyringStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyringStore")
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl KeyringStore {
    pub fn new(backend: impl SecretBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    pub fn with_backend(backend: Arc<dyn SecretBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    fn get_json<T: DeserializeOwned>(&self, key: &str, what: &str) -> Result<Option<T>, AuthError> {
        match self.backend.get(key)? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| AuthError::Serialization(format!("failed to parse {what}: {e}"))),
            None => Ok(None),
        }
    }

    fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), AuthError> {
        let raw = serde_json::to_string(value)?;
        self.backend.set(key, &raw)?;
        debug!(key, backend = self.backend.name(), "stored secret");
        Ok(())
    }
}

impl CredentialStore for KeyringStore {
    fn load(&self) -> Result<Credentials, AuthError> {
        self.get_json(CREDENTIALS_KEY, "credentials")?
            .ok_or(AuthError::NotLoggedIn)
    }

    fn save(&self, creds: &Credentials) -> Result<(), AuthError> {
        self.set_json(CREDENTIALS_KEY, creds)
    }

    fn delete(&self) -> Result<(), AuthError> {
        self.backend.delete(CREDENTIALS_KEY)
    }

    fn exists(&self) -> bool {
        matches!(self.backend.get(CREDENTIALS_KEY), Ok(Some(_)))
    }

    fn get_m2m_config(&self) -> Result<M2MConfig, AuthError> {
        self.get_json(M2M_CONFIG_KEY, "M2M config")?
            .ok_or_else(|| AuthError::NotConfigured("no M2M configuration found".to_string()))
    }

    fn store_m2m_config(&self, config: &M2MConfig) -> Result<(), AuthError> {
        self.set_json(M2M_CONFIG_KEY, config)
    }

    fn set_actor_type(&self, actor: ActorType) -> Result<(), AuthError> {
        self.backend.set(ACTOR_TYPE_KEY, actor.as_ref())
    }

    fn get_actor_type(&self) -> Result<ActorType, AuthError> {
        let raw = self
            .backend
            .get(ACTOR_TYPE_KEY)?
            .ok_or_else(|| AuthError::NotConfigured("actor type not set".to_string()))?;
        raw.trim()
            .parse()
            .map_err(|_| AuthError::Serialization(format!("unknown actor type: {raw}")))
    }
}

/// Credential store for this machine: the OS keyring when a backend is
/// reachable, otherwise the encrypted file under the user data directory.
pub fn default_credential_store() -> Result<KeyringStore, AuthError> {
    if OsKeyring::is_available() {
        return Ok(KeyringStore::new(OsKeyring::new(KEYRING_SERVICE)));
    }
    debug!("no OS keyring backend available, using encrypted file store");
    Ok(KeyringStore::new(EncryptedFileKeyring::new(
        EncryptedFileKeyring::default_dir(),
    )))
}

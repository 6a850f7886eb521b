//! ftl-auth: command-line authentication against an OIDC identity provider.
//!
//! Interactive users sign in with the OAuth2 device authorization grant;
//! machines use the client-credentials grant or a pre-issued token. The
//! resulting credentials live in the OS keyring (or an encrypted file when no
//! keyring is available) and are refreshed lazily when a caller asks for a
//! token.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use ftl_auth::{default_credential_store, AuthManager, LoginConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), ftl_auth::AuthError> {
//! let manager = AuthManager::new(Arc::new(default_credential_store()?), LoginConfig::default());
//! let cancel = CancellationToken::new();
//! let token = manager.get_token(&cancel).await?;
//! println!("Bearer {token}");
//! # Ok(())
//! # }
//! ```

pub mod browser;
pub mod claims;
pub mod config;
pub mod device_code;
pub mod error;
pub mod m2m;
pub mod manager;
pub mod oauth;
pub mod profile;
pub mod store;
pub mod token;
pub mod transport;

mod util;

pub use browser::{BrowserOpener, SystemBrowser};
pub use claims::JwtClaims;
pub use config::LoginConfig;
pub use device_code::{DeviceAuthResponse, DeviceCodePoll};
pub use error::AuthError;
pub use m2m::{is_m2m_configured, m2m_token_from_env, M2MConfig, M2MManager};
pub use manager::{AuthManager, AuthStatus};
pub use oauth::{OAuthClient, OAuthProvider};
pub use profile::{FileProfileStore, UserInfo, UserProfileStore};
pub use store::{
    default_credential_store, ActorType, CredentialStore, EncryptedFileKeyring, KeyringStore,
    OsKeyring, SecretBackend,
};
pub use token::{Credentials, TokenError, TokenErrorKind, TokenResponse};
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport};

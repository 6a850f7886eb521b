//! Identity-provider defaults, storage keys and login options.

use std::time::Duration;

use bon::Builder;

pub const DEFAULT_CLIENT_ID: &str = "client_01K2ADMPRAFT9X83PFVJBQ6T49";
pub const DEFAULT_ISSUER_DOMAIN: &str = "divine-lion-50-staging.authkit.app";
pub const DEVICE_SCOPES: &str = "openid profile email offline_access";

/// Upper bound on a whole device-flow login.
pub const LOGIN_TIMEOUT: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Per-request transport timeout.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub const KEYRING_SERVICE: &str = "ftl-cli";
pub const CREDENTIALS_KEY: &str = "default";
pub const M2M_CONFIG_KEY: &str = "m2m-config";
pub const ACTOR_TYPE_KEY: &str = "actor-type";

/// Assumed lifetime of a pre-issued machine token whose expiry is unknown.
pub const MACHINE_TOKEN_DEFAULT_EXPIRY_SECS: u64 = 3600;

/// Passphrase for the encrypted-file fallback store. Not a security boundary:
/// it only keeps tokens out of plain sight when no OS keyring exists.
pub(crate) const FILE_KEYRING_PASSPHRASE: &str = "ftl-keyring-encryption-key";

pub const ENV_CLIENT_ID: &str = "FTL_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "FTL_CLIENT_SECRET";
pub const ENV_ISSUER: &str = "FTL_ISSUER";
pub const ENV_M2M_TOKEN: &str = "FTL_M2M_TOKEN";

/// Options for an interactive login session.
///
/// # Example
/// ```
/// use ftl_auth::LoginConfig;
///
/// let config = LoginConfig::builder().no_browser(true).issuer_domain("auth.example.com").build();
/// assert_eq!(config.issuer_domain(), "auth.example.com");
/// assert!(!config.force);
/// ```
#[derive(Debug, Clone, Default, Builder)]
pub struct LoginConfig {
    #[builder(default)]
    pub no_browser: bool,
    #[builder(into)]
    pub issuer_domain: Option<String>,
    #[builder(into)]
    pub client_id: Option<String>,
    #[builder(default)]
    pub force: bool,
}

impl LoginConfig {
    pub fn issuer_domain(&self) -> &str {
        self.issuer_domain
            .as_deref()
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_ISSUER_DOMAIN)
    }

    pub fn client_id(&self) -> &str {
        self.client_id
            .as_deref()
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_CLIENT_ID)
    }
}

/// Base URL for an issuer. Bare domains get `https://`; values that already
/// carry a scheme are kept.
pub fn issuer_base_url(issuer: &str) -> String {
    let issuer = issuer.trim().trim_end_matches('/');
    if issuer.starts_with("https://") || issuer.starts_with("http://") {
        issuer.to_string()
    } else {
        format!("https://{issuer}")
    }
}

/// Read an environment variable, treating empty values as unset.
pub(crate) fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

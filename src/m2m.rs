//! Machine-to-machine login via the client-credentials grant.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::config::{
    env_var, issuer_base_url, DEFAULT_ISSUER_DOMAIN, ENV_CLIENT_ID, ENV_CLIENT_SECRET, ENV_ISSUER,
    ENV_M2M_TOKEN,
};
use crate::error::AuthError;
use crate::oauth::parse_body;
use crate::store::CredentialStore;
use crate::token::{TokenError, TokenResponse};
use crate::transport::{HttpTransport, ReqwestTransport};

/// Client id/secret pair for a machine identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct M2MConfig {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
}

impl M2MConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            issuer: None,
            org_id: None,
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Issuer domain, falling back to the default.
    pub fn issuer(&self) -> &str {
        self.issuer
            .as_deref()
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_ISSUER_DOMAIN)
    }

    pub fn is_complete(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }

    pub(crate) fn with_default_issuer(mut self) -> Self {
        if self.issuer.as_deref().map_or(true, str::is_empty) {
            self.issuer = Some(DEFAULT_ISSUER_DOMAIN.to_string());
        }
        self
    }

    fn from_env() -> Option<Self> {
        let client_id = env_var(ENV_CLIENT_ID)?;
        let client_secret = env_var(ENV_CLIENT_SECRET)?;
        Some(Self {
            client_id,
            client_secret,
            issuer: env_var(ENV_ISSUER),
            org_id: None,
        })
    }
}

/// Resolves machine credentials and exchanges them for access tokens.
pub struct M2MManager {
    store: Arc<dyn CredentialStore>,
    transport: Arc<dyn HttpTransport>,
}

impl M2MManager {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            store,
            transport: Arc::new(ReqwestTransport::default()),
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = transport;
        self
    }

    /// `FTL_CLIENT_ID`/`FTL_CLIENT_SECRET` win over any stored configuration.
    pub fn load_config(&self) -> Result<M2MConfig, AuthError> {
        if let Some(config) = M2MConfig::from_env() {
            debug!("using M2M credentials from environment");
            return Ok(config.with_default_issuer());
        }

        match self.store.get_m2m_config() {
            Ok(config) if config.is_complete() => return Ok(config.with_default_issuer()),
            Ok(_) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }

        Err(AuthError::Configuration(format!(
            "no M2M credentials found. Set {ENV_CLIENT_ID} and {ENV_CLIENT_SECRET} environment variables"
        )))
    }

    #[instrument(skip(self, cancel, config), fields(client_id = %config.client_id))]
    pub async fn exchange_credentials(
        &self,
        cancel: &CancellationToken,
        config: &M2MConfig,
    ) -> Result<TokenResponse, AuthError> {
        let url = format!("{}/oauth2/token", issuer_base_url(config.issuer()));
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
        ];

        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AuthError::Cancelled),
            resp = self.transport.post_form(&url, &form) => resp,
        };
        let resp = sent.map_err(|e| e.context("failed to exchange credentials"))?;

        if !resp.is_ok() {
            if let Ok(err) = serde_json::from_str::<TokenError>(&resp.body) {
                if !err.code.is_empty() {
                    return Err(AuthError::OAuth(err));
                }
            }
            return Err(AuthError::Status {
                operation: "client credentials exchange",
                status: resp.status,
                body: resp.body,
            });
        }

        parse_body(&resp, "failed to parse token response")
    }
}

/// True when machine credentials are present in the environment.
pub fn is_m2m_configured() -> bool {
    env_var(ENV_CLIENT_ID).is_some() && env_var(ENV_CLIENT_SECRET).is_some()
}

/// Pre-issued machine token from `FTL_M2M_TOKEN`.
pub fn m2m_token_from_env() -> Option<String> {
    env_var(ENV_M2M_TOKEN)
}

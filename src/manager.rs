use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::browser::{BrowserOpener, SystemBrowser};
use crate::claims::extract_from_token_response;
use crate::config::{LoginConfig, MACHINE_TOKEN_DEFAULT_EXPIRY_SECS};
use crate::device_code::DeviceAuthResponse;
use crate::error::AuthError;
use crate::m2m::{M2MConfig, M2MManager};
use crate::oauth::{OAuthClient, OAuthProvider};
use crate::profile::{FileProfileStore, UserInfo, UserProfileStore};
use crate::store::{ActorType, CredentialStore};
use crate::token::{Credentials, TokenResponse};
use crate::transport::HttpTransport;

/// Snapshot of the stored login, computed on demand.
#[derive(Debug)]
pub struct AuthStatus {
    pub logged_in: bool,
    pub credentials: Option<Credentials>,
    pub needs_refresh: bool,
    pub error: Option<AuthError>,
}

/// Entry point for login, logout, status and token retrieval.
///
/// All state lives in the [`CredentialStore`]; the manager holds none of
/// its own between calls. Tokens are refreshed lazily in
/// [`AuthManager::get_token`] when the stored one has expired.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use ftl_auth::{default_credential_store, AuthManager, LoginConfig};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn run() -> Result<(), ftl_auth::AuthError> {
/// let store = Arc::new(default_credential_store()?);
/// let manager = AuthManager::new(store, LoginConfig::default());
/// let cancel = CancellationToken::new();
/// let auth = manager.start_device_flow(&cancel).await?;
/// println!("Enter code {} at {}", auth.user_code, auth.verification_uri);
/// let creds = manager.complete_device_flow(&cancel, &auth).await?;
/// # let _ = creds;
/// # Ok(())
/// # }
/// ```
pub struct AuthManager {
    store: Arc<dyn CredentialStore>,
    provider: Arc<dyn OAuthProvider>,
    browser: Arc<dyn BrowserOpener>,
    profiles: Option<Arc<dyn UserProfileStore>>,
    m2m: M2MManager,
    config: LoginConfig,
}

impl AuthManager {
    pub fn new(store: Arc<dyn CredentialStore>, config: LoginConfig) -> Self {
        let provider = OAuthClient::new(config.issuer_domain(), config.client_id());
        Self {
            m2m: M2MManager::new(store.clone()),
            store,
            provider: Arc::new(provider),
            browser: Arc::new(SystemBrowser),
            profiles: Some(Arc::new(FileProfileStore::default())),
            config,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn OAuthProvider>) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_browser(mut self, browser: Arc<dyn BrowserOpener>) -> Self {
        self.browser = browser;
        self
    }

    pub fn with_profile_store(mut self, profiles: Arc<dyn UserProfileStore>) -> Self {
        self.profiles = Some(profiles);
        self
    }

    /// Skip the post-login profile update.
    pub fn without_profile_store(mut self) -> Self {
        self.profiles = None;
        self
    }

    /// Route the default OAuth client and the M2M exchange through `transport`.
    /// A provider set with [`AuthManager::with_provider`] afterwards wins.
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.provider = Arc::new(
            OAuthClient::new(self.config.issuer_domain(), self.config.client_id())
                .with_transport(transport.clone()),
        );
        self.m2m = M2MManager::new(self.store.clone()).with_transport(transport);
        self
    }

    pub fn config(&self) -> &LoginConfig {
        &self.config
    }

    pub fn m2m(&self) -> &M2MManager {
        &self.m2m
    }

    /// Begin an interactive login.
    ///
    /// Unless `force` is set, valid stored credentials short-circuit with
    /// [`AuthError::AlreadyLoggedIn`], and expired ones are refreshed
    /// silently first. The browser is opened on a best-effort basis.
    pub async fn start_device_flow(
        &self,
        cancel: &CancellationToken,
    ) -> Result<DeviceAuthResponse, AuthError> {
        if !self.config.force {
            match self.store.load() {
                Ok(creds) if !creds.is_expired() => {
                    return Err(AuthError::AlreadyLoggedIn { refreshed: false });
                }
                Ok(creds) if creds.can_refresh() => match self.refresh(cancel, &creds).await {
                    Ok(_) => return Err(AuthError::AlreadyLoggedIn { refreshed: true }),
                    Err(AuthError::Cancelled) => return Err(AuthError::Cancelled),
                    Err(err) => warn!(error = %err, "silent refresh failed, starting device flow"),
                },
                Ok(_) => {}
                Err(err) if err.is_not_found() => {}
                Err(err) => warn!(error = %err, "failed to read stored credentials"),
            }
        }

        let auth = self.provider.start_device_flow(cancel).await?;

        if !self.config.no_browser {
            if let Err(err) = self.browser.open_url(auth.browser_url()) {
                warn!(error = %err, "failed to open browser");
            }
        }

        Ok(auth)
    }

    /// Poll until the user approves, then persist the new credentials.
    pub async fn complete_device_flow(
        &self,
        cancel: &CancellationToken,
        auth: &DeviceAuthResponse,
    ) -> Result<Credentials, AuthError> {
        let token = self
            .provider
            .poll_for_token(cancel, &auth.device_code, auth.poll_interval())
            .await?;

        let creds = Credentials::from_token_response(
            &token,
            self.config.issuer_domain(),
            self.config.client_id(),
        );
        self.store.save(&creds)?;
        debug!(issuer = %creds.issuer_domain, "saved credentials");

        if let Err(err) = self.save_user_info_from_token(&token) {
            warn!(error = %err, "failed to save user info");
        }
        if let Err(err) = self.store.set_actor_type(ActorType::User) {
            warn!(error = %err, "failed to store actor type");
        }

        Ok(creds)
    }

    pub async fn login(&self, cancel: &CancellationToken) -> Result<Credentials, AuthError> {
        let auth = self.start_device_flow(cancel).await?;
        self.complete_device_flow(cancel, &auth).await
    }

    /// Remove stored credentials. Succeeds when nothing is stored.
    pub fn logout(&self) -> Result<(), AuthError> {
        self.store.delete()
    }

    pub fn status(&self) -> AuthStatus {
        match self.store.load() {
            Ok(creds) => AuthStatus {
                logged_in: true,
                needs_refresh: creds.is_expired(),
                credentials: Some(creds),
                error: None,
            },
            Err(err) => AuthStatus {
                logged_in: false,
                credentials: None,
                needs_refresh: false,
                error: Some(err),
            },
        }
    }

    /// Current access token, refreshed first if it has expired.
    pub async fn get_token(&self, cancel: &CancellationToken) -> Result<String, AuthError> {
        let creds = self.store.load()?;
        if !creds.is_expired() {
            return Ok(creds.access_token);
        }
        if !creds.can_refresh() {
            return Err(AuthError::TokenExpired);
        }
        debug!("access token expired, refreshing");
        let refreshed = self.refresh(cancel, &creds).await?;
        Ok(refreshed.access_token)
    }

    pub async fn get_or_refresh_token(
        &self,
        cancel: &CancellationToken,
    ) -> Result<String, AuthError> {
        self.get_token(cancel).await
    }

    /// Exchange the refresh token and persist the result. The previous
    /// refresh and ID tokens are kept when the provider does not rotate them.
    /// Nothing is written if the provider call fails.
    pub async fn refresh(
        &self,
        cancel: &CancellationToken,
        creds: &Credentials,
    ) -> Result<Credentials, AuthError> {
        let refresh_token = creds.refresh_token().ok_or(AuthError::NoRefreshToken)?;
        let token = self.provider.refresh_token(cancel, refresh_token).await?;

        let mut updated = Credentials::from_token_response(
            &token,
            creds.issuer_domain.clone(),
            creds.client_id.clone(),
        );
        if updated.refresh_token.is_none() {
            updated.refresh_token = Some(refresh_token.to_string());
        }
        if updated.id_token.is_none() {
            updated.id_token = creds.id_token.clone();
        }

        self.store.save(&updated)?;
        debug!("saved refreshed credentials");
        Ok(updated)
    }

    /// Forward the identity in `token` to the profile store.
    pub fn save_user_info_from_token(&self, token: &TokenResponse) -> Result<(), AuthError> {
        let Some(profiles) = &self.profiles else {
            return Ok(());
        };
        profiles.load_config()?;
        let claims = extract_from_token_response(token)?;
        profiles.set_current_user(UserInfo {
            username: claims.display_name(),
            email: claims.email.unwrap_or_default(),
            user_id: claims.user_id.unwrap_or_default(),
            updated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        })
    }

    /// Validate and persist machine credentials for later
    /// [`AuthManager::login_machine`] calls.
    pub fn configure_m2m(&self, config: M2MConfig) -> Result<(), AuthError> {
        if !config.is_complete() {
            return Err(AuthError::Configuration(
                "client_id and client_secret are required".to_string(),
            ));
        }
        self.store.store_m2m_config(&config.with_default_issuer())
    }

    /// Client-credentials login with the configured machine identity.
    pub async fn login_machine(&self, cancel: &CancellationToken) -> Result<(), AuthError> {
        let config = self.m2m.load_config()?;
        let token = self.m2m.exchange_credentials(cancel, &config).await?;
        self.store.store_token(&token.access_token, token.expires_in)?;
        self.mark_machine();
        Ok(())
    }

    /// Store a pre-issued machine token after a structural check. Its real
    /// expiry is unknown, so a one-hour lifetime is assumed.
    pub fn login_machine_with_token(&self, token: &str) -> Result<(), AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::InvalidToken("token cannot be empty".to_string()));
        }
        if token.split('.').count() != 3 {
            return Err(AuthError::InvalidToken("expected JWT with 3 parts".to_string()));
        }
        self.store.store_token(token, Some(MACHINE_TOKEN_DEFAULT_EXPIRY_SECS))?;
        self.mark_machine();
        Ok(())
    }

    /// Stored tag, else `machine` when M2M credentials resolve, else `user`.
    pub fn actor_type(&self) -> Result<ActorType, AuthError> {
        match self.store.get_actor_type() {
            Ok(actor) => return Ok(actor),
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }
        if self.m2m.load_config().is_ok() {
            return Ok(ActorType::Machine);
        }
        Ok(ActorType::User)
    }

    fn mark_machine(&self) {
        if let Err(err) = self.store.set_actor_type(ActorType::Machine) {
            warn!(error = %err, "failed to store actor type");
        }
    }
}

//! Device authorization, token polling and refresh against the identity provider.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::config::{issuer_base_url, DEFAULT_POLL_INTERVAL, DEVICE_SCOPES, LOGIN_TIMEOUT};
use crate::device_code::{DeviceAuthResponse, DeviceCodePoll};
use crate::error::AuthError;
use crate::token::{TokenError, TokenErrorKind, TokenResponse};
use crate::transport::{HttpResponse, HttpTransport, ReqwestTransport};

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// The three provider operations the manager depends on.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Begin a device authorization. A zero `interval` in the reply is
    /// replaced by the 5s default.
    async fn start_device_flow(
        &self,
        cancel: &CancellationToken,
    ) -> Result<DeviceAuthResponse, AuthError>;

    /// Poll the token endpoint once per `interval` until the user approves,
    /// the flow fails, the login deadline passes, or `cancel` fires.
    async fn poll_for_token(
        &self,
        cancel: &CancellationToken,
        device_code: &str,
        interval: Duration,
    ) -> Result<TokenResponse, AuthError>;

    async fn refresh_token(
        &self,
        cancel: &CancellationToken,
        refresh_token: &str,
    ) -> Result<TokenResponse, AuthError>;
}

/// OAuth client for one issuer and client id.
///
/// # Example
/// ```no_run
/// use ftl_auth::oauth::{OAuthClient, OAuthProvider};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn run() -> Result<(), ftl_auth::AuthError> {
/// let client = OAuthClient::new("auth.example.com", "client_123");
/// let cancel = CancellationToken::new();
/// let auth = client.start_device_flow(&cancel).await?;
/// println!("enter {} at {}", auth.user_code, auth.verification_uri);
/// let token = client
///     .poll_for_token(&cancel, &auth.device_code, auth.poll_interval())
///     .await?;
/// # let _ = token;
/// # Ok(())
/// # }
/// ```
pub struct OAuthClient {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    client_id: String,
    login_timeout: Duration,
}

impl std::fmt::Debug for OAuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthClient")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field("login_timeout", &self.login_timeout)
            .finish()
    }
}

impl OAuthClient {
    pub fn new(issuer_domain: &str, client_id: impl Into<String>) -> Self {
        Self {
            transport: Arc::new(ReqwestTransport::default()),
            base_url: issuer_base_url(issuer_domain),
            client_id: client_id.into(),
            login_timeout: LOGIN_TIMEOUT,
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = transport;
        self
    }

    /// Overall deadline for [`OAuthProvider::poll_for_token`].
    pub fn with_login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = timeout;
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn device_authorization_url(&self) -> String {
        format!("{}/oauth2/device_authorization", self.base_url)
    }

    pub fn token_url(&self) -> String {
        format!("{}/oauth2/token", self.base_url)
    }

    /// One device-code token request, classified.
    ///
    /// `expired_token` and `access_denied` come back as poll outcomes so the
    /// caller decides how to surface them; unrecognised error codes are
    /// returned as [`AuthError::OAuth`].
    pub async fn poll_device_code(
        &self,
        cancel: &CancellationToken,
        device_code: &str,
    ) -> Result<DeviceCodePoll, AuthError> {
        let resp = self
            .post(
                cancel,
                &self.token_url(),
                &[
                    ("grant_type", DEVICE_CODE_GRANT),
                    ("device_code", device_code),
                    ("client_id", self.client_id.as_str()),
                ],
            )
            .await
            .map_err(|e| e.context("failed to request token"))?;

        match resp.status {
            200 => {
                let token: TokenResponse = parse_body(&resp, "failed to parse token response")?;
                Ok(DeviceCodePoll::Authorized { token })
            }
            400 => {
                let err: TokenError = parse_body(&resp, "failed to parse error response")?;
                match err.kind() {
                    TokenErrorKind::AuthorizationPending => Ok(DeviceCodePoll::Pending),
                    TokenErrorKind::SlowDown => Ok(DeviceCodePoll::SlowDown),
                    TokenErrorKind::ExpiredToken => Ok(DeviceCodePoll::Expired),
                    TokenErrorKind::AccessDenied => Ok(DeviceCodePoll::AccessDenied {
                        description: err.description,
                    }),
                    TokenErrorKind::Other => Err(AuthError::OAuth(err)),
                }
            }
            status => Err(AuthError::Status {
                operation: "token request",
                status,
                body: resp.body,
            }),
        }
    }

    async fn post(
        &self,
        cancel: &CancellationToken,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<HttpResponse, AuthError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AuthError::Cancelled),
            resp = self.transport.post_form(url, form) => resp,
        }
    }
}

#[async_trait]
impl OAuthProvider for OAuthClient {
    #[instrument(skip(self, cancel))]
    async fn start_device_flow(
        &self,
        cancel: &CancellationToken,
    ) -> Result<DeviceAuthResponse, AuthError> {
        let resp = self
            .post(
                cancel,
                &self.device_authorization_url(),
                &[
                    ("client_id", self.client_id.as_str()),
                    ("scope", DEVICE_SCOPES),
                ],
            )
            .await
            .map_err(|e| e.context("failed to request device authorization"))?;
        if !resp.is_ok() {
            return Err(AuthError::Status {
                operation: "device authorization",
                status: resp.status,
                body: resp.body,
            });
        }
        let mut auth: DeviceAuthResponse = parse_body(&resp, "failed to parse response")?;
        if auth.interval == 0 {
            auth.interval = DEFAULT_POLL_INTERVAL.as_secs();
        }
        debug!(
            expires_in = auth.expires_in,
            interval = auth.interval,
            "device authorization started"
        );
        Ok(auth)
    }

    #[instrument(skip(self, cancel, device_code))]
    async fn poll_for_token(
        &self,
        cancel: &CancellationToken,
        device_code: &str,
        interval: Duration,
    ) -> Result<TokenResponse, AuthError> {
        let timeout = self.login_timeout.min(MAX_LOGIN_WAIT);
        let mut period = if interval.is_zero() {
            DEFAULT_POLL_INTERVAL
        } else {
            interval
        };
        period = capped_period(period, timeout);
        let deadline = sleep_until(Instant::now() + timeout);
        tokio::pin!(deadline);
        let mut ticker = poll_ticker(period);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AuthError::Cancelled),
                _ = &mut deadline => return Err(AuthError::LoginTimeout),
                _ = ticker.tick() => {}
            }

            match self.poll_device_code(cancel, device_code).await? {
                DeviceCodePoll::Authorized { token } => {
                    debug!("device authorization approved");
                    return Ok(token);
                }
                DeviceCodePoll::Pending => {
                    debug!(interval_ms = period.as_millis() as u64, "authorization pending");
                }
                DeviceCodePoll::SlowDown => {
                    period = capped_period(period.saturating_mul(2), timeout);
                    ticker = poll_ticker(period);
                    debug!(interval_ms = period.as_millis() as u64, "slow_down, backing off");
                }
                DeviceCodePoll::Expired => return Err(AuthError::DeviceCodeExpired),
                DeviceCodePoll::AccessDenied { description } => {
                    return Err(AuthError::AccessDenied { description })
                }
            }
        }
    }

    #[instrument(skip(self, cancel, refresh_token))]
    async fn refresh_token(
        &self,
        cancel: &CancellationToken,
        refresh_token: &str,
    ) -> Result<TokenResponse, AuthError> {
        let resp = self
            .post(
                cancel,
                &self.token_url(),
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token),
                    ("client_id", self.client_id.as_str()),
                ],
            )
            .await
            .map_err(|e| e.context("failed to refresh token"))?;
        if !resp.is_ok() {
            return Err(AuthError::Status {
                operation: "token refresh",
                status: resp.status,
                body: resp.body,
            });
        }
        parse_body(&resp, "failed to parse token response")
    }
}

/// Ceiling for a caller-supplied login timeout, keeping deadline arithmetic
/// on [`Instant`] in range.
const MAX_LOGIN_WAIT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// A tick later than the deadline never fires, so the period stops there.
fn capped_period(period: Duration, timeout: Duration) -> Duration {
    period.min(timeout).max(Duration::from_millis(1))
}

/// First tick one full period from now, then every `period`.
fn poll_ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

pub(crate) fn parse_body<T: DeserializeOwned>(
    resp: &HttpResponse,
    what: &str,
) -> Result<T, AuthError> {
    serde_json::from_str(&resp.body).map_err(|e| AuthError::InvalidResponse(format!("{what}: {e}")))
}

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use ftl_auth::profile::ProfileConfig;
use ftl_auth::{
    AuthError, BrowserOpener, Credentials, DeviceAuthResponse, HttpResponse, HttpTransport,
    KeyringStore, OAuthProvider, SecretBackend, TokenResponse, UserInfo, UserProfileStore,
};

// ---------------------------------------------------------------------------
// Secret backend
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryKeyring {
    values: Mutex<HashMap<String, String>>,
    failing: AtomicBool,
}

impl MemoryKeyring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail as if the keyring daemon were unreachable.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.values.lock().expect("keyring lock poisoned").get(key).cloned()
    }

    fn check(&self) -> Result<(), AuthError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AuthError::Storage("keyring unavailable".to_string()));
        }
        Ok(())
    }
}

impl SecretBackend for MemoryKeyring {
    fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
        self.check()?;
        Ok(self.raw(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AuthError> {
        self.check()?;
        self.values
            .lock()
            .expect("keyring lock poisoned")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), AuthError> {
        self.check()?;
        self.values.lock().expect("keyring lock poisoned").remove(key);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

pub fn memory_store() -> (Arc<MemoryKeyring>, Arc<KeyringStore>) {
    let keyring = Arc::new(MemoryKeyring::new());
    let store = Arc::new(KeyringStore::with_backend(keyring.clone()));
    (keyring, store)
}

// ---------------------------------------------------------------------------
// Scripted provider replies
// ---------------------------------------------------------------------------

/// One provider reply, consumed per request.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    DeviceAuth(DeviceAuthResponse),
    Token(TokenResponse),
    Pending,
    SlowDown,
    Expired,
    Denied,
    Fatal { status: u16, body: String },
    NetworkDown,
}

impl ScriptedReply {
    pub fn fatal(status: u16, body: &str) -> Self {
        Self::Fatal {
            status,
            body: body.to_string(),
        }
    }

    fn into_response(self) -> Result<HttpResponse, AuthError> {
        let oauth_error = |code: &str| {
            HttpResponse::new(400, json!({ "error": code }).to_string())
        };
        Ok(match self {
            Self::DeviceAuth(auth) => HttpResponse::new(200, to_json(&auth)),
            Self::Token(token) => HttpResponse::new(200, to_json(&token)),
            Self::Pending => oauth_error("authorization_pending"),
            Self::SlowDown => oauth_error("slow_down"),
            Self::Expired => oauth_error("expired_token"),
            Self::Denied => HttpResponse::new(
                400,
                json!({
                    "error": "access_denied",
                    "error_description": "The user denied the request"
                })
                .to_string(),
            ),
            Self::Fatal { status, body } => HttpResponse::new(status, body),
            Self::NetworkDown => {
                return Err(AuthError::Network("connection refused".to_string()))
            }
        })
    }

    fn into_token(self, operation: &'static str) -> Result<TokenResponse, AuthError> {
        match self {
            Self::Token(token) => Ok(token),
            Self::Expired => Err(AuthError::DeviceCodeExpired),
            Self::Denied => Err(AuthError::AccessDenied {
                description: Some("The user denied the request".to_string()),
            }),
            Self::Fatal { status, body } => Err(AuthError::Status {
                operation,
                status,
                body,
            }),
            Self::NetworkDown => Err(AuthError::Network("connection refused".to_string())),
            other => Err(AuthError::InvalidResponse(format!(
                "unexpected scripted reply {other:?}"
            ))),
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).expect("serialize scripted reply")
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub url: String,
    pub form: Vec<(String, String)>,
    pub at: Instant,
}

impl RecordedRequest {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// [`HttpTransport`] answering from a queue of [`ScriptedReply`]s.
///
/// Once the queue is empty the fallback reply (if any) repeats; otherwise the
/// transport answers 500.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<ScriptedReply>>,
    fallback: Mutex<Option<ScriptedReply>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedTransport {
    pub fn new(replies: impl IntoIterator<Item = ScriptedReply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            ..Default::default()
        })
    }

    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn repeating(reply: ScriptedReply) -> Arc<Self> {
        let transport = Self::empty();
        *transport.fallback.lock().expect("fallback lock poisoned") = Some(reply);
        transport
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("requests lock poisoned").clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().expect("requests lock poisoned").len()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<HttpResponse, AuthError> {
        self.requests
            .lock()
            .expect("requests lock poisoned")
            .push(RecordedRequest {
                url: url.to_string(),
                form: form
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                at: Instant::now(),
            });
        let next = self
            .replies
            .lock()
            .expect("replies lock poisoned")
            .pop_front()
            .or_else(|| self.fallback.lock().expect("fallback lock poisoned").clone());
        match next {
            Some(reply) => reply.into_response(),
            None => Ok(HttpResponse::new(500, "script exhausted")),
        }
    }
}

// ---------------------------------------------------------------------------
// Provider / browser / profile doubles
// ---------------------------------------------------------------------------

/// [`OAuthProvider`] returning scripted results and counting calls.
pub struct ScriptedProvider {
    device_auth: DeviceAuthResponse,
    polls: Mutex<VecDeque<ScriptedReply>>,
    refreshes: Mutex<VecDeque<ScriptedReply>>,
    pub start_calls: AtomicUsize,
    pub poll_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub last_interval: Mutex<Option<Duration>>,
    pub last_refresh_token: Mutex<Option<String>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            device_auth: device_auth(5),
            polls: Mutex::new(VecDeque::new()),
            refreshes: Mutex::new(VecDeque::new()),
            start_calls: AtomicUsize::new(0),
            poll_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            last_interval: Mutex::new(None),
            last_refresh_token: Mutex::new(None),
        }
    }

    pub fn with_device_auth(mut self, auth: DeviceAuthResponse) -> Self {
        self.device_auth = auth;
        self
    }

    pub fn on_poll(self, reply: ScriptedReply) -> Self {
        self.polls.lock().expect("polls lock poisoned").push_back(reply);
        self
    }

    pub fn on_refresh(self, reply: ScriptedReply) -> Self {
        self.refreshes
            .lock()
            .expect("refreshes lock poisoned")
            .push_back(reply);
        self
    }

    pub fn starts(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }

    pub fn refreshes(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OAuthProvider for ScriptedProvider {
    async fn start_device_flow(
        &self,
        _cancel: &CancellationToken,
    ) -> Result<DeviceAuthResponse, AuthError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.device_auth.clone())
    }

    async fn poll_for_token(
        &self,
        _cancel: &CancellationToken,
        _device_code: &str,
        interval: Duration,
    ) -> Result<TokenResponse, AuthError> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_interval.lock().expect("interval lock poisoned") = Some(interval);
        self.polls
            .lock()
            .expect("polls lock poisoned")
            .pop_front()
            .unwrap_or_else(|| ScriptedReply::fatal(500, "no poll scripted"))
            .into_token("token request")
    }

    async fn refresh_token(
        &self,
        _cancel: &CancellationToken,
        refresh_token: &str,
    ) -> Result<TokenResponse, AuthError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        *self
            .last_refresh_token
            .lock()
            .expect("refresh lock poisoned") = Some(refresh_token.to_string());
        self.refreshes
            .lock()
            .expect("refreshes lock poisoned")
            .pop_front()
            .unwrap_or_else(|| ScriptedReply::fatal(500, "no refresh scripted"))
            .into_token("token refresh")
    }
}

#[derive(Default)]
pub struct RecordingBrowser {
    pub opened: Mutex<Vec<String>>,
    pub fail: AtomicBool,
}

impl RecordingBrowser {
    pub fn failing() -> Self {
        Self {
            fail: AtomicBool::new(true),
            ..Default::default()
        }
    }

    pub fn urls(&self) -> Vec<String> {
        self.opened.lock().expect("browser lock poisoned").clone()
    }
}

impl BrowserOpener for RecordingBrowser {
    fn open_url(&self, url: &str) -> Result<(), AuthError> {
        self.opened
            .lock()
            .expect("browser lock poisoned")
            .push(url.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(AuthError::Io("no display".to_string()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingProfiles {
    pub users: Mutex<Vec<UserInfo>>,
    pub fail: AtomicBool,
}

impl RecordingProfiles {
    pub fn failing() -> Self {
        Self {
            fail: AtomicBool::new(true),
            ..Default::default()
        }
    }

    pub fn users(&self) -> Vec<UserInfo> {
        self.users.lock().expect("profiles lock poisoned").clone()
    }
}

impl UserProfileStore for RecordingProfiles {
    fn load_config(&self) -> Result<ProfileConfig, AuthError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AuthError::Io("config unreadable".to_string()));
        }
        Ok(ProfileConfig::default())
    }

    fn set_current_user(&self, user: UserInfo) -> Result<(), AuthError> {
        self.users.lock().expect("profiles lock poisoned").push(user);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn device_auth(interval: u64) -> DeviceAuthResponse {
    DeviceAuthResponse {
        device_code: "device-code-123".to_string(),
        user_code: "ABCD-EFGH".to_string(),
        verification_uri: "https://auth.example.com/device".to_string(),
        verification_uri_complete: "https://auth.example.com/device?user_code=ABCD-EFGH"
            .to_string(),
        expires_in: 900,
        interval,
    }
}

pub fn token_response(
    access: &str,
    refresh: Option<&str>,
    expires_in: Option<u64>,
) -> TokenResponse {
    TokenResponse {
        access_token: access.to_string(),
        token_type: "Bearer".to_string(),
        expires_in,
        refresh_token: refresh.map(String::from),
        id_token: None,
    }
}

pub fn credentials(
    access: &str,
    refresh: Option<&str>,
    expires_at: Option<DateTime<Utc>>,
) -> Credentials {
    Credentials {
        issuer_domain: "auth.example.com".to_string(),
        access_token: access.to_string(),
        refresh_token: refresh.map(String::from),
        id_token: None,
        expires_at,
        client_id: "client_test".to_string(),
    }
}

/// Unsigned JWT with the given payload.
pub fn jwt(payload: Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{header}.{body}.sig")
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

pub const M2M_ENV_VARS: [&str; 4] = [
    "FTL_CLIENT_ID",
    "FTL_CLIENT_SECRET",
    "FTL_ISSUER",
    "FTL_M2M_TOKEN",
];

/// Restores captured environment variables on drop.
pub struct EnvGuard {
    saved: Vec<(String, Option<String>)>,
}

impl EnvGuard {
    pub fn capture(keys: &[&str]) -> Self {
        let saved = keys
            .iter()
            .map(|key| ((*key).to_string(), std::env::var(key).ok()))
            .collect();
        Self { saved }
    }

    /// Capture and clear the M2M variables.
    pub fn clean_m2m() -> Self {
        let guard = Self::capture(&M2M_ENV_VARS);
        for key in M2M_ENV_VARS {
            std::env::remove_var(key);
        }
        guard
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.saved {
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
        }
    }
}

pub fn env_lock_guard() -> MutexGuard<'static, ()> {
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

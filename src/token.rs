use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Credentials for the active identity, as persisted in the credential store.
///
/// # Example
/// ```
/// use chrono::{Duration, Utc};
/// use ftl_auth::Credentials;
///
/// let creds = Credentials {
///     issuer_domain: "auth.example.com".to_string(),
///     access_token: "access".to_string(),
///     refresh_token: Some("refresh".to_string()),
///     id_token: None,
///     expires_at: Some(Utc::now() + Duration::hours(1)),
///     client_id: "client_123".to_string(),
/// };
/// assert!(!creds.is_expired());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default, alias = "authkit_domain")]
    pub issuer_domain: String,
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub client_id: String,
}

impl Credentials {
    /// Bare access token, as stored by machine flows.
    pub fn from_access_token(access_token: impl Into<String>, expires_in: Option<u64>) -> Self {
        Self {
            issuer_domain: String::new(),
            access_token: access_token.into(),
            refresh_token: None,
            id_token: None,
            expires_at: expires_at_from(Utc::now(), expires_in),
            client_id: String::new(),
        }
    }

    /// Build credentials from a fresh token response.
    pub fn from_token_response(
        response: &TokenResponse,
        issuer_domain: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            issuer_domain: issuer_domain.into(),
            access_token: response.access_token.clone(),
            refresh_token: non_empty(response.refresh_token.as_deref()).map(String::from),
            id_token: non_empty(response.id_token.as_deref()).map(String::from),
            expires_at: expires_at_from(Utc::now(), response.expires_in),
            client_id: client_id.into(),
        }
    }

    /// A missing expiry means the token never expires.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now > expires_at,
            None => false,
        }
    }

    /// Time left before expiry; `None` when the token never expires.
    pub fn time_until_expiry(&self) -> Option<Duration> {
        self.expires_at.map(|expires_at| expires_at - Utc::now())
    }

    /// The refresh token, treating an empty string as absent.
    pub fn refresh_token(&self) -> Option<&str> {
        non_empty(self.refresh_token.as_deref())
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token().is_some()
    }
}

/// Successful token endpoint response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

/// Error body returned by the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenError {
    #[serde(rename = "error")]
    pub code: String,
    #[serde(
        rename = "error_description",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,
}

/// Classification of a [`TokenError`] code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenErrorKind {
    AuthorizationPending,
    SlowDown,
    ExpiredToken,
    AccessDenied,
    Other,
}

impl TokenError {
    pub fn new(code: impl Into<String>, description: Option<String>) -> Self {
        Self {
            code: code.into(),
            description,
        }
    }

    pub fn kind(&self) -> TokenErrorKind {
        match self.code.as_str() {
            "authorization_pending" => TokenErrorKind::AuthorizationPending,
            "slow_down" => TokenErrorKind::SlowDown,
            "expired_token" => TokenErrorKind::ExpiredToken,
            "access_denied" => TokenErrorKind::AccessDenied,
            _ => TokenErrorKind::Other,
        }
    }

    pub fn is_authorization_pending(&self) -> bool {
        self.kind() == TokenErrorKind::AuthorizationPending
    }

    pub fn is_slow_down(&self) -> bool {
        self.kind() == TokenErrorKind::SlowDown
    }

    pub fn is_expired(&self) -> bool {
        self.kind() == TokenErrorKind::ExpiredToken
    }

    pub fn is_access_denied(&self) -> bool {
        self.kind() == TokenErrorKind::AccessDenied
    }
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match non_empty(self.description.as_deref()) {
            Some(description) => write!(f, "{}: {}", self.code, description),
            None => f.write_str(&self.code),
        }
    }
}

/// Longest lifetime honoured from a provider's `expires_in`.
const MAX_EXPIRES_IN_SECS: u64 = 10 * 365 * 24 * 60 * 60;

fn expires_at_from(now: DateTime<Utc>, expires_in: Option<u64>) -> Option<DateTime<Utc>> {
    let secs = expires_in.filter(|&secs| secs > 0)?.min(MAX_EXPIRES_IN_SECS);
    let lifetime = Duration::try_seconds(i64::try_from(secs).ok()?)?;
    now.checked_add_signed(lifetime)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

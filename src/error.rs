use thiserror::Error;

use crate::token::TokenError;

/// Authentication errors across the device, refresh and client-credentials flows.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("not logged in")]
    NotLoggedIn,
    #[error("{0}")]
    NotConfigured(String),
    #[error("already logged in{}", refreshed_suffix(.refreshed))]
    AlreadyLoggedIn { refreshed: bool },
    #[error("token expired and no refresh token available")]
    TokenExpired,
    #[error("no refresh token available")]
    NoRefreshToken,
    #[error("device code expired, retry the flow")]
    DeviceCodeExpired,
    #[error("user denied the request")]
    AccessDenied { description: Option<String> },
    #[error("login timeout exceeded")]
    LoginTimeout,
    #[error("operation cancelled")]
    Cancelled,
    #[error("authorization server rejected the request: {0}")]
    OAuth(TokenError),
    #[error("{operation} failed (status {status}): {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },
    #[error("Invalid token: {0}")]
    InvalidToken(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

fn refreshed_suffix(refreshed: &bool) -> &'static str {
    if *refreshed {
        " (token refreshed)"
    } else {
        ""
    }
}

impl AuthError {
    /// True for the expected "nothing stored" conditions, as opposed to a
    /// failing backend.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotLoggedIn | Self::NotConfigured(_))
    }

    /// True when the user has to start a new device flow.
    pub fn requires_restart(&self) -> bool {
        matches!(
            self,
            Self::DeviceCodeExpired | Self::AccessDenied { .. } | Self::LoginTimeout
        )
    }

    /// Prefix transport and decode errors with the operation that produced them.
    pub(crate) fn context(self, operation: &str) -> Self {
        match self {
            Self::Network(message) => Self::Network(format!("{operation}: {message}")),
            Self::InvalidResponse(message) => {
                Self::InvalidResponse(format!("{operation}: {message}"))
            }
            other => other,
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(error: reqwest::Error) -> Self {
        Self::Network(error.to_string())
    }
}

impl From<std::io::Error> for AuthError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<keyring::Error> for AuthError {
    fn from(error: keyring::Error) -> Self {
        Self::Storage(error.to_string())
    }
}

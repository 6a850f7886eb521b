use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_POLL_INTERVAL;
use crate::token::TokenResponse;

/// Device authorization response from the identity provider.
///
/// # Example
/// ```
/// use ftl_auth::DeviceAuthResponse;
///
/// let auth = DeviceAuthResponse {
///     device_code: "device-code".to_string(),
///     user_code: "ABCD-EFGH".to_string(),
///     verification_uri: "https://auth.example.com/device".to_string(),
///     verification_uri_complete: "https://auth.example.com/device?code=ABCD-EFGH".to_string(),
///     expires_in: 600,
///     interval: 0,
/// };
/// assert_eq!(auth.poll_interval().as_secs(), 5);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAuthResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    #[serde(default)]
    pub verification_uri_complete: String,
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default)]
    pub interval: u64,
}

impl DeviceAuthResponse {
    /// Polling interval, 5s when the provider sent none.
    pub fn poll_interval(&self) -> Duration {
        if self.interval == 0 {
            DEFAULT_POLL_INTERVAL
        } else {
            Duration::from_secs(self.interval)
        }
    }

    /// URL to open in a browser; falls back to the bare URI when the
    /// provider did not send a pre-filled one.
    pub fn browser_url(&self) -> &str {
        if self.verification_uri_complete.is_empty() {
            &self.verification_uri
        } else {
            &self.verification_uri_complete
        }
    }
}

/// Outcome of a single token request during device-code polling.
#[derive(Debug, Clone)]
pub enum DeviceCodePoll {
    Pending,
    SlowDown,
    Authorized { token: TokenResponse },
    AccessDenied { description: Option<String> },
    Expired,
}

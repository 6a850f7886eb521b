//! Unverified JWT claim decoding for display purposes.
//!
//! Signatures are not checked. Tokens here were issued to us by the provider
//! and are verified by whichever service receives them; the claims are only
//! used to show who is logged in.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use serde_json::{Map, Value};

use crate::error::AuthError;
use crate::token::TokenResponse;

/// Identity claims of interest, standard and provider-specific.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JwtClaims {
    pub subject: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub organization_id: Option<String>,
    pub organizations: Vec<String>,
    pub actor_type: Option<String>,
    /// Same as `sub` for this provider.
    pub user_id: Option<String>,
    pub email_verified: bool,
    /// Seconds since the epoch.
    pub expires_at: Option<i64>,
    pub issued_at: Option<i64>,
}

impl JwtClaims {
    /// Best human-readable name: username, full name, "first last", email
    /// local part, then user id / subject.
    pub fn display_name(&self) -> String {
        if let Some(username) = present(&self.username) {
            return username.to_string();
        }
        if let Some(name) = present(&self.name) {
            return name.to_string();
        }
        if present(&self.first_name).is_some() || present(&self.last_name).is_some() {
            let full = format!(
                "{} {}",
                self.first_name.as_deref().unwrap_or_default(),
                self.last_name.as_deref().unwrap_or_default()
            );
            return full.trim().to_string();
        }
        if let Some(email) = present(&self.email) {
            return match email.find('@') {
                Some(at) if at > 0 => email[..at].to_string(),
                _ => email.to_string(),
            };
        }
        present(&self.user_id)
            .or_else(|| present(&self.subject))
            .unwrap_or_default()
            .to_string()
    }

    /// False when the token carries no `exp`.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(exp) if exp > 0 => Utc::now().timestamp() > exp,
            _ => false,
        }
    }

    fn from_payload(payload: &Map<String, Value>) -> Self {
        let string = |key: &str| payload.get(key).and_then(Value::as_str).map(String::from);
        let subject = string("sub");
        Self {
            user_id: subject.clone(),
            subject,
            email: string("email"),
            name: string("name"),
            username: string("username"),
            first_name: string("first_name"),
            last_name: string("last_name"),
            organization_id: string("org_id"),
            organizations: payload
                .get("org_ids")
                .and_then(Value::as_array)
                .map(|ids| {
                    ids.iter()
                        .filter_map(Value::as_str)
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            actor_type: string("actor_type"),
            email_verified: payload
                .get("email_verified")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            expires_at: payload.get("exp").and_then(Value::as_f64).map(|v| v as i64),
            issued_at: payload.get("iat").and_then(Value::as_f64).map(|v| v as i64),
        }
    }
}

/// Decode a JWT's payload without verifying its signature.
///
/// Claims with unexpected JSON types are ignored rather than rejected.
pub fn decode_unverified(token: &str) -> Result<JwtClaims, AuthError> {
    let parts: Vec<&str> = token.trim().split('.').collect();
    if parts.len() != 3 {
        return Err(AuthError::InvalidToken(format!(
            "expected 3 segments, found {}",
            parts.len()
        )));
    }
    let decoded = URL_SAFE_NO_PAD
        .decode(parts[1].trim_end_matches('='))
        .map_err(|_| AuthError::InvalidToken("invalid payload encoding".to_string()))?;
    let value: Value = serde_json::from_slice(&decoded)
        .map_err(|_| AuthError::InvalidToken("invalid payload JSON".to_string()))?;
    let payload = value
        .as_object()
        .ok_or_else(|| AuthError::InvalidToken("payload is not a JSON object".to_string()))?;
    Ok(JwtClaims::from_payload(payload))
}

/// Claims from the ID token when present, else (or if it fails to decode)
/// from the access token.
pub fn extract_from_token_response(token: &TokenResponse) -> Result<JwtClaims, AuthError> {
    match token.id_token.as_deref().filter(|t| !t.is_empty()) {
        Some(id_token) => {
            decode_unverified(id_token).or_else(|_| decode_unverified(&token.access_token))
        }
        None => decode_unverified(&token.access_token),
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

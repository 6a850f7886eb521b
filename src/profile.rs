//! User-profile collaborator notified with the display identity after login.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AuthError;
use crate::util::fs::{atomic_write, ftl_home, read_optional};

/// Display-only record of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user_id: String,
    /// RFC 3339 timestamp.
    pub updated_at: String,
}

/// User profile configuration. Keys this crate does not own are carried
/// through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_user: Option<UserInfo>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

pub trait UserProfileStore: Send + Sync {
    fn load_config(&self) -> Result<ProfileConfig, AuthError>;
    fn set_current_user(&self, user: UserInfo) -> Result<(), AuthError>;
}

/// Profile stored as JSON at `~/.ftl/config.json`.
#[derive(Debug, Clone)]
pub struct FileProfileStore {
    path: PathBuf,
}

impl FileProfileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn default_path() -> PathBuf {
        ftl_home().join("config.json")
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl Default for FileProfileStore {
    fn default() -> Self {
        Self::new(Self::default_path())
    }
}

impl UserProfileStore for FileProfileStore {
    fn load_config(&self) -> Result<ProfileConfig, AuthError> {
        match read_optional(&self.path)? {
            Some(raw) if !raw.trim().is_empty() => serde_json::from_str(&raw).map_err(|e| {
                AuthError::Serialization(format!(
                    "failed to parse {}: {e}",
                    self.path.display()
                ))
            }),
            _ => Ok(ProfileConfig::default()),
        }
    }

    fn set_current_user(&self, user: UserInfo) -> Result<(), AuthError> {
        let mut config = self.load_config()?;
        config.current_user = Some(user);
        let data = serde_json::to_vec_pretty(&config)?;
        atomic_write(&self.path, &data)
    }
}

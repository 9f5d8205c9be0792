use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

const CREDENTIALS_FILE: &str = "credentials.json";

/// Identity reported when nobody is logged in.
pub const ANONYMOUS_IDENTITY: &str = "anon";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Read-only view of the credentials written by the login flow.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// `$HOME/.wiretap/credentials.json`, or `None` when `HOME` is unset.
    pub fn from_home() -> Option<Self> {
        let home = std::env::var_os("HOME")?;
        Some(Self::from_config_dir(Path::new(&home).join(".wiretap")))
    }

    pub fn from_config_dir(config_dir: impl AsRef<Path>) -> Self {
        Self {
            path: config_dir.as_ref().join(CREDENTIALS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Option<Credentials> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(error) => {
                debug!(path = %self.path.display(), %error, "no credentials");
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(credentials) => Some(credentials),
            Err(error) => {
                debug!(path = %self.path.display(), %error, "unreadable credentials");
                None
            }
        }
    }

    /// The logged-in user id, or [`ANONYMOUS_IDENTITY`]. Never fails.
    pub async fn identity(&self) -> String {
        self.load()
            .await
            .and_then(|c| c.user_id)
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| ANONYMOUS_IDENTITY.to_string())
    }
}

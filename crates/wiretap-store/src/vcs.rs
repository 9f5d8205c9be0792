use std::path::{Path, PathBuf};

use async_trait::async_trait;
use wiretap_schema::GitState;

#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    #[error("failed to run git: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("git {args} failed: {stderr}")]
    Command { args: String, stderr: String },
}

#[async_trait]
pub trait VersionControl: Send + Sync {
    async fn current_state(&self) -> Result<GitState, VcsError>;
}

/// Reads provenance by shelling out to the `git` binary.
#[derive(Debug, Clone)]
pub struct GitCli {
    work_dir: PathBuf,
}

impl GitCli {
    pub fn new(work_dir: impl AsRef<Path>) -> Self {
        Self {
            work_dir: work_dir.as_ref().to_path_buf(),
        }
    }

    async fn git(&self, args: &[&str]) -> Result<String, VcsError> {
        let output = tokio::process::Command::new("git")
            .args(args)
            .current_dir(&self.work_dir)
            .output()
            .await?;
        if !output.status.success() {
            return Err(VcsError::Command {
                args: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl VersionControl for GitCli {
    async fn current_state(&self) -> Result<GitState, VcsError> {
        let commit_id = self.git(&["rev-parse", "HEAD"]).await?;
        let branch = self.git(&["rev-parse", "--abbrev-ref", "HEAD"]).await?;
        // An unset user.email is not an error for provenance purposes.
        let email = self
            .git(&["config", "user.email"])
            .await
            .ok()
            .filter(|e| !e.is_empty());
        Ok(GitState {
            commit_id,
            branch,
            email,
        })
    }
}

use std::sync::Arc;

use wiretap_store::{
    CredentialStore, ExampleStore, ProjectPaths, ProvenanceProcessor, SessionStore, SpecEventLog,
    VersionControl,
};

/// Shared application state accessible from all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionStore,
    pub spec_log: SpecEventLog,
    pub examples: ExampleStore,
    /// Source of the author identity for `/command-context`.
    pub vcs: Arc<dyn VersionControl>,
    /// `None` when no home directory is known; identity then falls back to anonymous.
    pub credentials: Option<CredentialStore>,
}

impl AppState {
    pub fn for_project(
        paths: &ProjectPaths,
        spec_id: &str,
        vcs: Arc<dyn VersionControl>,
        credentials: Option<CredentialStore>,
    ) -> Self {
        Self {
            sessions: SessionStore::new(&paths.sessions_dir),
            spec_log: SpecEventLog::new(
                spec_id,
                &paths.spec_store_path,
                Arc::new(ProvenanceProcessor),
            ),
            examples: ExampleStore::new(&paths.example_requests_dir),
            vcs,
            credentials,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;
    use wiretap_schema::GitState;
    use wiretap_store::VcsError;

    pub struct StaticGit(pub Option<&'static str>);

    #[async_trait]
    impl VersionControl for StaticGit {
        async fn current_state(&self) -> Result<GitState, VcsError> {
            match self.0 {
                Some(email) => Ok(GitState {
                    commit_id: "abc123".into(),
                    branch: "main".into(),
                    email: Some(email.into()),
                }),
                None => Err(VcsError::Command {
                    args: "rev-parse HEAD".into(),
                    stderr: "not a git repository".into(),
                }),
            }
        }
    }

    pub fn setup_state() -> (AppState, tempfile::TempDir) {
        let tmp = tempfile::TempDir::new().unwrap();
        let paths = ProjectPaths::new(tmp.path());
        let state = AppState::for_project(
            &paths,
            "test-spec",
            Arc::new(StaticGit(Some("dev@example.com"))),
            Some(CredentialStore::from_config_dir(tmp.path().join("home"))),
        );
        (state, tmp)
    }

    pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}

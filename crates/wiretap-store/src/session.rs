//! File-backed registry of capture sessions and their diff state.
//!
//! Each session is two documents in one directory:
//! `<id>.wiretap_session.json` holds the payload the UI stored, and
//! `<id>.wiretap_diff-state.json` holds the [`DiffState`]. A missing diff-state
//! file means the session is still in its initial `started` state.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;
use wiretap_schema::DiffState;

use crate::error::{Result, StoreError};
use crate::fs::{exists, read_json, validate_id, write_json};

pub const SESSION_FILE_SUFFIX: &str = ".wiretap_session.json";
pub const DIFF_STATE_FILE_SUFFIX: &str = ".wiretap_diff-state.json";

/// A session payload together with its diff state, loaded as one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedSession {
    pub session_id: String,
    pub session: serde_json::Value,
    pub diff_state: DiffState,
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions_dir: PathBuf,
    /// Serializes writers against the two-file load inside this process.
    gate: Arc<RwLock<()>>,
}

impl SessionStore {
    pub fn new(sessions_dir: impl AsRef<Path>) -> Self {
        Self {
            sessions_dir: sessions_dir.as_ref().to_path_buf(),
            gate: Arc::new(RwLock::new(())),
        }
    }

    pub fn sessions_dir(&self) -> &Path {
        &self.sessions_dir
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.sessions_dir
            .join(format!("{session_id}{SESSION_FILE_SUFFIX}"))
    }

    fn diff_state_path(&self, session_id: &str) -> PathBuf {
        self.sessions_dir
            .join(format!("{session_id}{DIFF_STATE_FILE_SUFFIX}"))
    }

    /// All session ids, newest first (descending lexicographic order).
    pub async fn list_sessions(&self) -> Result<Vec<String>> {
        let mut dir = match tokio::fs::read_dir(&self.sessions_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::storage(&self.sessions_dir, e)),
        };

        let mut ids = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| StoreError::storage(&self.sessions_dir, e))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(id) = name.strip_suffix(SESSION_FILE_SUFFIX) {
                if !id.is_empty() {
                    ids.push(id.to_string());
                }
            }
        }

        ids.sort_by(|a, b| b.cmp(a));
        Ok(ids)
    }

    pub async fn session_exists(&self, session_id: &str) -> Result<bool> {
        if validate_id(session_id).is_err() {
            return Ok(false);
        }
        exists(&self.session_path(session_id)).await
    }

    /// False only when a diff state exists and it is `persisted`. An id that
    /// cannot name a session has no diff state, so it is startable.
    pub async fn is_session_startable(&self, session_id: &str) -> Result<bool> {
        if validate_id(session_id).is_err() {
            return Ok(true);
        }
        let _read = self.gate.read().await;
        let state: Option<DiffState> = read_json(&self.diff_state_path(session_id)).await?;
        Ok(!state.is_some_and(|s| s.is_persisted()))
    }

    /// Check the id and load payload plus diff state together.
    ///
    /// The diff state is synthesized when absent, so callers never see one
    /// document without the other.
    pub async fn validate_and_load(&self, session_id: &str) -> Result<LoadedSession> {
        if validate_id(session_id).is_err() {
            return Err(StoreError::NotFound(session_id.to_string()));
        }
        let _read = self.gate.read().await;

        let session: serde_json::Value = read_json(&self.session_path(session_id))
            .await?
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))?;
        let diff_state = read_json(&self.diff_state_path(session_id))
            .await?
            .unwrap_or_else(DiffState::initial);

        Ok(LoadedSession {
            session_id: session_id.to_string(),
            session,
            diff_state,
        })
    }

    /// Create or fully replace a session payload.
    pub async fn write_session(&self, session_id: &str, payload: &serde_json::Value) -> Result<()> {
        validate_id(session_id)?;
        let _write = self.gate.write().await;
        write_json(&self.session_path(session_id), payload).await?;
        debug!(session_id, "session written");
        Ok(())
    }

    /// Replace the diff state of an existing session. Refused once persisted.
    pub async fn write_diff_state(&self, session_id: &str, state: &DiffState) -> Result<()> {
        validate_id(session_id)?;
        let _write = self.gate.write().await;
        self.ensure_exists(session_id).await?;

        let path = self.diff_state_path(session_id);
        let current: Option<DiffState> = read_json(&path).await?;
        if current.is_some_and(|s| s.is_persisted()) {
            return Err(StoreError::SessionFinalized(session_id.to_string()));
        }
        write_json(&path, state).await?;
        debug!(session_id, status = ?state.status, "diff state written");
        Ok(())
    }

    /// Open a diff session: persists the initial diff state if there is none yet
    /// and returns the current one. Refused for a persisted session.
    pub async fn start_diff(&self, session_id: &str) -> Result<DiffState> {
        validate_id(session_id)?;
        let _write = self.gate.write().await;
        self.ensure_exists(session_id).await?;

        let path = self.diff_state_path(session_id);
        match read_json::<DiffState>(&path).await? {
            Some(state) if state.is_persisted() => {
                Err(StoreError::SessionFinalized(session_id.to_string()))
            }
            Some(state) => Ok(state),
            None => {
                let state = DiffState::initial();
                write_json(&path, &state).await?;
                debug!(session_id, "diff session started");
                Ok(state)
            }
        }
    }

    async fn ensure_exists(&self, session_id: &str) -> Result<()> {
        if !exists(&self.session_path(session_id)).await? {
            return Err(StoreError::NotFound(session_id.to_string()));
        }
        Ok(())
    }
}

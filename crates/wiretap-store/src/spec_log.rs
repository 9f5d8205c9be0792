//! Event-sourced specification log.
//!
//! The log is a JSON array of events stored in one file. Appending commands is a
//! read-modify-write cycle: load every event, hand them with the new commands to
//! a [`CommandProcessor`], and overwrite the file with the full result.
//!
//! There is no cross-process lock. Two writers on the same spec can lose each
//! other's events.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;
use wiretap_schema::{CommandContext, SpecCommand, SpecEvent};

use crate::error::{Result, StoreError};
use crate::fs::{exists, write_atomic};

#[derive(Debug, thiserror::Error)]
#[error("command processing failed: {0}")]
pub struct ProcessorError(pub String);

/// `(events, commands, context) -> events`. Implementations must return the
/// complete sequence, with the input events as an unchanged prefix.
pub trait CommandProcessor: Send + Sync {
    fn process(
        &self,
        spec_id: &str,
        events: Vec<SpecEvent>,
        commands: &[SpecCommand],
        context: &CommandContext,
    ) -> std::result::Result<Vec<SpecEvent>, ProcessorError>;
}

/// Processor for the commands this tool issues itself.
///
/// Replays the existing log to check that every event has the
/// `{"EventName": {...}}` shape, then emits one event per command.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProvenanceProcessor;

impl CommandProcessor for ProvenanceProcessor {
    fn process(
        &self,
        spec_id: &str,
        mut events: Vec<SpecEvent>,
        commands: &[SpecCommand],
        context: &CommandContext,
    ) -> std::result::Result<Vec<SpecEvent>, ProcessorError> {
        for (index, event) in events.iter().enumerate() {
            match event.0.as_object() {
                Some(map) if map.len() == 1 => {}
                _ => {
                    return Err(ProcessorError(format!(
                        "{spec_id}: event {index} is not a single-key object"
                    )))
                }
            }
        }

        let event_context = serde_json::json!({
            "clientId": context.author,
            "clientSessionId": context.session_id,
            "clientCommandBatchId": context.batch_id,
        });
        for command in commands {
            let event = match command {
                SpecCommand::SetGitState {
                    commit_id,
                    branch_name,
                } => serde_json::json!({
                    "GitStateSet": {
                        "branchName": branch_name,
                        "commitId": commit_id,
                        "eventContext": event_context,
                    }
                }),
            };
            events.push(SpecEvent(event));
        }
        Ok(events)
    }
}

/// One event per line inside the array, so diffs of the log stay line-oriented.
pub fn serialize_events(events: &[SpecEvent]) -> serde_json::Result<String> {
    if events.is_empty() {
        return Ok("[]".to_string());
    }
    let lines = events
        .iter()
        .map(serde_json::to_string)
        .collect::<serde_json::Result<Vec<_>>>()?;
    Ok(format!("[\n{}\n]", lines.join(",\n")))
}

#[derive(Clone)]
pub struct SpecEventLog {
    spec_id: String,
    path: PathBuf,
    processor: Arc<dyn CommandProcessor>,
}

impl SpecEventLog {
    pub fn new(
        spec_id: impl Into<String>,
        path: impl AsRef<Path>,
        processor: Arc<dyn CommandProcessor>,
    ) -> Self {
        Self {
            spec_id: spec_id.into(),
            path: path.as_ref().to_path_buf(),
            processor,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn spec_id(&self) -> &str {
        &self.spec_id
    }

    /// The persisted events, or an empty sequence if the log does not exist yet.
    pub async fn load(&self) -> Result<Vec<SpecEvent>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::storage(&self.path, e)),
        };
        let value: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::corrupt(&self.path, e))?;
        match value {
            serde_json::Value::Array(items) => Ok(items.into_iter().map(SpecEvent).collect()),
            other => Err(StoreError::corrupt(
                &self.path,
                format!("expected a JSON array of events, found {}", json_kind(&other)),
            )),
        }
    }

    /// Ok when the log is absent or a well-formed array.
    pub async fn ensure_valid(&self) -> Result<()> {
        if exists(&self.path).await? {
            self.load().await?;
        }
        Ok(())
    }

    /// Overwrite the whole log.
    pub async fn replace(&self, events: &[SpecEvent]) -> Result<()> {
        let body = serialize_events(events).map_err(|e| StoreError::corrupt(&self.path, e))?;
        write_atomic(&self.path, body.as_bytes()).await
    }

    /// Apply `commands` on top of the persisted events and write the result back.
    pub async fn append_commands(
        &self,
        commands: &[SpecCommand],
        context: &CommandContext,
    ) -> Result<Vec<SpecEvent>> {
        let events = self.load().await?;
        let before = events.len();
        let events = self
            .processor
            .process(&self.spec_id, events, commands, context)?;
        self.replace(&events).await?;
        debug!(
            spec_id = %self.spec_id,
            batch_id = %context.batch_id,
            appended = events.len().saturating_sub(before),
            total = events.len(),
            "spec events written"
        );
        Ok(events)
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

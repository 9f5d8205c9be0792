use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A persisted specification event. The event vocabulary belongs to the
/// command processor; everything else treats events as opaque JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct SpecEvent(pub serde_json::Value);

/// Commands that can be applied to a specification's event log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum SpecCommand {
    #[serde(rename_all = "camelCase")]
    SetGitState { commit_id: String, branch_name: String },
}

/// Audit tag attached to every batch of commands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CommandContext {
    pub author: String,
    pub session_id: Uuid,
    pub batch_id: Uuid,
}

impl CommandContext {
    pub const ANONYMOUS: &'static str = "anonymous";

    /// Fresh context for one invocation. A missing author becomes `anonymous`.
    pub fn new(author: Option<&str>) -> Self {
        let author = author
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .unwrap_or(Self::ANONYMOUS);
        Self {
            author: author.to_string(),
            session_id: Uuid::new_v4(),
            batch_id: Uuid::new_v4(),
        }
    }
}

/// Version-control provenance of the working copy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GitState {
    pub commit_id: String,
    pub branch: String,
    #[serde(default)]
    pub email: Option<String>,
}

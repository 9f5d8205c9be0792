pub mod config;
pub mod interaction;
pub mod spec;

pub use config::*;
pub use interaction::*;
pub use spec::*;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether a diff workflow over a capture session is still open.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DiffStatus {
    #[default]
    Started,
    Persisted,
}

/// Per-session diff progress. Once `status` is `Persisted` the record is frozen.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DiffState {
    pub status: DiffStatus,
    #[serde(default)]
    pub interaction_results: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub accepted_interpretations: Vec<serde_json::Value>,
}

impl DiffState {
    /// The state of a session that has no diff-state document yet.
    pub fn initial() -> Self {
        Self::default()
    }

    pub fn is_persisted(&self) -> bool {
        self.status == DiffStatus::Persisted
    }
}

/// Mint a session id whose lexicographic order matches creation order.
pub fn mint_session_id() -> String {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%3f");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{stamp}-{}", &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_diff_state_serializes_to_wire_shape() {
        let value = serde_json::to_value(DiffState::initial()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "status": "started",
                "interactionResults": {},
                "acceptedInterpretations": []
            })
        );
    }

    #[test]
    fn diff_state_parses_persisted_status() {
        let state: DiffState = serde_json::from_str(
            r#"{"status":"persisted","interactionResults":{"a":1},"acceptedInterpretations":[{}]}"#,
        )
        .unwrap();
        assert!(state.is_persisted());
        assert_eq!(state.accepted_interpretations.len(), 1);
    }

    #[test]
    fn diff_state_missing_collections_default_to_empty() {
        let state: DiffState = serde_json::from_str(r#"{"status":"started"}"#).unwrap();
        assert_eq!(state, DiffState::initial());
    }

    #[test]
    fn minted_ids_sort_by_creation() {
        let first = mint_session_id();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = mint_session_id();
        assert!(second > first);
        assert_eq!(first.len(), "20240101T000000000-".len() + 8);
    }
}

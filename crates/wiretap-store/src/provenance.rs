use tracing::{debug, info};
use wiretap_schema::{CommandContext, SpecCommand};

use crate::error::StoreError;
use crate::spec_log::SpecEventLog;
use crate::vcs::{VcsError, VersionControl};

#[derive(Debug, thiserror::Error)]
pub enum ProvenanceError {
    #[error(transparent)]
    Vcs(#[from] VcsError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Record the working copy's commit and branch in the spec log.
pub async fn record_git_state(
    vcs: &dyn VersionControl,
    log: &SpecEventLog,
) -> Result<usize, ProvenanceError> {
    let state = vcs.current_state().await?;
    let context = CommandContext::new(state.email.as_deref());
    let command = SpecCommand::SetGitState {
        commit_id: state.commit_id,
        branch_name: state.branch,
    };
    let events = log.append_commands(&[command], &context).await?;
    Ok(events.len())
}

/// Best-effort variant of [`record_git_state`]: failures are logged and swallowed
/// so the calling flow always continues.
pub async fn emit_git_state(vcs: &dyn VersionControl, log: &SpecEventLog) {
    match record_git_state(vcs, log).await {
        Ok(total) => info!(spec_id = log.spec_id(), total, "recorded git state"),
        Err(error) => debug!(spec_id = log.spec_id(), %error, "skipped git state"),
    }
}

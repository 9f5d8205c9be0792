use std::sync::Arc;

use anyhow::{bail, Result};
use wiretap_schema::ProjectConfig;
use wiretap_server::state::AppState;
use wiretap_server::{bind_first_free, serve, UI_PORTS};
use wiretap_store::{emit_git_state, CredentialStore, GitCli, ProjectPaths, StoreError};

pub async fn run(paths: &ProjectPaths, config: &ProjectConfig, open_browser: bool) -> Result<()> {
    let vcs = Arc::new(GitCli::new(&paths.project_root));
    let state = AppState::for_project(paths, &config.name, vcs.clone(), CredentialStore::from_home());

    match state.spec_log.ensure_valid().await {
        Ok(()) => {}
        Err(StoreError::CorruptState { path, reason }) => bail!(
            "something wrong with your API spec file at {}: {reason}. It must be a valid JSON array of events",
            path.display()
        ),
        Err(e) => return Err(e.into()),
    }

    emit_git_state(vcs.as_ref(), &state.spec_log).await;

    let listener = bind_first_free("127.0.0.1", UI_PORTS).await?;
    let url = format!("http://localhost:{}/", listener.local_addr()?.port());
    println!("Serving {} at {url}. Press Ctrl-C to stop.", config.name);
    if open_browser {
        if let Err(error) = webbrowser::open(&url) {
            tracing::debug!(%error, "could not open browser");
        }
    }

    serve(state, listener, async {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received SIGINT, shutting down...");
        }
    })
    .await
}

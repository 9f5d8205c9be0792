use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;
use wiretap_capture::{
    CaptureSessionManager, FileCaptureSaver, ForwardingCapturer, IgnoreRules, SessionConfig,
    SessionEnd,
};
use wiretap_schema::{mint_session_id, CaptureFlags, ProjectConfig};
use wiretap_store::{ProjectPaths, SessionStore};

pub async fn run(paths: &ProjectPaths, config: &ProjectConfig) -> Result<()> {
    let flags = CaptureFlags::from_env();
    let ignore = IgnoreRules::new(&config.ignore_rules())?;
    let session_id = mint_session_id();
    let sink = Arc::new(FileCaptureSaver::new(paths.capture_dir(&session_id), ignore));

    let session_config = SessionConfig::from_project(config, flags);
    let manager = CaptureSessionManager::new(session_config, ForwardingCapturer::new()?);
    let stopper = manager.stopper();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received SIGINT, stopping capture...");
            stopper.stop();
        }
    });

    println!(
        "Capturing traffic on http://{}:{} for {}. Press Ctrl-C to stop.",
        config.proxy.host, config.proxy.port, config.name
    );
    let report = manager
        .run(sink.clone())
        .await
        .context("capture session failed to start")?;

    if let SessionEnd::CommandExited(Some(status)) = report.end {
        if !status.success() {
            println!("Command exited with {status}");
        }
    }

    let sessions = SessionStore::new(&paths.sessions_dir);
    sessions
        .write_session(
            &session_id,
            &json!({
                "apiName": config.name,
                "captureId": session_id,
                "interactions": sink.interactions_path().display().to_string(),
                "saved": sink.saved(),
                "ignored": sink.skipped(),
            }),
        )
        .await?;

    println!(
        "Session {session_id}: saved {} interactions ({} ignored)",
        sink.saved(),
        sink.skipped()
    );
    Ok(())
}

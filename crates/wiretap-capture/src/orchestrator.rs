//! Capture session orchestration.
//!
//! A [`CaptureSessionManager`] owns one capturer and, optionally, one service
//! subprocess. [`CaptureSessionManager::run`] starts both, forwards every
//! captured interaction to a [`CaptureSaver`], waits until the subprocess exits
//! or the session is stopped, and then tears down in a fixed order:
//! subprocess, capturer, sink.

use std::collections::BTreeMap;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wiretap_schema::{
    CaptureFlags, HttpInteraction, ProjectConfig, ProxyConfig, ServiceConfig, ENV_API_HOST,
    ENV_API_PORT,
};

use crate::capturer::{CaptureOptions, InteractionCapturer};
use crate::error::CaptureError;
use crate::sink::CaptureSaver;
use crate::supervisor::CommandSession;

const SAMPLE_BUFFER: usize = 256;
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub service: ServiceConfig,
    pub proxy: ProxyConfig,
    pub flags: CaptureFlags,
    /// Shell command for the service under test.
    pub command: Option<String>,
    /// Extra variables for the subprocess, on top of the inherited environment.
    pub env_overlay: BTreeMap<String, String>,
}

impl SessionConfig {
    pub fn from_project(project: &ProjectConfig, flags: CaptureFlags) -> Self {
        Self {
            service: project.service.clone(),
            proxy: project.proxy.clone(),
            flags,
            command: project.command.clone(),
            env_overlay: BTreeMap::new(),
        }
    }

    fn command_env(&self) -> BTreeMap<String, String> {
        let mut env = self.env_overlay.clone();
        env.insert(ENV_API_HOST.to_string(), self.service.host.clone());
        env.insert(ENV_API_PORT.to_string(), self.service.port.to_string());
        env
    }

    fn capture_options(&self) -> Result<CaptureOptions, CaptureError> {
        let target = if self.flags.transparent_proxy {
            None
        } else {
            Some(
                self.service
                    .url()
                    .map_err(|e| CaptureError::startup("proxy", e))?,
            )
        };
        Ok(CaptureOptions {
            proxy_host: self.proxy.host.clone(),
            proxy_port: self.proxy.port,
            target,
            flags: self.flags,
        })
    }
}

/// Handle for ending a running session from elsewhere, e.g. a Ctrl-C listener.
#[derive(Debug, Clone)]
pub struct SessionStopper(CancellationToken);

impl SessionStopper {
    /// Request the session to end. Extra calls are absorbed.
    pub fn stop(&self) {
        self.0.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.0.is_cancelled()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The subprocess exited on its own. `None` if its status could not be read.
    CommandExited(Option<ExitStatus>),
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionReport {
    pub end: SessionEnd,
    /// Interactions handed to the sink.
    pub forwarded: usize,
}

pub struct CaptureSessionManager<C> {
    config: SessionConfig,
    capturer: C,
    cancel: CancellationToken,
}

impl<C: InteractionCapturer> CaptureSessionManager<C> {
    pub fn new(config: SessionConfig, capturer: C) -> Self {
        Self {
            config,
            capturer,
            cancel: CancellationToken::new(),
        }
    }

    pub fn stopper(&self) -> SessionStopper {
        SessionStopper(self.cancel.clone())
    }

    /// Run one capture session to completion.
    ///
    /// Startup failures are returned before any subprocess is launched, and the
    /// sink is discarded so nothing is left behind.
    pub async fn run(mut self, sink: Arc<dyn CaptureSaver>) -> Result<SessionReport, CaptureError> {
        let options = self.config.capture_options()?;
        sink.init().await?;

        let (samples, received) = mpsc::channel(SAMPLE_BUFFER);
        let forwarded = Arc::new(AtomicUsize::new(0));
        let forwarder = spawn_forwarder(received, sink.clone(), forwarded.clone());

        if let Err(error) = self.capturer.start(options, samples).await {
            drain(forwarder, DRAIN_TIMEOUT).await;
            discard(sink.as_ref()).await;
            return Err(error);
        }
        info!(
            proxy = %format!("{}:{}", self.config.proxy.host, self.config.proxy.port),
            transparent = self.config.flags.transparent_proxy,
            "capture started"
        );

        let mut command = match self.config.command.as_deref() {
            Some(line) => match CommandSession::spawn(line, &self.config.command_env()) {
                Ok(session) => {
                    info!(command = line, "command running");
                    Some(session)
                }
                Err(error) => {
                    if let Err(e) = self.capturer.stop().await {
                        warn!(error = %e, "failed to stop capturer");
                    }
                    drain(forwarder, DRAIN_TIMEOUT).await;
                    discard(sink.as_ref()).await;
                    return Err(error);
                }
            },
            None => None,
        };

        let end = match command.as_mut() {
            Some(session) => tokio::select! {
                status = session.wait() => SessionEnd::CommandExited(status),
                _ = self.cancel.cancelled() => SessionEnd::Cancelled,
            },
            None => {
                self.cancel.cancelled().await;
                SessionEnd::Cancelled
            }
        };
        debug!(?end, "capture session ending");
        // Later stop requests land on an already-cancelled token.
        self.cancel.cancel();

        if let Some(mut session) = command {
            if let Err(error) = session.stop().await {
                warn!(%error, "failed to stop command");
            }
        }
        if let Err(error) = self.capturer.stop().await {
            warn!(%error, "failed to stop capturer");
        }
        drain(forwarder, DRAIN_TIMEOUT).await;
        let forwarded = forwarded.load(Ordering::SeqCst);
        if let Err(error) = sink.cleanup().await {
            warn!(%error, "failed to clean up capture sink");
        }
        info!(forwarded, "capture finished");

        Ok(SessionReport { end, forwarded })
    }
}

/// `forwarded` counts interactions as they are handed to the sink, so the
/// total survives the forwarder being aborted.
fn spawn_forwarder(
    mut received: mpsc::Receiver<HttpInteraction>,
    sink: Arc<dyn CaptureSaver>,
    forwarded: Arc<AtomicUsize>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(interaction) = received.recv().await {
            let request = interaction.request_line();
            forwarded.fetch_add(1, Ordering::SeqCst);
            if let Err(error) = sink.save(interaction).await {
                warn!(%request, %error, "failed to save interaction");
            }
        }
    })
}

/// Wait for queued interactions to reach the sink. The capturer has already
/// released its sender, so the forwarder ends once the queue is empty.
async fn drain(mut forwarder: JoinHandle<()>, limit: Duration) {
    match tokio::time::timeout(limit, &mut forwarder).await {
        Ok(Ok(())) => {}
        Ok(Err(error)) => warn!(%error, "interaction forwarder failed"),
        Err(_) => {
            warn!("interaction forwarder did not drain in time");
            forwarder.abort();
        }
    }
}

async fn discard(sink: &dyn CaptureSaver) {
    if let Err(error) = sink.discard().await {
        warn!(%error, "failed to discard capture sink");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use wiretap_schema::{CapturedRequest, CapturedResponse};

    /// Saves instantly except for `/stuck`, which never completes.
    struct StuckSink;

    #[async_trait]
    impl CaptureSaver for StuckSink {
        async fn init(&self) -> Result<(), CaptureError> {
            Ok(())
        }

        async fn save(&self, interaction: HttpInteraction) -> Result<(), CaptureError> {
            if interaction.request.path == "/stuck" {
                std::future::pending::<()>().await;
            }
            Ok(())
        }

        async fn cleanup(&self) -> Result<(), CaptureError> {
            Ok(())
        }
    }

    fn interaction(path: &str) -> HttpInteraction {
        HttpInteraction {
            uuid: path.to_string(),
            request: CapturedRequest {
                host: "localhost:3005".into(),
                method: "GET".into(),
                path: path.into(),
                query: None,
                headers: vec![],
                body: Default::default(),
            },
            response: CapturedResponse {
                status_code: 200,
                headers: vec![],
                body: Default::default(),
            },
            tags: vec![],
        }
    }

    fn config(transparent: bool) -> SessionConfig {
        SessionConfig {
            service: ServiceConfig {
                host: "localhost".into(),
                port: 3005,
                protocol: "http".into(),
            },
            proxy: ProxyConfig {
                host: "127.0.0.1".into(),
                port: 3000,
            },
            flags: CaptureFlags {
                transparent_proxy: transparent,
                ..CaptureFlags::default()
            },
            command: None,
            env_overlay: BTreeMap::from([("EXTRA".to_string(), "1".to_string())]),
        }
    }

    #[test]
    fn targeted_mode_points_at_service() {
        let options = config(false).capture_options().unwrap();
        assert_eq!(
            options.target.map(|u| u.to_string()).as_deref(),
            Some("http://localhost:3005/")
        );
        assert_eq!(options.proxy_port, 3000);
    }

    #[test]
    fn transparent_mode_has_no_target() {
        assert!(config(true).capture_options().unwrap().target.is_none());
    }

    #[test]
    fn command_env_adds_service_address() {
        let env = config(false).command_env();
        assert_eq!(env.get(ENV_API_HOST).map(String::as_str), Some("localhost"));
        assert_eq!(env.get(ENV_API_PORT).map(String::as_str), Some("3005"));
        assert_eq!(env.get("EXTRA").map(String::as_str), Some("1"));
    }

    #[tokio::test]
    async fn drain_timeout_keeps_forwarded_count() {
        let (samples, received) = mpsc::channel(8);
        let forwarded = Arc::new(AtomicUsize::new(0));
        let forwarder = spawn_forwarder(received, Arc::new(StuckSink), forwarded.clone());
        for path in ["/one", "/two", "/stuck"] {
            samples.send(interaction(path)).await.unwrap();
        }
        drop(samples);

        drain(forwarder, Duration::from_millis(100)).await;
        assert_eq!(forwarded.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn stopper_absorbs_repeated_stops() {
        let token = CancellationToken::new();
        let stopper = SessionStopper(token.clone());
        assert!(!stopper.is_stopped());
        stopper.stop();
        stopper.stop();
        assert!(token.is_cancelled());
    }
}

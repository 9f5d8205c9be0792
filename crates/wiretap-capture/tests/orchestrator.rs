use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Duration};
use wiretap_capture::{
    CaptureError, CaptureOptions, CaptureSaver, CaptureSessionManager, InteractionCapturer,
    SessionConfig, SessionEnd,
};
use wiretap_schema::{
    CaptureFlags, CapturedRequest, CapturedResponse, HttpInteraction, ProxyConfig, ServiceConfig,
};

#[derive(Clone, Default)]
struct FakeCapturer {
    sender: Arc<Mutex<Option<mpsc::Sender<HttpInteraction>>>>,
    starts: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
    fail_start: bool,
    fail_stop: bool,
}

impl FakeCapturer {
    fn failing() -> Self {
        Self {
            fail_start: true,
            ..Self::default()
        }
    }

    fn failing_stop() -> Self {
        Self {
            fail_stop: true,
            ..Self::default()
        }
    }

    async fn emit(&self, path: &str) {
        let sender = self.sender.lock().unwrap().clone().unwrap();
        sender.send(interaction(path)).await.unwrap();
    }
}

#[async_trait]
impl InteractionCapturer for FakeCapturer {
    async fn start(
        &mut self,
        _options: CaptureOptions,
        samples: mpsc::Sender<HttpInteraction>,
    ) -> Result<(), CaptureError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start {
            return Err(CaptureError::startup("proxy", "address in use"));
        }
        *self.sender.lock().unwrap() = Some(samples);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.sender.lock().unwrap().take();
        if self.fail_stop {
            return Err(CaptureError::Capturer("proxy task panicked".into()));
        }
        Ok(())
    }
}

#[derive(Default)]
struct RecordingSink {
    saved: Mutex<Vec<String>>,
    inits: AtomicUsize,
    cleanups: AtomicUsize,
    discards: AtomicUsize,
    fail_cleanup: bool,
}

impl RecordingSink {
    fn paths(&self) -> Vec<String> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait]
impl CaptureSaver for RecordingSink {
    async fn init(&self) -> Result<(), CaptureError> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn save(&self, interaction: HttpInteraction) -> Result<(), CaptureError> {
        self.saved.lock().unwrap().push(interaction.request.path);
        Ok(())
    }

    async fn cleanup(&self) -> Result<(), CaptureError> {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
        if self.fail_cleanup {
            return Err(CaptureError::Sink("disk full".into()));
        }
        Ok(())
    }

    async fn discard(&self) -> Result<(), CaptureError> {
        self.discards.fetch_add(1, Ordering::SeqCst);
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

fn config(command: Option<String>) -> SessionConfig {
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
        flags: CaptureFlags::default(),
        command,
        env_overlay: BTreeMap::new(),
    }
}

#[cfg(unix)]
#[tokio::test]
async fn session_ends_when_command_exits() {
    let capturer = FakeCapturer::default();
    let sink = Arc::new(RecordingSink::default());
    let manager = CaptureSessionManager::new(config(Some("exit 0".into())), capturer.clone());

    let report = timeout(Duration::from_secs(10), manager.run(sink.clone()))
        .await
        .unwrap()
        .unwrap();

    match report.end {
        SessionEnd::CommandExited(Some(status)) => assert!(status.success()),
        other => panic!("unexpected end: {other:?}"),
    }
    assert_eq!(capturer.starts.load(Ordering::SeqCst), 1);
    assert_eq!(capturer.stops.load(Ordering::SeqCst), 1);
    assert_eq!(sink.inits.load(Ordering::SeqCst), 1);
    assert_eq!(sink.cleanups.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cancellation_after_three_interactions_forwards_exactly_three() {
    let capturer = FakeCapturer::default();
    let sink = Arc::new(RecordingSink::default());
    let manager = CaptureSessionManager::new(config(None), capturer.clone());
    let stopper = manager.stopper();
    let running = tokio::spawn(manager.run(sink.clone()));

    while capturer.sender.lock().unwrap().is_none() {
        sleep(Duration::from_millis(5)).await;
    }
    for path in ["/one", "/two", "/three"] {
        capturer.emit(path).await;
    }
    while sink.paths().len() < 3 {
        sleep(Duration::from_millis(5)).await;
    }
    stopper.stop();
    stopper.stop();

    let report = timeout(Duration::from_secs(10), running)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(report.end, SessionEnd::Cancelled);
    assert_eq!(report.forwarded, 3);
    assert_eq!(sink.paths(), ["/one", "/two", "/three"]);
    assert_eq!(capturer.stops.load(Ordering::SeqCst), 1);
    assert_eq!(sink.cleanups.load(Ordering::SeqCst), 1);
    assert!(stopper.is_stopped());
}

#[cfg(unix)]
#[tokio::test]
async fn startup_failure_never_launches_command() {
    let tmp = tempfile::TempDir::new().unwrap();
    let marker = tmp.path().join("launched");
    let capturer = FakeCapturer::failing();
    let sink = Arc::new(RecordingSink::default());
    let manager = CaptureSessionManager::new(
        config(Some(format!("touch {}", marker.display()))),
        capturer.clone(),
    );

    let err = manager.run(sink.clone()).await.unwrap_err();
    assert!(matches!(err, CaptureError::Startup { .. }));

    sleep(Duration::from_millis(100)).await;
    assert!(!marker.exists());
    assert_eq!(sink.discards.load(Ordering::SeqCst), 1);
    assert_eq!(sink.cleanups.load(Ordering::SeqCst), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn stop_kills_running_command() {
    let capturer = FakeCapturer::default();
    let sink = Arc::new(RecordingSink::default());
    let manager = CaptureSessionManager::new(config(Some("sleep 30".into())), capturer.clone());
    let stopper = manager.stopper();
    let running = tokio::spawn(manager.run(sink.clone()));

    while capturer.sender.lock().unwrap().is_none() {
        sleep(Duration::from_millis(5)).await;
    }
    stopper.stop();

    let report = timeout(Duration::from_secs(10), running)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(report.end, SessionEnd::Cancelled);
    assert_eq!(capturer.stops.load(Ordering::SeqCst), 1);
    assert_eq!(sink.cleanups.load(Ordering::SeqCst), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn command_sees_service_address() {
    let tmp = tempfile::TempDir::new().unwrap();
    let out = tmp.path().join("env.txt");
    let capturer = FakeCapturer::default();
    let sink = Arc::new(RecordingSink::default());
    let command = format!(
        "printf '%s:%s' \"$WIRETAP_API_HOST\" \"$WIRETAP_API_PORT\" > {}",
        out.display()
    );
    let manager = CaptureSessionManager::new(config(Some(command)), capturer);

    timeout(Duration::from_secs(10), manager.run(sink))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(std::fs::read_to_string(out).unwrap(), "localhost:3005");
}

#[tokio::test]
async fn capturer_stop_failure_still_cleans_up_sink() {
    let capturer = FakeCapturer::failing_stop();
    let sink = Arc::new(RecordingSink::default());
    let manager = CaptureSessionManager::new(config(None), capturer.clone());
    let stopper = manager.stopper();
    let running = tokio::spawn(manager.run(sink.clone()));

    while capturer.sender.lock().unwrap().is_none() {
        sleep(Duration::from_millis(5)).await;
    }
    capturer.emit("/one").await;
    stopper.stop();

    let report = timeout(Duration::from_secs(10), running)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(report.end, SessionEnd::Cancelled);
    assert_eq!(report.forwarded, 1);
    assert_eq!(capturer.stops.load(Ordering::SeqCst), 1);
    assert_eq!(sink.cleanups.load(Ordering::SeqCst), 1);
    assert_eq!(sink.discards.load(Ordering::SeqCst), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn sink_cleanup_failure_does_not_fail_session() {
    let capturer = FakeCapturer::default();
    let sink = Arc::new(RecordingSink {
        fail_cleanup: true,
        ..RecordingSink::default()
    });
    let manager = CaptureSessionManager::new(config(Some("exit 0".into())), capturer.clone());

    let report = timeout(Duration::from_secs(10), manager.run(sink.clone()))
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(report.end, SessionEnd::CommandExited(Some(_))));
    assert_eq!(capturer.stops.load(Ordering::SeqCst), 1);
    assert_eq!(sink.cleanups.load(Ordering::SeqCst), 1);
}

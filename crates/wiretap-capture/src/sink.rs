use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tracing::{debug, info};
use wiretap_schema::HttpInteraction;

use crate::error::CaptureError;
use crate::ignore::IgnoreRules;

pub const INTERACTIONS_FILE: &str = "interactions.jsonl";

/// Durable destination for captured interactions.
#[async_trait]
pub trait CaptureSaver: Send + Sync {
    /// Must succeed before the first `save`.
    async fn init(&self) -> Result<(), CaptureError>;

    /// Called once per interaction, in capture order.
    async fn save(&self, interaction: HttpInteraction) -> Result<(), CaptureError>;

    /// Flush and close.
    async fn cleanup(&self) -> Result<(), CaptureError>;

    /// Undo `init` after a session failed to start.
    async fn discard(&self) -> Result<(), CaptureError> {
        self.cleanup().await
    }
}

/// Appends one JSON document per line to `<dir>/interactions.jsonl`.
pub struct FileCaptureSaver {
    dir: PathBuf,
    ignore: IgnoreRules,
    file: Mutex<Option<BufWriter<File>>>,
    saved: AtomicUsize,
    skipped: AtomicUsize,
}

impl FileCaptureSaver {
    pub fn new(dir: impl Into<PathBuf>, ignore: IgnoreRules) -> Self {
        Self {
            dir: dir.into(),
            ignore,
            file: Mutex::new(None),
            saved: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn interactions_path(&self) -> PathBuf {
        self.dir.join(INTERACTIONS_FILE)
    }

    pub fn saved(&self) -> usize {
        self.saved.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::Relaxed)
    }
}

fn sink_error(path: &Path, e: impl std::fmt::Display) -> CaptureError {
    CaptureError::Sink(format!("{}: {e}", path.display()))
}

#[async_trait]
impl CaptureSaver for FileCaptureSaver {
    async fn init(&self) -> Result<(), CaptureError> {
        let mut guard = self.file.lock().await;
        if guard.is_some() {
            return Ok(());
        }
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| sink_error(&self.dir, e))?;
        let path = self.interactions_path();
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| sink_error(&path, e))?;
        *guard = Some(BufWriter::new(file));
        debug!(path = %path.display(), "capture file opened");
        Ok(())
    }

    async fn save(&self, interaction: HttpInteraction) -> Result<(), CaptureError> {
        if self.ignore.should_ignore(&interaction) {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            debug!(request = %interaction.request_line(), "ignored");
            return Ok(());
        }
        let mut line = serde_json::to_vec(&interaction)
            .map_err(|e| CaptureError::Sink(format!("serializing interaction: {e}")))?;
        line.push(b'\n');

        let mut guard = self.file.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| CaptureError::Sink("capture file is not open".into()))?;
        let path = self.interactions_path();
        writer.write_all(&line).await.map_err(|e| sink_error(&path, e))?;
        writer.flush().await.map_err(|e| sink_error(&path, e))?;
        self.saved.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn cleanup(&self) -> Result<(), CaptureError> {
        let Some(mut writer) = self.file.lock().await.take() else {
            return Ok(());
        };
        let path = self.interactions_path();
        writer.flush().await.map_err(|e| sink_error(&path, e))?;
        writer
            .into_inner()
            .sync_all()
            .await
            .map_err(|e| sink_error(&path, e))?;
        info!(
            saved = self.saved(),
            skipped = self.skipped(),
            path = %path.display(),
            "capture saved"
        );
        Ok(())
    }

    async fn discard(&self) -> Result<(), CaptureError> {
        drop(self.file.lock().await.take());
        match fs::remove_dir_all(&self.dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(sink_error(&self.dir, e)),
        }
    }
}

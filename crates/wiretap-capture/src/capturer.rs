use async_trait::async_trait;
use axum::http::{header::CONTENT_TYPE, HeaderMap};
use tokio::sync::mpsc;
use url::Url;
use wiretap_schema::{CaptureFlags, CapturedBody, HeaderEntry, HttpInteraction};

use crate::error::CaptureError;

#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub proxy_host: String,
    pub proxy_port: u16,
    /// Upstream to forward to. `None` means transparent mode: each request
    /// names its own destination.
    pub target: Option<Url>,
    pub flags: CaptureFlags,
}

/// Something that sits between a client and the service under test and reports
/// every exchange it sees.
#[async_trait]
pub trait InteractionCapturer: Send {
    /// Bind and begin forwarding. Interactions go to `samples` in the order they
    /// complete. Fails with [`CaptureError::Startup`] if the listener cannot bind.
    async fn start(
        &mut self,
        options: CaptureOptions,
        samples: mpsc::Sender<HttpInteraction>,
    ) -> Result<(), CaptureError>;

    /// Stop forwarding and release `samples`. Calling it again is a no-op.
    async fn stop(&mut self) -> Result<(), CaptureError>;
}

/// Record a body according to the capture flags.
pub fn capture_body(headers: &HeaderMap, bytes: &[u8], flags: &CaptureFlags) -> CapturedBody {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    if bytes.is_empty() {
        return CapturedBody {
            content_type,
            ..CapturedBody::default()
        };
    }

    let is_json = content_type
        .as_deref()
        .is_some_and(|ct| ct.to_ascii_lowercase().contains("json"));
    let text = if flags.include_text_body {
        std::str::from_utf8(bytes).ok().map(str::to_string)
    } else {
        None
    };
    let json = if flags.include_json_body && is_json {
        serde_json::from_slice(bytes).ok()
    } else {
        None
    };

    CapturedBody {
        content_type,
        text,
        json,
    }
}

pub fn header_entries(headers: &HeaderMap) -> Vec<HeaderEntry> {
    headers
        .iter()
        .map(|(name, value)| HeaderEntry {
            name: name.as_str().to_string(),
            value: String::from_utf8_lossy(value.as_bytes()).into_owned(),
        })
        .collect()
}

//! Forwarding HTTP capturer.
//!
//! Listens on the proxy address, relays each request to the upstream service
//! with `reqwest`, and reports the pair as an [`HttpInteraction`]. This works at
//! the HTTP layer only; there is no CONNECT tunnelling or TLS interception.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;
use wiretap_schema::{CaptureFlags, CapturedRequest, CapturedResponse, HttpInteraction};

use crate::capturer::{capture_body, header_entries, CaptureOptions, InteractionCapturer};
use crate::error::CaptureError;

const MAX_BODY_BYTES: usize = 100 * 1024 * 1024;
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

struct ProxyState {
    client: reqwest::Client,
    target: Option<Url>,
    flags: CaptureFlags,
    samples: mpsc::Sender<HttpInteraction>,
    /// Fired when graceful shutdown overruns; in-flight relays give up.
    abort: CancellationToken,
}

struct Running {
    shutdown: CancellationToken,
    abort: CancellationToken,
    server: JoinHandle<()>,
    local_addr: SocketAddr,
}

pub struct ForwardingCapturer {
    client: reqwest::Client,
    shutdown_grace: Duration,
    running: Option<Running>,
}

impl ForwardingCapturer {
    pub fn new() -> Result<Self, CaptureError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(UPSTREAM_TIMEOUT)
            .build()
            .map_err(|e| CaptureError::startup("http client", e))?;
        Ok(Self {
            client,
            shutdown_grace: SHUTDOWN_GRACE,
            running: None,
        })
    }

    /// How long `stop` lets in-flight requests finish before cutting them off.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Address the proxy is bound to while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }
}

#[async_trait]
impl InteractionCapturer for ForwardingCapturer {
    async fn start(
        &mut self,
        options: CaptureOptions,
        samples: mpsc::Sender<HttpInteraction>,
    ) -> Result<(), CaptureError> {
        if self.running.is_some() {
            return Err(CaptureError::startup("proxy", "already running"));
        }
        if options.flags.chrome {
            info!("browser capture requested; the forwarding proxy records only traffic sent to it");
        }

        let addr = format!("{}:{}", options.proxy_host, options.proxy_port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| CaptureError::startup("proxy", format!("{addr}: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| CaptureError::startup("proxy", e))?;

        let abort = CancellationToken::new();
        let state = Arc::new(ProxyState {
            client: self.client.clone(),
            target: options.target,
            flags: options.flags,
            samples,
            abort: abort.clone(),
        });
        let app = Router::new().fallback(forward).with_state(state);

        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        let server = tokio::spawn(async move {
            if let Err(error) = axum::serve(listener, app)
                .with_graceful_shutdown(signal.cancelled_owned())
                .await
            {
                warn!(%error, "proxy server exited with error");
            }
        });

        debug!(%local_addr, "forwarding proxy listening");
        self.running = Some(Running {
            shutdown,
            abort,
            server,
            local_addr,
        });
        Ok(())
    }

    /// Stop accepting connections and wait up to the shutdown grace for
    /// in-flight requests. Past that, pending relays are answered with 503
    /// and the server task is aborted.
    async fn stop(&mut self) -> Result<(), CaptureError> {
        let Some(mut running) = self.running.take() else {
            return Ok(());
        };
        running.shutdown.cancel();
        match tokio::time::timeout(self.shutdown_grace, &mut running.server).await {
            Ok(joined) => joined.map_err(|e| CaptureError::Capturer(format!("proxy task: {e}"))),
            Err(_) => {
                warn!(
                    grace_ms = self.shutdown_grace.as_millis() as u64,
                    "proxy did not drain in time, aborting in-flight requests"
                );
                running.abort.cancel();
                running.server.abort();
                let _ = running.server.await;
                Ok(())
            }
        }
    }
}

async fn forward(State(state): State<Arc<ProxyState>>, request: Request) -> Response {
    tokio::select! {
        relayed = relay(&state, request) => match relayed {
            Ok(response) => response,
            Err(reason) => {
                warn!(%reason, "could not relay request");
                (StatusCode::BAD_GATEWAY, reason).into_response()
            }
        },
        _ = state.abort.cancelled() => {
            (StatusCode::SERVICE_UNAVAILABLE, "capture stopped").into_response()
        }
    }
}

async fn relay(state: &ProxyState, request: Request) -> Result<Response, String> {
    let (parts, body) = request.into_parts();
    let request_body = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| format!("reading request body: {e}"))?;

    let base = match &state.target {
        Some(target) => target.clone(),
        None => transparent_target(&parts.uri, &parts.headers)?,
    };
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = base
        .join(path_and_query)
        .map_err(|e| format!("building upstream url: {e}"))?;
    let host = parts
        .headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| url.host_str().map(str::to_string))
        .unwrap_or_default();

    let upstream = state
        .client
        .request(parts.method.clone(), url)
        .headers(forwardable(&parts.headers, true))
        .body(request_body.clone())
        .send()
        .await
        .map_err(|e| format!("upstream request failed: {e}"))?;

    let status = upstream.status();
    let response_headers = upstream.headers().clone();
    let response_body: Bytes = upstream
        .bytes()
        .await
        .map_err(|e| format!("reading upstream body: {e}"))?;

    let interaction = HttpInteraction {
        uuid: Uuid::new_v4().to_string(),
        request: CapturedRequest {
            host,
            method: parts.method.to_string(),
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(str::to_string),
            headers: header_entries(&parts.headers),
            body: capture_body(&parts.headers, &request_body, &state.flags),
        },
        response: CapturedResponse {
            status_code: status.as_u16(),
            headers: header_entries(&response_headers),
            body: capture_body(&response_headers, &response_body, &state.flags),
        },
        tags: Vec::new(),
    };
    if state.samples.send(interaction).await.is_err() {
        debug!("sample receiver closed, interaction not recorded");
    }

    let mut response = Response::new(Body::from(response_body));
    *response.status_mut() = status;
    *response.headers_mut() = forwardable(&response_headers, false);
    Ok(response)
}

/// Resolve the destination from an absolute-form URI or the `Host` header.
fn transparent_target(uri: &axum::http::Uri, headers: &HeaderMap) -> Result<Url, String> {
    if let (Some(scheme), Some(authority)) = (uri.scheme_str(), uri.authority()) {
        return Url::parse(&format!("{scheme}://{authority}")).map_err(|e| e.to_string());
    }
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| "transparent mode needs an absolute URI or Host header".to_string())?;
    Url::parse(&format!("http://{host}")).map_err(|e| e.to_string())
}

fn forwardable(headers: &HeaderMap, is_request: bool) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_by_hop(name) || *name == header::CONTENT_LENGTH {
            continue;
        }
        if is_request && *name == header::HOST {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "proxy-connection"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

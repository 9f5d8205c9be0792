pub mod error;
pub mod routes;
pub mod state;

use std::future::Future;
use std::ops::RangeInclusive;

use anyhow::{anyhow, Result};
use axum::extract::DefaultBodyLimit;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Ports tried, in order, for the local UI server.
pub const UI_PORTS: RangeInclusive<u16> = 3201..=3299;

const MAX_BODY_BYTES: usize = 100 * 1024 * 1024;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/cli-api", routes::api_router())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind to the first free port of `ports` on `host`.
pub async fn bind_first_free(host: &str, ports: RangeInclusive<u16>) -> Result<TcpListener> {
    for port in ports.clone() {
        match TcpListener::bind((host, port)).await {
            Ok(listener) => return Ok(listener),
            Err(e) => tracing::debug!(port, error = %e, "port unavailable"),
        }
    }
    Err(anyhow!(
        "no free port between {} and {}",
        ports.start(),
        ports.end()
    ))
}

pub async fn serve(
    state: AppState,
    listener: TcpListener,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = create_router(state);
    tracing::info!("wiretap-server listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::setup_state;
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    #[tokio::test]
    async fn routes_live_under_cli_api() {
        let (state, _tmp) = setup_state();
        let app = create_router(state);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/cli-api/sessions")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);

        let response = app
            .oneshot(Request::builder().uri("/sessions").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn binds_next_port_when_first_is_taken() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();
        let Some(end) = port.checked_add(20) else {
            return;
        };
        let listener = bind_first_free("127.0.0.1", port..=end).await.unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), port);
    }
}

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use wiretap_schema::SpecEvent;

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_events).put(replace_events))
}

/// The persisted spec events. Read failures yield an empty list.
async fn list_events(State(state): State<AppState>) -> Json<Vec<SpecEvent>> {
    match state.spec_log.load().await {
        Ok(events) => Json(events),
        Err(error) => {
            tracing::warn!(%error, "failed to read spec events");
            Json(Vec::new())
        }
    }
}

async fn replace_events(
    State(state): State<AppState>,
    Json(events): Json<Vec<SpecEvent>>,
) -> Result<StatusCode, ApiError> {
    state.spec_log.replace(&events).await?;
    tracing::debug!(count = events.len(), "spec events replaced");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    use super::router;
    use crate::state::testing::{body_json, setup_state};

    #[tokio::test]
    async fn replace_then_list_round_trips() {
        let (state, _tmp) = setup_state();
        let app = router().with_state(state.clone());

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"[{"PathComponentAdded":{"pathId":"p1"}}]"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::NO_CONTENT);

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let events = body_json(response).await;
        assert_eq!(events[0]["PathComponentAdded"]["pathId"], "p1");
        assert_eq!(events.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn corrupt_log_lists_as_empty() {
        let (state, _tmp) = setup_state();
        let path = state.spec_log.path().to_path_buf();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"not":"an array"}"#).unwrap();
        let app = router().with_state(state);

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!([]));
    }

    #[tokio::test]
    async fn replace_rejects_non_array_body() {
        let (state, _tmp) = setup_state();
        let app = router().with_state(state.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"a":1}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.status().is_client_error());
        assert!(!state.spec_log.path().exists());
    }
}

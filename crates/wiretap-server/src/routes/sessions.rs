use axum::{
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use wiretap_schema::DiffState;
use wiretap_store::{LoadedSession, StoreError};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct SessionList {
    pub sessions: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreated {
    pub session_id: String,
}

#[derive(Serialize)]
pub struct SessionBody {
    pub session: Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffStateBody {
    pub diff_state: DiffState,
}

/// A session that exists, loaded together with its diff state before the
/// handler runs. Unknown ids are rejected with 404.
pub struct ValidatedSession(pub LoadedSession);

impl FromRequestParts<AppState> for ValidatedSession {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Path(session_id) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError(StoreError::NotFound(e.body_text())))?;
        let loaded = state.sessions.validate_and_load(&session_id).await?;
        Ok(Self(loaded))
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_sessions))
        .route("/{session_id}", get(get_session).put(put_session))
        .route(
            "/{session_id}/diff-state",
            get(get_diff_state).put(put_diff_state),
        )
        .route("/{session_id}/diff-state/start", post(start_diff))
}

async fn list_sessions(State(state): State<AppState>) -> Result<Json<SessionList>, ApiError> {
    let sessions = state.sessions.list_sessions().await?;
    Ok(Json(SessionList { sessions }))
}

async fn put_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(payload): Json<Value>,
) -> Result<Json<SessionCreated>, ApiError> {
    state.sessions.write_session(&session_id, &payload).await?;
    Ok(Json(SessionCreated { session_id }))
}

async fn get_session(ValidatedSession(loaded): ValidatedSession) -> Json<SessionBody> {
    Json(SessionBody {
        session: loaded.session,
    })
}

async fn get_diff_state(ValidatedSession(loaded): ValidatedSession) -> Json<DiffStateBody> {
    Json(DiffStateBody {
        diff_state: loaded.diff_state,
    })
}

async fn put_diff_state(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(diff_state): Json<DiffState>,
) -> Result<StatusCode, ApiError> {
    state
        .sessions
        .write_diff_state(&session_id, &diff_state)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn start_diff(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<DiffStateBody>, ApiError> {
    let diff_state = state.sessions.start_diff(&session_id).await?;
    Ok(Json(DiffStateBody { diff_state }))
}

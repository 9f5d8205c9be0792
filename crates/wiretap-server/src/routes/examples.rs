use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct ExampleList {
    pub examples: Vec<Value>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/{request_id}", get(list_examples).post(add_example))
}

async fn add_example(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
    Json(example): Json<Value>,
) -> Result<StatusCode, ApiError> {
    state.examples.append(&request_id, example).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_examples(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Result<Json<ExampleList>, ApiError> {
    let examples = state.examples.list(&request_id).await?;
    Ok(Json(ExampleList { examples }))
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::warn;
use wiretap_store::StoreError;

/// Store failures translated into control-plane responses.
#[derive(Debug)]
pub struct ApiError(pub StoreError);

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            StoreError::NotFound(_) => (StatusCode::NOT_FOUND, "invalid session id".to_string()),
            StoreError::InvalidId(_) => (StatusCode::BAD_REQUEST, self.0.to_string()),
            StoreError::SessionFinalized(_) => (StatusCode::CONFLICT, self.0.to_string()),
            StoreError::CorruptState { .. } => {
                warn!(error = %self.0, "corrupt state");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("{}; fix or remove the file and try again", self.0),
                )
            }
            StoreError::Storage { .. } | StoreError::Processor(_) => {
                warn!(error = %self.0, "store failure");
                (StatusCode::INTERNAL_SERVER_ERROR, self.0.to_string())
            }
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}

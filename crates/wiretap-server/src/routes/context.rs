use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use serde_json::json;
use wiretap_schema::CommandContext;
use wiretap_store::ANONYMOUS_IDENTITY;

use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandContextBody {
    pub user_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityBody {
    pub distinct_id: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/command-context", get(command_context))
        .route("/identity", get(identity))
}

async fn command_context(
    State(state): State<AppState>,
) -> Result<Json<CommandContextBody>, (StatusCode, Json<serde_json::Value>)> {
    match state.vcs.current_state().await {
        Ok(git) => Ok(Json(CommandContextBody {
            user_id: CommandContext::new(git.email.as_deref()).author,
        })),
        Err(error) => {
            tracing::warn!(%error, "could not read version control state");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "message": error.to_string() })),
            ))
        }
    }
}

async fn identity(State(state): State<AppState>) -> Json<IdentityBody> {
    let distinct_id = match &state.credentials {
        Some(store) => store.identity().await,
        None => ANONYMOUS_IDENTITY.to_string(),
    };
    Json(IdentityBody { distinct_id })
}

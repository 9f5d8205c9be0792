pub mod context;
pub mod events;
pub mod examples;
pub mod sessions;

use axum::Router;

use crate::state::AppState;

pub fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/events", events::router())
        .nest("/example-requests", examples::router())
        .nest("/sessions", sessions::router())
        .merge(context::router())
}

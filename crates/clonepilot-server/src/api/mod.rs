pub mod clone;
pub mod clone_stream;

use axum::Router;

use crate::AppState;

/// Build the complete API router with all sub-routes.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/api/clone-stream", clone_stream::router())
        .nest("/api/clone", clone::router())
}

//! HTTP routes.

use axum::Router;

use crate::state::AppState;

pub mod health;
pub mod ingest;

/// Builds the full router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .nest("/api/v1", ingest::router())
        .with_state(state)
}

//! Health check endpoint.
//!
//! Reports whether both pipelines still accept work, so the endpoint doubles
//! as a readiness check during shutdown.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Json, Router, routing::get};
use serde::Serialize;

use crate::state::AppState;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok` while both pipelines accept work, `stopping` otherwise.
    pub status: &'static str,
    /// Service version.
    pub version: &'static str,
    /// Per-pipeline readiness.
    pub pipelines: PipelineHealth,
}

/// Readiness of each worker pool.
#[derive(Serialize)]
pub struct PipelineHealth {
    /// Event workers.
    pub events: PoolHealth,
    /// Command workers.
    pub commands: PoolHealth,
}

/// Readiness of one worker pool.
#[derive(Serialize)]
pub struct PoolHealth {
    /// Whether submissions are accepted.
    pub accepting: bool,
    /// Number of partitions.
    pub partitions: usize,
}

/// GET /health
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let events = PoolHealth {
        accepting: state.events.is_accepting(),
        partitions: state.events.partitions(),
    };
    let commands = PoolHealth {
        accepting: state.commands.is_accepting(),
        partitions: state.commands.partitions(),
    };
    let ready = events.accepting && commands.accepting;

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = HealthResponse {
        status: if ready { "ok" } else { "stopping" },
        version: env!("CARGO_PKG_VERSION"),
        pipelines: PipelineHealth { events, commands },
    };
    (status, Json(body))
}

/// Returns the health check router.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

//! Ingress onto the partitioned workers.
//!
//! Bodies are queued byte-for-byte after the envelope is parsed far enough to
//! find its partition key. Processing happens asynchronously, so a `202`
//! only means the message was accepted.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use threadline_core::command::CommandEnvelope;
use threadline_core::event::EventEnvelope;

use crate::error::ApiError;
use crate::state::AppState;

/// Response body for an accepted message.
#[derive(Debug, Serialize)]
pub struct Accepted {
    /// The envelope id.
    pub id: String,
    /// The partition key it was queued under.
    pub key: String,
}

/// POST /api/v1/events
async fn ingest_event(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Accepted>), ApiError> {
    let envelope = EventEnvelope::from_slice(&body)?;
    let key = envelope.partition_key().to_owned();
    state.events.submit(&key, body.to_vec()).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(Accepted {
            id: envelope.id,
            key,
        }),
    ))
}

/// POST /api/v1/commands
async fn ingest_command(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Accepted>), ApiError> {
    let envelope = CommandEnvelope::from_slice(&body)?;
    let key = envelope.partition_key().to_owned();
    state.commands.submit(&key, body.to_vec()).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(Accepted {
            id: envelope.id,
            key,
        }),
    ))
}

/// Returns the ingress router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/events", post(ingest_event))
        .route("/commands", post(ingest_command))
}

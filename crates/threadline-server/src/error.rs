//! Threadline service — error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use threadline_core::error::DomainError;

/// Startup and runtime errors for the service.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Redis client error.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Store preparation failed.
    #[error("store error: {0}")]
    Store(#[from] DomainError),

    /// Tracing or exporter setup failed.
    #[error("telemetry error: {0}")]
    Telemetry(String),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
}

/// HTTP-layer wrapper around `DomainError` that implements `IntoResponse`.
#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self.0 {
            DomainError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            DomainError::SchemaMismatch { .. } => (StatusCode::BAD_REQUEST, "schema_mismatch"),
            DomainError::UnregisteredSchema(_) => {
                (StatusCode::BAD_REQUEST, "unregistered_schema")
            }
            DomainError::AggregateNotFound { .. } => {
                (StatusCode::NOT_FOUND, "aggregate_not_found")
            }
            DomainError::TransactionConflict(_) => (StatusCode::CONFLICT, "transaction_conflict"),
            DomainError::ConcurrencyConflict { .. } => {
                (StatusCode::CONFLICT, "concurrency_conflict")
            }
            DomainError::Generation(_) => (StatusCode::BAD_GATEWAY, "generation_error"),
            DomainError::Transport(_) => (StatusCode::SERVICE_UNAVAILABLE, "transport_error"),
            DomainError::Infrastructure(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "infrastructure_error")
            }
        };

        let body = ErrorBody {
            error: error_code,
            message: self.0.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

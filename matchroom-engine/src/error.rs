//! Error types for matchroom-engine
//!
//! Two layers: [`EngineError`] is the domain taxonomy returned by the core
//! components, [`ApiError`] translates it to HTTP for the mapping layer.
//! The engine never fabricates movies or votes to mask a failure; every
//! error below the discovery client's single internal retry surfaces here.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::cache_manager::ConsistencyReport;
use crate::services::tmdb_client::CatalogError;

/// Domain error taxonomy.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Catalog API unreachable, rate-limited past the single retry, or
    /// returned a malformed response.
    #[error("External service error: {0}")]
    ExternalService(#[from] CatalogError),

    /// Fewer than the required number of qualifying titles exist after
    /// filtering. A hard failure; quality filters are never relaxed.
    #[error("Insufficient content: {available} qualifying titles, {required} required")]
    InsufficientContent { available: usize, required: usize },

    /// Cache metadata missing or not yet complete. Callers should treat
    /// this as "try again shortly", not as "no content".
    #[error("Cache not ready for room {0}")]
    CacheNotReady(String),

    /// Structural sequence invariant violated; carries the diagnosis
    /// instead of guessed data.
    #[error("Sequence inconsistency in room {}", .0.room_id)]
    SequenceInconsistency(ConsistencyReport),

    /// The vote transaction's room-status condition failed.
    #[error("Room {0} is not available for voting")]
    RoomNotAvailable(String),

    /// Malformed input, rejected before any I/O.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Storage layer failure.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// matchroom-common error
    #[error("Common error: {0}")]
    Common(#[from] matchroom_common::Error),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Engine error, mapped per variant
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<matchroom_common::Error> for ApiError {
    fn from(err: matchroom_common::Error) -> Self {
        match err {
            matchroom_common::Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            other => ApiError::Engine(EngineError::Common(other)),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg, None),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg, None),
            ApiError::Engine(err) => match err {
                EngineError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg, None)
                }
                EngineError::RoomNotAvailable(_) => (
                    StatusCode::CONFLICT,
                    "ROOM_NOT_AVAILABLE",
                    err.to_string(),
                    None,
                ),
                // "Retry shortly" is distinct from "cannot proceed"
                EngineError::CacheNotReady(_) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "CACHE_NOT_READY",
                    err.to_string(),
                    None,
                ),
                EngineError::InsufficientContent { .. } => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "INSUFFICIENT_CONTENT",
                    err.to_string(),
                    None,
                ),
                EngineError::SequenceInconsistency(ref report) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "SEQUENCE_INCONSISTENCY",
                    err.to_string(),
                    serde_json::to_value(report).ok(),
                ),
                EngineError::ExternalService(_) => (
                    StatusCode::BAD_GATEWAY,
                    "EXTERNAL_SERVICE_ERROR",
                    err.to_string(),
                    None,
                ),
                EngineError::Database(_) | EngineError::Common(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    err.to_string(),
                    None,
                ),
            },
            ApiError::Other(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                err.to_string(),
                None,
            ),
        };

        let mut error = json!({
            "code": error_code,
            "message": message,
        });
        if let Some(details) = details {
            error["details"] = details;
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

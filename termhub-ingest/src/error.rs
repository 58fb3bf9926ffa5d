//! Error types for termhub-ingest
//!
//! Two layers: `IngestError` is the pipeline taxonomy (row, enrichment,
//! persistence, source), `ApiError` is the HTTP surface.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Pipeline error taxonomy
///
/// Row- and field-level variants are always recovered locally (skip or
/// degrade); batch- and job-level variants surface as job state
/// transitions.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Malformed single row: skip, count, continue
    #[error("Row {offset} failed to parse: {reason}")]
    RowParse { offset: u64, reason: String },

    /// Enrichment quota exhausted past the queue wait: degrade the field
    #[error("Enrichment quota exhausted: {0}")]
    EnrichmentQuota(String),

    /// Enrichment upstream failure after retries: degrade the field
    #[error("Enrichment service error: {0}")]
    EnrichmentService(String),

    /// Single record failed to commit: exclude from batch, continue
    #[error("Record '{slug}' rejected by store: {reason}")]
    PersistenceConstraint { slug: String, reason: String },

    /// Batch-level commit failure: retry with backoff, then pause the job
    #[error("Persistence transport error: {0}")]
    PersistenceTransport(#[from] sqlx::Error),

    /// Source file unreadable or corrupt beyond recovery: fail the job
    #[error("Source read error: {0}")]
    SourceRead(String),

    /// Record serialization failure: fail the job
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    /// Whether this error pauses the job (recoverable) rather than failing it
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            IngestError::PersistenceTransport(_)
                | IngestError::EnrichmentQuota(_)
                | IngestError::EnrichmentService(_)
        )
    }
}

/// Result type for pipeline operations
pub type IngestResult<T> = Result<T, IngestError>;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409) - e.g., job already running
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Internal(format!("Database error: {}", err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Io(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IO_ERROR",
                err.to_string(),
            ),
            ApiError::Other(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

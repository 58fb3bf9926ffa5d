//! HTTP surface: job control, status, health, and the event stream

pub mod health;
pub mod jobs;
pub mod sse;

use crate::AppState;
use axum::routing::{get, post};
use axum::Router;

/// Build the service router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/events", get(sse::events))
        .route("/ingest/start", post(jobs::start_job))
        .route("/ingest/status/:job_id", get(jobs::job_status))
        .route("/ingest/cancel/:job_id", post(jobs::cancel_job))
        .with_state(state)
}

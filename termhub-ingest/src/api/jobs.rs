//! Job control endpoints
//!
//! One ingestion job runs at a time; starting while another is active is
//! a conflict. Cancellation is cooperative through the job's token and
//! acknowledged immediately.

use crate::db::jobs::{has_active_job, load_job, save_job};
use crate::error::{ApiError, ApiResult};
use crate::models::{IngestJob, JobOptions, JobState};
use crate::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    /// Source file path on the server host
    pub source_file: Option<String>,
    /// Paused job to resume; `source_file` is then taken from the job
    pub resume_job_id: Option<Uuid>,
    #[serde(flatten)]
    pub options: JobOptions,
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub job_id: Uuid,
    pub state: JobState,
}

/// POST /ingest/start
pub async fn start_job(
    State(state): State<AppState>,
    Json(request): Json<StartRequest>,
) -> ApiResult<(StatusCode, Json<StartResponse>)> {
    if has_active_job(&state.pool).await? {
        return Err(ApiError::Conflict(
            "an ingestion job is already active".to_string(),
        ));
    }

    let job = match request.resume_job_id {
        Some(job_id) => {
            let mut job = load_job(&state.pool, job_id)
                .await?
                .ok_or_else(|| ApiError::NotFound(format!("no job {}", job_id)))?;
            if job.state != JobState::Paused {
                return Err(ApiError::Conflict(format!(
                    "job {} is {:?}, only paused jobs resume",
                    job_id, job.state
                )));
            }
            job.options.resume = true;
            job.state = JobState::Pending;
            job
        }
        None => {
            let source_file = request
                .source_file
                .ok_or_else(|| ApiError::BadRequest("source_file is required".to_string()))?;
            let metadata = tokio::fs::metadata(&source_file).await.map_err(|err| {
                ApiError::BadRequest(format!("cannot read {}: {}", source_file, err))
            })?;
            if !metadata.is_file() {
                return Err(ApiError::BadRequest(format!(
                    "{} is not a regular file",
                    source_file
                )));
            }
            IngestJob::new(source_file, request.options)
        }
    };

    let job_id = job.job_id;
    save_job(&state.pool, &job).await?;

    let cancel = CancellationToken::new();
    state.jobs.write().await.insert(job_id, cancel.clone());

    let supervisor = Arc::clone(&state.supervisor);
    let jobs = Arc::clone(&state.jobs);
    let run_job = job.clone();
    tokio::spawn(async move {
        supervisor.run(run_job, cancel).await;
        jobs.write().await.remove(&job_id);
    });

    tracing::info!(job_id = %job_id, source_file = %job.source_file, "Ingestion job accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(StartResponse {
            job_id,
            state: job.state,
        }),
    ))
}

/// GET /ingest/status/{job_id}
pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<IngestJob>> {
    let job = load_job(&state.pool, job_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no job {}", job_id)))?;
    Ok(Json(job))
}

/// POST /ingest/cancel/{job_id}
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    if let Some(cancel) = state.jobs.read().await.get(&job_id) {
        cancel.cancel();
        tracing::info!(job_id = %job_id, "Cancellation requested");
        return Ok((
            StatusCode::ACCEPTED,
            Json(json!({ "job_id": job_id, "cancelling": true })),
        ));
    }

    // Not running; distinguish unknown from already finished
    match load_job(&state.pool, job_id).await? {
        Some(job) => Err(ApiError::Conflict(format!(
            "job {} is not running (state {:?})",
            job_id, job.state
        ))),
        None => Err(ApiError::NotFound(format!("no job {}", job_id))),
    }
}

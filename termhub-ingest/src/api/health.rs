//! Health endpoint

use crate::db::jobs::has_active_job;
use crate::error::ApiResult;
use crate::AppState;
use axum::extract::State;
use axum::Json;
use serde_json::json;

/// GET /health
pub async fn health(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let active = has_active_job(&state.pool).await?;
    Ok(Json(json!({
        "status": "ok",
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "job_active": active,
        "enrichment_calls": state.enricher.network_calls(),
    })))
}

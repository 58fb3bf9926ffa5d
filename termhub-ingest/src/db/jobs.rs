//! Job persistence
//!
//! The full job is stored as JSON next to a queryable state column. Jobs
//! found mid-flight at startup are moved to PAUSED, not failed: their
//! checkpoints are intact and a resume picks up where the crash left off.

use crate::models::{IngestJob, JobState};
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

fn state_str(state: JobState) -> &'static str {
    match state {
        JobState::Pending => "PENDING",
        JobState::Running => "RUNNING",
        JobState::Paused => "PAUSED",
        JobState::Completed => "COMPLETED",
        JobState::Cancelled => "CANCELLED",
        JobState::Failed => "FAILED",
    }
}

/// Insert or update a job row
pub async fn save_job(pool: &SqlitePool, job: &IngestJob) -> Result<(), sqlx::Error> {
    let job_json =
        serde_json::to_string(job).map_err(|err| sqlx::Error::Protocol(err.to_string()))?;
    sqlx::query(
        r#"
        INSERT INTO ingest_jobs (job_id, state, source_file, job_json, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(job_id) DO UPDATE SET
            state = excluded.state,
            source_file = excluded.source_file,
            job_json = excluded.job_json,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(job.job_id.to_string())
    .bind(state_str(job.state))
    .bind(&job.source_file)
    .bind(&job_json)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

/// Load a job by id
pub async fn load_job(pool: &SqlitePool, job_id: Uuid) -> Result<Option<IngestJob>, sqlx::Error> {
    let row: Option<(String,)> = sqlx::query_as("SELECT job_json FROM ingest_jobs WHERE job_id = ?")
        .bind(job_id.to_string())
        .fetch_optional(pool)
        .await?;
    match row {
        Some((job_json,)) => {
            let job = serde_json::from_str(&job_json)
                .map_err(|err| sqlx::Error::Protocol(err.to_string()))?;
            Ok(Some(job))
        }
        None => Ok(None),
    }
}

/// Whether any job is currently pending or running
pub async fn has_active_job(pool: &SqlitePool) -> Result<bool, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM ingest_jobs WHERE state IN ('PENDING', 'RUNNING')",
    )
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

/// Move jobs left mid-flight by an unclean shutdown to PAUSED.
/// Returns the number of jobs adjusted.
pub async fn pause_stale_jobs(pool: &SqlitePool) -> Result<u64, sqlx::Error> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT job_id, job_json FROM ingest_jobs WHERE state IN ('PENDING', 'RUNNING')",
    )
    .fetch_all(pool)
    .await?;

    let mut adjusted = 0u64;
    for (job_id, job_json) in rows {
        let mut job: IngestJob = match serde_json::from_str(&job_json) {
            Ok(job) => job,
            Err(err) => {
                tracing::warn!(job_id = %job_id, error = %err, "Discarding unreadable stale job");
                continue;
            }
        };
        job.transition_to(JobState::Paused);
        job.progress.current_operation =
            "Interrupted by restart; resumable from last checkpoint".to_string();
        save_job(pool, &job).await?;
        tracing::info!(job_id = %job_id, "Stale job paused, resumable from checkpoint");
        adjusted += 1;
    }
    Ok(adjusted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_pool;
    use crate::models::JobOptions;

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let pool = init_memory_pool().await.unwrap();
        let mut job = IngestJob::new("terms.csv".to_string(), JobOptions::default());
        job.transition_to(JobState::Running);
        save_job(&pool, &job).await.unwrap();

        let loaded = load_job(&pool, job.job_id).await.unwrap().unwrap();
        assert_eq!(loaded.job_id, job.job_id);
        assert_eq!(loaded.state, JobState::Running);
        assert_eq!(loaded.source_file, "terms.csv");

        assert!(load_job(&pool, Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_active_job_detection() {
        let pool = init_memory_pool().await.unwrap();
        assert!(!has_active_job(&pool).await.unwrap());

        let mut job = IngestJob::new("terms.csv".to_string(), JobOptions::default());
        job.transition_to(JobState::Running);
        save_job(&pool, &job).await.unwrap();
        assert!(has_active_job(&pool).await.unwrap());

        job.transition_to(JobState::Completed);
        save_job(&pool, &job).await.unwrap();
        assert!(!has_active_job(&pool).await.unwrap());
    }

    #[tokio::test]
    async fn test_stale_jobs_become_paused() {
        let pool = init_memory_pool().await.unwrap();

        let mut running = IngestJob::new("a.csv".to_string(), JobOptions::default());
        running.transition_to(JobState::Running);
        save_job(&pool, &running).await.unwrap();

        let mut done = IngestJob::new("b.csv".to_string(), JobOptions::default());
        done.transition_to(JobState::Completed);
        save_job(&pool, &done).await.unwrap();

        assert_eq!(pause_stale_jobs(&pool).await.unwrap(), 1);

        let loaded = load_job(&pool, running.job_id).await.unwrap().unwrap();
        assert_eq!(loaded.state, JobState::Paused);
        // Paused is not terminal; no end stamp
        assert!(loaded.ended_at.is_none());

        let untouched = load_job(&pool, done.job_id).await.unwrap().unwrap();
        assert_eq!(untouched.state, JobState::Completed);
    }
}

//! Ingestion job state machine
//!
//! A job progresses `Pending → Running → {Completed, Failed, Paused}`.
//! Paused jobs resume from their last committed checkpoint under the same
//! job id; Cancelled is reached only through the explicit cancel
//! operation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use termhub_common::events::RowCounts;
use uuid::Uuid;

/// Ingestion job state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobState {
    /// Accepted, strategy not yet selected
    Pending,
    /// Pipeline executing
    Running,
    /// Recoverable error; resumable from the last checkpoint
    Paused,
    /// Finished successfully; terminal
    Completed,
    /// Cancelled by the caller; terminal
    Cancelled,
    /// Unrecoverable error; terminal
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Cancelled | JobState::Failed
        )
    }
}

/// Options accepted by the start operation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobOptions {
    /// Rows per committed batch (None: configured default)
    pub batch_size: Option<usize>,
    /// Enrichment context identifier, part of every cache key
    pub context: String,
    /// Resume from the last committed checkpoint for this job id
    pub resume: bool,
    /// Bypass the row-level unchanged skip for this run only; the
    /// field-level enrichment cache still applies
    pub force_reprocess: bool,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            batch_size: None,
            context: "glossary-v1".to_string(),
            resume: false,
            force_reprocess: false,
        }
    }
}

/// One sampled row failure, enough to diagnose data-quality issues
/// without re-running the job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowFailure {
    pub offset: u64,
    pub reason: String,
}

/// Progress snapshot, queryable at any time while running
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobProgress {
    /// Highest committed row offset (-1 before the first commit)
    pub row_offset: i64,
    /// Total rows expected, if the source knows it
    pub total_rows: Option<u64>,
    /// Processing rate over the run so far
    pub rows_per_sec: f64,
    /// Current operation description
    pub current_operation: String,
    /// Elapsed time (seconds)
    pub elapsed_seconds: u64,
    /// Estimated remaining time (seconds), None if unknown
    pub estimated_remaining_seconds: Option<u64>,
}

impl Default for JobProgress {
    fn default() -> Self {
        Self {
            row_offset: -1,
            total_rows: None,
            rows_per_sec: 0.0,
            current_operation: String::from("Initializing..."),
            elapsed_seconds: 0,
            estimated_remaining_seconds: None,
        }
    }
}

/// Ingestion job (in-memory state, persisted per batch)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestJob {
    /// Unique job identifier
    pub job_id: Uuid,
    /// Current state
    pub state: JobState,
    /// Source file being ingested
    pub source_file: String,
    /// Start options
    pub options: JobOptions,
    /// Progress tracking
    pub progress: JobProgress,
    /// Row counts
    pub counts: RowCounts,
    /// Sampled row failures with offsets
    pub failures: Vec<RowFailure>,
    /// Job start time
    pub started_at: DateTime<Utc>,
    /// Job end time (terminal states only)
    pub ended_at: Option<DateTime<Utc>>,
}

impl IngestJob {
    pub fn new(source_file: String, options: JobOptions) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            state: JobState::Pending,
            source_file,
            options,
            progress: JobProgress::default(),
            counts: RowCounts::default(),
            failures: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Transition to a new state, stamping the end time for terminal states
    pub fn transition_to(&mut self, new_state: JobState) {
        tracing::debug!(
            job_id = %self.job_id,
            old_state = ?self.state,
            new_state = ?new_state,
            "Job state transition"
        );
        self.state = new_state;
        if new_state.is_terminal() {
            self.ended_at = Some(Utc::now());
        }
    }

    /// Update the progress snapshot after a committed batch
    pub fn update_progress(&mut self, row_offset: i64, total_rows: Option<u64>, operation: String) {
        self.progress.row_offset = row_offset;
        self.progress.total_rows = total_rows;
        self.progress.current_operation = operation;

        let elapsed = (Utc::now() - self.started_at).num_seconds().max(0) as u64;
        self.progress.elapsed_seconds = elapsed;

        let processed = self.counts.total();
        self.progress.rows_per_sec = if elapsed > 0 {
            processed as f64 / elapsed as f64
        } else {
            processed as f64
        };

        self.progress.estimated_remaining_seconds = match total_rows {
            Some(total) if processed > 0 && total > processed => {
                let rate = elapsed as f64 / processed as f64;
                Some(((total - processed) as f64 * rate) as u64)
            }
            _ => None,
        };
    }

    /// Record a row failure, keeping at most `sample_limit` reasons
    pub fn add_failure(&mut self, offset: u64, reason: String, sample_limit: usize) {
        if self.failures.len() < sample_limit {
            self.failures.push(RowFailure { offset, reason });
        }
    }

    /// Check if the job is in a terminal state
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(!JobState::Paused.is_terminal());
    }

    #[test]
    fn test_transition_stamps_end_time() {
        let mut job = IngestJob::new("data.csv".to_string(), JobOptions::default());
        job.transition_to(JobState::Running);
        assert!(job.ended_at.is_none());
        job.transition_to(JobState::Completed);
        assert!(job.ended_at.is_some());
    }

    #[test]
    fn test_paused_is_not_terminal() {
        let mut job = IngestJob::new("data.csv".to_string(), JobOptions::default());
        job.transition_to(JobState::Running);
        job.transition_to(JobState::Paused);
        assert!(!job.is_terminal());
        assert!(job.ended_at.is_none());
    }

    #[test]
    fn test_failure_sampling_cap() {
        let mut job = IngestJob::new("data.csv".to_string(), JobOptions::default());
        for offset in 0..10 {
            job.add_failure(offset, "bad row".to_string(), 3);
        }
        assert_eq!(job.failures.len(), 3);
        assert_eq!(job.failures[2].offset, 2);
    }

    #[test]
    fn test_progress_estimate() {
        let mut job = IngestJob::new("data.csv".to_string(), JobOptions::default());
        job.counts.succeeded = 50;
        // Backdate start so elapsed > 0
        job.started_at = Utc::now() - chrono::Duration::seconds(10);
        job.update_progress(49, Some(100), "Committing batch".to_string());
        assert!(job.progress.rows_per_sec > 0.0);
        assert!(job.progress.estimated_remaining_seconds.is_some());
    }

    #[test]
    fn test_state_serialization_uppercase() {
        assert_eq!(
            serde_json::to_string(&JobState::Running).unwrap(),
            "\"RUNNING\""
        );
        assert_eq!(
            serde_json::to_string(&JobState::Paused).unwrap(),
            "\"PAUSED\""
        );
    }
}

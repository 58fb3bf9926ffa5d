//! Event types for the Termhub event system
//!
//! Provides shared event definitions and the EventBus used to broadcast
//! ingest progress to SSE subscribers and other observers.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Row counts reported with progress and completion events
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowCounts {
    /// Rows mapped and durably committed
    pub succeeded: u64,
    /// Rows whose fingerprint matched an already-persisted record
    pub skipped_unchanged: u64,
    /// Rows that failed to parse or commit
    pub failed: u64,
}

impl RowCounts {
    /// Total rows accounted for
    pub fn total(&self) -> u64 {
        self.succeeded + self.skipped_unchanged + self.failed
    }
}

/// Ingest events broadcast via EventBus
///
/// Events are serialized for SSE transmission; all ingest observers share
/// this central enum for type safety and exhaustive matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IngestEvent {
    /// Ingestion job accepted and started
    JobStarted {
        job_id: Uuid,
        source_file: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Intake strategy chosen for the source file
    StrategySelected {
        job_id: Uuid,
        /// "direct", "streaming-native", or "forced-row-wise"
        strategy: String,
        file_size_bytes: u64,
    },

    /// A batch of records was durably committed with its checkpoint
    BatchCommitted {
        job_id: Uuid,
        records_committed: usize,
        last_committed_offset: u64,
        counts: RowCounts,
    },

    /// A single row was skipped due to a row-level failure
    RowFailed {
        job_id: Uuid,
        offset: u64,
        reason: String,
    },

    /// Periodic progress update during a running job
    ProgressUpdate {
        job_id: Uuid,
        row_offset: u64,
        total_rows: Option<u64>,
        rows_per_sec: f64,
        counts: RowCounts,
    },

    /// Job paused on a recoverable error; resumable from its checkpoint
    JobPaused {
        job_id: Uuid,
        reason: String,
    },

    /// Job cancelled cooperatively
    JobCancelled {
        job_id: Uuid,
    },

    /// Job finished; final counts
    JobCompleted {
        job_id: Uuid,
        counts: RowCounts,
        elapsed_seconds: u64,
    },

    /// Job failed on an unrecoverable error
    JobFailed {
        job_id: Uuid,
        error: String,
    },
}

impl IngestEvent {
    /// Event type name for SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            IngestEvent::JobStarted { .. } => "JobStarted",
            IngestEvent::StrategySelected { .. } => "StrategySelected",
            IngestEvent::BatchCommitted { .. } => "BatchCommitted",
            IngestEvent::RowFailed { .. } => "RowFailed",
            IngestEvent::ProgressUpdate { .. } => "ProgressUpdate",
            IngestEvent::JobPaused { .. } => "JobPaused",
            IngestEvent::JobCancelled { .. } => "JobCancelled",
            IngestEvent::JobCompleted { .. } => "JobCompleted",
            IngestEvent::JobFailed { .. } => "JobFailed",
        }
    }

    /// Job this event belongs to
    pub fn job_id(&self) -> Uuid {
        match self {
            IngestEvent::JobStarted { job_id, .. }
            | IngestEvent::StrategySelected { job_id, .. }
            | IngestEvent::BatchCommitted { job_id, .. }
            | IngestEvent::RowFailed { job_id, .. }
            | IngestEvent::ProgressUpdate { job_id, .. }
            | IngestEvent::JobPaused { job_id, .. }
            | IngestEvent::JobCancelled { job_id }
            | IngestEvent::JobCompleted { job_id, .. }
            | IngestEvent::JobFailed { job_id, .. } => *job_id,
        }
    }
}

/// Central event distribution bus
///
/// Uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<IngestEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a new EventBus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<IngestEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns the number of subscribers that received the event. An event
    /// with no subscribers is not an error.
    pub fn emit(&self, event: IngestEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current subscriber count
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

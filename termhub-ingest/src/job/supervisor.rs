//! Job supervisor: runs one ingestion job end to end
//!
//! Stages are connected by bounded channels. The reader fills a window of
//! raw rows, the mapper enriches them with bounded concurrency, and the
//! persistence task commits batch N while batch N+1 accumulates. Every
//! unrecoverable path lands the job in a terminal state; recoverable
//! paths pause it with the checkpoint intact.

use crate::config::IngestConfig;
use crate::db::jobs::save_job;
use crate::db::records::{CommitOutcome, RecordStore};
use crate::enrich::EnrichmentClient;
use crate::error::{IngestError, IngestResult};
use crate::ingest::mapper::{MappedRow, SectionMapper};
use crate::ingest::router::{detect_format, select_strategy, IntakeStrategy};
use crate::ingest::stream::{open_row_stream, RowMessage, RowStream};
use crate::ingest::taxonomy::Taxonomy;
use crate::models::{CheckpointState, EnrichedRecord, IngestJob, JobState};
use crate::retry::RetryPolicy;
use futures::stream::StreamExt;
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use termhub_common::events::{EventBus, IngestEvent};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// How a pipeline run ended without an error
enum PipelineEnd {
    Completed,
    Cancelled,
    Paused(String),
}

/// One batch handed to the persistence task
struct PersistRequest {
    records: Vec<EnrichedRecord>,
    checkpoint: CheckpointState,
}

/// Supervises ingestion jobs against one database and one enricher
pub struct JobSupervisor {
    pool: SqlitePool,
    store: RecordStore,
    event_bus: EventBus,
    config: Arc<IngestConfig>,
    enricher: Arc<EnrichmentClient>,
}

impl JobSupervisor {
    pub fn new(
        pool: SqlitePool,
        event_bus: EventBus,
        config: Arc<IngestConfig>,
        enricher: Arc<EnrichmentClient>,
    ) -> Self {
        let store = RecordStore::new(pool.clone());
        Self {
            pool,
            store,
            event_bus,
            config,
            enricher,
        }
    }

    /// Run a job to a terminal or paused state, persisting every
    /// transition. Never returns an error; failures become job state.
    pub async fn run(self: Arc<Self>, mut job: IngestJob, cancel: CancellationToken) {
        let job_id = job.job_id;
        self.event_bus.emit(IngestEvent::JobStarted {
            job_id,
            source_file: job.source_file.clone(),
            timestamp: chrono::Utc::now(),
        });

        let end = self.execute(&mut job, &cancel).await;
        match end {
            Ok(PipelineEnd::Completed) => {
                job.transition_to(JobState::Completed);
                job.progress.current_operation = "Completed".to_string();
                self.event_bus.emit(IngestEvent::JobCompleted {
                    job_id,
                    counts: job.counts,
                    elapsed_seconds: job.progress.elapsed_seconds,
                });
                tracing::info!(
                    job_id = %job_id,
                    succeeded = job.counts.succeeded,
                    skipped = job.counts.skipped_unchanged,
                    failed = job.counts.failed,
                    "Ingestion job completed"
                );
            }
            Ok(PipelineEnd::Cancelled) => {
                job.transition_to(JobState::Cancelled);
                job.progress.current_operation = "Cancelled".to_string();
                self.event_bus.emit(IngestEvent::JobCancelled { job_id });
                tracing::info!(job_id = %job_id, "Ingestion job cancelled");
            }
            Ok(PipelineEnd::Paused(reason)) => {
                job.transition_to(JobState::Paused);
                job.progress.current_operation = format!("Paused: {}", reason);
                self.event_bus.emit(IngestEvent::JobPaused {
                    job_id,
                    reason: reason.clone(),
                });
                tracing::warn!(job_id = %job_id, reason = %reason, "Ingestion job paused");
            }
            Err(err) if err.is_recoverable() => {
                let reason = err.to_string();
                job.transition_to(JobState::Paused);
                job.progress.current_operation = format!("Paused: {}", reason);
                self.event_bus.emit(IngestEvent::JobPaused {
                    job_id,
                    reason: reason.clone(),
                });
                tracing::warn!(job_id = %job_id, error = %reason, "Ingestion job paused on error");
            }
            Err(err) => {
                let error = err.to_string();
                job.transition_to(JobState::Failed);
                job.progress.current_operation = format!("Failed: {}", error);
                self.event_bus.emit(IngestEvent::JobFailed {
                    job_id,
                    error: error.clone(),
                });
                tracing::error!(job_id = %job_id, error = %error, "Ingestion job failed");
            }
        }

        if let Err(err) = save_job(&self.pool, &job).await {
            tracing::error!(job_id = %job_id, error = %err, "Failed to persist final job state");
        }
    }

    async fn execute(
        &self,
        job: &mut IngestJob,
        cancel: &CancellationToken,
    ) -> IngestResult<PipelineEnd> {
        let job_id = job.job_id;
        let source = Path::new(&job.source_file).to_path_buf();
        let started = Instant::now();
        let deadline = started + self.config.job_timeout();

        let metadata = tokio::fs::metadata(&source).await.map_err(|err| {
            IngestError::SourceRead(format!("cannot stat {}: {}", source.display(), err))
        })?;
        if !metadata.is_file() {
            return Err(IngestError::SourceRead(format!(
                "{} is not a regular file",
                source.display()
            )));
        }

        let format = detect_format(&source)?;
        let strategy = select_strategy(format, metadata.len(), &self.config);
        self.event_bus.emit(IngestEvent::StrategySelected {
            job_id,
            strategy: strategy.label().to_string(),
            file_size_bytes: metadata.len(),
        });
        tracing::info!(
            job_id = %job_id,
            format = format.label(),
            strategy = strategy.label(),
            file_size = metadata.len(),
            "Intake strategy selected"
        );

        let mut checkpoint = if job.options.resume {
            match self.store.load_checkpoint(job_id).await? {
                Some(found) => {
                    tracing::info!(
                        job_id = %job_id,
                        resume_offset = found.resume_offset(),
                        "Resuming from checkpoint"
                    );
                    found
                }
                None => CheckpointState::new(job_id),
            }
        } else {
            CheckpointState::new(job_id)
        };
        job.counts = checkpoint.counts;
        let start_offset = checkpoint.resume_offset();

        job.transition_to(JobState::Running);
        save_job(&self.pool, job).await?;

        let batch_size = job
            .options
            .batch_size
            .unwrap_or(self.config.batch_size)
            .max(1);

        let mut stream = self
            .open_with_fallback(&source, format, strategy, start_offset, batch_size)
            .await?;
        checkpoint.total_rows = stream.total_rows.map(|total| total as i64);

        let taxonomy = Taxonomy::from_headers(&stream.headers, &self.config.unstructured_markers);
        let mapper = SectionMapper::new(
            taxonomy,
            Arc::clone(&self.enricher),
            self.store.clone(),
            job.options.context.clone(),
            job.options.force_reprocess,
        );

        // Persistence runs one batch behind the mapper
        let (persist_tx, persist_rx) = mpsc::channel::<PersistRequest>(1);
        let (outcome_tx, mut outcome_rx) = mpsc::channel::<IngestResult<CommitOutcome>>(1);
        let persist_task = tokio::spawn(persistence_loop(
            self.store.clone(),
            RetryPolicy::new(self.config.commit_max_retries, self.config.retry_base_delay()),
            self.config.commit_timeout(),
            persist_rx,
            outcome_tx,
        ));

        let mut outstanding = false;
        let mut end = None;

        'batches: loop {
            if cancel.is_cancelled() {
                end = Some(PipelineEnd::Cancelled);
                break;
            }
            if Instant::now() >= deadline {
                end = Some(PipelineEnd::Paused(format!(
                    "job exceeded its {}s budget",
                    self.config.job_timeout_secs
                )));
                break;
            }

            // Fill one window of raw rows, watching the cancel signal
            // between rows
            let mut window = Vec::with_capacity(batch_size);
            let mut cancelled_mid_window = false;
            while window.len() < batch_size {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        cancelled_mid_window = true;
                        break;
                    }
                    message = stream.rx.recv() => match message {
                        Some(message) => window.push(message),
                        None => break,
                    },
                }
            }
            if window.is_empty() {
                if cancelled_mid_window {
                    end = Some(PipelineEnd::Cancelled);
                }
                break;
            }
            // A partial window still maps and commits; the next pass
            // through the loop observes the cancellation

            let mut window_high_offset = checkpoint.last_committed_offset;
            let mut rows = Vec::with_capacity(window.len());
            for message in window {
                match message {
                    RowMessage::Row(row) => {
                        window_high_offset = window_high_offset.max(row.offset as i64);
                        rows.push(row);
                    }
                    RowMessage::Failed { offset, reason } => {
                        window_high_offset = window_high_offset.max(offset as i64);
                        checkpoint.counts.failed += 1;
                        job.add_failure(offset, reason.clone(), self.config.failure_sample_limit);
                        self.event_bus
                            .emit(IngestEvent::RowFailed { job_id, offset, reason });
                    }
                }
            }

            // Map the window with bounded enrichment concurrency
            let mut records = Vec::with_capacity(rows.len());
            let mut mapped = futures::stream::iter(rows.into_iter().map(|row| mapper.map_row(row)))
                .buffer_unordered(self.config.worker_pool.max(1));
            while let Some(result) = mapped.next().await {
                match result {
                    Ok(MappedRow::Record(record)) => {
                        checkpoint.counts.succeeded += 1;
                        records.push(*record);
                    }
                    Ok(MappedRow::SkippedUnchanged { .. }) => {
                        checkpoint.counts.skipped_unchanged += 1;
                    }
                    Err(IngestError::RowParse { offset, reason }) => {
                        checkpoint.counts.failed += 1;
                        job.add_failure(offset, reason.clone(), self.config.failure_sample_limit);
                        self.event_bus
                            .emit(IngestEvent::RowFailed { job_id, offset, reason });
                    }
                    Err(other) => {
                        drop(mapped);
                        if outstanding {
                            let _ = outcome_rx.recv().await;
                        }
                        return Err(other);
                    }
                }
            }
            drop(mapped);

            checkpoint.last_committed_offset = window_high_offset;

            // Settle the previous batch before queueing this one
            if outstanding {
                match outcome_rx.recv().await {
                    Some(outcome) => self.apply_outcome(job, &mut checkpoint, outcome?)?,
                    None => {
                        end = Some(PipelineEnd::Paused(
                            "persistence task stopped unexpectedly".to_string(),
                        ));
                        break 'batches;
                    }
                }
                outstanding = false;
            }

            let request = PersistRequest {
                records,
                checkpoint: checkpoint.clone(),
            };
            if persist_tx.send(request).await.is_err() {
                end = Some(PipelineEnd::Paused(
                    "persistence task stopped unexpectedly".to_string(),
                ));
                break;
            }
            outstanding = true;
        }

        drop(stream.rx);
        drop(persist_tx);

        if outstanding {
            if let Some(outcome) = outcome_rx.recv().await {
                self.apply_outcome(job, &mut checkpoint, outcome?)?;
            }
        }
        if let Err(err) = persist_task.await {
            tracing::error!(job_id = %job_id, error = %err, "Persistence task panicked");
        }

        // Observe any source-level failure the reader hit mid-stream
        let reader_result = stream
            .reader
            .await
            .map_err(|err| IngestError::SourceRead(format!("reader panicked: {}", err)))?;
        if end.is_none() {
            reader_result?;
        }

        Ok(end.unwrap_or(PipelineEnd::Completed))
    }

    /// Open the row stream, falling back to the forced row-wise strategy
    /// when native streaming cannot parse the source
    async fn open_with_fallback(
        &self,
        source: &Path,
        format: crate::ingest::router::SourceFormat,
        strategy: IntakeStrategy,
        start_offset: u64,
        channel_capacity: usize,
    ) -> IngestResult<RowStream> {
        match open_row_stream(source, format, strategy, start_offset, channel_capacity).await {
            Ok(stream) => Ok(stream),
            Err(IngestError::SourceRead(reason))
                if strategy == IntakeStrategy::StreamingNative =>
            {
                tracing::warn!(
                    source = %source.display(),
                    reason = %reason,
                    "Native streaming failed, retrying with row-wise normalization"
                );
                open_row_stream(
                    source,
                    format,
                    IntakeStrategy::ForcedRowWise,
                    start_offset,
                    channel_capacity,
                )
                .await
            }
            Err(err) => Err(err),
        }
    }

    /// Fold a commit outcome back into job state and emit progress
    fn apply_outcome(
        &self,
        job: &mut IngestJob,
        checkpoint: &mut CheckpointState,
        outcome: CommitOutcome,
    ) -> IngestResult<()> {
        let job_id = job.job_id;
        for failure in &outcome.constraint_failures {
            job.add_failure(
                failure.offset,
                failure.reason.clone(),
                self.config.failure_sample_limit,
            );
            self.event_bus.emit(IngestEvent::RowFailed {
                job_id,
                offset: failure.offset,
                reason: failure.reason.clone(),
            });
        }

        // Constraint rejections are the only delta the commit applies;
        // the live checkpoint may already carry the next window's counts
        let rejected = outcome.constraint_failures.len() as u64;
        checkpoint.counts.succeeded = checkpoint.counts.succeeded.saturating_sub(rejected);
        checkpoint.counts.failed += rejected;
        // The job reports what is durably committed
        job.counts = outcome.checkpoint.counts;

        let committed_offset = outcome.checkpoint.last_committed_offset;
        self.event_bus.emit(IngestEvent::BatchCommitted {
            job_id,
            records_committed: outcome.committed as usize,
            last_committed_offset: committed_offset.max(0) as u64,
            counts: job.counts,
        });

        job.update_progress(
            committed_offset,
            outcome.checkpoint.total_rows.map(|total| total as u64),
            format!("Committed through row {}", committed_offset),
        );
        self.event_bus.emit(IngestEvent::ProgressUpdate {
            job_id,
            row_offset: committed_offset.max(0) as u64,
            total_rows: outcome.checkpoint.total_rows.map(|total| total as u64),
            rows_per_sec: job.progress.rows_per_sec,
            counts: job.counts,
        });

        let pool = self.pool.clone();
        let snapshot = job.clone();
        tokio::spawn(async move {
            if let Err(err) = save_job(&pool, &snapshot).await {
                tracing::warn!(job_id = %snapshot.job_id, error = %err, "Progress save failed");
            }
        });
        Ok(())
    }
}

/// Commits batches with retry and a per-commit timeout. Transport errors
/// that survive the retries are reported back and end the loop.
async fn persistence_loop(
    store: RecordStore,
    retry: RetryPolicy,
    commit_timeout: std::time::Duration,
    mut rx: mpsc::Receiver<PersistRequest>,
    outcome_tx: mpsc::Sender<IngestResult<CommitOutcome>>,
) {
    while let Some(request) = rx.recv().await {
        let result = retry
            .run(
                "batch-commit",
                |err: &IngestError| matches!(err, IngestError::PersistenceTransport(_)),
                || async {
                    match tokio::time::timeout(
                        commit_timeout,
                        store.commit_batch(&request.records, &request.checkpoint),
                    )
                    .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(IngestError::PersistenceTransport(
                            sqlx::Error::PoolTimedOut,
                        )),
                    }
                },
            )
            .await;

        let failed = result.is_err();
        if outcome_tx.send(result).await.is_err() || failed {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::cache::EnrichmentCache;
    use crate::db::init_memory_pool;
    use crate::enrich::{QuotaSet, ScriptedBackend};
    use crate::models::JobOptions;
    use std::io::Write;
    use std::time::Duration;

    async fn supervisor_with(
        backend: Arc<ScriptedBackend>,
        config: IngestConfig,
    ) -> (Arc<JobSupervisor>, SqlitePool, EventBus) {
        let pool = init_memory_pool().await.unwrap();
        let event_bus = EventBus::new(256);
        let enricher = Arc::new(EnrichmentClient::new(
            backend,
            QuotaSet::new(
                config.quota_per_minute,
                config.quota_per_hour,
                config.quota_per_day,
            ),
            RetryPolicy::new(config.enrich_max_retries, config.retry_base_delay()),
            EnrichmentCache::new(pool.clone(), config.cache_ttl_secs),
            config.max_queue_wait(),
            config.enrich_timeout(),
        ));
        let supervisor = Arc::new(JobSupervisor::new(
            pool.clone(),
            event_bus.clone(),
            Arc::new(config),
            enricher,
        ));
        (supervisor, pool, event_bus)
    }

    fn csv_fixture(dir: &tempfile::TempDir, rows: &[&str]) -> String {
        let path = dir.path().join("terms.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "Term,Introduction – Definition and Overview,Tags and Keywords").unwrap();
        for row in rows {
            writeln!(file, "{}", row).unwrap();
        }
        path.display().to_string()
    }

    #[tokio::test]
    async fn test_job_completes_and_persists_records() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::new());
        let (supervisor, pool, _bus) = supervisor_with(backend, IngestConfig::default()).await;

        let source = csv_fixture(
            &dir,
            &[
                "CNN,A convolutional neural network for image analysis.,\"vision, imaging\"",
                "RNN,A recurrent neural network for sequence modeling.,\"sequences, text\"",
            ],
        );
        let job = IngestJob::new(source, JobOptions::default());
        let job_id = job.job_id;

        Arc::clone(&supervisor)
            .run(job, CancellationToken::new())
            .await;

        let loaded = crate::db::jobs::load_job(&pool, job_id).await.unwrap().unwrap();
        assert_eq!(loaded.state, JobState::Completed);
        assert_eq!(loaded.counts.succeeded, 2);
        assert_eq!(loaded.counts.failed, 0);

        let store = RecordStore::new(pool);
        assert_eq!(store.record_count().await.unwrap(), 2);
        assert!(store.fingerprint_for_slug("cnn").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_reingest_skips_unchanged_rows() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::new());
        let (supervisor, pool, _bus) = supervisor_with(backend, IngestConfig::default()).await;

        let source = csv_fixture(
            &dir,
            &["CNN,A convolutional neural network for image analysis.,vision"],
        );

        let first = IngestJob::new(source.clone(), JobOptions::default());
        Arc::clone(&supervisor)
            .run(first, CancellationToken::new())
            .await;

        let second = IngestJob::new(source, JobOptions::default());
        let second_id = second.job_id;
        Arc::clone(&supervisor)
            .run(second, CancellationToken::new())
            .await;

        let loaded = crate::db::jobs::load_job(&pool, second_id).await.unwrap().unwrap();
        assert_eq!(loaded.state, JobState::Completed);
        assert_eq!(loaded.counts.skipped_unchanged, 1);
        assert_eq!(loaded.counts.succeeded, 0);
    }

    #[tokio::test]
    async fn test_malformed_row_counted_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::new());
        let (supervisor, pool, _bus) = supervisor_with(backend, IngestConfig::default()).await;

        // Middle row has an empty identity cell
        let source = csv_fixture(
            &dir,
            &[
                "CNN,A convolutional neural network for image analysis.,vision",
                ",An orphaned definition with no term.,",
                "RNN,A recurrent neural network for sequence modeling.,text",
            ],
        );
        let job = IngestJob::new(source, JobOptions::default());
        let job_id = job.job_id;

        Arc::clone(&supervisor)
            .run(job, CancellationToken::new())
            .await;

        let loaded = crate::db::jobs::load_job(&pool, job_id).await.unwrap().unwrap();
        assert_eq!(loaded.state, JobState::Completed);
        assert_eq!(loaded.counts.succeeded, 2);
        assert_eq!(loaded.counts.failed, 1);
        assert_eq!(loaded.failures.len(), 1);
        assert_eq!(loaded.failures[0].offset, 1);
    }

    #[tokio::test]
    async fn test_missing_source_fails_job() {
        let backend = Arc::new(ScriptedBackend::new());
        let (supervisor, pool, _bus) = supervisor_with(backend, IngestConfig::default()).await;

        let job = IngestJob::new("/nonexistent/terms.csv".to_string(), JobOptions::default());
        let job_id = job.job_id;
        Arc::clone(&supervisor)
            .run(job, CancellationToken::new())
            .await;

        let loaded = crate::db::jobs::load_job(&pool, job_id).await.unwrap().unwrap();
        assert_eq!(loaded.state, JobState::Failed);
    }

    #[tokio::test]
    async fn test_pre_cancelled_job_commits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::new());
        let (supervisor, pool, _bus) = supervisor_with(backend, IngestConfig::default()).await;

        let source = csv_fixture(
            &dir,
            &["CNN,A convolutional neural network for image analysis.,vision"],
        );
        let job = IngestJob::new(source, JobOptions::default());
        let job_id = job.job_id;

        let cancel = CancellationToken::new();
        cancel.cancel();
        Arc::clone(&supervisor).run(job, cancel).await;

        let loaded = crate::db::jobs::load_job(&pool, job_id).await.unwrap().unwrap();
        assert_eq!(loaded.state, JobState::Cancelled);
        let store = RecordStore::new(pool);
        assert_eq!(store.record_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancel_mid_run_stops_after_inflight_batch() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::new());
        let mut config = IngestConfig::default();
        config.batch_size = 1;
        let (supervisor, pool, bus) = supervisor_with(backend, config).await;
        let mut events = bus.subscribe();

        let rows: Vec<String> = (0..50)
            .map(|i| format!("Term{i},Definition number {i} of a term for testing.,tag{i}"))
            .collect();
        let row_refs: Vec<&str> = rows.iter().map(String::as_str).collect();
        let source = csv_fixture(&dir, &row_refs);

        let job = IngestJob::new(source, JobOptions::default());
        let job_id = job.job_id;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let watcher = tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                if matches!(event, IngestEvent::BatchCommitted { .. }) {
                    trigger.cancel();
                    break;
                }
            }
        });

        Arc::clone(&supervisor).run(job, cancel).await;
        watcher.await.unwrap();

        let loaded = crate::db::jobs::load_job(&pool, job_id).await.unwrap().unwrap();
        assert_eq!(loaded.state, JobState::Cancelled);

        // Something committed before the cancel, and the rest never did
        let store = RecordStore::new(pool);
        let committed = store.record_count().await.unwrap();
        assert!(committed >= 1 && committed < 50, "committed = {}", committed);
        let checkpoint = store.load_checkpoint(job_id).await.unwrap().unwrap();
        assert_eq!(checkpoint.counts.succeeded as i64, committed);
    }

    #[tokio::test]
    async fn test_checkpoint_written_per_batch() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::new());
        let mut config = IngestConfig::default();
        config.batch_size = 2;
        let (supervisor, pool, _bus) = supervisor_with(backend, config).await;

        let source = csv_fixture(
            &dir,
            &[
                "A,First definition of a term for testing purposes.,x",
                "B,Second definition of a term for testing purposes.,y",
                "C,Third definition of a term for testing purposes.,z",
            ],
        );
        let job = IngestJob::new(source, JobOptions::default());
        let job_id = job.job_id;

        Arc::clone(&supervisor)
            .run(job, CancellationToken::new())
            .await;

        let store = RecordStore::new(pool);
        let checkpoint = store.load_checkpoint(job_id).await.unwrap().unwrap();
        assert_eq!(checkpoint.last_committed_offset, 2);
        assert_eq!(checkpoint.counts.succeeded, 3);
        assert_eq!(store.record_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_events_follow_job_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::new());
        let (supervisor, _pool, bus) = supervisor_with(backend, IngestConfig::default()).await;
        let mut rx = bus.subscribe();

        let source = csv_fixture(
            &dir,
            &["CNN,A convolutional neural network for image analysis.,vision"],
        );
        let job = IngestJob::new(source, JobOptions::default());

        Arc::clone(&supervisor)
            .run(job, CancellationToken::new())
            .await;

        let mut types = Vec::new();
        while let Ok(event) = rx.try_recv() {
            types.push(event.event_type());
        }
        assert_eq!(types.first(), Some(&"JobStarted"));
        assert!(types.contains(&"StrategySelected"));
        assert!(types.contains(&"BatchCommitted"));
        assert_eq!(types.last(), Some(&"JobCompleted"));
    }
}

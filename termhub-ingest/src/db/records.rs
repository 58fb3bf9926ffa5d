//! Record store and transactional batch commit
//!
//! A batch of records and its checkpoint advance commit in one SQLite
//! transaction. Either the records are visible and the checkpoint covers
//! them, or neither happened. A record rejected by a schema constraint is
//! excluded from the batch and reported; it never poisons the rest.

use crate::error::{IngestError, IngestResult};
use crate::models::{CheckpointState, EnrichedRecord, RowFailure};
use chrono::Utc;
use sqlx::SqlitePool;
use termhub_common::events::RowCounts;
use uuid::Uuid;

/// Result of one committed batch
#[derive(Debug)]
pub struct CommitOutcome {
    /// Records actually written
    pub committed: u64,
    /// Records rejected by constraints, excluded from the batch
    pub constraint_failures: Vec<RowFailure>,
    /// Checkpoint as written, counts adjusted for constraint failures
    pub checkpoint: CheckpointState,
}

/// Store for enriched records and job checkpoints
#[derive(Debug, Clone)]
pub struct RecordStore {
    pool: SqlitePool,
}

impl RecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Stored fingerprint for a slug, None if the record is new
    pub async fn fingerprint_for_slug(&self, slug: &str) -> Result<Option<String>, sqlx::Error> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT fingerprint FROM records WHERE slug = ?")
                .bind(slug)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(fingerprint,)| fingerprint))
    }

    /// Commit a batch and its checkpoint atomically.
    ///
    /// Constraint violations on individual records are collected and the
    /// offending records dropped from the batch; transport-level errors
    /// roll the whole transaction back and propagate.
    pub async fn commit_batch(
        &self,
        records: &[EnrichedRecord],
        checkpoint: &CheckpointState,
    ) -> IngestResult<CommitOutcome> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now().to_rfc3339();

        let mut committed = 0u64;
        let mut constraint_failures = Vec::new();

        for record in records {
            let sections = serde_json::to_string(&record.sections)?;
            let meta = serde_json::to_string(&record.meta)?;

            let result = sqlx::query(
                r#"
                INSERT INTO records (
                    slug, name, fingerprint, sections, definition,
                    short_definition, category, meta, source_offset,
                    version, created_at, updated_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
                ON CONFLICT(slug) DO UPDATE SET
                    name = excluded.name,
                    fingerprint = excluded.fingerprint,
                    sections = excluded.sections,
                    definition = excluded.definition,
                    short_definition = excluded.short_definition,
                    category = excluded.category,
                    meta = excluded.meta,
                    source_offset = excluded.source_offset,
                    version = records.version + 1,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&record.slug)
            .bind(&record.name)
            .bind(&record.fingerprint)
            .bind(&sections)
            .bind(&record.definition)
            .bind(&record.short_definition)
            .bind(&record.category)
            .bind(&meta)
            .bind(record.source_offset as i64)
            .bind(&now)
            .bind(&now)
            .execute(&mut *tx)
            .await;

            match result {
                Ok(_) => committed += 1,
                // A constraint rejection does not abort a SQLite
                // transaction; anything else does
                Err(sqlx::Error::Database(db_err))
                    if !matches!(db_err.kind(), sqlx::error::ErrorKind::Other) =>
                {
                    tracing::warn!(
                        slug = %record.slug,
                        offset = record.source_offset,
                        error = %db_err,
                        "Record rejected by constraint, excluding from batch"
                    );
                    let rejection = IngestError::PersistenceConstraint {
                        slug: record.slug.clone(),
                        reason: db_err.to_string(),
                    };
                    constraint_failures.push(RowFailure {
                        offset: record.source_offset,
                        reason: rejection.to_string(),
                    });
                }
                Err(err) => return Err(IngestError::PersistenceTransport(err)),
            }
        }

        // Constraint rejections move rows from succeeded to failed before
        // the checkpoint is written
        let mut checkpoint = checkpoint.clone();
        let rejected = constraint_failures.len() as u64;
        checkpoint.counts.succeeded = checkpoint.counts.succeeded.saturating_sub(rejected);
        checkpoint.counts.failed += rejected;

        write_checkpoint(&mut tx, &checkpoint, &now).await?;
        tx.commit().await?;

        Ok(CommitOutcome {
            committed,
            constraint_failures,
            checkpoint,
        })
    }

    /// Load the persisted checkpoint for a job, if any
    pub async fn load_checkpoint(
        &self,
        job_id: Uuid,
    ) -> Result<Option<CheckpointState>, sqlx::Error> {
        let row: Option<(i64, Option<i64>, i64, i64, i64)> = sqlx::query_as(
            "SELECT last_committed_offset, total_rows, succeeded, skipped_unchanged, failed
             FROM checkpoints WHERE job_id = ?",
        )
        .bind(job_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(
            |(last_committed_offset, total_rows, succeeded, skipped_unchanged, failed)| {
                CheckpointState {
                    job_id,
                    last_committed_offset,
                    total_rows,
                    counts: RowCounts {
                        succeeded: succeeded as u64,
                        skipped_unchanged: skipped_unchanged as u64,
                        failed: failed as u64,
                    },
                }
            },
        ))
    }

    /// Total records in the store
    pub async fn record_count(&self) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM records")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

async fn write_checkpoint(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    checkpoint: &CheckpointState,
    now: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO checkpoints (
            job_id, last_committed_offset, total_rows,
            succeeded, skipped_unchanged, failed, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(job_id) DO UPDATE SET
            last_committed_offset = excluded.last_committed_offset,
            total_rows = excluded.total_rows,
            succeeded = excluded.succeeded,
            skipped_unchanged = excluded.skipped_unchanged,
            failed = excluded.failed,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(checkpoint.job_id.to_string())
    .bind(checkpoint.last_committed_offset)
    .bind(checkpoint.total_rows)
    .bind(checkpoint.counts.succeeded as i64)
    .bind(checkpoint.counts.skipped_unchanged as i64)
    .bind(checkpoint.counts.failed as i64)
    .bind(now)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_pool;
    use crate::models::EnrichmentMeta;
    use std::collections::BTreeMap;

    fn record(slug: &str, fingerprint: &str, offset: u64) -> EnrichedRecord {
        let mut sections = BTreeMap::new();
        sections.insert(
            "Introduction".to_string(),
            crate::models::SectionContent::Text("prose".to_string()),
        );
        EnrichedRecord {
            slug: slug.to_string(),
            name: slug.to_uppercase(),
            fingerprint: fingerprint.to_string(),
            sections,
            definition: Some("a definition".to_string()),
            short_definition: None,
            category: Some("Optimization".to_string()),
            meta: EnrichmentMeta::default(),
            source_offset: offset,
        }
    }

    fn checkpoint_for(job_id: Uuid, offset: i64, succeeded: u64) -> CheckpointState {
        let mut checkpoint = CheckpointState::new(job_id);
        checkpoint.last_committed_offset = offset;
        checkpoint.counts.succeeded = succeeded;
        checkpoint
    }

    #[tokio::test]
    async fn test_batch_and_checkpoint_commit_together() {
        let pool = init_memory_pool().await.unwrap();
        let store = RecordStore::new(pool);
        let job_id = Uuid::new_v4();

        let outcome = store
            .commit_batch(
                &[record("cnn", "f1", 0), record("rnn", "f2", 1)],
                &checkpoint_for(job_id, 1, 2),
            )
            .await
            .unwrap();

        assert_eq!(outcome.committed, 2);
        assert!(outcome.constraint_failures.is_empty());

        let loaded = store.load_checkpoint(job_id).await.unwrap().unwrap();
        assert_eq!(loaded.last_committed_offset, 1);
        assert_eq!(loaded.counts.succeeded, 2);
        assert_eq!(store.record_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_upsert_bumps_version_keeps_slug_unique() {
        let pool = init_memory_pool().await.unwrap();
        let store = RecordStore::new(pool.clone());
        let job_id = Uuid::new_v4();

        store
            .commit_batch(&[record("cnn", "f1", 0)], &checkpoint_for(job_id, 0, 1))
            .await
            .unwrap();
        store
            .commit_batch(&[record("cnn", "f2", 0)], &checkpoint_for(job_id, 0, 2))
            .await
            .unwrap();

        let (version, fingerprint): (i64, String) =
            sqlx::query_as("SELECT version, fingerprint FROM records WHERE slug = 'cnn'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(version, 2);
        assert_eq!(fingerprint, "f2");
        assert_eq!(store.record_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_constraint_failure_isolated_from_batch() {
        let pool = init_memory_pool().await.unwrap();
        let store = RecordStore::new(pool);
        let job_id = Uuid::new_v4();

        // Empty name violates the CHECK constraint
        let mut bad = record("bad", "f2", 1);
        bad.name = String::new();

        let outcome = store
            .commit_batch(
                &[record("good", "f1", 0), bad, record("also-good", "f3", 2)],
                &checkpoint_for(job_id, 2, 3),
            )
            .await
            .unwrap();

        assert_eq!(outcome.committed, 2);
        assert_eq!(outcome.constraint_failures.len(), 1);
        assert_eq!(outcome.constraint_failures[0].offset, 1);
        assert!(outcome.constraint_failures[0]
            .reason
            .contains("'bad' rejected by store"));

        // Counts shifted from succeeded to failed, checkpoint still advanced
        assert_eq!(outcome.checkpoint.counts.succeeded, 2);
        assert_eq!(outcome.checkpoint.counts.failed, 1);
        assert_eq!(outcome.checkpoint.last_committed_offset, 2);
        assert_eq!(store.record_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_fingerprint_lookup() {
        let pool = init_memory_pool().await.unwrap();
        let store = RecordStore::new(pool);
        let job_id = Uuid::new_v4();

        assert_eq!(store.fingerprint_for_slug("cnn").await.unwrap(), None);
        store
            .commit_batch(&[record("cnn", "f1", 0)], &checkpoint_for(job_id, 0, 1))
            .await
            .unwrap();
        assert_eq!(
            store.fingerprint_for_slug("cnn").await.unwrap(),
            Some("f1".to_string())
        );
    }

    #[tokio::test]
    async fn test_empty_batch_still_advances_checkpoint() {
        let pool = init_memory_pool().await.unwrap();
        let store = RecordStore::new(pool);
        let job_id = Uuid::new_v4();

        // A batch where every row was skipped as unchanged
        let mut checkpoint = checkpoint_for(job_id, 99, 0);
        checkpoint.counts.skipped_unchanged = 100;

        let outcome = store.commit_batch(&[], &checkpoint).await.unwrap();
        assert_eq!(outcome.committed, 0);

        let loaded = store.load_checkpoint(job_id).await.unwrap().unwrap();
        assert_eq!(loaded.last_committed_offset, 99);
        assert_eq!(loaded.counts.skipped_unchanged, 100);
    }
}

//! Data models for termhub-ingest

mod job;
mod record;

pub use job::{IngestJob, JobOptions, JobProgress, JobState, RowFailure};
pub use record::{
    CheckpointState, EnrichedRecord, EnrichmentMeta, SectionContent, SourceRow,
};

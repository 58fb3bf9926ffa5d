//! termhub-ingest: bounded-memory intake and enrichment of glossary sources
//!
//! Reads wide tabular sources (CSV, JSON, XLSX), maps each row to a
//! hierarchical term record, enriches free-text columns through a
//! rate-limited completion service, and commits batches atomically with
//! a resume checkpoint. Exposes an HTTP surface for starting, watching,
//! and cancelling jobs.

pub mod api;
pub mod config;
pub mod db;
pub mod enrich;
pub mod error;
pub mod ingest;
pub mod job;
pub mod models;
pub mod retry;

pub use api::build_router;

use crate::config::IngestConfig;
use crate::enrich::EnrichmentClient;
use crate::job::JobSupervisor;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use termhub_common::events::EventBus;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Shared application state for the HTTP surface
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub event_bus: EventBus,
    pub config: Arc<IngestConfig>,
    pub enricher: Arc<EnrichmentClient>,
    pub supervisor: Arc<JobSupervisor>,
    /// Cancellation tokens for jobs currently running
    pub jobs: Arc<RwLock<HashMap<Uuid, CancellationToken>>>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        pool: SqlitePool,
        event_bus: EventBus,
        config: Arc<IngestConfig>,
        enricher: Arc<EnrichmentClient>,
    ) -> Self {
        let supervisor = Arc::new(JobSupervisor::new(
            pool.clone(),
            event_bus.clone(),
            Arc::clone(&config),
            Arc::clone(&enricher),
        ));
        Self {
            pool,
            event_bus,
            config,
            enricher,
            supervisor,
            jobs: Arc::new(RwLock::new(HashMap::new())),
            started_at: Instant::now(),
        }
    }
}

//! Enrichment client: cache, quotas, retries around a backend
//!
//! Call order is cache, then quota admission, then the backend with
//! retry. A cache hit consumes no quota and touches no network. Errors
//! surface as the quota or service variants so the mapper can degrade
//! the field rather than fail the row.

use crate::db::cache::EnrichmentCache;
use crate::enrich::backend::{BackendError, EnrichmentBackend, EnrichmentRequest};
use crate::enrich::limiter::QuotaSet;
use crate::error::{IngestError, IngestResult};
use crate::ingest::fingerprint::fingerprint_text;
use crate::retry::RetryPolicy;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One enriched field and whether it came from cache
#[derive(Debug, Clone)]
pub struct EnrichedField {
    pub text: String,
    pub cached: bool,
}

/// Shared enrichment client; one per process
pub struct EnrichmentClient {
    backend: Arc<dyn EnrichmentBackend>,
    quotas: QuotaSet,
    retry: RetryPolicy,
    cache: EnrichmentCache,
    max_queue_wait: Duration,
    call_timeout: Duration,
    network_calls: AtomicU64,
}

impl EnrichmentClient {
    pub fn new(
        backend: Arc<dyn EnrichmentBackend>,
        quotas: QuotaSet,
        retry: RetryPolicy,
        cache: EnrichmentCache,
        max_queue_wait: Duration,
        call_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            quotas,
            retry,
            cache,
            max_queue_wait,
            call_timeout,
            network_calls: AtomicU64::new(0),
        }
    }

    /// Enrich one cell. The cache key is the cell's content fingerprint
    /// plus the context and column, independent of the row around it.
    pub async fn enrich(
        &self,
        term: &str,
        section_column: &str,
        text: &str,
        context_id: &str,
    ) -> IngestResult<EnrichedField> {
        let content_hash = fingerprint_text(text);
        let cache_context = format!("{}:{}", context_id, section_column);

        if let Some(cached) = self.cache.get(&content_hash, &cache_context).await? {
            tracing::trace!(term, column = section_column, "Enrichment cache hit");
            return Ok(EnrichedField {
                text: cached,
                cached: true,
            });
        }

        self.quotas.acquire(self.max_queue_wait).await?;

        let request = EnrichmentRequest {
            term: term.to_string(),
            section: section_column.to_string(),
            text: text.to_string(),
            context: context_id.to_string(),
        };

        let backend = Arc::clone(&self.backend);
        let call_timeout = self.call_timeout;
        let counter = &self.network_calls;

        let response = self
            .retry
            .run(
                "enrichment",
                |err: &BackendError| err.retryable,
                || {
                    let backend = Arc::clone(&backend);
                    let request = request.clone();
                    async move {
                        counter.fetch_add(1, Ordering::Relaxed);
                        match tokio::time::timeout(call_timeout, backend.complete(&request)).await {
                            Ok(result) => result,
                            Err(_) => Err(BackendError {
                                retryable: true,
                                message: format!(
                                    "call exceeded {}s",
                                    call_timeout.as_secs()
                                ),
                            }),
                        }
                    }
                },
            )
            .await
            .map_err(|err| IngestError::EnrichmentService(err.message))?;

        self.cache
            .put(&content_hash, &cache_context, &response)
            .await?;

        Ok(EnrichedField {
            text: response,
            cached: false,
        })
    }

    /// Completed backend calls so far (retries included, cache hits not)
    pub fn network_calls(&self) -> u64 {
        self.network_calls.load(Ordering::Relaxed)
    }
}

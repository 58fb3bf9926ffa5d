//! Ingest pipeline tunables
//!
//! Every threshold, quota, and timeout is configurable; defaults reflect
//! single-machine operation against low-hundreds-of-MB inputs. Values can
//! be overridden through the `[ingest]` table of the TOML config.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Rows accumulated per committed batch
    pub batch_size: usize,
    /// Concurrent enrichment calls within a batch
    pub worker_pool: usize,

    /// Below this size the native structured format is parsed in memory
    pub direct_max_bytes: u64,
    /// Above this size the source is normalized to row-wise form first
    pub stream_max_bytes: u64,

    /// Enrichment quota: requests per minute
    pub quota_per_minute: u32,
    /// Enrichment quota: requests per hour
    pub quota_per_hour: u32,
    /// Enrichment quota: requests per day
    pub quota_per_day: u32,
    /// Maximum time a quota-blocked enrichment request may wait
    pub max_queue_wait_ms: u64,

    /// Per-enrichment-call timeout (seconds)
    pub enrich_timeout_secs: u64,
    /// Retry attempts for transient enrichment failures
    pub enrich_max_retries: u32,
    /// Base delay for exponential backoff (milliseconds)
    pub retry_base_delay_ms: u64,

    /// Per-batch-commit timeout (seconds)
    pub commit_timeout_secs: u64,
    /// Retry attempts for batch-level commit failures
    pub commit_max_retries: u32,

    /// Overall wall-clock budget per job (seconds)
    pub job_timeout_secs: u64,

    /// Enrichment cache entry lifetime (seconds)
    pub cache_ttl_secs: i64,

    /// Maximum failure reasons retained per job for the error summary
    pub failure_sample_limit: usize,

    /// Header substrings marking a column as unstructured (needs
    /// interpretation); matched case-insensitively
    pub unstructured_markers: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            worker_pool: 8,
            direct_max_bytes: 16 * 1024 * 1024,
            stream_max_bytes: 256 * 1024 * 1024,
            quota_per_minute: 60,
            quota_per_hour: 1_000,
            quota_per_day: 10_000,
            max_queue_wait_ms: 10_000,
            enrich_timeout_secs: 60,
            enrich_max_retries: 3,
            retry_base_delay_ms: 250,
            commit_timeout_secs: 30,
            commit_max_retries: 3,
            job_timeout_secs: 4 * 3600,
            cache_ttl_secs: 30 * 24 * 3600,
            failure_sample_limit: 25,
            unstructured_markers: vec![
                "did you know".to_string(),
                "interactive".to_string(),
                "interview".to_string(),
                "industry insight".to_string(),
                "anecdote".to_string(),
                "expert opinion".to_string(),
            ],
        }
    }
}

impl IngestConfig {
    /// Build from the `[ingest]` table of the service TOML file.
    /// A missing or malformed table falls back to defaults.
    pub fn from_toml_value(value: Option<&toml::Value>) -> Self {
        match value {
            Some(value) => match value.clone().try_into() {
                Ok(config) => config,
                Err(err) => {
                    tracing::warn!(error = %err, "Invalid [ingest] config table, using defaults");
                    Self::default()
                }
            },
            None => Self::default(),
        }
    }

    /// Per-enrichment-call timeout
    pub fn enrich_timeout(&self) -> Duration {
        Duration::from_secs(self.enrich_timeout_secs)
    }

    /// Maximum quota queue wait
    pub fn max_queue_wait(&self) -> Duration {
        Duration::from_millis(self.max_queue_wait_ms)
    }

    /// Per-batch-commit timeout
    pub fn commit_timeout(&self) -> Duration {
        Duration::from_secs(self.commit_timeout_secs)
    }

    /// Overall job budget
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    /// Base backoff delay
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_ordered() {
        let config = IngestConfig::default();
        assert!(config.direct_max_bytes < config.stream_max_bytes);
        assert!(config.batch_size > 0);
        assert!(config.worker_pool > 0);
    }

    #[test]
    fn test_partial_toml_override() {
        let config: IngestConfig = toml::from_str("batch_size = 25\nquota_per_minute = 3").unwrap();
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.quota_per_minute, 3);
        // Untouched fields keep defaults
        assert_eq!(config.worker_pool, IngestConfig::default().worker_pool);
    }
}

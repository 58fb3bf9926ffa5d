//! Enrichment: rate-limited, cached calls to the completion service

pub mod backend;
pub mod client;
pub mod limiter;

pub use backend::{
    BackendError, DisabledBackend, EnrichmentBackend, EnrichmentRequest, OpenAiBackend,
    ScriptedBackend,
};
pub use client::{EnrichedField, EnrichmentClient};
pub use limiter::QuotaSet;

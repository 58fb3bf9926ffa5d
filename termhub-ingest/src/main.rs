//! termhub-ingest service binary

use anyhow::Context;
use std::sync::Arc;
use termhub_common::config::{
    ensure_data_dir, load_toml_config, resolve_data_dir, resolve_enrichment_api_key,
};
use termhub_common::events::EventBus;
use termhub_ingest::config::IngestConfig;
use termhub_ingest::db::cache::EnrichmentCache;
use termhub_ingest::enrich::{
    DisabledBackend, EnrichmentBackend, EnrichmentClient, OpenAiBackend, QuotaSet,
};
use termhub_ingest::retry::RetryPolicy;
use termhub_ingest::{build_router, AppState};
use tracing_subscriber::EnvFilter;

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:5810";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4.1-nano";
const FALLBACK_MODEL: &str = "gpt-4o-mini";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("termhub_ingest=info,termhub_common=info")),
        )
        .init();

    let toml_config = load_toml_config();
    let ingest_config = Arc::new(IngestConfig::from_toml_value(toml_config.ingest.as_ref()));

    let cli_data_dir = std::env::args().nth(1);
    let data_dir = resolve_data_dir(cli_data_dir.as_deref(), &toml_config);
    let db_path = ensure_data_dir(&data_dir).context("Failed to prepare data directory")?;

    let pool = termhub_ingest::db::init_database_pool(&db_path)
        .await
        .context("Failed to open database")?;

    let paused = termhub_ingest::db::jobs::pause_stale_jobs(&pool).await?;
    if paused > 0 {
        tracing::info!(count = paused, "Paused stale jobs from previous run");
    }

    let event_bus = EventBus::new(1000);

    let backend: Arc<dyn EnrichmentBackend> = match resolve_enrichment_api_key(&toml_config) {
        Some(api_key) => {
            let base_url = toml_config
                .enrichment_base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
            let model = toml_config
                .enrichment_model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string());
            tracing::info!(base_url = %base_url, model = %model, "Enrichment service configured");
            Arc::new(OpenAiBackend::new(
                base_url,
                api_key,
                model,
                Some(FALLBACK_MODEL.to_string()),
                ingest_config.enrich_timeout(),
            ))
        }
        None => Arc::new(DisabledBackend),
    };

    let cache = EnrichmentCache::new(pool.clone(), ingest_config.cache_ttl_secs);
    let evicted = cache.evict_expired().await?;
    if evicted > 0 {
        tracing::info!(count = evicted, "Evicted expired enrichment cache entries");
    }

    let enricher = Arc::new(EnrichmentClient::new(
        backend,
        QuotaSet::new(
            ingest_config.quota_per_minute,
            ingest_config.quota_per_hour,
            ingest_config.quota_per_day,
        ),
        RetryPolicy::new(
            ingest_config.enrich_max_retries,
            ingest_config.retry_base_delay(),
        ),
        cache,
        ingest_config.max_queue_wait(),
        ingest_config.enrich_timeout(),
    ));

    let state = AppState::new(pool, event_bus, ingest_config, enricher);
    let app = build_router(state);

    let listen_addr = toml_config
        .listen_addr
        .clone()
        .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", listen_addr))?;
    tracing::info!(addr = %listen_addr, "termhub-ingest listening");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

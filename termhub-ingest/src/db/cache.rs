//! Enrichment response cache
//!
//! Keyed by (content fingerprint, context). Entries are immutable once
//! written: a live entry is never updated in place, only aged out by TTL
//! or removed by explicit invalidation. Identical source text under the
//! same context therefore never pays for a second service call.

use chrono::Utc;
use sqlx::SqlitePool;

/// TTL-bounded cache over the `enrichment_cache` table
#[derive(Debug, Clone)]
pub struct EnrichmentCache {
    pool: SqlitePool,
    ttl_seconds: i64,
}

impl EnrichmentCache {
    pub fn new(pool: SqlitePool, ttl_seconds: i64) -> Self {
        Self { pool, ttl_seconds }
    }

    /// Look up an unexpired entry
    pub async fn get(
        &self,
        content_hash: &str,
        context: &str,
    ) -> Result<Option<String>, sqlx::Error> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT response FROM enrichment_cache
             WHERE content_hash = ? AND context = ? AND created_at + ttl_seconds > ?",
        )
        .bind(content_hash)
        .bind(context)
        .bind(Utc::now().timestamp())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(response,)| response))
    }

    /// Store a response under the configured TTL. An existing live entry
    /// wins; concurrent workers resolving the same cell do not clobber
    /// each other.
    pub async fn put(
        &self,
        content_hash: &str,
        context: &str,
        response: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT OR IGNORE INTO enrichment_cache
             (content_hash, context, response, created_at, ttl_seconds)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(content_hash)
        .bind(context)
        .bind(response)
        .bind(Utc::now().timestamp())
        .bind(self.ttl_seconds)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Remove expired entries; returns the number removed
    pub async fn evict_expired(&self) -> Result<u64, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM enrichment_cache WHERE created_at + ttl_seconds <= ?")
                .bind(Utc::now().timestamp())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    /// Drop every entry whose context starts with `context_prefix`.
    /// Used when prompt wording or the model changes for a context.
    pub async fn invalidate_context(&self, context_prefix: &str) -> Result<u64, sqlx::Error> {
        let pattern = format!("{}%", context_prefix.replace('%', "\\%"));
        let result = sqlx::query("DELETE FROM enrichment_cache WHERE context LIKE ? ESCAPE '\\'")
            .bind(pattern)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_pool;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let pool = init_memory_pool().await.unwrap();
        let cache = EnrichmentCache::new(pool, 3600);

        assert_eq!(cache.get("abc", "glossary-v1:Intro").await.unwrap(), None);
        cache.put("abc", "glossary-v1:Intro", "enriched text").await.unwrap();
        assert_eq!(
            cache.get("abc", "glossary-v1:Intro").await.unwrap(),
            Some("enriched text".to_string())
        );
        // Same hash under a different context is a different entry
        assert_eq!(cache.get("abc", "glossary-v1:Tags").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_live_entries_are_immutable() {
        let pool = init_memory_pool().await.unwrap();
        let cache = EnrichmentCache::new(pool, 3600);

        cache.put("abc", "ctx", "first").await.unwrap();
        cache.put("abc", "ctx", "second").await.unwrap();
        assert_eq!(cache.get("abc", "ctx").await.unwrap(), Some("first".to_string()));
    }

    #[tokio::test]
    async fn test_expired_entries_invisible_and_evictable() {
        let pool = init_memory_pool().await.unwrap();
        // Zero TTL: everything is expired on arrival
        let cache = EnrichmentCache::new(pool, 0);

        cache.put("abc", "ctx", "stale").await.unwrap();
        assert_eq!(cache.get("abc", "ctx").await.unwrap(), None);
        assert_eq!(cache.evict_expired().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_context() {
        let pool = init_memory_pool().await.unwrap();
        let cache = EnrichmentCache::new(pool, 3600);

        cache.put("a", "glossary-v1:Intro", "x").await.unwrap();
        cache.put("b", "glossary-v1:Tags", "y").await.unwrap();
        cache.put("c", "glossary-v2:Intro", "z").await.unwrap();

        assert_eq!(cache.invalidate_context("glossary-v1").await.unwrap(), 2);
        assert_eq!(cache.get("c", "glossary-v2:Intro").await.unwrap(), Some("z".to_string()));
    }
}

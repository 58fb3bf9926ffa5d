//! Layered admission quotas for the enrichment service
//!
//! Three direct rate limiters, checked in order: per-minute, per-hour,
//! per-day. A request admitted by all three proceeds; one that cannot be
//! admitted within the queue-wait budget is rejected so the caller can
//! degrade the field instead of stalling the pipeline.

use crate::error::{IngestError, IngestResult};
use governor::{DefaultDirectRateLimiter, Quota};
use std::num::NonZeroU32;
use std::time::Duration;

/// Minute/hour/day admission quotas
pub struct QuotaSet {
    per_minute: DefaultDirectRateLimiter,
    per_hour: DefaultDirectRateLimiter,
    per_day: DefaultDirectRateLimiter,
}

impl QuotaSet {
    /// Build from per-window request counts. Zero means one per window.
    pub fn new(per_minute: u32, per_hour: u32, per_day: u32) -> Self {
        let per_minute = nonzero(per_minute);
        let per_hour = nonzero(per_hour);
        let per_day = nonzero(per_day);

        // No per-day constructor upstream; spread the daily allowance
        // evenly and allow the full count as burst
        let day_period = Duration::from_secs(86_400 / u64::from(per_day.get()).max(1));
        let day_quota = Quota::with_period(day_period)
            .unwrap_or_else(|| Quota::per_hour(per_hour))
            .allow_burst(per_day);

        Self {
            per_minute: DefaultDirectRateLimiter::direct(Quota::per_minute(per_minute)),
            per_hour: DefaultDirectRateLimiter::direct(Quota::per_hour(per_hour)),
            per_day: DefaultDirectRateLimiter::direct(day_quota),
        }
    }

    /// Wait for admission through all three windows, up to `max_wait`
    pub async fn acquire(&self, max_wait: Duration) -> IngestResult<()> {
        tokio::time::timeout(max_wait, async {
            self.per_minute.until_ready().await;
            self.per_hour.until_ready().await;
            self.per_day.until_ready().await;
        })
        .await
        .map_err(|_| {
            IngestError::EnrichmentQuota(format!(
                "no quota slot within {}ms",
                max_wait.as_millis()
            ))
        })
    }

    /// Non-blocking admission check, consuming a slot when it succeeds
    pub fn try_acquire(&self) -> bool {
        self.per_minute.check().is_ok()
            && self.per_hour.check().is_ok()
            && self.per_day.check().is_ok()
    }
}

fn nonzero(value: u32) -> NonZeroU32 {
    NonZeroU32::new(value.max(1)).unwrap_or(NonZeroU32::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_admits_within_quota() {
        let quotas = QuotaSet::new(10, 100, 1000);
        for _ in 0..5 {
            quotas.acquire(Duration::from_millis(50)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_rejects_when_exhausted() {
        // One request per minute, no burst headroom after the first
        let quotas = QuotaSet::new(1, 1, 1);
        quotas.acquire(Duration::from_millis(50)).await.unwrap();

        let result = quotas.acquire(Duration::from_millis(20)).await;
        assert!(matches!(result, Err(IngestError::EnrichmentQuota(_))));
    }

    #[tokio::test]
    async fn test_try_acquire() {
        let quotas = QuotaSet::new(1, 1, 1);
        assert!(quotas.try_acquire());
        assert!(!quotas.try_acquire());
    }
}

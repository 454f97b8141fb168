//! Two-tier cache manager
//!
//! Read path: local tier first (hit increments the entry's access count);
//! on a local miss the distributed tier is queried and a hit is backfilled
//! into the local map. Write path: both tiers unconditionally; tier-write
//! order does not matter for correctness.
//!
//! Distributed-tier errors are never fatal. They are logged and the lookup
//! proceeds as a miss, because the tier exists for cross-instance sharing
//! and the local computation path remains the source of truth.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::distributed::CacheTier;
use crate::cache::key::canonical_key;
use crate::cache::local::{LocalResultCache, SweepReport};
use crate::config::CacheConfig;
use crate::types::{AggregationRequest, AggregationResult};

/// Which tier satisfied a lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheHitTier {
    /// Served from the in-process map
    Local,
    /// Served from the distributed tier (and backfilled locally)
    Distributed,
}

/// Hit/miss/eviction counters
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Local-tier hits
    pub local_hits: AtomicU64,
    /// Distributed-tier hits
    pub distributed_hits: AtomicU64,
    /// Full misses
    pub misses: AtomicU64,
    /// Entries evicted by sweeps
    pub evictions: AtomicU64,
    /// Distributed-tier errors degraded to misses
    pub tier_errors: AtomicU64,
}

/// Two-tier memoization layer for aggregation results
pub struct CacheManager {
    local: LocalResultCache,
    distributed: Arc<dyn CacheTier>,
    distributed_ttl: Duration,
    stats: CacheStats,
}

impl CacheManager {
    /// Create a manager over the given distributed tier
    pub fn new(config: &CacheConfig, distributed: Arc<dyn CacheTier>) -> Self {
        Self {
            local: LocalResultCache::new(
                Duration::from_secs(config.local_ttl_secs),
                config.local_max_entries,
            ),
            distributed,
            distributed_ttl: Duration::from_secs(config.distributed_ttl_secs),
            stats: CacheStats::default(),
        }
    }

    /// Canonical key for a request
    pub fn key_for(&self, request: &AggregationRequest) -> String {
        canonical_key(request)
    }

    /// Look up a result by key
    ///
    /// Returns the payload and the tier that served it, or `None` on a full
    /// miss. Distributed failures are logged and count as a miss.
    pub async fn get(&self, key: &str) -> Option<(Arc<AggregationResult>, CacheHitTier)> {
        if let Some(payload) = self.local.get(key) {
            self.stats.local_hits.fetch_add(1, Ordering::Relaxed);
            debug!(key, "cache hit (local)");
            return Some((payload, CacheHitTier::Local));
        }

        match self.distributed.get(key).await {
            Ok(Some(result)) => {
                self.stats.distributed_hits.fetch_add(1, Ordering::Relaxed);
                debug!(key, "cache hit (distributed), backfilling local");
                let payload = Arc::new(result);
                self.local.set(key.to_string(), Arc::clone(&payload));
                Some((payload, CacheHitTier::Distributed))
            },
            Ok(None) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            },
            Err(e) => {
                // Fail open: a broken tier must never fail the request
                self.stats.tier_errors.fetch_add(1, Ordering::Relaxed);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                warn!(key, error = %e, "distributed cache get failed, treating as miss");
                None
            },
        }
    }

    /// Write a result to both tiers
    pub async fn set(&self, key: &str, payload: Arc<AggregationResult>) {
        self.local.set(key.to_string(), Arc::clone(&payload));

        if let Err(e) = self
            .distributed
            .set(key, payload.as_ref(), self.distributed_ttl)
            .await
        {
            self.stats.tier_errors.fetch_add(1, Ordering::Relaxed);
            warn!(key, error = %e, "distributed cache set failed, local tier retains entry");
        }
    }

    /// Run one sweep pass over the local tier
    pub fn sweep(&self) -> SweepReport {
        let report = self.local.sweep();
        if report.expired > 0 || report.evicted > 0 {
            self.stats
                .evictions
                .fetch_add(report.evicted as u64, Ordering::Relaxed);
            debug!(
                expired = report.expired,
                evicted = report.evicted,
                remaining = report.remaining,
                "local cache sweep"
            );
        }
        report
    }

    /// Clear the local tier; called from the shutdown hook
    ///
    /// No flush to durable storage: the distributed cache and the backing
    /// data store remain the sources of truth.
    pub fn clear(&self) {
        self.local.clear();
    }

    /// Counters snapshot holder
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Access count for a local entry, if present
    pub fn local_access_count(&self, key: &str) -> Option<u64> {
        self.local.access_count(key)
    }

    /// Current local entry count
    pub fn local_len(&self) -> usize {
        self.local.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::distributed::InMemoryCacheTier;
    use crate::types::{DateRange, Granularity, SummaryStatistics};
    use chrono::Utc;

    fn config() -> CacheConfig {
        CacheConfig::default()
    }

    fn result(id: &str) -> Arc<AggregationResult> {
        let now = Utc::now();
        Arc::new(AggregationResult {
            id: id.to_string(),
            generated_at: now,
            request: AggregationRequest::new(
                vec!["time".to_string()],
                vec!["revenue".to_string()],
                Granularity::Day,
                DateRange::new(now - chrono::Duration::days(1), now),
            ),
            rows: vec![],
            summary: SummaryStatistics::default(),
            comparison: None,
            insights: vec![],
        })
    }

    #[tokio::test]
    async fn test_set_writes_both_tiers() {
        let tier = Arc::new(InMemoryCacheTier::new());
        let manager = CacheManager::new(&config(), tier.clone());

        manager.set("k1", result("r-1")).await;
        assert_eq!(manager.local_len(), 1);
        assert_eq!(tier.len(), 1);
    }

    #[tokio::test]
    async fn test_local_hit_increments_access_count() {
        let tier = Arc::new(InMemoryCacheTier::new());
        let manager = CacheManager::new(&config(), tier);

        manager.set("k1", result("r-1")).await;
        let (_, hit) = manager.get("k1").await.unwrap();
        assert_eq!(hit, CacheHitTier::Local);
        assert_eq!(manager.local_access_count("k1"), Some(1));
        assert_eq!(manager.stats().local_hits.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_distributed_hit_backfills_local() {
        let tier = Arc::new(InMemoryCacheTier::new());
        // Populate the shared tier as if another instance computed the result
        tier.set("k1", result("r-remote").as_ref(), Duration::from_secs(60))
            .await
            .unwrap();

        let manager = CacheManager::new(&config(), tier);
        let (payload, hit) = manager.get("k1").await.unwrap();
        assert_eq!(hit, CacheHitTier::Distributed);
        assert_eq!(payload.id, "r-remote");

        // Backfilled: the next lookup is local
        let (_, hit) = manager.get("k1").await.unwrap();
        assert_eq!(hit, CacheHitTier::Local);
    }

    #[tokio::test]
    async fn test_tier_outage_fails_open() {
        let tier = Arc::new(InMemoryCacheTier::new());
        let manager = CacheManager::new(&config(), tier.clone());

        tier.set_unavailable(true);
        assert!(manager.get("k1").await.is_none());

        // A set during the outage still lands in the local tier
        manager.set("k1", result("r-1")).await;
        let (_, hit) = manager.get("k1").await.unwrap();
        assert_eq!(hit, CacheHitTier::Local);
        assert!(manager.stats().tier_errors.load(Ordering::Relaxed) >= 2);
    }

    #[tokio::test]
    async fn test_clear_empties_local() {
        let tier = Arc::new(InMemoryCacheTier::new());
        let manager = CacheManager::new(&config(), tier);
        manager.set("k1", result("r-1")).await;
        manager.clear();
        assert_eq!(manager.local_len(), 0);
    }
}

//! Local in-process result cache
//!
//! Bounded map from canonical key to aggregation result with:
//! - TTL-based expiration (default 30 minutes)
//! - Access-count tracking, incremented on every hit
//! - Sweep-time eviction in ascending access-count order (least-used first)
//!
//! The sweep itself is driven by the cache manager's background service;
//! this structure only exposes the `sweep` primitive.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::types::AggregationResult;

/// One cached result with expiry and usage tracking
///
/// The access count is the only mutable field after insertion.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The cached payload
    pub payload: Arc<AggregationResult>,
    /// Insertion time
    pub inserted_at: Instant,
    /// Hits since insertion
    pub access_count: u64,
}

impl CacheEntry {
    fn new(payload: Arc<AggregationResult>) -> Self {
        Self {
            payload,
            inserted_at: Instant::now(),
            access_count: 0,
        }
    }

    /// True once the entry has outlived `ttl`
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() > ttl
    }
}

/// Outcome of one sweep pass, for logging
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries dropped because their TTL elapsed
    pub expired: usize,
    /// Entries evicted to restore the size bound
    pub evicted: usize,
    /// Entries remaining after the sweep
    pub remaining: usize,
}

/// Bounded in-process cache keyed by canonical request key
pub struct LocalResultCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
    max_entries: usize,
}

impl LocalResultCache {
    /// Create a cache with the given TTL and size bound
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            max_entries,
        }
    }

    /// Get a cached result, incrementing its access count on a hit
    ///
    /// Expired entries count as a miss and are left for the next sweep.
    pub fn get(&self, key: &str) -> Option<Arc<AggregationResult>> {
        let mut entries = self.entries.write();
        let entry = entries.get_mut(key)?;
        if entry.is_expired(self.ttl) {
            return None;
        }
        entry.access_count += 1;
        Some(Arc::clone(&entry.payload))
    }

    /// Insert or replace an entry
    ///
    /// Insertion does not evict; the bound is restored by [`sweep`].
    /// Between sweeps the map may briefly exceed `max_entries`.
    ///
    /// [`sweep`]: LocalResultCache::sweep
    pub fn set(&self, key: String, payload: Arc<AggregationResult>) {
        self.entries.write().insert(key, CacheEntry::new(payload));
    }

    /// Access count for a key, if present (expired or not)
    pub fn access_count(&self, key: &str) -> Option<u64> {
        self.entries.read().get(key).map(|e| e.access_count)
    }

    /// Drop expired entries, then evict least-accessed entries to the bound
    pub fn sweep(&self) -> SweepReport {
        let mut entries = self.entries.write();
        let before = entries.len();

        entries.retain(|_, e| !e.is_expired(self.ttl));
        let expired = before - entries.len();

        let mut evicted = 0;
        if entries.len() > self.max_entries {
            let mut by_usage: Vec<(String, u64)> = entries
                .iter()
                .map(|(k, e)| (k.clone(), e.access_count))
                .collect();
            by_usage.sort_by_key(|(_, count)| *count);

            let excess = entries.len() - self.max_entries;
            for (key, _) in by_usage.into_iter().take(excess) {
                entries.remove(&key);
                evicted += 1;
            }
        }

        SweepReport {
            expired,
            evicted,
            remaining: entries.len(),
        }
    }

    /// Remove everything
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Current entry count (including expired entries awaiting a sweep)
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True when the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Snapshot of access counts, used by sweep-order assertions in tests
    pub fn access_counts(&self) -> Vec<(String, u64)> {
        self.entries
            .read()
            .iter()
            .map(|(k, e)| (k.clone(), e.access_count))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        AggregationRequest, DateRange, Granularity, SummaryStatistics,
    };
    use chrono::Utc;

    fn result() -> Arc<AggregationResult> {
        let now = Utc::now();
        Arc::new(AggregationResult {
            id: "r-1".to_string(),
            generated_at: now,
            request: AggregationRequest::new(
                vec!["time".to_string()],
                vec!["revenue".to_string()],
                Granularity::Day,
                DateRange::new(now - chrono::Duration::days(7), now),
            ),
            rows: vec![],
            summary: SummaryStatistics::default(),
            comparison: None,
            insights: vec![],
        })
    }

    #[test]
    fn test_get_increments_access_count() {
        let cache = LocalResultCache::new(Duration::from_secs(60), 10);
        cache.set("k1".to_string(), result());
        assert_eq!(cache.access_count("k1"), Some(0));

        assert!(cache.get("k1").is_some());
        assert!(cache.get("k1").is_some());
        assert_eq!(cache.access_count("k1"), Some(2));
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let cache = LocalResultCache::new(Duration::from_millis(0), 10);
        cache.set("k1".to_string(), result());
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("k1").is_none());
        // Entry remains until swept
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_sweep_drops_expired() {
        let cache = LocalResultCache::new(Duration::from_millis(0), 10);
        cache.set("k1".to_string(), result());
        cache.set("k2".to_string(), result());
        std::thread::sleep(Duration::from_millis(5));

        let report = cache.sweep();
        assert_eq!(report.expired, 2);
        assert_eq!(report.remaining, 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_sweep_evicts_least_accessed_first() {
        let cache = LocalResultCache::new(Duration::from_secs(60), 2);
        cache.set("cold".to_string(), result());
        cache.set("warm".to_string(), result());
        cache.set("hot".to_string(), result());

        let _ = cache.get("warm");
        let _ = cache.get("hot");
        let _ = cache.get("hot");

        let report = cache.sweep();
        assert_eq!(report.evicted, 1);
        assert_eq!(report.remaining, 2);
        assert!(cache.get("cold").is_none());
        assert!(cache.get("warm").is_some());
        assert!(cache.get("hot").is_some());
    }

    #[test]
    fn test_post_sweep_bound_and_order_property() {
        let cache = LocalResultCache::new(Duration::from_secs(60), 3);
        for i in 0..8 {
            let key = format!("k{}", i);
            cache.set(key.clone(), result());
            // Higher-numbered keys get more hits
            for _ in 0..i {
                let _ = cache.get(&key);
            }
        }

        let report = cache.sweep();
        assert!(report.remaining <= 3);

        // Every retained entry's access count is >= every evicted one's
        let retained_min = cache
            .access_counts()
            .into_iter()
            .map(|(_, c)| c)
            .min()
            .unwrap();
        assert!(retained_min >= 5);
    }

    #[test]
    fn test_clear() {
        let cache = LocalResultCache::new(Duration::from_secs(60), 10);
        cache.set("k1".to_string(), result());
        cache.clear();
        assert!(cache.is_empty());
    }
}

//! Periodic local-cache sweep service
//!
//! Runs one sweep pass over the cache manager's local tier on a fixed
//! interval, dropping TTL-expired entries and evicting least-accessed
//! entries above the size bound. Stops on the manager's shutdown signal.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::cache::CacheManager;
use crate::services::framework::{Service, ServiceError, ServiceStatus};

/// Background service sweeping the local cache tier
pub struct CacheSweepService {
    cache: Arc<CacheManager>,
    interval: Duration,
    status: RwLock<ServiceStatus>,
}

impl CacheSweepService {
    /// Create a sweeper over the given cache manager
    pub fn new(cache: Arc<CacheManager>, interval: Duration) -> Self {
        Self {
            cache,
            interval,
            status: RwLock::new(ServiceStatus::Starting),
        }
    }
}

#[async_trait::async_trait]
impl Service for CacheSweepService {
    async fn start(&self, mut shutdown: broadcast::Receiver<()>) -> Result<(), ServiceError> {
        *self.status.write() = ServiceStatus::Running;
        info!(interval = ?self.interval, "Cache sweep service started");

        let mut ticker = tokio::time::interval(self.interval);
        // The first tick fires immediately; skip it so the first real sweep
        // happens one full interval after start
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.cache.sweep();
                    debug!(
                        expired = report.expired,
                        evicted = report.evicted,
                        remaining = report.remaining,
                        "sweep pass complete"
                    );
                },
                _ = shutdown.recv() => {
                    break;
                },
            }
        }

        *self.status.write() = ServiceStatus::Stopped;
        info!("Cache sweep service stopped");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "cache-sweeper"
    }

    fn status(&self) -> ServiceStatus {
        self.status.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCacheTier;
    use crate::config::CacheConfig;
    use crate::services::framework::ServiceManager;
    use crate::types::{
        AggregationRequest, AggregationResult, DateRange, Granularity, SummaryStatistics,
    };
    use chrono::Utc;

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

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_over_bound() {
        let config = CacheConfig {
            local_max_entries: 2,
            ..CacheConfig::default()
        };
        let cache = Arc::new(CacheManager::new(
            &config,
            Arc::new(InMemoryCacheTier::new()),
        ));

        for i in 0..5 {
            cache.set(&format!("k{i}"), result(&format!("r-{i}"))).await;
        }
        assert_eq!(cache.local_len(), 5);

        let manager = ServiceManager::with_defaults();
        manager
            .register(Arc::new(CacheSweepService::new(
                cache.clone(),
                Duration::from_secs(300),
            )))
            .unwrap();
        manager.start_all().unwrap();

        // Past one interval the sweep has bounded the map
        tokio::time::sleep(Duration::from_secs(301)).await;
        assert_eq!(cache.local_len(), 2);

        manager.shutdown().await.unwrap();
        assert_eq!(
            manager.service_status("cache-sweeper"),
            Some(ServiceStatus::Stopped)
        );
    }
}

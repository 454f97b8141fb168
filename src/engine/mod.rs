//! Analytics engine facade
//!
//! Integrates the registry, query pipeline, cache, insight and comparison
//! engines and the ETL simulator behind one explicitly-constructed type.
//! There is no global state: every collaborator is passed to the builder,
//! so multiple isolated instances can coexist (e.g. in tests).
//!
//! Aggregation control flow: validate and bind the request, check the
//! cache by canonical key, execute on a miss, derive statistics and
//! insights, optionally attach the period-over-period comparison, write
//! the composed result back through the cache and return it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::cache::{CacheManager, CacheStats, CacheTier, InMemoryCacheTier};
use crate::compare::{BenchmarkSource, ComparisonEngine, StaticBenchmarks};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::etl::{EtlProcess, EtlSimulator, ScoreBandTrend, TrendRule};
use crate::query::{AggregationExecutor, DataStore, QueryBuilder};
use crate::registry::{CubeDefinition, EntityType, LineageRecord, Registry};
use crate::services::{CacheSweepService, ServiceManager};
use crate::types::{AggregationRequest, AggregationResult};
use crate::{insight, stats};

// ============================================================================
// Builder
// ============================================================================

/// Builder for an [`AnalyticsEngine`] with explicit collaborators
///
/// The data store is required; every other collaborator has a default
/// (built-in catalog, in-memory distributed tier, placeholder benchmarks,
/// score-band trend rule).
pub struct AnalyticsEngineBuilder {
    config: EngineConfig,
    registry: Option<Arc<Registry>>,
    store: Option<Arc<dyn DataStore>>,
    cache_tier: Option<Arc<dyn CacheTier>>,
    benchmarks: Option<Arc<dyn BenchmarkSource>>,
    trend_rule: Option<Arc<dyn TrendRule>>,
}

impl AnalyticsEngineBuilder {
    /// Create a builder with default configuration
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            registry: None,
            store: None,
            cache_tier: None,
            benchmarks: None,
            trend_rule: None,
        }
    }

    /// Set engine configuration
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the metadata registry
    pub fn with_registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the backing data store
    pub fn with_store(mut self, store: Arc<dyn DataStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the distributed cache tier
    pub fn with_cache_tier(mut self, tier: Arc<dyn CacheTier>) -> Self {
        self.cache_tier = Some(tier);
        self
    }

    /// Set the benchmark source for comparison blocks
    pub fn with_benchmarks(mut self, benchmarks: Arc<dyn BenchmarkSource>) -> Self {
        self.benchmarks = Some(benchmarks);
        self
    }

    /// Set the ETL trend rule
    pub fn with_trend_rule(mut self, rule: Arc<dyn TrendRule>) -> Self {
        self.trend_rule = Some(rule);
        self
    }

    /// Build the engine with the configured collaborators
    pub fn build(self) -> Result<AnalyticsEngine> {
        self.config.validate()?;

        let store = self
            .store
            .ok_or_else(|| Error::Configuration("No data store configured".to_string()))?;
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(Registry::with_builtin_catalog()));
        let cache_tier = self
            .cache_tier
            .unwrap_or_else(|| Arc::new(InMemoryCacheTier::new()));
        let benchmarks = self
            .benchmarks
            .unwrap_or_else(|| Arc::new(StaticBenchmarks));
        let trend_rule = self
            .trend_rule
            .unwrap_or_else(|| Arc::new(ScoreBandTrend::default()));

        let cache = Arc::new(CacheManager::new(&self.config.cache, cache_tier));
        let builder = QueryBuilder::new(Arc::clone(&registry), self.config.query.clone());
        let executor = Arc::new(AggregationExecutor::new(store, self.config.query.clone()));
        let comparison = ComparisonEngine::new(Arc::clone(&executor), benchmarks);
        let etl = EtlSimulator::with_trend_rule(trend_rule);
        let services = ServiceManager::with_defaults();
        services.register(Arc::new(CacheSweepService::new(
            Arc::clone(&cache),
            self.config.sweep_interval(),
        )))?;

        Ok(AnalyticsEngine {
            config: self.config,
            registry,
            builder,
            executor,
            cache,
            comparison,
            etl,
            services,
            result_seq: AtomicU64::new(0),
        })
    }
}

impl Default for AnalyticsEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Engine
// ============================================================================

/// The multi-dimensional aggregation engine
pub struct AnalyticsEngine {
    config: EngineConfig,
    registry: Arc<Registry>,
    builder: QueryBuilder,
    executor: Arc<AggregationExecutor>,
    cache: Arc<CacheManager>,
    comparison: ComparisonEngine,
    etl: EtlSimulator,
    services: ServiceManager,
    result_seq: AtomicU64,
}

impl AnalyticsEngine {
    /// Run one aggregation request through the full pipeline
    ///
    /// Validation happens before the cache lookup so a malformed request
    /// fails identically whether or not a cached result exists.
    pub async fn aggregate(&self, request: &AggregationRequest) -> Result<Arc<AggregationResult>> {
        let query = self.builder.bind(request)?;

        let key = self.cache.key_for(request);
        if let Some((payload, tier)) = self.cache.get(&key).await {
            debug!(key, ?tier, "aggregation served from cache");
            return Ok(payload);
        }

        let rows = self.executor.execute(&query).await?;

        let summary = stats::summarize(&rows, &request.dimensions, &request.measures);
        let has_time = request.dimensions.iter().any(|d| d == "time");
        let insights = insight::detect(&rows, &request.measures, has_time, &self.config.insight);

        let comparison = if request.include_comparisons {
            Some(self.comparison.compare(&query).await?)
        } else {
            None
        };

        let result = AggregationResult {
            id: format!(
                "agg-{}-{}",
                Utc::now().timestamp_millis(),
                self.result_seq.fetch_add(1, Ordering::Relaxed)
            ),
            generated_at: Utc::now(),
            request: request.clone(),
            rows,
            summary,
            comparison,
            insights,
        };

        info!(
            id = %result.id,
            rows = result.rows.len(),
            insights = result.insights.len(),
            critical = query.critical,
            "aggregation computed"
        );

        let payload = Arc::new(result);
        self.cache.set(&key, Arc::clone(&payload)).await;
        Ok(payload)
    }

    /// Run the standard ETL pipeline for an operation
    pub fn process_etl(
        &self,
        operation: &str,
        source_type: &str,
        processing_mode: &str,
    ) -> Result<EtlProcess> {
        Ok(self.etl.run(operation, source_type, processing_mode)?)
    }

    /// Look up a cube definition by id
    pub fn cube(&self, id: &str) -> Option<CubeDefinition> {
        self.registry.cube(id)
    }

    /// All registered cube definitions
    pub fn cubes(&self) -> Vec<CubeDefinition> {
        self.registry.cubes()
    }

    /// Declared lineage for an entity, if any
    pub fn lineage(&self, entity_id: &str, entity_type: EntityType) -> Option<LineageRecord> {
        self.registry.lineage(entity_id, entity_type)
    }

    /// Start background services (the periodic cache sweeper)
    pub fn start_services(&self) -> Result<()> {
        self.services.start_all()?;
        Ok(())
    }

    /// Stop background services and clear in-process cache structures
    ///
    /// Nothing is flushed: the distributed cache and the data store remain
    /// the sources of truth.
    pub async fn shutdown(&self) -> Result<()> {
        self.services.shutdown().await?;
        self.cache.clear();
        Ok(())
    }

    /// The metadata registry
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Cache hit/miss/eviction counters
    pub fn cache_stats(&self) -> &CacheStats {
        self.cache.stats()
    }

    /// The cache manager (exposed for sweep inspection in embedding code)
    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

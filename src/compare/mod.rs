//! Comparison engine
//!
//! Active only when a request sets `include_comparisons`. Derives the
//! window of identical length immediately preceding the current one and
//! re-invokes the executor — and only the executor, not the full pipeline —
//! for that window with identical dimensions, measures and filters. The
//! two window aggregations have no ordering dependency and run
//! concurrently.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::QueryError;
use crate::query::builder::BoundQuery;
use crate::query::executor::AggregationExecutor;
use crate::types::{Benchmark, ComparisonBlock, MeasureComparison, ResultRow};

/// Source of benchmark figures for a measure
///
/// The shipped implementation returns illustrative placeholders; wire a
/// real benchmark source before production use.
#[async_trait]
pub trait BenchmarkSource: Send + Sync + 'static {
    /// Benchmark figures for a measure given its current-window total
    async fn benchmark(&self, measure: &str, current_total: f64) -> Benchmark;
}

/// Placeholder benchmark figures derived from the current total
///
/// Not sourced from real external data.
pub struct StaticBenchmarks;

#[async_trait]
impl BenchmarkSource for StaticBenchmarks {
    async fn benchmark(&self, _measure: &str, current_total: f64) -> Benchmark {
        let industry_average = current_total * 0.92;
        let target = current_total * 1.10;
        let variance = if target == 0.0 {
            0.0
        } else {
            (current_total - target) / target * 100.0
        };
        Benchmark {
            industry_average,
            target,
            variance,
        }
    }
}

/// Computes period-over-period deltas by re-running the executor
pub struct ComparisonEngine {
    executor: Arc<AggregationExecutor>,
    benchmarks: Arc<dyn BenchmarkSource>,
}

impl ComparisonEngine {
    /// Create a comparison engine sharing the pipeline's executor
    pub fn new(executor: Arc<AggregationExecutor>, benchmarks: Arc<dyn BenchmarkSource>) -> Self {
        Self {
            executor,
            benchmarks,
        }
    }

    /// Compare the query's window against the immediately preceding one
    pub async fn compare(&self, query: &BoundQuery) -> Result<ComparisonBlock, QueryError> {
        let previous_range = query.range.previous_window();
        let previous_query = query.with_range(previous_range);

        // No ordering dependency between the two windows
        let (current_rows, previous_rows) = tokio::join!(
            self.executor.execute(query),
            self.executor.execute(&previous_query),
        );
        let current_rows = current_rows?;
        let previous_rows = previous_rows?;

        let mut measures = BTreeMap::new();
        for measure in &query.measures {
            let current_total = measure_total(&current_rows, &measure.name);
            let previous_total = measure_total(&previous_rows, &measure.name);
            let change = current_total - previous_total;
            let change_percentage = if previous_total == 0.0 {
                0.0
            } else {
                change / previous_total * 100.0
            };
            let benchmark = self.benchmarks.benchmark(&measure.name, current_total).await;

            measures.insert(
                measure.name.clone(),
                MeasureComparison {
                    current_total,
                    previous_total,
                    change,
                    change_percentage,
                    benchmark,
                },
            );
        }

        Ok(ComparisonBlock {
            previous_range,
            measures,
        })
    }
}

/// Total of one measure across a row set
fn measure_total(rows: &[ResultRow], measure: &str) -> f64 {
    rows.iter()
        .filter_map(|r| r.measure_values.get(measure).copied())
        .sum()
}

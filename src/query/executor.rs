//! Aggregation executor
//!
//! Turns a bound query into grouped result rows: scan the data store over
//! the request window, group by every non-time dimension plus the time
//! bucket, fold each measure per its registered aggregation, and cap the
//! output at the configured row limit (truncated without pagination).
//!
//! Critical-path requests race the computation against a deadline timer.
//! On expiry the executor signals cancellation to the running task and
//! surfaces a timeout error; the abandoned computation may still finish in
//! the background and its result is discarded. Latency over efficiency,
//! deliberately.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::config::QueryConfig;
use crate::error::QueryError;
use crate::query::builder::{BoundMeasure, BoundQuery};
use crate::query::datastore::{DataStore, SourceRecord};
use crate::types::{AggregationKind, ResultRow, RowMetadata};

/// Execution counters
#[derive(Debug, Default)]
pub struct ExecutorStats {
    /// Queries executed to completion
    pub executed: AtomicU64,
    /// Critical-path deadline timeouts
    pub deadline_timeouts: AtomicU64,
    /// Results truncated at the row cap
    pub truncated: AtomicU64,
}

/// Shapes bound queries into result rows
pub struct AggregationExecutor {
    store: Arc<dyn DataStore>,
    config: QueryConfig,
    stats: ExecutorStats,
}

impl AggregationExecutor {
    /// Create an executor over the given store
    pub fn new(store: Arc<dyn DataStore>, config: QueryConfig) -> Self {
        Self {
            store,
            config,
            stats: ExecutorStats::default(),
        }
    }

    /// Execute a bound query
    ///
    /// Critical queries are raced against the configured deadline;
    /// non-critical queries have no hard deadline.
    pub async fn execute(&self, query: &BoundQuery) -> Result<Vec<ResultRow>, QueryError> {
        let rows = if query.critical {
            self.execute_with_deadline(query).await?
        } else {
            let (_cancel_tx, cancel_rx) = watch::channel(false);
            run_pipeline(
                Arc::clone(&self.store),
                query.clone(),
                self.config.max_rows,
                cancel_rx,
            )
            .await?
        };

        self.stats.executed.fetch_add(1, Ordering::Relaxed);
        Ok(rows)
    }

    /// Race the pipeline against the critical-path deadline
    async fn execute_with_deadline(&self, query: &BoundQuery) -> Result<Vec<ResultRow>, QueryError> {
        let deadline = std::time::Duration::from_millis(self.config.critical_deadline_ms);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let store = Arc::clone(&self.store);
        let task_query = query.clone();
        let max_rows = self.config.max_rows;
        let handle =
            tokio::spawn(async move { run_pipeline(store, task_query, max_rows, cancel_rx).await });

        match tokio::time::timeout(deadline, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(QueryError::Internal(join_err.to_string())),
            Err(_elapsed) => {
                // Signal cancellation; the task checks the flag at safe
                // points and terminates at the next one. Its late result,
                // if any, is discarded.
                let _ = cancel_tx.send(true);
                self.stats.deadline_timeouts.fetch_add(1, Ordering::Relaxed);
                warn!(
                    deadline_ms = self.config.critical_deadline_ms,
                    "critical-path deadline exceeded, abandoning computation"
                );
                Err(QueryError::DeadlineExceeded {
                    deadline_ms: self.config.critical_deadline_ms,
                })
            },
        }
    }

    /// Execution counters
    pub fn stats(&self) -> &ExecutorStats {
        &self.stats
    }
}

/// The scan-group-shape pipeline, cancellable between phases
async fn run_pipeline(
    store: Arc<dyn DataStore>,
    query: BoundQuery,
    max_rows: usize,
    cancel: watch::Receiver<bool>,
) -> Result<Vec<ResultRow>, QueryError> {
    let records = match store.scan(&query).await {
        Ok(records) => records,
        Err(e) => {
            // Fatal for this request; log with full request context
            error!(
                dimensions = ?query.dimensions.iter().map(|d| d.name.as_str()).collect::<Vec<_>>(),
                measures = ?query.measures.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
                range_start = %query.range.start,
                range_end = %query.range.end,
                error = %e,
                "data store scan failed"
            );
            return Err(e);
        },
    };
    if *cancel.borrow() {
        return Err(QueryError::Cancelled);
    }

    let groups = group_records(&query, records);
    if *cancel.borrow() {
        return Err(QueryError::Cancelled);
    }

    let mut rows: Vec<ResultRow> = groups
        .into_iter()
        .map(|(dimension_values, group)| shape_row(&query.measures, dimension_values, &group))
        .collect();

    if rows.len() > max_rows {
        debug!(produced = rows.len(), cap = max_rows, "truncating result rows");
        rows.truncate(max_rows);
    }
    Ok(rows)
}

/// Group records by every requested non-time dimension plus the time bucket
///
/// BTreeMap keying keeps row order deterministic across runs.
fn group_records(
    query: &BoundQuery,
    records: Vec<SourceRecord>,
) -> BTreeMap<BTreeMap<String, String>, Vec<SourceRecord>> {
    let mut groups: BTreeMap<BTreeMap<String, String>, Vec<SourceRecord>> = BTreeMap::new();

    for record in records {
        let mut key = BTreeMap::new();
        for dimension in &query.dimensions {
            let value = if dimension.is_time {
                query.granularity.bucket(record.occurred_at)
            } else {
                record
                    .dimension_value(&dimension.column)
                    .unwrap_or("unknown")
                    .to_string()
            };
            key.insert(dimension.name.clone(), value);
        }
        groups.entry(key).or_default().push(record);
    }
    groups
}

/// Fold one group into a result row
fn shape_row(
    measures: &[BoundMeasure],
    dimension_values: BTreeMap<String, String>,
    group: &[SourceRecord],
) -> ResultRow {
    let mut measure_values = BTreeMap::new();
    let mut present_pairs = 0usize;

    for measure in measures {
        let value = aggregate_measure(measure, group);
        present_pairs += group
            .iter()
            .filter(|r| r.measure_value(&measure.column).is_some()
                || r.distinct_token(&measure.column).is_some())
            .count();
        measure_values.insert(measure.name.clone(), value);
    }

    let record_count = group.len() as u64;
    let total_pairs = group.len() * measures.len();
    let data_quality = if total_pairs == 0 {
        0.0
    } else {
        present_pairs as f64 / total_pairs as f64
    };
    // Confidence rises with the evidence behind the row
    let confidence = record_count as f64 / (record_count as f64 + 10.0);

    ResultRow {
        dimension_values,
        measure_values,
        metadata: RowMetadata {
            record_count,
            confidence,
            data_quality,
        },
    }
}

/// Fold one measure across a group per its registered aggregation
fn aggregate_measure(measure: &BoundMeasure, group: &[SourceRecord]) -> f64 {
    match measure.aggregation {
        AggregationKind::Sum => group
            .iter()
            .filter_map(|r| r.measure_value(&measure.column))
            .sum(),
        AggregationKind::Avg => {
            let values: Vec<f64> = group
                .iter()
                .filter_map(|r| r.measure_value(&measure.column))
                .collect();
            if values.is_empty() {
                0.0
            } else {
                values.iter().sum::<f64>() / values.len() as f64
            }
        },
        AggregationKind::Count => group.len() as f64,
        AggregationKind::Min => group
            .iter()
            .filter_map(|r| r.measure_value(&measure.column))
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.min(v))))
            .unwrap_or(0.0),
        AggregationKind::Max => group
            .iter()
            .filter_map(|r| r.measure_value(&measure.column))
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
            .unwrap_or(0.0),
        AggregationKind::Distinct => {
            let tokens: HashSet<String> = group
                .iter()
                .filter_map(|r| r.distinct_token(&measure.column))
                .collect();
            tokens.len() as f64
        },
    }
}

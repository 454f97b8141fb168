//! Data-store collaborator seam
//!
//! The executor issues read-only, bounded scans against this trait. No
//! writes ever originate from the engine. A store failure is fatal for the
//! request it serves: the executor returns the error instead of partial
//! rows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::QueryError;
use crate::query::builder::BoundQuery;

/// One source record from the backing fact table
#[derive(Debug, Clone)]
pub struct SourceRecord {
    /// Event timestamp, bucketed by the requested granularity
    pub occurred_at: DateTime<Utc>,
    /// Owning tenant
    pub tenant_id: String,
    /// Order identifier, used for distinct counts
    pub order_id: String,
    /// Monetary amount of the record
    pub amount: f64,
    /// Remaining dimension columns (region, channel, ...)
    pub attributes: BTreeMap<String, String>,
    /// Remaining numeric columns (units, discount_rate, ...)
    pub metrics: BTreeMap<String, f64>,
}

impl SourceRecord {
    /// Resolve a dimension column to its value for this record
    pub fn dimension_value(&self, column: &str) -> Option<&str> {
        match column {
            "tenant_id" => Some(self.tenant_id.as_str()),
            "order_id" => Some(self.order_id.as_str()),
            _ => self.attributes.get(column).map(|s| s.as_str()),
        }
    }

    /// Resolve a numeric column to its value for this record
    pub fn measure_value(&self, column: &str) -> Option<f64> {
        match column {
            "amount" => Some(self.amount),
            _ => self.metrics.get(column).copied(),
        }
    }

    /// Token used for distinct-count aggregation over a column
    pub fn distinct_token(&self, column: &str) -> Option<String> {
        if let Some(v) = self.dimension_value(column) {
            return Some(v.to_string());
        }
        self.measure_value(column).map(|v| v.to_string())
    }
}

/// Read-only access to the backing fact table
#[async_trait]
pub trait DataStore: Send + Sync + 'static {
    /// Return the records matching the query's window and filter predicates
    ///
    /// The store applies the date range, the tenant predicate and the
    /// minimum-amount predicate; grouping and aggregation stay in the
    /// executor.
    async fn scan(&self, query: &BoundQuery) -> Result<Vec<SourceRecord>, QueryError>;
}

// ============================================================================
// In-Memory Store
// ============================================================================

/// In-memory [`DataStore`] for tests and embedded demos
///
/// Supports an optional artificial scan latency so deadline behavior can be
/// exercised deterministically.
pub struct InMemoryDataStore {
    records: RwLock<Vec<SourceRecord>>,
    scan_latency: RwLock<Option<Duration>>,
}

impl InMemoryDataStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            scan_latency: RwLock::new(None),
        }
    }

    /// Create a store over the given records
    pub fn with_records(records: Vec<SourceRecord>) -> Self {
        Self {
            records: RwLock::new(records),
            scan_latency: RwLock::new(None),
        }
    }

    /// Append a record
    pub fn insert(&self, record: SourceRecord) {
        self.records.write().push(record);
    }

    /// Delay every scan by `latency`
    pub fn set_scan_latency(&self, latency: Option<Duration>) {
        *self.scan_latency.write() = latency;
    }
}

impl Default for InMemoryDataStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataStore for InMemoryDataStore {
    async fn scan(&self, query: &BoundQuery) -> Result<Vec<SourceRecord>, QueryError> {
        let latency = *self.scan_latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let records = self.records.read();
        let matched = records
            .iter()
            .filter(|r| query.range.contains(r.occurred_at))
            .filter(|r| {
                query
                    .tenant_filter
                    .as_ref()
                    .map_or(true, |t| &r.tenant_id == t)
            })
            .filter(|r| query.min_amount.map_or(true, |min| r.amount >= min))
            .cloned()
            .collect();
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueryConfig;
    use crate::query::builder::QueryBuilder;
    use crate::registry::Registry;
    use crate::types::{AggregationRequest, DateRange, Granularity};
    use chrono::NaiveDateTime;
    use std::sync::Arc;

    fn ts(s: &str) -> DateTime<Utc> {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
            .unwrap()
            .and_utc()
    }

    fn record(when: &str, tenant: &str, order: &str, amount: f64) -> SourceRecord {
        SourceRecord {
            occurred_at: ts(when),
            tenant_id: tenant.to_string(),
            order_id: order.to_string(),
            amount,
            attributes: BTreeMap::new(),
            metrics: BTreeMap::new(),
        }
    }

    fn bound(request: AggregationRequest) -> BoundQuery {
        let builder = QueryBuilder::new(
            Arc::new(Registry::with_builtin_catalog()),
            QueryConfig::default(),
        );
        builder.bind(&request).unwrap()
    }

    #[tokio::test]
    async fn test_scan_applies_range_and_predicates() {
        let store = InMemoryDataStore::with_records(vec![
            record("2024-03-01 10:00:00", "t-1", "o-1", 100.0),
            record("2024-03-02 10:00:00", "t-2", "o-2", 5.0),
            record("2024-03-20 10:00:00", "t-1", "o-3", 300.0), // outside range
        ]);

        let request = AggregationRequest::new(
            vec!["time".to_string()],
            vec!["revenue".to_string()],
            Granularity::Day,
            DateRange::new(ts("2024-03-01 00:00:00"), ts("2024-03-08 00:00:00")),
        )
        .with_filter("tenant_id", "t-1")
        .with_filter("min_amount", "50");

        let rows = store.scan(&bound(request)).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].order_id, "o-1");
    }

    #[tokio::test]
    async fn test_unrecognized_filter_is_ignored() {
        let store = InMemoryDataStore::with_records(vec![record(
            "2024-03-01 10:00:00",
            "t-1",
            "o-1",
            100.0,
        )]);

        let request = AggregationRequest::new(
            vec!["time".to_string()],
            vec!["revenue".to_string()],
            Granularity::Day,
            DateRange::new(ts("2024-03-01 00:00:00"), ts("2024-03-08 00:00:00")),
        )
        .with_filter("favorite_color", "purple");

        let rows = store.scan(&bound(request)).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_distinct_token_prefers_string_columns() {
        let r = record("2024-03-01 10:00:00", "t-1", "o-1", 42.0);
        assert_eq!(r.distinct_token("order_id"), Some("o-1".to_string()));
        assert_eq!(r.distinct_token("amount"), Some("42".to_string()));
        assert_eq!(r.distinct_token("missing"), None);
    }
}

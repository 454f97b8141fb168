//! End-to-end aggregation scenarios through the engine facade

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};

use cubeflow::cache::InMemoryCacheTier;
use cubeflow::engine::AnalyticsEngineBuilder;
use cubeflow::error::{Error, QueryError};
use cubeflow::query::{InMemoryDataStore, SourceRecord};
use cubeflow::types::{AggregationRequest, DateRange, Granularity, InsightKind};

/// Route engine tracing through the test harness, once per process
fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

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

/// Seven days of sales for two tenants with steadily rising revenue
fn week_of_sales() -> Vec<SourceRecord> {
    let mut records = Vec::new();
    for day in 0..7 {
        let when = format!("2024-03-0{} 10:00:00", day + 1);
        let factor = (day + 1) as f64;
        records.push(record(&when, "t-1", &format!("a{day}"), 100.0 * factor));
        records.push(record(&when, "t-2", &format!("b{day}"), 80.0 * factor));
    }
    // A second zero-amount order for t-1 on day one exercises the
    // distinct-count fold without moving revenue
    records.push(record("2024-03-01 15:00:00", "t-1", "a0x", 0.0));
    records
}

fn week_request() -> AggregationRequest {
    AggregationRequest::new(
        vec!["time".to_string(), "tenant".to_string()],
        vec!["revenue".to_string(), "orders".to_string()],
        Granularity::Day,
        DateRange::new(ts("2024-03-01 00:00:00"), ts("2024-03-08 00:00:00")),
    )
}

fn row_for<'a>(
    result: &'a cubeflow::types::AggregationResult,
    day: &str,
    tenant: &str,
) -> &'a cubeflow::types::ResultRow {
    result
        .rows
        .iter()
        .find(|r| {
            r.dimension_values.get("time").map(String::as_str) == Some(day)
                && r.dimension_values.get("tenant").map(String::as_str) == Some(tenant)
        })
        .unwrap_or_else(|| panic!("no row for ({day}, {tenant})"))
}

#[tokio::test]
async fn test_seven_day_revenue_orders_scenario() {
    init_tracing();
    let engine = AnalyticsEngineBuilder::new()
        .with_store(Arc::new(InMemoryDataStore::with_records(week_of_sales())))
        .build()
        .unwrap();

    let result = engine.aggregate(&week_request()).await.unwrap();

    // One row per (day, tenant) pair present in the source data
    assert_eq!(result.rows.len(), 14);

    // Revenue is the sum of matching amounts, orders the distinct id count
    let row = row_for(&result, "2024-03-03", "t-1");
    assert_eq!(row.measure_values["revenue"], 300.0);
    assert_eq!(row.measure_values["orders"], 1.0);

    let first = row_for(&result, "2024-03-01", "t-1");
    assert_eq!(first.measure_values["revenue"], 100.0);
    assert_eq!(first.measure_values["orders"], 2.0);
    assert_eq!(first.metadata.record_count, 2);

    // Rising day-over-day revenue produces exactly one trend insight for it
    let revenue_trends: Vec<_> = result
        .insights
        .iter()
        .filter(|i| i.kind == InsightKind::Trend && i.subject == "revenue")
        .collect();
    assert_eq!(revenue_trends.len(), 1);
    assert!(revenue_trends[0].significance > 0.0);

    // Summary statistics cover both requested measures and dimensions
    assert!((result.summary.measures["revenue"].sum - 5040.0).abs() < 1e-9);
    assert_eq!(result.summary.dimensions["tenant"].distinct_count, 2);
}

#[tokio::test]
async fn test_repeat_request_is_served_from_local_cache() {
    init_tracing();
    let engine = AnalyticsEngineBuilder::new()
        .with_store(Arc::new(InMemoryDataStore::with_records(week_of_sales())))
        .build()
        .unwrap();

    let request = week_request();
    let first = engine.aggregate(&request).await.unwrap();

    let key = engine.cache().key_for(&request);
    assert_eq!(engine.cache().local_access_count(&key), Some(0));

    // Same request again, no mutating event in between: local tier serves
    // it and the entry's access count increments
    let second = engine.aggregate(&request).await.unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!(engine.cache().local_access_count(&key), Some(1));
}

#[tokio::test(start_paused = true)]
async fn test_critical_request_times_out_instead_of_returning_late() {
    init_tracing();
    let store = Arc::new(InMemoryDataStore::with_records(week_of_sales()));
    // A scan far beyond the 450ms deadline
    store.set_scan_latency(Some(Duration::from_secs(2)));

    let engine = AnalyticsEngineBuilder::new()
        .with_store(store)
        .build()
        .unwrap();

    // time x tenant over revenue/orders is the critical classification
    let err = engine.aggregate(&week_request()).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Query(QueryError::DeadlineExceeded { deadline_ms: 450 })
    ));
}

#[tokio::test]
async fn test_distributed_outage_never_fails_a_request() {
    init_tracing();
    let tier = Arc::new(InMemoryCacheTier::new());
    tier.set_unavailable(true);

    let engine = AnalyticsEngineBuilder::new()
        .with_store(Arc::new(InMemoryDataStore::with_records(week_of_sales())))
        .with_cache_tier(tier.clone())
        .build()
        .unwrap();

    // Both the lookup and the write-back hit the broken tier; the request
    // still succeeds from the computation path
    let result = engine.aggregate(&week_request()).await.unwrap();
    assert_eq!(result.rows.len(), 14);

    // Recovery: with the tier back, repeat requests hit the local cache
    tier.set_unavailable(false);
    let again = engine.aggregate(&week_request()).await.unwrap();
    assert_eq!(again.id, result.id);
}

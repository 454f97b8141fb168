//! Core value objects shared by every component
//!
//! Requests are constructed per call and never mutated by the engine;
//! results are produced once, cached by canonical key, and shared as
//! immutable values after creation.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Enumerations
// ============================================================================

/// Time bucket granularity applied to timestamps for grouping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// Hourly buckets (`YYYY-MM-DD HH:00`)
    Hour,
    /// Daily buckets (`YYYY-MM-DD`)
    Day,
    /// Weekly buckets, keyed by the ISO week's Monday (`YYYY-MM-DD`)
    Week,
    /// Monthly buckets (`YYYY-MM`)
    Month,
    /// Quarterly buckets (`YYYY-Qn`)
    Quarter,
    /// Yearly buckets (`YYYY`)
    Year,
}

impl Granularity {
    /// Deterministically truncate a timestamp into its bucket label
    ///
    /// Two timestamps in the same bucket always produce the same label, so
    /// the label doubles as the grouping key for the `time` dimension.
    pub fn bucket(&self, ts: DateTime<Utc>) -> String {
        match self {
            Granularity::Hour => format!("{} {:02}:00", ts.format("%Y-%m-%d"), ts.hour()),
            Granularity::Day => ts.format("%Y-%m-%d").to_string(),
            Granularity::Week => {
                let monday = ts.date_naive()
                    - Duration::days(i64::from(ts.weekday().num_days_from_monday()));
                monday.format("%Y-%m-%d").to_string()
            },
            Granularity::Month => ts.format("%Y-%m").to_string(),
            Granularity::Quarter => {
                let quarter = (ts.month() - 1) / 3 + 1;
                format!("{}-Q{}", ts.year(), quarter)
            },
            Granularity::Year => ts.format("%Y").to_string(),
        }
    }

    /// Canonical lowercase name used in cache keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Hour => "hour",
            Granularity::Day => "day",
            Granularity::Week => "week",
            Granularity::Month => "month",
            Granularity::Quarter => "quarter",
            Granularity::Year => "year",
        }
    }
}

/// How a measure is folded across the records of a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationKind {
    /// Sum of values
    Sum,
    /// Arithmetic mean of values
    Avg,
    /// Count of records
    Count,
    /// Minimum value
    Min,
    /// Maximum value
    Max,
    /// Count of distinct values
    Distinct,
}

/// The axis type of a dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DimensionType {
    /// Discrete labels (tenant, channel, ...)
    Categorical,
    /// Numeric axis bucketed into ranges
    Numerical,
    /// Time axis, bucketed by granularity
    Temporal,
    /// Geographic axis (region, country, ...)
    Geographical,
}

/// The numeric kind of a measure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasureKind {
    /// Whole numbers (counts)
    Integer,
    /// Arbitrary decimals
    Decimal,
    /// Values in [0, 100]
    Percentage,
    /// Monetary amounts
    Currency,
}

// ============================================================================
// Date Range
// ============================================================================

/// Half-open time window `[start, end)` over which records are aggregated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// Inclusive window start
    pub start: DateTime<Utc>,
    /// Exclusive window end
    pub end: DateTime<Utc>,
}

impl DateRange {
    /// Create a new range; caller validates ordering via request validation
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Window length
    pub fn length(&self) -> Duration {
        self.end - self.start
    }

    /// The window of identical length immediately preceding this one
    ///
    /// Used by the comparison engine for period-over-period deltas.
    pub fn previous_window(&self) -> DateRange {
        let len = self.length();
        DateRange {
            start: self.start - len,
            end: self.start,
        }
    }

    /// True when `ts` falls inside the window
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }
}

// ============================================================================
// Aggregation Request
// ============================================================================

/// Declarative aggregation request submitted by the caller
///
/// Value object constructed per call. Filter keys the executor does not
/// recognize are ignored rather than rejected (intentional: callers share
/// one filter map across heterogeneous cubes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationRequest {
    /// Dimension names to group by; must exist in the registry
    pub dimensions: Vec<String>,

    /// Measure names to aggregate; must exist in the registry
    pub measures: Vec<String>,

    /// Bucketing granularity for the `time` dimension
    pub granularity: Granularity,

    /// Time window for the aggregation
    pub date_range: DateRange,

    /// String-keyed filters; ordered map so serialization is stable
    #[serde(default)]
    pub filters: BTreeMap<String, String>,

    /// Requested fold; measures with a registered aggregation keep their own
    pub aggregation: AggregationKind,

    /// Compute a period-over-period comparison block
    #[serde(default)]
    pub include_comparisons: bool,

    /// Placeholder, accepted but unused
    #[serde(default)]
    pub include_forecasts: bool,
}

impl AggregationRequest {
    /// Build a minimal request over the given dimensions and measures
    pub fn new(
        dimensions: Vec<String>,
        measures: Vec<String>,
        granularity: Granularity,
        date_range: DateRange,
    ) -> Self {
        Self {
            dimensions,
            measures,
            granularity,
            date_range,
            filters: BTreeMap::new(),
            aggregation: AggregationKind::Sum,
            include_comparisons: false,
            include_forecasts: false,
        }
    }

    /// Add a filter predicate
    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    /// Request the comparison block
    pub fn with_comparisons(mut self) -> Self {
        self.include_comparisons = true;
        self
    }
}

// ============================================================================
// Result Rows
// ============================================================================

/// Per-row quality metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowMetadata {
    /// Number of source records folded into this row
    pub record_count: u64,
    /// Confidence in [0, 1], derived from the record count
    pub confidence: f64,
    /// Data-quality score in [0, 1]
    pub data_quality: f64,
}

/// One grouped result row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRow {
    /// Grouping values keyed by dimension name (`time` maps to the bucket label)
    pub dimension_values: BTreeMap<String, String>,
    /// Aggregated values keyed by measure name
    pub measure_values: BTreeMap<String, f64>,
    /// Row quality metadata
    pub metadata: RowMetadata,
}

// ============================================================================
// Summary Statistics
// ============================================================================

/// One entry in a dimension's frequency distribution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrequencyEntry {
    /// The dimension value
    pub value: String,
    /// Occurrence count across rows
    pub count: u64,
    /// Share of total rows, in percent
    pub percentage: f64,
}

/// Descriptive statistics for one dimension
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionSummary {
    /// Count of distinct values observed
    pub distinct_count: u64,
    /// Count of null/unknown values
    pub null_count: u64,
    /// Distribution sorted descending by count
    pub distribution: Vec<FrequencyEntry>,
}

/// Rank-based percentiles for a measure
///
/// Computed with the nearest-lower-rank rule: sort ascending, index =
/// floor(count x percentile), no interpolation. Callers must not assume
/// linear interpolation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Percentiles {
    /// 25th percentile
    pub p25: f64,
    /// 50th percentile (median under the rank rule)
    pub p50: f64,
    /// 75th percentile
    pub p75: f64,
    /// 90th percentile
    pub p90: f64,
    /// 95th percentile
    pub p95: f64,
}

/// Descriptive statistics for one measure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasureSummary {
    /// Sum of values across rows
    pub sum: f64,
    /// Arithmetic mean
    pub avg: f64,
    /// Minimum value
    pub min: f64,
    /// Maximum value
    pub max: f64,
    /// Population standard deviation
    pub std_dev: f64,
    /// Nearest-lower-rank percentiles
    pub percentiles: Percentiles,
}

/// Per-dimension and per-measure statistics for a result set
///
/// Computed once per result and cached only as part of the owning
/// [`AggregationResult`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummaryStatistics {
    /// Keyed by dimension name
    pub dimensions: BTreeMap<String, DimensionSummary>,
    /// Keyed by measure name
    pub measures: BTreeMap<String, MeasureSummary>,
}

// ============================================================================
// Insights
// ============================================================================

/// The kind of automatically derived insight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightKind {
    /// Directional movement of a measure over time buckets
    Trend,
    /// Outlier values relative to the measure's own distribution
    Anomaly,
    /// Linear association between two measures
    Correlation,
}

/// One automatically derived insight
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    /// Insight kind
    pub kind: InsightKind,
    /// The measure (or measure pair) the insight describes
    pub subject: String,
    /// Human-readable description
    pub description: String,
    /// Significance in [0, 1]; the final list is sorted descending by this
    pub significance: f64,
    /// Confidence in [0, 1]
    pub confidence: f64,
}

// ============================================================================
// Comparison Block
// ============================================================================

/// Placeholder benchmark figures
///
/// Illustrative values only; not derived from real external data. Wire a
/// real `BenchmarkSource` before production use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Benchmark {
    /// Industry-average figure
    pub industry_average: f64,
    /// Internal target figure
    pub target: f64,
    /// Variance versus target, in percent
    pub variance: f64,
}

/// Period-over-period delta for one measure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasureComparison {
    /// Total over the current window
    pub current_total: f64,
    /// Total over the previous window
    pub previous_total: f64,
    /// `current_total - previous_total`
    pub change: f64,
    /// `change / previous_total * 100`, 0 when the previous total is 0
    pub change_percentage: f64,
    /// Benchmark figures for this measure
    pub benchmark: Benchmark,
}

/// Comparison of the current window against the immediately preceding one
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonBlock {
    /// The previous window that was aggregated
    pub previous_range: DateRange,
    /// Per-measure deltas keyed by measure name
    pub measures: BTreeMap<String, MeasureComparison>,
}

// ============================================================================
// Aggregation Result
// ============================================================================

/// The composed output of one aggregation request
///
/// Produced once per request, cached by canonical key, never mutated after
/// creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationResult {
    /// Opaque result identifier
    pub id: String,
    /// Creation timestamp
    pub generated_at: DateTime<Utc>,
    /// Echo of the originating request
    pub request: AggregationRequest,
    /// Grouped rows, capped at the executor's row limit
    pub rows: Vec<ResultRow>,
    /// Per-dimension and per-measure statistics
    pub summary: SummaryStatistics,
    /// Present only when the request asked for comparisons
    pub comparison: Option<ComparisonBlock>,
    /// Derived insights, sorted descending by significance
    pub insights: Vec<Insight>,
}

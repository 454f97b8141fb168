//! Query builder
//!
//! Translates a declarative [`AggregationRequest`] into a validated
//! [`BoundQuery`]: every dimension and measure is resolved through the
//! registry (unknown names are a validation error, not silently dropped),
//! recognized filter keys become predicates, and the request is classified
//! as critical-path or not.
//!
//! Filters are deliberately permissive: callers share one filter map across
//! heterogeneous cubes, so keys the engine does not recognize are ignored
//! rather than rejected.

use std::sync::Arc;

use crate::config::QueryConfig;
use crate::error::ValidationError;
use crate::registry::Registry;
use crate::types::{AggregationKind, AggregationRequest, DateRange, Granularity};

/// Recognized filter key: equality on the owning tenant
pub const FILTER_TENANT: &str = "tenant_id";
/// Recognized filter key: minimum record amount
pub const FILTER_MIN_AMOUNT: &str = "min_amount";

/// A dimension resolved to its backing column
#[derive(Debug, Clone)]
pub struct BoundDimension {
    /// Request name
    pub name: String,
    /// Backing column or join path
    pub column: String,
    /// True for the `time` dimension, which buckets by granularity
    pub is_time: bool,
}

/// A measure resolved to its aggregate expression
#[derive(Debug, Clone)]
pub struct BoundMeasure {
    /// Request name
    pub name: String,
    /// Backing numeric (or distinct-token) column
    pub column: String,
    /// The registered fold for this measure
    pub aggregation: AggregationKind,
}

/// A validated, executable query
#[derive(Debug, Clone)]
pub struct BoundQuery {
    /// Resolved grouping dimensions, in request order
    pub dimensions: Vec<BoundDimension>,
    /// Resolved measures, in request order
    pub measures: Vec<BoundMeasure>,
    /// Time bucketing granularity
    pub granularity: Granularity,
    /// Scan window
    pub range: DateRange,
    /// Tenant equality predicate, if the filter was present
    pub tenant_filter: Option<String>,
    /// Minimum-amount predicate, if the filter was present and parsed
    pub min_amount: Option<f64>,
    /// True when the request must meet the critical-path deadline
    pub critical: bool,
}

impl BoundQuery {
    /// The same query over a different window
    ///
    /// Used by the comparison engine for the previous period.
    pub fn with_range(&self, range: DateRange) -> BoundQuery {
        let mut query = self.clone();
        query.range = range;
        query
    }
}

/// Validates requests against the registry and binds them for execution
pub struct QueryBuilder {
    registry: Arc<Registry>,
    config: QueryConfig,
}

impl QueryBuilder {
    /// Create a builder over the given registry
    pub fn new(registry: Arc<Registry>, config: QueryConfig) -> Self {
        Self { registry, config }
    }

    /// Validate and bind a request
    pub fn bind(&self, request: &AggregationRequest) -> Result<BoundQuery, ValidationError> {
        if request.date_range.start >= request.date_range.end {
            return Err(ValidationError::InvalidDateRange {
                start: request.date_range.start.to_rfc3339(),
                end: request.date_range.end.to_rfc3339(),
            });
        }
        if request.measures.is_empty() {
            return Err(ValidationError::NoMeasures);
        }

        let mut dimensions = Vec::with_capacity(request.dimensions.len());
        for name in &request.dimensions {
            let dimension = self
                .registry
                .dimension(name)
                .ok_or_else(|| ValidationError::UnknownDimension(name.clone()))?;
            dimensions.push(BoundDimension {
                name: dimension.name,
                column: dimension.source_column,
                is_time: name == "time",
            });
        }

        let mut measures = Vec::with_capacity(request.measures.len());
        for name in &request.measures {
            let measure = self
                .registry
                .measure(name)
                .ok_or_else(|| ValidationError::UnknownMeasure(name.clone()))?;
            measures.push(BoundMeasure {
                name: measure.name,
                column: measure.source_column,
                aggregation: measure.aggregation,
            });
        }

        let tenant_filter = request.filters.get(FILTER_TENANT).cloned();
        // A non-numeric min_amount is treated as absent, in line with the
        // permissive filter contract
        let min_amount = request
            .filters
            .get(FILTER_MIN_AMOUNT)
            .and_then(|v| v.parse::<f64>().ok());

        let critical = self.is_critical(request);

        Ok(BoundQuery {
            dimensions,
            measures,
            granularity: request.granularity,
            range: request.date_range,
            tenant_filter,
            min_amount,
            critical,
        })
    }

    /// Critical-path classification
    ///
    /// A request is critical when its measures and dimensions are drawn
    /// entirely from the configured allow-lists and it stays within two
    /// dimensions and three measures.
    fn is_critical(&self, request: &AggregationRequest) -> bool {
        request.dimensions.len() <= 2
            && request.measures.len() <= 3
            && request
                .dimensions
                .iter()
                .all(|d| self.config.critical_dimensions.contains(d))
            && request
                .measures
                .iter()
                .all(|m| self.config.critical_measures.contains(m))
    }
}

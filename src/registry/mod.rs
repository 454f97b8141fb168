//! Cube & Lineage Registry
//!
//! In-memory, keyed-by-id metadata store for cube definitions and lineage
//! records, pre-populated at startup from a static built-in catalog rather
//! than derived from live schema introspection. Dimensions and measures are
//! immutable once registered; requests referencing names that are not
//! registered are rejected during validation.
//!
//! Lineage data is declared metadata, not computed from an actual
//! dependency graph. Production use requires backing this with a real
//! lineage source.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{AggregationKind, DimensionType, MeasureKind};

// ============================================================================
// Metadata Types
// ============================================================================

/// Declared share of records carrying one dimension value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueShare {
    /// The dimension value
    pub value: String,
    /// Expected fraction of records, in [0, 1]
    pub share: f64,
}

/// A grouping axis registered with the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dimension {
    /// Stable identifier
    pub id: String,
    /// Name used in requests
    pub name: String,
    /// Axis type
    pub dimension_type: DimensionType,
    /// Hierarchy levels, coarse to fine (e.g. year > quarter > month)
    pub hierarchy: Vec<String>,
    /// Approximate number of distinct values
    pub cardinality: u64,
    /// Declared value distribution; empty for temporal or long-tail axes
    pub value_distribution: Vec<ValueShare>,
    /// Backing column or join path in the source table
    pub source_column: String,
}

/// A numeric quantity registered with the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measure {
    /// Stable identifier
    pub id: String,
    /// Name used in requests
    pub name: String,
    /// Numeric kind
    pub kind: MeasureKind,
    /// How this measure folds across a group
    pub aggregation: AggregationKind,
    /// Display unit (e.g. "USD", "count")
    pub unit: String,
    /// Free-text business-rule constraints
    pub business_rules: Vec<String>,
    /// Backing column in the source table
    pub source_column: String,
}

/// Five quality sub-scores plus the overall score for a cube
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CubeQuality {
    /// Share of non-null required fields
    pub completeness: f64,
    /// Agreement with the system of record
    pub accuracy: f64,
    /// Cross-partition agreement
    pub consistency: f64,
    /// Freshness relative to the refresh schedule
    pub timeliness: f64,
    /// Share of rows passing validation rules
    pub validity: f64,
    /// Overall score
    pub overall: f64,
}

/// A named bundle of dimensions, measures and a backing source
///
/// Created at startup from static configuration; read-only thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CubeDefinition {
    /// Stable identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Dimensions available on this cube
    pub dimensions: Vec<Dimension>,
    /// Measures available on this cube
    pub measures: Vec<Measure>,
    /// Backing table reference
    pub source_table: String,
    /// Refresh frequency (e.g. "hourly")
    pub refresh_frequency: String,
    /// Quality scores
    pub quality: CubeQuality,
    /// Approximate row count
    pub row_count: u64,
    /// Approximate size in bytes
    pub size_bytes: u64,
    /// Partition strategy (e.g. "by day")
    pub partition_strategy: String,
}

/// The kind of entity a lineage record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    /// A cube definition
    Cube,
    /// An ETL pipeline
    Pipeline,
    /// A backing table
    Table,
}

/// One declared lineage edge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineageEdge {
    /// The related entity's identifier
    pub entity_id: String,
    /// Relationship kind (e.g. "feeds", "derived-from")
    pub relation: String,
    /// Confidence or impact rating in [0, 1]
    pub rating: f64,
}

/// Declared upstream/downstream relationships for one entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineageRecord {
    /// The entity this record describes
    pub entity_id: String,
    /// Entity kind
    pub entity_type: EntityType,
    /// Entities this one consumes
    pub upstream: Vec<LineageEdge>,
    /// Entities consuming this one
    pub downstream: Vec<LineageEdge>,
}

// ============================================================================
// Registry
// ============================================================================

/// In-memory metadata store for cubes and lineage
pub struct Registry {
    cubes: RwLock<HashMap<String, CubeDefinition>>,
    lineage: RwLock<HashMap<(String, EntityType), LineageRecord>>,
    /// Flattened dimension lookup across cubes, keyed by request name
    dimensions: RwLock<HashMap<String, Dimension>>,
    /// Flattened measure lookup across cubes, keyed by request name
    measures: RwLock<HashMap<String, Measure>>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            cubes: RwLock::new(HashMap::new()),
            lineage: RwLock::new(HashMap::new()),
            dimensions: RwLock::new(HashMap::new()),
            measures: RwLock::new(HashMap::new()),
        }
    }

    /// Create a registry pre-populated with the built-in sales catalog
    pub fn with_builtin_catalog() -> Self {
        let registry = Self::new();
        registry.register_cube(builtin_sales_cube());
        registry.register_lineage(builtin_sales_lineage());
        registry
    }

    /// Register a cube and index its dimensions and measures by name
    pub fn register_cube(&self, cube: CubeDefinition) {
        {
            let mut dims = self.dimensions.write();
            for d in &cube.dimensions {
                dims.entry(d.name.clone()).or_insert_with(|| d.clone());
            }
        }
        {
            let mut measures = self.measures.write();
            for m in &cube.measures {
                measures.entry(m.name.clone()).or_insert_with(|| m.clone());
            }
        }
        self.cubes.write().insert(cube.id.clone(), cube);
    }

    /// Register a lineage record
    pub fn register_lineage(&self, record: LineageRecord) {
        self.lineage
            .write()
            .insert((record.entity_id.clone(), record.entity_type), record);
    }

    /// Look up a cube by id
    pub fn cube(&self, id: &str) -> Option<CubeDefinition> {
        self.cubes.read().get(id).cloned()
    }

    /// All registered cubes
    pub fn cubes(&self) -> Vec<CubeDefinition> {
        let mut cubes: Vec<CubeDefinition> = self.cubes.read().values().cloned().collect();
        cubes.sort_by(|a, b| a.id.cmp(&b.id));
        cubes
    }

    /// Declared lineage for an entity, if any
    pub fn lineage(&self, entity_id: &str, entity_type: EntityType) -> Option<LineageRecord> {
        self.lineage
            .read()
            .get(&(entity_id.to_string(), entity_type))
            .cloned()
    }

    /// Look up a dimension by request name
    pub fn dimension(&self, name: &str) -> Option<Dimension> {
        self.dimensions.read().get(name).cloned()
    }

    /// Look up a measure by request name
    pub fn measure(&self, name: &str) -> Option<Measure> {
        self.measures.read().get(name).cloned()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_builtin_catalog()
    }
}

// ============================================================================
// Built-in Catalog
// ============================================================================

fn dim(
    id: &str,
    name: &str,
    dimension_type: DimensionType,
    hierarchy: &[&str],
    cardinality: u64,
    distribution: &[(&str, f64)],
    source_column: &str,
) -> Dimension {
    Dimension {
        id: id.to_string(),
        name: name.to_string(),
        dimension_type,
        hierarchy: hierarchy.iter().map(|s| s.to_string()).collect(),
        cardinality,
        value_distribution: distribution
            .iter()
            .map(|(value, share)| ValueShare {
                value: value.to_string(),
                share: *share,
            })
            .collect(),
        source_column: source_column.to_string(),
    }
}

fn measure(
    id: &str,
    name: &str,
    kind: MeasureKind,
    aggregation: AggregationKind,
    unit: &str,
    rules: &[&str],
    source_column: &str,
) -> Measure {
    Measure {
        id: id.to_string(),
        name: name.to_string(),
        kind,
        aggregation,
        unit: unit.to_string(),
        business_rules: rules.iter().map(|s| s.to_string()).collect(),
        source_column: source_column.to_string(),
    }
}

/// The static sales cube shipped with the engine
fn builtin_sales_cube() -> CubeDefinition {
    CubeDefinition {
        id: "sales".to_string(),
        name: "Sales Analytics".to_string(),
        dimensions: vec![
            dim(
                "dim-time",
                "time",
                DimensionType::Temporal,
                &["year", "quarter", "month", "week", "day", "hour"],
                0,
                &[],
                "occurred_at",
            ),
            dim(
                "dim-tenant",
                "tenant",
                DimensionType::Categorical,
                &["tenant"],
                500,
                &[],
                "tenant_id",
            ),
            dim(
                "dim-region",
                "region",
                DimensionType::Geographical,
                &["continent", "country", "region"],
                40,
                &[("amer", 0.38), ("emea", 0.36), ("apac", 0.26)],
                "region",
            ),
            dim(
                "dim-channel",
                "channel",
                DimensionType::Categorical,
                &["channel"],
                6,
                &[("web", 0.55), ("mobile", 0.30), ("store", 0.15)],
                "channel",
            ),
            dim(
                "dim-category",
                "product_category",
                DimensionType::Categorical,
                &["department", "category"],
                120,
                &[
                    ("electronics", 0.32),
                    ("apparel", 0.27),
                    ("home", 0.22),
                    ("grocery", 0.19),
                ],
                "product_category",
            ),
        ],
        measures: vec![
            measure(
                "m-revenue",
                "revenue",
                MeasureKind::Currency,
                AggregationKind::Sum,
                "USD",
                &["non-negative", "net of refunds"],
                "amount",
            ),
            measure(
                "m-orders",
                "orders",
                MeasureKind::Integer,
                AggregationKind::Distinct,
                "count",
                &["distinct order ids"],
                "order_id",
            ),
            measure(
                "m-units",
                "units",
                MeasureKind::Integer,
                AggregationKind::Sum,
                "count",
                &[],
                "units",
            ),
            measure(
                "m-discount",
                "discount_rate",
                MeasureKind::Percentage,
                AggregationKind::Avg,
                "%",
                &["bounded to [0, 100]"],
                "discount_rate",
            ),
            measure(
                "m-basket",
                "avg_basket",
                MeasureKind::Currency,
                AggregationKind::Avg,
                "USD",
                &[],
                "amount",
            ),
        ],
        source_table: "fact_sales".to_string(),
        refresh_frequency: "hourly".to_string(),
        quality: CubeQuality {
            completeness: 0.98,
            accuracy: 0.96,
            consistency: 0.97,
            timeliness: 0.99,
            validity: 0.97,
            overall: 0.97,
        },
        row_count: 48_000_000,
        size_bytes: 12 * 1024 * 1024 * 1024,
        partition_strategy: "by day".to_string(),
    }
}

fn builtin_sales_lineage() -> LineageRecord {
    LineageRecord {
        entity_id: "sales".to_string(),
        entity_type: EntityType::Cube,
        upstream: vec![
            LineageEdge {
                entity_id: "fact_sales".to_string(),
                relation: "derived-from".to_string(),
                rating: 0.95,
            },
            LineageEdge {
                entity_id: "daily-sales-load".to_string(),
                relation: "refreshed-by".to_string(),
                rating: 0.9,
            },
        ],
        downstream: vec![LineageEdge {
            entity_id: "executive-dashboard".to_string(),
            relation: "feeds".to_string(),
            rating: 0.8,
        }],
    }
}

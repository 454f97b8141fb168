//! CubeFlow - Multi-dimensional business-analytics aggregation engine
//!
//! This library turns a declarative query (dimensions, measures, time
//! window, filters) into:
//! - Grouped numeric result rows with per-row quality metadata
//! - Descriptive statistics per dimension and measure
//! - Automatically derived insights (trend, anomaly, correlation)
//! - Optional period-over-period comparison blocks
//!
//! Results are memoized in a two-tier cache (bounded in-process map plus a
//! distributed tier) and critical-path requests race a hard deadline. A
//! simulated batch-pipeline quality tracker and a static cube/lineage
//! registry round out the engine.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod error;
pub mod registry;
pub mod types;

/// Configuration management with TOML support
pub mod config;

/// Two-tier result caching (local map + distributed tier)
pub mod cache;

/// Query building, validation and deadline-bounded execution
pub mod query;

/// Descriptive statistics over result rows
pub mod stats;

/// Trend, anomaly and correlation detection
pub mod insight;

/// Period-over-period comparison, reusing the executor
pub mod compare;

/// ETL pipeline simulation and quality scoring
pub mod etl;

/// Background services (cache sweeper) with graceful shutdown
pub mod services;

// Re-export main types
pub use engine::{AnalyticsEngine, AnalyticsEngineBuilder};
pub use error::{Error, Result};
pub use types::{AggregationRequest, AggregationResult, DateRange, Granularity};

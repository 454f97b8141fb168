//! Query building and aggregation execution
//!
//! Translates validated requests into bounded scans against the data-store
//! collaborator and shapes the records into grouped result rows, enforcing
//! the row cap and the critical-path deadline.

pub mod builder;
pub mod datastore;
pub mod executor;

pub use builder::{BoundDimension, BoundMeasure, BoundQuery, QueryBuilder};
pub use datastore::{DataStore, InMemoryDataStore, SourceRecord};
pub use executor::{AggregationExecutor, ExecutorStats};

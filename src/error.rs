//! Error types for the analytics engine

use thiserror::Error;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum Error {
    /// Request validation error
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Query execution error
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    /// Cache error
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// ETL pipeline error
    #[error("ETL error: {0}")]
    Etl(#[from] EtlError),

    /// Background-service error
    #[error("Service error: {0}")]
    Service(#[from] crate::services::ServiceError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// General error
    #[error("{0}")]
    General(String),
}

/// Request validation errors
///
/// Validation failures are field-level and are never retried by the engine.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Dimension name not present in the registry
    #[error("Unknown dimension: {0}")]
    UnknownDimension(String),

    /// Measure name not present in the registry
    #[error("Unknown measure: {0}")]
    UnknownMeasure(String),

    /// Date range start is not before end
    #[error("Invalid date range: start {start} is not before end {end}")]
    InvalidDateRange {
        /// Range start
        start: String,
        /// Range end
        end: String,
    },

    /// Request has no measures
    #[error("Request must name at least one measure")]
    NoMeasures,

    /// Required field is missing
    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Query execution errors
#[derive(Error, Debug)]
pub enum QueryError {
    /// Critical-path deadline expired before the computation finished
    ///
    /// Surfaced distinctly from generic failures so callers can retry with
    /// a smaller or relaxed request. The engine itself never auto-retries.
    #[error("Critical-path deadline of {deadline_ms}ms exceeded")]
    DeadlineExceeded {
        /// The deadline that was exceeded, in milliseconds
        deadline_ms: u64,
    },

    /// The backing data store failed; no partial rows are returned
    #[error("Data store error: {0}")]
    DataStore(String),

    /// The executor task was cancelled before producing a result
    #[error("Query cancelled")]
    Cancelled,

    /// Internal executor failure
    #[error("Execution failed: {0}")]
    Internal(String),
}

/// Cache-tier errors
///
/// Distributed-tier failures are logged and degraded to a miss by the
/// cache manager; they never surface as a request failure.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Distributed tier unreachable
    #[error("Cache tier unreachable: {0}")]
    Unreachable(String),

    /// Distributed-tier operation timed out
    #[error("Cache tier timeout after {0:?}")]
    Timeout(std::time::Duration),

    /// Payload could not be decoded
    #[error("Malformed cache payload: {0}")]
    MalformedPayload(String),
}

/// ETL pipeline errors
///
/// Quality-rule violations are not errors: a failed reject rule aborts the
/// remaining steps but the run still returns its monitoring block with the
/// partial counts and a failed status.
#[derive(Error, Debug)]
pub enum EtlError {
    /// Pipeline configuration is invalid
    #[error("Invalid pipeline: {0}")]
    InvalidPipeline(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

//! Canonical cache keys
//!
//! Two requests that differ only in the ordering of their dimension list,
//! measure list or filter keys must produce the same key. The canonical
//! representation sorts every list, serializes the date range with a fixed
//! format, and hashes to a fixed-length opaque hex string.

use std::hash::{DefaultHasher, Hash, Hasher};

use crate::types::AggregationRequest;

/// Fixed timestamp format used inside the canonical representation
const RANGE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Compute the canonical cache key for a request
///
/// The hash uses `DefaultHasher::new()` (SipHash with fixed keys), so keys
/// agree across processes running identical binaries and remain valid in
/// the shared distributed tier. The algorithm is only guaranteed stable
/// within one compiler release: a fleet mixing binaries from different
/// Rust versions may cold-start the distributed tier after an upgrade.
pub fn canonical_key(request: &AggregationRequest) -> String {
    let mut dimensions = request.dimensions.clone();
    dimensions.sort();
    let mut measures = request.measures.clone();
    measures.sort();

    // BTreeMap iteration is already sorted by key
    let filters: Vec<String> = request
        .filters
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();

    let canonical = format!(
        "d:{}|m:{}|g:{}|r:{}/{}|f:{}|a:{:?}|c:{}",
        dimensions.join(","),
        measures.join(","),
        request.granularity.as_str(),
        request.date_range.start.format(RANGE_FORMAT),
        request.date_range.end.format(RANGE_FORMAT),
        filters.join(","),
        request.aggregation,
        request.include_comparisons,
    );

    let mut hasher = DefaultHasher::new();
    canonical.hash(&mut hasher);
    format!("agg:{:016x}", hasher.finish())
}

//! Statistics engine
//!
//! Descriptive statistics over one result set, computed once per result
//! and cached only as part of the owning `AggregationResult`.
//!
//! Percentiles use the nearest-lower-rank rule: sort ascending, index =
//! floor(count x percentile), no interpolation. This diverges from
//! interpolated-percentile conventions on purpose; callers must not assume
//! linear interpolation.

use std::collections::BTreeMap;

use crate::types::{
    DimensionSummary, FrequencyEntry, MeasureSummary, Percentiles, ResultRow, SummaryStatistics,
};

/// Compute per-dimension and per-measure statistics for a result set
pub fn summarize(
    rows: &[ResultRow],
    dimensions: &[String],
    measures: &[String],
) -> SummaryStatistics {
    let mut summary = SummaryStatistics::default();

    for dimension in dimensions {
        summary
            .dimensions
            .insert(dimension.clone(), summarize_dimension(rows, dimension));
    }
    for measure in measures {
        let values = measure_series(rows, measure);
        summary
            .measures
            .insert(measure.clone(), summarize_measure(&values));
    }
    summary
}

/// Extract a measure's value series in row order
pub fn measure_series(rows: &[ResultRow], measure: &str) -> Vec<f64> {
    rows.iter()
        .filter_map(|r| r.measure_values.get(measure).copied())
        .collect()
}

fn summarize_dimension(rows: &[ResultRow], dimension: &str) -> DimensionSummary {
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    let mut null_count = 0u64;

    for row in rows {
        match row.dimension_values.get(dimension) {
            Some(value) if !value.is_empty() && value != "unknown" => {
                *counts.entry(value.clone()).or_default() += 1;
            },
            _ => null_count += 1,
        }
    }

    let total: u64 = counts.values().sum::<u64>() + null_count;
    let mut distribution: Vec<FrequencyEntry> = counts
        .iter()
        .map(|(value, &count)| FrequencyEntry {
            value: value.clone(),
            count,
            percentage: if total == 0 {
                0.0
            } else {
                count as f64 / total as f64 * 100.0
            },
        })
        .collect();
    // Descending by count; ties keep the BTreeMap's value order
    distribution.sort_by(|a, b| b.count.cmp(&a.count));

    DimensionSummary {
        distinct_count: counts.len() as u64,
        null_count,
        distribution,
    }
}

fn summarize_measure(values: &[f64]) -> MeasureSummary {
    if values.is_empty() {
        return MeasureSummary {
            sum: 0.0,
            avg: 0.0,
            min: 0.0,
            max: 0.0,
            std_dev: 0.0,
            percentiles: Percentiles {
                p25: 0.0,
                p50: 0.0,
                p75: 0.0,
                p90: 0.0,
                p95: 0.0,
            },
        };
    }

    let sum: f64 = values.iter().sum();
    let avg = sum / values.len() as f64;
    let min = values.iter().fold(f64::INFINITY, |a, &b| a.min(b));
    let max = values.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    let std_dev = population_std_dev(values, avg);

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    MeasureSummary {
        sum,
        avg,
        min,
        max,
        std_dev,
        percentiles: Percentiles {
            p25: nearest_lower_rank(&sorted, 0.25),
            p50: nearest_lower_rank(&sorted, 0.50),
            p75: nearest_lower_rank(&sorted, 0.75),
            p90: nearest_lower_rank(&sorted, 0.90),
            p95: nearest_lower_rank(&sorted, 0.95),
        },
    }
}

/// Population standard deviation (divide by n, not n-1)
pub fn population_std_dev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Nearest-lower-rank percentile over an ascending-sorted slice
fn nearest_lower_rank(sorted: &[f64], percentile: f64) -> f64 {
    let index = ((sorted.len() as f64 * percentile).floor() as usize).min(sorted.len() - 1);
    sorted[index]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RowMetadata;

    fn row(dims: &[(&str, &str)], measures: &[(&str, f64)]) -> ResultRow {
        ResultRow {
            dimension_values: dims
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            measure_values: measures
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            metadata: RowMetadata {
                record_count: 1,
                confidence: 1.0,
                data_quality: 1.0,
            },
        }
    }

    #[test]
    fn test_dimension_distribution_sorted_descending() {
        let rows = vec![
            row(&[("tenant", "a")], &[]),
            row(&[("tenant", "b")], &[]),
            row(&[("tenant", "b")], &[]),
            row(&[("tenant", "b")], &[]),
            row(&[("tenant", "c")], &[]),
        ];
        let summary = summarize(&rows, &["tenant".to_string()], &[]);
        let dim = &summary.dimensions["tenant"];
        assert_eq!(dim.distinct_count, 3);
        assert_eq!(dim.null_count, 0);
        assert_eq!(dim.distribution[0].value, "b");
        assert_eq!(dim.distribution[0].count, 3);
        assert!((dim.distribution[0].percentage - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_counts_as_null() {
        let rows = vec![
            row(&[("region", "unknown")], &[]),
            row(&[("region", "emea")], &[]),
            row(&[], &[]),
        ];
        let summary = summarize(&rows, &["region".to_string()], &[]);
        let dim = &summary.dimensions["region"];
        assert_eq!(dim.null_count, 2);
        assert_eq!(dim.distinct_count, 1);
    }

    #[test]
    fn test_measure_summary_basics() {
        let rows: Vec<ResultRow> = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]
            .iter()
            .map(|v| row(&[], &[("x", *v)]))
            .collect();
        let summary = summarize(&rows, &[], &["x".to_string()]);
        let m = &summary.measures["x"];
        assert_eq!(m.sum, 40.0);
        assert_eq!(m.avg, 5.0);
        assert_eq!(m.min, 2.0);
        assert_eq!(m.max, 9.0);
        // Classic population-stddev example: sigma = 2
        assert!((m.std_dev - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_nearest_lower_rank_no_interpolation() {
        // n = 4: p50 index = floor(4 * 0.5) = 2
        let sorted = [10.0, 20.0, 30.0, 40.0];
        assert_eq!(nearest_lower_rank(&sorted, 0.50), 30.0);
        // p95 index = floor(3.8) = 3
        assert_eq!(nearest_lower_rank(&sorted, 0.95), 40.0);
        // p25 index = floor(1.0) = 1
        assert_eq!(nearest_lower_rank(&sorted, 0.25), 20.0);
    }

    #[test]
    fn test_percentile_monotonicity_property() {
        let series: Vec<f64> = (0..137).map(|i| ((i * 31) % 97) as f64).collect();
        let rows: Vec<ResultRow> = series.iter().map(|v| row(&[], &[("x", *v)])).collect();
        let summary = summarize(&rows, &[], &["x".to_string()]);
        let p = &summary.measures["x"].percentiles;
        assert!(p.p25 <= p.p50);
        assert!(p.p50 <= p.p75);
        assert!(p.p75 <= p.p90);
        assert!(p.p90 <= p.p95);
    }

    #[test]
    fn test_empty_rows_produce_zeroed_summary() {
        let summary = summarize(&[], &["tenant".to_string()], &["x".to_string()]);
        assert_eq!(summary.dimensions["tenant"].distinct_count, 0);
        assert_eq!(summary.measures["x"].sum, 0.0);
        assert_eq!(summary.measures["x"].std_dev, 0.0);
    }
}

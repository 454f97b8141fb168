//! Insight engine
//!
//! Runs after the statistics engine and produces a flat list of derived
//! insights, sorted descending by significance:
//!
//! - **Trend**: ordinary least squares of per-bucket totals against the
//!   bucket index, reported when the mean-normalized slope clears the
//!   configured threshold.
//! - **Anomaly**: values beyond the configured sigma distance from the
//!   mean; one aggregate insight per measure stating the count, never one
//!   insight per anomalous point.
//! - **Correlation**: Pearson coefficient for every unordered measure
//!   pair, reported when |r| clears the configured threshold.

use std::collections::BTreeMap;

use crate::config::InsightConfig;
use crate::stats::{measure_series, population_std_dev};
use crate::types::{Insight, InsightKind, ResultRow};

/// Derive insights over a result set
///
/// `has_time_dimension` gates trend detection: without the `time` dimension
/// there is no chronological axis to regress against.
pub fn detect(
    rows: &[ResultRow],
    measures: &[String],
    has_time_dimension: bool,
    config: &InsightConfig,
) -> Vec<Insight> {
    let mut insights = Vec::new();

    if has_time_dimension {
        for measure in measures {
            if let Some(insight) = detect_trend(rows, measure, config) {
                insights.push(insight);
            }
        }
    }

    for measure in measures {
        let values = measure_series(rows, measure);
        if let Some(insight) = detect_anomalies(measure, &values, config) {
            insights.push(insight);
        }
    }

    for i in 0..measures.len() {
        for j in (i + 1)..measures.len() {
            let a = measure_series(rows, &measures[i]);
            let b = measure_series(rows, &measures[j]);
            if let Some(insight) =
                detect_correlation(&measures[i], &measures[j], &a, &b, config)
            {
                insights.push(insight);
            }
        }
    }

    insights.sort_by(|a, b| {
        b.significance
            .partial_cmp(&a.significance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    insights
}

// ============================================================================
// Trend
// ============================================================================

/// Slope and goodness-of-fit of a least-squares line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendFit {
    /// Slope of value against point index
    pub slope: f64,
    /// Coefficient of determination in [0, 1]
    pub r_squared: f64,
}

/// Ordinary least squares of `values` against their indices
pub fn linear_fit(values: &[f64]) -> Option<TrendFit> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let n_f = n as f64;
    let sum_x: f64 = (0..n).map(|i| i as f64).sum();
    let sum_y: f64 = values.iter().sum();
    let sum_xy: f64 = values.iter().enumerate().map(|(i, v)| i as f64 * v).sum();
    let sum_x2: f64 = (0..n).map(|i| (i as f64).powi(2)).sum();

    let denominator = n_f * sum_x2 - sum_x * sum_x;
    if denominator == 0.0 {
        return None;
    }
    let slope = (n_f * sum_xy - sum_x * sum_y) / denominator;
    let intercept = (sum_y - slope * sum_x) / n_f;

    let mean_y = sum_y / n_f;
    let ss_tot: f64 = values.iter().map(|v| (v - mean_y).powi(2)).sum();
    let ss_res: f64 = values
        .iter()
        .enumerate()
        .map(|(i, v)| (v - (slope * i as f64 + intercept)).powi(2))
        .sum();
    let r_squared = if ss_tot == 0.0 {
        // A perfectly flat series is perfectly explained by a flat line
        1.0
    } else {
        (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
    };

    Some(TrendFit { slope, r_squared })
}

fn detect_trend(rows: &[ResultRow], measure: &str, config: &InsightConfig) -> Option<Insight> {
    // Collapse rows to one total per time bucket; bucket labels sort
    // chronologically for every granularity format
    let mut per_bucket: BTreeMap<String, f64> = BTreeMap::new();
    for row in rows {
        let bucket = row.dimension_values.get("time")?;
        let value = row.measure_values.get(measure).copied().unwrap_or(0.0);
        *per_bucket.entry(bucket.clone()).or_default() += value;
    }
    if per_bucket.len() < 3 {
        return None;
    }

    let series: Vec<f64> = per_bucket.values().copied().collect();
    let fit = linear_fit(&series)?;

    // Normalize the slope by the series mean so the threshold is unit-free
    let mean = series.iter().sum::<f64>() / series.len() as f64;
    let normalized_slope = if mean.abs() < f64::EPSILON {
        0.0
    } else {
        fit.slope / mean.abs()
    };
    if normalized_slope.abs() <= config.trend_slope_threshold {
        return None;
    }

    let direction = if normalized_slope > 0.0 { "upward" } else { "downward" };
    Some(Insight {
        kind: InsightKind::Trend,
        subject: measure.to_string(),
        description: format!(
            "{} shows an {} trend of {:.1}% per bucket over {} buckets",
            measure,
            direction,
            normalized_slope * 100.0,
            per_bucket.len()
        ),
        significance: (normalized_slope.abs() * 2.0).min(1.0),
        confidence: fit.r_squared,
    })
}

// ============================================================================
// Anomaly
// ============================================================================

fn detect_anomalies(measure: &str, values: &[f64], config: &InsightConfig) -> Option<Insight> {
    if values.len() < 6 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let std_dev = population_std_dev(values, mean);
    if std_dev == 0.0 {
        return None;
    }

    let mut count = 0usize;
    let mut max_z = 0.0f64;
    for value in values {
        let z = (value - mean).abs() / std_dev;
        if z > config.anomaly_sigma {
            count += 1;
            max_z = max_z.max(z);
        }
    }
    if count == 0 {
        return None;
    }

    // One aggregate insight for the measure, not one per anomalous point
    Some(Insight {
        kind: InsightKind::Anomaly,
        subject: measure.to_string(),
        description: format!(
            "{} has {} value(s) more than {:.1} standard deviations from the mean",
            measure, count, config.anomaly_sigma
        ),
        significance: (max_z / (config.anomaly_sigma * 2.0)).min(1.0),
        confidence: 0.8,
    })
}

// ============================================================================
// Correlation
// ============================================================================

/// Pearson correlation coefficient of two equal-length series
///
/// Returns `None` when the series differ in length, are too short, or
/// either has zero variance.
pub fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.len() <= 2 {
        return None;
    }
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;

    let mut covariance = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        covariance += (x - mean_a) * (y - mean_b);
        var_a += (x - mean_a).powi(2);
        var_b += (y - mean_b).powi(2);
    }
    if var_a == 0.0 || var_b == 0.0 {
        return None;
    }
    Some(covariance / (var_a.sqrt() * var_b.sqrt()))
}

fn detect_correlation(
    measure_a: &str,
    measure_b: &str,
    a: &[f64],
    b: &[f64],
    config: &InsightConfig,
) -> Option<Insight> {
    let r = pearson(a, b)?;
    if r.abs() <= config.correlation_threshold {
        return None;
    }

    let label = if r > 0.0 { "positive" } else { "negative" };
    Some(Insight {
        kind: InsightKind::Correlation,
        subject: format!("{}~{}", measure_a, measure_b),
        description: format!(
            "{} and {} show a strong {} correlation (r = {:.2})",
            measure_a, measure_b, label, r
        ),
        significance: r.abs(),
        confidence: r.abs(),
    })
}

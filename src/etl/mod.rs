//! ETL Simulator & Quality Scorer
//!
//! Models one named pipeline as an ordered list of transformation steps
//! and executes it as a simulation: records flow through each step, a
//! per-step rejection rate splits them into survivors and rejects, and
//! the monitoring block accumulates the counters. The conservation
//! invariant `records_inserted + records_rejected == records_processed`
//! holds at every step boundary.
//!
//! Quality rules are evaluated at each step boundary against the running
//! error rate. A failed rule with a `Reject` action aborts the remaining
//! steps; the counts accumulated so far are retained and the run's final
//! status reflects the violated rule's action.

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::EtlError;

// ============================================================================
// Pipeline Model
// ============================================================================

/// What a quality-rule violation does to the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    /// Record the violation and continue
    Warn,
    /// Abort the remaining steps of the run
    Reject,
    /// Apply an automatic correction and continue
    Fix,
}

/// A data-quality rule evaluated at step boundaries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityRule {
    /// Rule name
    pub name: String,
    /// Human-readable rule expression
    pub expression: String,
    /// Maximum tolerated cumulative error rate, in percent
    pub max_error_rate: f64,
    /// What a violation does to the run
    pub action: RuleAction,
    /// Whether the rule held for the whole run
    pub passed: bool,
    /// Number of step boundaries at which the rule was violated
    pub violation_count: u64,
}

impl QualityRule {
    /// A rule that has not been evaluated yet
    pub fn new(name: &str, expression: &str, max_error_rate: f64, action: RuleAction) -> Self {
        Self {
            name: name.to_string(),
            expression: expression.to_string(),
            max_error_rate,
            action,
            passed: true,
            violation_count: 0,
        }
    }
}

/// One transformation step of a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformationStep {
    /// Step name
    pub name: String,
    /// Step kind (e.g. "extract", "cleanse", "load")
    pub kind: String,
    /// Columns the step reads
    pub input_columns: Vec<String>,
    /// Columns the step emits
    pub output_columns: Vec<String>,
    /// Free-text transformation rule
    pub rule: String,
    /// Fraction of incoming records rejected by this step, in [0, 1]
    pub rejection_rate: f64,
}

impl TransformationStep {
    /// Build a step with identical input and output columns
    pub fn new(name: &str, kind: &str, columns: &[&str], rule: &str, rejection_rate: f64) -> Self {
        let columns: Vec<String> = columns.iter().map(|s| s.to_string()).collect();
        Self {
            name: name.to_string(),
            kind: kind.to_string(),
            input_columns: columns.clone(),
            output_columns: columns,
            rule: rule.to_string(),
            rejection_rate,
        }
    }
}

/// Data endpoint descriptor for a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    /// Endpoint kind (e.g. "database", "file", "api")
    pub kind: String,
    /// Location or connection reference
    pub location: String,
}

/// Final status of one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// All steps ran, no rule violated
    Completed,
    /// All steps ran, at least one warn-rule violated
    CompletedWithWarnings,
    /// All steps ran, at least one fix-rule violation was auto-corrected
    CompletedWithFixes,
    /// A reject-rule violation aborted the remaining steps
    Failed,
}

/// Score trajectory relative to the previous run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreTrend {
    /// Score rose beyond the comparison band
    Improving,
    /// Score stayed within the comparison band, or this is the first run
    Stable,
    /// Score fell beyond the comparison band
    Degrading,
}

/// Simulated resource consumption for one run
///
/// Derived deterministically from the run's counters, like the duration:
/// memory scales with the input volume, CPU with the number of executed
/// steps, and I/O with the records read plus the survivors written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceUsage {
    /// Peak resident memory in megabytes
    pub peak_memory_mb: f64,
    /// Average CPU utilization in percent
    pub avg_cpu_percent: f64,
    /// Bytes read from the source plus bytes written to the target
    pub io_bytes: u64,
}

/// Counters and derived rates for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringBlock {
    /// Final run status
    pub status: RunStatus,
    /// Simulated elapsed time in seconds
    pub duration_secs: f64,
    /// Records that entered the pipeline
    pub records_processed: u64,
    /// Records surviving every executed step
    pub records_inserted: u64,
    /// Records rejected across all executed steps
    pub records_rejected: u64,
    /// `records_rejected / records_processed × 100`
    pub error_rate: f64,
    /// `records_processed / duration_secs`
    pub throughput: f64,
    /// Index of the last executed step
    pub steps_completed: usize,
    /// Simulated resource consumption
    pub resources: ResourceUsage,
}

/// One pipeline run's definition plus its monitoring outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtlProcess {
    /// Run identifier
    pub id: String,
    /// Pipeline name
    pub name: String,
    /// Ordered transformation steps
    pub steps: Vec<TransformationStep>,
    /// Data source
    pub source: EndpointDescriptor,
    /// Data target
    pub target: EndpointDescriptor,
    /// Refresh schedule (e.g. "daily")
    pub schedule: String,
    /// Counters and rates for this run
    pub monitoring: MonitoringBlock,
    /// Rules with their post-run pass/fail state
    pub quality_rules: Vec<QualityRule>,
    /// `100 − error_rate`, deliberately unclamped
    pub overall_score: f64,
    /// Trajectory relative to the previous run of the same pipeline
    pub trend: ScoreTrend,
}

// ============================================================================
// Trend Rule
// ============================================================================

/// Pluggable rule mapping run scores to a trend indicator
///
/// The reference behavior declares the trend field without defining how it
/// is computed, so the rule is injectable.
pub trait TrendRule: Send + Sync + 'static {
    /// Classify the current score against the previous run's, if any
    fn classify(&self, current_score: f64, previous_score: Option<f64>) -> ScoreTrend;
}

/// Default rule: compare scores within a symmetric band
///
/// Scores within `band` of the previous run's are `Stable`; a first run is
/// always `Stable`.
pub struct ScoreBandTrend {
    band: f64,
}

impl ScoreBandTrend {
    /// Rule with a custom comparison band
    pub fn new(band: f64) -> Self {
        Self { band }
    }
}

impl Default for ScoreBandTrend {
    fn default() -> Self {
        Self { band: 1.0 }
    }
}

impl TrendRule for ScoreBandTrend {
    fn classify(&self, current_score: f64, previous_score: Option<f64>) -> ScoreTrend {
        match previous_score {
            None => ScoreTrend::Stable,
            Some(previous) => {
                let delta = current_score - previous;
                if delta > self.band {
                    ScoreTrend::Improving
                } else if delta < -self.band {
                    ScoreTrend::Degrading
                } else {
                    ScoreTrend::Stable
                }
            },
        }
    }
}

// ============================================================================
// Simulator
// ============================================================================

/// Simulated records per second of pipeline work
const RECORDS_PER_SECOND: f64 = 50_000.0;

/// Simulated baseline memory footprint in megabytes
const BASE_MEMORY_MB: f64 = 64.0;

/// Simulated average record size in bytes
const RECORD_BYTES: u64 = 256;

/// Definition of one pipeline to run
pub struct PipelineSpec {
    /// Pipeline name
    pub name: String,
    /// Ordered steps
    pub steps: Vec<TransformationStep>,
    /// Rules evaluated at step boundaries
    pub quality_rules: Vec<QualityRule>,
    /// Data source
    pub source: EndpointDescriptor,
    /// Data target
    pub target: EndpointDescriptor,
    /// Refresh schedule
    pub schedule: String,
    /// Records entering the first step
    pub input_records: u64,
}

/// Executes pipeline simulations and scores their quality
pub struct EtlSimulator {
    trend_rule: Arc<dyn TrendRule>,
    /// Last overall score per pipeline name
    previous_scores: RwLock<HashMap<String, f64>>,
}

impl EtlSimulator {
    /// Simulator with the default trend rule
    pub fn new() -> Self {
        Self::with_trend_rule(Arc::new(ScoreBandTrend::default()))
    }

    /// Simulator with an injected trend rule
    pub fn with_trend_rule(trend_rule: Arc<dyn TrendRule>) -> Self {
        Self {
            trend_rule,
            previous_scores: RwLock::new(HashMap::new()),
        }
    }

    /// Build and run the standard pipeline for an operation
    ///
    /// `processing_mode` sets the simulated input volume: "batch",
    /// "incremental" or "streaming".
    pub fn run(
        &self,
        operation: &str,
        source_type: &str,
        processing_mode: &str,
    ) -> Result<EtlProcess, EtlError> {
        if operation.trim().is_empty() {
            return Err(EtlError::InvalidPipeline("empty operation name".to_string()));
        }
        let input_records = match processing_mode {
            "batch" => 100_000,
            "incremental" => 25_000,
            "streaming" => 5_000,
            other => {
                return Err(EtlError::InvalidPipeline(format!(
                    "unsupported processing mode '{other}'"
                )))
            },
        };
        self.execute(standard_pipeline(operation, source_type, input_records))
    }

    /// Run one pipeline spec through the simulation
    pub fn execute(&self, spec: PipelineSpec) -> Result<EtlProcess, EtlError> {
        if spec.steps.is_empty() {
            return Err(EtlError::InvalidPipeline("pipeline has no steps".to_string()));
        }
        for step in &spec.steps {
            if !(0.0..=1.0).contains(&step.rejection_rate) {
                return Err(EtlError::InvalidPipeline(format!(
                    "step '{}' rejection rate {} outside [0, 1]",
                    step.name, step.rejection_rate
                )));
            }
        }

        debug!(
            pipeline = %spec.name,
            steps = spec.steps.len(),
            input_records = spec.input_records,
            "starting pipeline run"
        );

        let mut quality_rules = spec.quality_rules.clone();
        let records_processed = spec.input_records;
        let mut surviving = spec.input_records;
        let mut records_rejected = 0u64;
        let mut duration_secs = 0.0f64;
        let mut steps_completed = 0usize;
        let mut warned = false;
        let mut fixed = false;
        let mut aborted = false;

        for step in &spec.steps {
            let step_rejected = (surviving as f64 * step.rejection_rate).floor() as u64;
            duration_secs += surviving as f64 / RECORDS_PER_SECOND;
            surviving -= step_rejected;
            records_rejected += step_rejected;
            steps_completed += 1;

            // Conservation holds here: surviving + records_rejected ==
            // records_processed, with surviving the inserted count so far.
            let error_rate = error_rate(records_rejected, records_processed);
            debug!(
                pipeline = %spec.name,
                step = %step.name,
                rejected = step_rejected,
                error_rate,
                "step complete"
            );

            for rule in &mut quality_rules {
                if error_rate > rule.max_error_rate {
                    rule.passed = false;
                    rule.violation_count += 1;
                    match rule.action {
                        RuleAction::Warn => {
                            warn!(
                                pipeline = %spec.name,
                                rule = %rule.name,
                                error_rate,
                                "quality rule violated"
                            );
                            warned = true;
                        },
                        RuleAction::Fix => {
                            debug!(
                                pipeline = %spec.name,
                                rule = %rule.name,
                                "quality rule violated, auto-corrected"
                            );
                            fixed = true;
                        },
                        RuleAction::Reject => {
                            warn!(
                                pipeline = %spec.name,
                                rule = %rule.name,
                                step = %step.name,
                                error_rate,
                                "reject rule violated, aborting run"
                            );
                            aborted = true;
                        },
                    }
                }
            }
            if aborted {
                break;
            }
        }

        let status = if aborted {
            RunStatus::Failed
        } else if warned {
            RunStatus::CompletedWithWarnings
        } else if fixed {
            RunStatus::CompletedWithFixes
        } else {
            RunStatus::Completed
        };

        let error_rate = error_rate(records_rejected, records_processed);
        let throughput = if duration_secs > 0.0 {
            records_processed as f64 / duration_secs
        } else {
            0.0
        };
        // Unclamped: heavy rejection may push the score below zero
        let overall_score = 100.0 - error_rate;

        let resources = ResourceUsage {
            peak_memory_mb: BASE_MEMORY_MB + records_processed as f64 / 1_000.0,
            avg_cpu_percent: (25.0 + 15.0 * steps_completed as f64).min(95.0),
            io_bytes: (records_processed + surviving) * RECORD_BYTES,
        };

        let previous_score = self
            .previous_scores
            .write()
            .insert(spec.name.clone(), overall_score);
        let trend = self.trend_rule.classify(overall_score, previous_score);

        info!(
            pipeline = %spec.name,
            ?status,
            processed = records_processed,
            inserted = surviving,
            rejected = records_rejected,
            overall_score,
            "pipeline run finished"
        );

        Ok(EtlProcess {
            id: format!("etl-{}-{}", spec.name, Utc::now().timestamp_millis()),
            name: spec.name,
            steps: spec.steps,
            source: spec.source,
            target: spec.target,
            schedule: spec.schedule,
            monitoring: MonitoringBlock {
                status,
                duration_secs,
                records_processed,
                records_inserted: surviving,
                records_rejected,
                error_rate,
                throughput,
                steps_completed,
                resources,
            },
            quality_rules,
            overall_score,
            trend,
        })
    }
}

impl Default for EtlSimulator {
    fn default() -> Self {
        Self::new()
    }
}

fn error_rate(rejected: u64, processed: u64) -> f64 {
    if processed == 0 {
        0.0
    } else {
        rejected as f64 / processed as f64 * 100.0
    }
}

/// The extract-cleanse-transform-load pipeline used by the facade
fn standard_pipeline(operation: &str, source_type: &str, input_records: u64) -> PipelineSpec {
    let columns = &["order_id", "tenant_id", "occurred_at", "amount"];
    PipelineSpec {
        name: operation.to_string(),
        steps: vec![
            TransformationStep::new(
                "extract",
                "extract",
                columns,
                "read from source partition",
                0.001,
            ),
            TransformationStep::new(
                "cleanse",
                "cleanse",
                columns,
                "drop rows failing schema checks",
                0.02,
            ),
            TransformationStep::new(
                "transform",
                "transform",
                columns,
                "normalize currency and timestamps",
                0.005,
            ),
            TransformationStep::new("load", "load", columns, "upsert into fact table", 0.002),
        ],
        quality_rules: vec![
            QualityRule::new(
                "rejection-ceiling",
                "error_rate <= 5%",
                5.0,
                RuleAction::Warn,
            ),
            QualityRule::new(
                "rejection-hard-stop",
                "error_rate <= 25%",
                25.0,
                RuleAction::Reject,
            ),
        ],
        source: EndpointDescriptor {
            kind: source_type.to_string(),
            location: format!("{source_type}://orders"),
        },
        target: EndpointDescriptor {
            kind: "database".to_string(),
            location: "warehouse://fact_sales".to_string(),
        },
        schedule: "daily".to_string(),
        input_records,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec_with(steps: Vec<TransformationStep>, rules: Vec<QualityRule>) -> PipelineSpec {
        PipelineSpec {
            name: "test-pipeline".to_string(),
            steps,
            quality_rules: rules,
            source: EndpointDescriptor {
                kind: "database".to_string(),
                location: "db://src".to_string(),
            },
            target: EndpointDescriptor {
                kind: "database".to_string(),
                location: "db://dst".to_string(),
            },
            schedule: "daily".to_string(),
            input_records: 10_000,
        }
    }

    fn step(name: &str, rejection_rate: f64) -> TransformationStep {
        TransformationStep::new(name, "transform", &["a"], "rule", rejection_rate)
    }

    #[test]
    fn test_conservation_invariant_holds() {
        let simulator = EtlSimulator::new();
        let process = simulator
            .run("daily-sales-load", "database", "batch")
            .unwrap();
        let m = &process.monitoring;
        assert_eq!(m.records_inserted + m.records_rejected, m.records_processed);
        assert_eq!(m.records_processed, 100_000);
        assert!(m.records_rejected > 0);
        assert_eq!(m.status, RunStatus::Completed);
    }

    #[test]
    fn test_scores_and_throughput_derived_from_counters() {
        let simulator = EtlSimulator::new();
        // 10% rejection in a single step
        let process = simulator
            .execute(spec_with(vec![step("only", 0.10)], vec![]))
            .unwrap();
        let m = &process.monitoring;
        assert_eq!(m.records_rejected, 1_000);
        assert!((m.error_rate - 10.0).abs() < 1e-9);
        assert!((process.overall_score - 90.0).abs() < 1e-9);
        // 10_000 records at 50k records/sec: 0.2 simulated seconds
        assert!((m.duration_secs - 0.2).abs() < 1e-9);
        assert!((m.throughput - 50_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_resource_usage_derived_from_counters() {
        let simulator = EtlSimulator::new();
        // 10_000 records, one step, 10% rejection
        let process = simulator
            .execute(spec_with(vec![step("only", 0.10)], vec![]))
            .unwrap();
        let r = &process.monitoring.resources;
        assert!((r.peak_memory_mb - 74.0).abs() < 1e-9);
        assert!((r.avg_cpu_percent - 40.0).abs() < 1e-9);
        // 10_000 read + 9_000 written, 256 bytes each
        assert_eq!(r.io_bytes, 19_000 * 256);

        // CPU is capped no matter how many steps run
        let busy: Vec<TransformationStep> = (0..10).map(|i| step(&format!("s{i}"), 0.0)).collect();
        let process = simulator.execute(spec_with(busy, vec![])).unwrap();
        assert!((process.monitoring.resources.avg_cpu_percent - 95.0).abs() < 1e-9);
    }

    #[test]
    fn test_overall_score_unclamped_below_zero_floor() {
        let simulator = EtlSimulator::new();
        let process = simulator
            .execute(spec_with(vec![step("lossy", 0.999)], vec![]))
            .unwrap();
        assert!(process.overall_score < 1.0);
        assert!(process.monitoring.error_rate > 99.0);
    }

    #[test]
    fn test_reject_rule_aborts_remaining_steps() {
        let simulator = EtlSimulator::new();
        let rules = vec![QualityRule::new(
            "hard-stop",
            "error_rate <= 5%",
            5.0,
            RuleAction::Reject,
        )];
        let process = simulator
            .execute(spec_with(
                vec![step("first", 0.50), step("second", 0.0), step("third", 0.0)],
                rules,
            ))
            .unwrap();
        let m = &process.monitoring;
        assert_eq!(m.status, RunStatus::Failed);
        assert_eq!(m.steps_completed, 1);
        // Partial counts retained, conservation still holds
        assert_eq!(m.records_rejected, 5_000);
        assert_eq!(m.records_inserted + m.records_rejected, m.records_processed);
        assert!(!process.quality_rules[0].passed);
        assert_eq!(process.quality_rules[0].violation_count, 1);
    }

    #[test]
    fn test_warn_rule_completes_with_warnings() {
        let simulator = EtlSimulator::new();
        let rules = vec![QualityRule::new(
            "soft-stop",
            "error_rate <= 5%",
            5.0,
            RuleAction::Warn,
        )];
        let process = simulator
            .execute(spec_with(vec![step("first", 0.10), step("second", 0.0)], rules))
            .unwrap();
        assert_eq!(process.monitoring.status, RunStatus::CompletedWithWarnings);
        assert_eq!(process.monitoring.steps_completed, 2);
        // Violated at both boundaries
        assert_eq!(process.quality_rules[0].violation_count, 2);
    }

    #[test]
    fn test_trend_against_previous_run() {
        let simulator = EtlSimulator::new();
        let clean = || spec_with(vec![step("s", 0.0)], vec![]);
        let lossy = || spec_with(vec![step("s", 0.10)], vec![]);

        // First run of a pipeline is always stable
        assert_eq!(simulator.execute(lossy()).unwrap().trend, ScoreTrend::Stable);
        // 90 -> 100 improves; 100 -> 90 degrades
        assert_eq!(
            simulator.execute(clean()).unwrap().trend,
            ScoreTrend::Improving
        );
        assert_eq!(
            simulator.execute(lossy()).unwrap().trend,
            ScoreTrend::Degrading
        );
        // Repeat within the band is stable
        assert_eq!(simulator.execute(lossy()).unwrap().trend, ScoreTrend::Stable);
    }

    #[test]
    fn test_invalid_pipelines_rejected() {
        let simulator = EtlSimulator::new();
        assert!(matches!(
            simulator.run("", "database", "batch"),
            Err(EtlError::InvalidPipeline(_))
        ));
        assert!(matches!(
            simulator.run("load", "database", "hourly"),
            Err(EtlError::InvalidPipeline(_))
        ));
        assert!(matches!(
            simulator.execute(spec_with(vec![], vec![])),
            Err(EtlError::InvalidPipeline(_))
        ));
        assert!(matches!(
            simulator.execute(spec_with(vec![step("s", 1.5)], vec![])),
            Err(EtlError::InvalidPipeline(_))
        ));
    }

    #[test]
    fn test_processing_mode_sets_volume() {
        let simulator = EtlSimulator::new();
        let incremental = simulator.run("load", "api", "incremental").unwrap();
        assert_eq!(incremental.monitoring.records_processed, 25_000);
        let streaming = simulator.run("load", "api", "streaming").unwrap();
        assert_eq!(streaming.monitoring.records_processed, 5_000);
        assert_eq!(streaming.source.kind, "api");
    }
}

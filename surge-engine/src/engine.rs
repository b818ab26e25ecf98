use serde::Serialize;
use std::sync::Arc;
use surge_common::Result;
use tracing::info;

use crate::metrics::{self, MetricKind, MetricSink, MetricSnapshot, TrendStrategy};
use crate::pool::{PoolConfig, PoolReport, StopHandle, StopReason, WorkerPool};
use crate::runner::IterationRunner;
use crate::scenario::Scenario;
use crate::threshold::{self, RunVerdict};
use crate::transport::Transport;

#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub pool: PoolConfig,
    pub trend_strategy: TrendStrategy,
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub scenario: String,
    pub snapshot: MetricSnapshot,
    pub verdict: RunVerdict,
    pub report: PoolReport,
}

impl RunResult {
    /// Process exit status for CI: 0 iff every threshold passed.
    pub fn exit_code(&self) -> i32 {
        if self.verdict.passed {
            0
        } else {
            1
        }
    }

    pub fn summary(&self) -> RunSummary<'_> {
        RunSummary {
            scenario: &self.scenario,
            passed: self.verdict.passed,
            stop_reason: stop_reason_name(&self.report.reason),
            peak_workers: self.report.peak_workers,
            violations: self
                .verdict
                .violations
                .iter()
                .map(|v| ViolationSummary {
                    rule: &v.rule.description,
                    observed: v.observed,
                    reason: v.reason.to_string(),
                })
                .collect(),
            metrics: &self.snapshot,
        }
    }
}

/// Serializable run summary (`--summary-json`).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary<'a> {
    pub scenario: &'a str,
    pub passed: bool,
    pub stop_reason: &'static str,
    pub peak_workers: usize,
    pub violations: Vec<ViolationSummary<'a>>,
    pub metrics: &'a MetricSnapshot,
}

#[derive(Debug, Serialize)]
pub struct ViolationSummary<'a> {
    pub rule: &'a str,
    pub observed: Option<f64>,
    pub reason: String,
}

pub fn stop_reason_name(reason: &StopReason) -> &'static str {
    match reason {
        StopReason::RampComplete => "ramp-complete",
        StopReason::IterationsExhausted => "iterations-exhausted",
        StopReason::External => "stopped",
        StopReason::ThresholdAbort(_) => "threshold-abort",
    }
}

/// Wires a scenario, a transport and a worker pool together and produces the verdict.
pub struct Engine {
    config: EngineConfig,
    stop: StopHandle,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config, stop: StopHandle::new() }
    }

    /// Handle that stops the current (or next) run.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub async fn run(
        &self,
        scenario: &Scenario,
        transport: Arc<dyn Transport>,
    ) -> Result<RunResult> {
        scenario.validate()?;

        let mut pool_config = self.config.pool.clone();
        pool_config.iterations = scenario.iterations;
        pool_config.abort_rules =
            scenario.thresholds.iter().filter(|r| r.abort_on_fail).cloned().collect();
        let pool = WorkerPool::with_stop(pool_config, self.stop.clone())?;

        let sink = Arc::new(MetricSink::new(self.config.trend_strategy));
        declare_builtin_metrics(&sink);

        let runner = Arc::new(IterationRunner::new(
            transport,
            Arc::clone(&scenario.workload),
            scenario.pacing,
        ));

        info!(scenario = %scenario.name, thresholds = scenario.thresholds.len(), "run starting");
        let report = pool.run(&scenario.profile, runner, Arc::clone(&sink)).await?;

        let snapshot = sink.snapshot();
        let verdict = threshold::evaluate(&snapshot, &scenario.thresholds);
        info!(
            scenario = %scenario.name,
            passed = verdict.passed,
            violations = verdict.violations.len(),
            iterations = snapshot.count(metrics::ITERATIONS),
            "run finished"
        );

        Ok(RunResult { scenario: scenario.name.clone(), snapshot, verdict, report })
    }
}

/// Pre-register the built-in metrics so every snapshot carries them, even at zero.
pub fn declare_builtin_metrics(sink: &MetricSink) {
    for name in [
        metrics::ITERATIONS,
        metrics::HTTP_REQS,
        metrics::SUCCESSFUL_TRANSACTIONS,
        metrics::ERRORS_TRANSPORT,
        metrics::ERRORS_CHECK_FAILED,
        metrics::ITERATIONS_INTERRUPTED,
    ] {
        sink.declare(name, MetricKind::Counter);
    }
    for name in [metrics::ERRORS, metrics::HTTP_REQ_FAILED, metrics::CHECKS] {
        sink.declare(name, MetricKind::Rate);
    }
    for name in [
        metrics::HTTP_REQ_DURATION,
        metrics::ITERATION_DURATION,
        metrics::TRANSACTION_DURATION,
    ] {
        sink.declare(name, MetricKind::Trend);
    }
}

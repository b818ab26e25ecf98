use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use surge_common::{RequestSpec, ResponseView, Result, SurgeError};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::task::AbortOnDropHandle;

use crate::check::Check;
use crate::metrics::{self, MetricSink};
use crate::pacing::Pacing;
use crate::transport::Transport;
use crate::workload::{IterationContext, Workload};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Ok,
    /// A response arrived but at least one check rejected it.
    CheckFailed,
    /// At least one request produced no response (refused, DNS, timeout, panic).
    TransportError,
}

/// Result of one iteration. `latency` is the summed request time, excluding pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationOutcome {
    pub success: bool,
    pub latency: Duration,
    pub classification: Classification,
}

/// Executes single iterations of a workload and records them into a [`MetricSink`].
pub struct IterationRunner {
    transport: Arc<dyn Transport>,
    workload: Arc<dyn Workload>,
    pacing: Pacing,
}

impl IterationRunner {
    pub fn new(
        transport: Arc<dyn Transport>,
        workload: Arc<dyn Workload>,
        pacing: Pacing,
    ) -> Self {
        Self { transport, workload, pacing }
    }

    pub fn pacing(&self) -> Pacing {
        self.pacing
    }

    /// Execute one iteration, record it, then pace. Step pauses and the pacing pause end
    /// early when `stop` fires; the outcome is recorded either way.
    pub async fn run_once(
        &self,
        ctx: IterationContext,
        sink: &MetricSink,
        stop: &mut watch::Receiver<bool>,
    ) -> IterationOutcome {
        let outcome = self.iterate(ctx, sink, Some(&mut *stop)).await;
        self.pacing.pause(stop).await;
        outcome
    }

    /// Execute and record one iteration without pacing. Step pauses run to completion.
    pub async fn execute(&self, ctx: IterationContext, sink: &MetricSink) -> IterationOutcome {
        self.iterate(ctx, sink, None).await
    }

    async fn iterate(
        &self,
        ctx: IterationContext,
        sink: &MetricSink,
        mut stop: Option<&mut watch::Receiver<bool>>,
    ) -> IterationOutcome {
        let started = Instant::now();
        let mut latency = Duration::ZERO;
        let mut transport_failed = false;
        let mut checks_failed = false;
        let mut first_failure: Option<SurgeError> = None;

        match catch_unwind(AssertUnwindSafe(|| self.workload.plan(&ctx))) {
            Ok(steps) => {
                for step in steps {
                    let sent_at = Instant::now();
                    let result = self.send_isolated(step.request).await;
                    let took = sent_at.elapsed();
                    latency += took;

                    sink.increment(metrics::HTTP_REQS);
                    sink.add_duration(metrics::HTTP_REQ_DURATION, took);

                    match result {
                        Err(err) => {
                            transport_failed = true;
                            sink.add_rate(metrics::HTTP_REQ_FAILED, true);
                            first_failure.get_or_insert(err);
                        }
                        Ok(response) => {
                            let response = response.with_duration(took);
                            sink.add_rate(metrics::HTTP_REQ_FAILED, response.status >= 400);
                            for check in step.checks.iter() {
                                let ok = evaluate_check(check, &response, &ctx);
                                sink.add_rate(metrics::CHECKS, ok);
                                sink.add_rate(&metrics::check_metric_name(check.name()), ok);
                                if !ok {
                                    checks_failed = true;
                                    first_failure.get_or_insert_with(|| {
                                        SurgeError::CheckFailed(check.name().to_string())
                                    });
                                }
                            }
                        }
                    }

                    if let Some(pause) = step.pause {
                        match stop.as_deref_mut() {
                            Some(stop) => {
                                Pacing::Fixed(pause).pause(stop).await;
                            }
                            None => tokio::time::sleep(pause).await,
                        }
                    }
                }
            }
            Err(_) => {
                tracing::warn!(
                    worker = ctx.worker_id,
                    iteration = ctx.iteration,
                    "workload panicked while building requests"
                );
                transport_failed = true;
            }
        }

        let classification = if transport_failed {
            Classification::TransportError
        } else if checks_failed {
            Classification::CheckFailed
        } else {
            Classification::Ok
        };
        let success = classification == Classification::Ok;
        if let Some(err) = first_failure {
            tracing::debug!(
                worker = ctx.worker_id,
                iteration = ctx.iteration,
                ?classification,
                error = %err,
                "iteration failed"
            );
        }

        sink.increment(metrics::ITERATIONS);
        sink.add_duration(metrics::ITERATION_DURATION, started.elapsed());
        sink.add_rate(metrics::ERRORS, !success);
        match classification {
            Classification::Ok => {
                sink.increment(metrics::SUCCESSFUL_TRANSACTIONS);
                sink.add_duration(metrics::TRANSACTION_DURATION, latency);
            }
            Classification::CheckFailed => sink.increment(metrics::ERRORS_CHECK_FAILED),
            Classification::TransportError => sink.increment(metrics::ERRORS_TRANSPORT),
        }

        IterationOutcome { success, latency, classification }
    }

    /// Run the transport on its own task so a panic inside it becomes a failed request.
    /// The task is aborted if this future is dropped, e.g. when the pool aborts the worker.
    async fn send_isolated(&self, request: RequestSpec) -> Result<ResponseView> {
        let transport = Arc::clone(&self.transport);
        let task = AbortOnDropHandle::new(tokio::spawn(async move {
            transport.send(&request).await
        }));
        match task.await {
            Ok(result) => result,
            Err(join_err) => Err(SurgeError::NetworkError(format!(
                "transport task failed: {join_err}"
            ))),
        }
    }
}

/// A panicking check counts as a failed check.
fn evaluate_check(check: &Check, response: &ResponseView, ctx: &IterationContext) -> bool {
    match catch_unwind(AssertUnwindSafe(|| check.evaluate(response))) {
        Ok(ok) => ok,
        Err(_) => {
            tracing::warn!(
                worker = ctx.worker_id,
                iteration = ctx.iteration,
                check = check.name(),
                "check panicked"
            );
            false
        }
    }
}

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use surge_common::{Result, SurgeError};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::metrics::{self, MetricSink};
use crate::ramp::{RampProfile, RampScheduler};
use crate::runner::IterationRunner;
use crate::threshold::{RuleOutcome, ThresholdRule};
use crate::workload::IterationContext;

pub const DEFAULT_TICK: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_WORKERS: u32 = 500;
pub const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);

/// What to do when the ramp asks for more workers than `max_workers`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CapacityPolicy {
    /// Run at the cap and log a warning.
    #[default]
    Clamp,
    /// Stop the run and fail with `CapacityExceeded`.
    Abort,
}

impl CapacityPolicy {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "clamp" => Some(CapacityPolicy::Clamp),
            "abort" => Some(CapacityPolicy::Abort),
            _ => None,
        }
    }

    pub fn as_name(&self) -> &'static str {
        match self {
            CapacityPolicy::Clamp => "clamp",
            CapacityPolicy::Abort => "abort",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Control loop period; the ramp target is re-derived on every tick.
    pub tick: Duration,
    pub max_workers: u32,
    pub capacity_policy: CapacityPolicy,
    /// How long in-flight iterations may take to finish once the run stops.
    pub graceful_stop: Duration,
    /// Total iterations across all workers. `None` means bounded by the ramp only.
    pub iterations: Option<u64>,
    /// Rules checked on every tick; the first violation stops the run.
    pub abort_rules: Vec<ThresholdRule>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            tick: DEFAULT_TICK,
            max_workers: DEFAULT_MAX_WORKERS,
            capacity_policy: CapacityPolicy::default(),
            graceful_stop: DEFAULT_GRACEFUL_STOP,
            iterations: None,
            abort_rules: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    RampComplete,
    IterationsExhausted,
    External,
    /// Carries the description of the rule that tripped.
    ThresholdAbort(String),
}

#[derive(Debug, Clone)]
pub struct PoolReport {
    pub reason: StopReason,
    pub elapsed: Duration,
    pub peak_workers: usize,
    pub spawned: u64,
    /// Workers cut off after the grace period, each mid-iteration.
    pub interrupted: u64,
}

/// Requests a running pool to stop. Cloneable; safe to use from signal handlers.
#[derive(Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for StopHandle {
    fn default() -> Self {
        Self::new()
    }
}

struct IterationBudget {
    remaining: Option<AtomicU64>,
}

impl IterationBudget {
    fn new(limit: Option<u64>) -> Self {
        Self { remaining: limit.map(AtomicU64::new) }
    }

    fn try_claim(&self) -> bool {
        match &self.remaining {
            None => true,
            Some(left) => left
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
                .is_ok(),
        }
    }

    fn exhausted(&self) -> bool {
        self.remaining.as_ref().is_some_and(|left| left.load(Ordering::Acquire) == 0)
    }
}

/// Decrements the live-worker count when the worker task ends, however it ends.
struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

struct WorkerSlot {
    id: u64,
    retire: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Keeps the number of looping workers equal to the ramp target.
pub struct WorkerPool {
    config: PoolConfig,
    stop: Arc<watch::Sender<bool>>,
    live: Arc<AtomicUsize>,
}

impl WorkerPool {
    pub fn new(config: PoolConfig) -> Result<Self> {
        Self::with_stop(config, StopHandle::new())
    }

    /// Build a pool that obeys an existing stop handle.
    pub fn with_stop(config: PoolConfig, stop: StopHandle) -> Result<Self> {
        if config.tick.is_zero() {
            return Err(SurgeError::config("control tick must be greater than zero"));
        }
        if config.max_workers == 0 {
            return Err(SurgeError::config("max workers must be at least 1"));
        }
        Ok(Self { config, stop: stop.tx, live: Arc::new(AtomicUsize::new(0)) })
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle { tx: Arc::clone(&self.stop) }
    }

    /// Workers currently alive, including retiring ones finishing their last iteration.
    pub fn live_workers(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Drive `runner` from a set of workers sized by `profile` until the run stops, then
    /// wait for every worker to exit.
    pub async fn run(
        &self,
        profile: &RampProfile,
        runner: Arc<IterationRunner>,
        sink: Arc<MetricSink>,
    ) -> Result<PoolReport> {
        let scheduler = RampScheduler::new(profile.clone());
        let budget = Arc::new(IterationBudget::new(self.config.iterations));
        let drained = Arc::new(Notify::new());
        let mut stop_rx = self.stop.subscribe();

        let mut active: Vec<WorkerSlot> = Vec::new();
        let mut retiring: Vec<WorkerSlot> = Vec::new();
        let mut next_id: u64 = 1;
        let mut peak = 0usize;
        let mut capacity_warned = false;
        let mut current_stage: Option<usize> = None;

        let started = Instant::now();
        let mut ticker = tokio::time::interval(self.config.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            stages = profile.stages().len(),
            duration = ?profile.total_duration(),
            peak = profile.peak(),
            "starting worker pool"
        );

        let outcome: Result<StopReason> = loop {
            if *stop_rx.borrow() {
                break Ok(StopReason::External);
            }
            tokio::select! {
                _ = ticker.tick() => {}
                _ = drained.notified() => {}
                _ = stop_rx.changed() => continue,
            }

            reap_dead(&mut active).await;
            retiring.retain(|slot| !slot.task.is_finished());

            if budget.exhausted() && active.is_empty() {
                break Ok(StopReason::IterationsExhausted);
            }

            let elapsed = started.elapsed();
            let Some(mut target) = scheduler.target_at(elapsed) else {
                break Ok(StopReason::RampComplete);
            };

            let stage = scheduler.stage_index_at(elapsed);
            if stage != current_stage {
                if let Some(idx) = stage {
                    let declared = profile.stages()[idx];
                    info!(
                        stage = idx + 1,
                        target = declared.target,
                        duration = ?declared.duration,
                        "entering stage"
                    );
                }
                current_stage = stage;
            }

            if target > self.config.max_workers {
                match self.config.capacity_policy {
                    CapacityPolicy::Clamp => {
                        if !capacity_warned {
                            warn!(
                                requested = target,
                                cap = self.config.max_workers,
                                "target concurrency clamped to worker cap"
                            );
                            capacity_warned = true;
                        }
                        target = self.config.max_workers;
                    }
                    CapacityPolicy::Abort => {
                        break Err(SurgeError::CapacityExceeded {
                            requested: target,
                            cap: self.config.max_workers,
                        });
                    }
                }
            }
            let target = target as usize;

            if !budget.exhausted() {
                while active.len() < target {
                    let slot = self.spawn_worker(
                        next_id,
                        Arc::clone(&runner),
                        Arc::clone(&sink),
                        Arc::clone(&budget),
                        Arc::clone(&drained),
                    );
                    next_id += 1;
                    active.push(slot);
                }
            }
            while active.len() > target {
                // Newest workers retire first.
                let Some(slot) = active.pop() else { break };
                debug!(worker = slot.id, "retiring worker");
                slot.retire.send_replace(true);
                retiring.push(slot);
            }

            peak = peak.max(self.live_workers());

            if let Some(rule) = self.tripped_abort_rule(&sink) {
                warn!(rule = %rule.description, "abort-on-fail threshold crossed, stopping run");
                break Ok(StopReason::ThresholdAbort(rule.description.clone()));
            }
        };

        match &outcome {
            Ok(reason) => info!(?reason, live = self.live_workers(), "stopping workers"),
            Err(err) => warn!(error = %err, "aborting run"),
        }

        let slots: Vec<WorkerSlot> = active.into_iter().chain(retiring).collect();
        for slot in &slots {
            slot.retire.send_replace(true);
        }
        let interrupted = self.drain(slots).await;
        if interrupted > 0 {
            sink.add(metrics::ITERATIONS_INTERRUPTED, interrupted);
        }

        let reason = outcome?;
        Ok(PoolReport {
            reason,
            elapsed: started.elapsed(),
            peak_workers: peak,
            spawned: next_id - 1,
            interrupted,
        })
    }

    fn spawn_worker(
        &self,
        id: u64,
        runner: Arc<IterationRunner>,
        sink: Arc<MetricSink>,
        budget: Arc<IterationBudget>,
        drained: Arc<Notify>,
    ) -> WorkerSlot {
        let (retire_tx, retire_rx) = watch::channel(false);
        self.live.fetch_add(1, Ordering::AcqRel);
        let guard = LiveGuard(Arc::clone(&self.live));
        debug!(worker = id, "spawning worker");
        let task = tokio::spawn(worker_loop(id, runner, sink, retire_rx, budget, drained, guard));
        WorkerSlot { id, retire: retire_tx, task }
    }

    /// Wait for every worker up to the grace period, then abort the stragglers.
    async fn drain(&self, slots: Vec<WorkerSlot>) -> u64 {
        let deadline = Instant::now() + self.config.graceful_stop;
        let mut interrupted = 0;
        for mut slot in slots {
            match tokio::time::timeout_at(deadline, &mut slot.task).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(worker = slot.id, error = %err, "worker ended abnormally"),
                Err(_) => {
                    slot.task.abort();
                    // Cancellation completes at the task's next yield point.
                    let _ = slot.task.await;
                    interrupted += 1;
                }
            }
        }
        if interrupted > 0 {
            warn!(
                interrupted,
                grace = ?self.config.graceful_stop,
                "workers aborted after grace period"
            );
        }
        interrupted
    }

    fn tripped_abort_rule(&self, sink: &MetricSink) -> Option<&ThresholdRule> {
        if self.config.abort_rules.is_empty() {
            return None;
        }
        let snapshot = sink.snapshot();
        self.config.abort_rules.iter().find(|rule| {
            let has_samples = snapshot.get(&rule.metric).is_some_and(|m| m.samples() > 0);
            has_samples && matches!(rule.check(&snapshot), RuleOutcome::Violated { .. })
        })
    }
}

/// Remove workers whose task ended on its own; the next scaling step replaces them.
async fn reap_dead(active: &mut Vec<WorkerSlot>) {
    let mut idx = 0;
    while idx < active.len() {
        if active[idx].task.is_finished() {
            let slot = active.remove(idx);
            if let Err(err) = slot.task.await {
                warn!(worker = slot.id, error = %err, "worker died, it will be replaced");
            }
        } else {
            idx += 1;
        }
    }
}

async fn worker_loop(
    id: u64,
    runner: Arc<IterationRunner>,
    sink: Arc<MetricSink>,
    mut retire: watch::Receiver<bool>,
    budget: Arc<IterationBudget>,
    drained: Arc<Notify>,
    _guard: LiveGuard,
) {
    let mut iteration: u64 = 0;
    loop {
        if *retire.borrow() {
            break;
        }
        if !budget.try_claim() {
            drained.notify_one();
            break;
        }
        let ctx = IterationContext { worker_id: id, iteration };
        runner.run_once(ctx, &sink, &mut retire).await;
        iteration += 1;
    }
    debug!(worker = id, iterations = iteration, "worker exited");
}

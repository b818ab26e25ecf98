use dashmap::DashMap;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

// Built-in metric names. Downstream reporting and CI gates depend on these.
pub const ITERATIONS: &str = "iterations";
pub const ITERATION_DURATION: &str = "iteration_duration";
pub const ITERATIONS_INTERRUPTED: &str = "iterations_interrupted";
pub const HTTP_REQS: &str = "http_reqs";
pub const HTTP_REQ_DURATION: &str = "http_req_duration";
pub const HTTP_REQ_FAILED: &str = "http_req_failed";
pub const CHECKS: &str = "checks";
pub const ERRORS: &str = "errors";
pub const ERRORS_TRANSPORT: &str = "errors_transport";
pub const ERRORS_CHECK_FAILED: &str = "errors_check_failed";
pub const SUCCESSFUL_TRANSACTIONS: &str = "successful_transactions";
pub const TRANSACTION_DURATION: &str = "transaction_duration";

/// Name of the per-check sub-metric for the check called `check`.
pub fn check_metric_name(check: &str) -> String {
    format!("{CHECKS}{{{check}}}")
}

/// How trends keep their samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrendStrategy {
    /// Retain every sample; percentiles are exact. Suited to bounded-duration runs.
    #[default]
    Exact,
    /// Keep a uniform random sample of at most `capacity` values. Count, sum, min and
    /// max stay exact; percentiles are estimated from the reservoir.
    Reservoir { capacity: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Rate,
    Trend,
}

#[derive(Debug, Default)]
struct RateState {
    passes: u64,
    total: u64,
}

enum SampleStore {
    Exact(Vec<f64>),
    Reservoir { samples: Vec<f64>, capacity: usize, rng: StdRng },
}

impl SampleStore {
    fn new(strategy: TrendStrategy) -> Self {
        match strategy {
            TrendStrategy::Exact => SampleStore::Exact(Vec::new()),
            TrendStrategy::Reservoir { capacity } => SampleStore::Reservoir {
                samples: Vec::with_capacity(capacity.min(4096)),
                capacity: capacity.max(1),
                rng: StdRng::from_entropy(),
            },
        }
    }

    /// `seen` is the number of samples offered so far, including this one.
    fn push(&mut self, value: f64, seen: u64) {
        match self {
            SampleStore::Exact(samples) => samples.push(value),
            SampleStore::Reservoir { samples, capacity, rng } => {
                if samples.len() < *capacity {
                    samples.push(value);
                } else {
                    let slot = rng.gen_range(0..seen);
                    if (slot as usize) < *capacity {
                        samples[slot as usize] = value;
                    }
                }
            }
        }
    }

    fn values(&self) -> &[f64] {
        match self {
            SampleStore::Exact(samples) => samples,
            SampleStore::Reservoir { samples, .. } => samples,
        }
    }
}

struct TrendState {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    store: SampleStore,
}

impl TrendState {
    fn new(strategy: TrendStrategy) -> Self {
        Self {
            count: 0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            store: SampleStore::new(strategy),
        }
    }

    fn add(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.store.push(value, self.count);
    }

    fn snapshot(&self) -> TrendSnapshot {
        let mut sorted = self.store.values().to_vec();
        sorted.sort_unstable_by(f64::total_cmp);
        if self.count == 0 {
            return TrendSnapshot::default();
        }
        TrendSnapshot {
            count: self.count,
            min: self.min,
            max: self.max,
            avg: self.sum / self.count as f64,
            med: percentile(&sorted, 0.50),
            p90: percentile(&sorted, 0.90),
            p95: percentile(&sorted, 0.95),
            p99: percentile(&sorted, 0.99),
            sorted,
        }
    }
}

enum Metric {
    Counter(AtomicU64),
    Rate(Mutex<RateState>),
    Trend(Mutex<TrendState>),
}

impl Metric {
    fn kind(&self) -> MetricKind {
        match self {
            Metric::Counter(_) => MetricKind::Counter,
            Metric::Rate(_) => MetricKind::Rate,
            Metric::Trend(_) => MetricKind::Trend,
        }
    }
}

/// Thread-safe aggregation point for every counter, rate and trend of a run.
///
/// Metrics live in a sharded map and each one carries its own atomic or lock, so
/// concurrent writers to different metrics never contend on a shared lock.
pub struct MetricSink {
    metrics: DashMap<String, Metric>,
    strategy: TrendStrategy,
    started: Instant,
}

impl Default for MetricSink {
    fn default() -> Self {
        Self::new(TrendStrategy::Exact)
    }
}

impl MetricSink {
    pub fn new(strategy: TrendStrategy) -> Self {
        Self { metrics: DashMap::new(), strategy, started: Instant::now() }
    }

    /// Register a metric with zero samples so it appears in snapshots even if never written.
    pub fn declare(&self, name: &str, kind: MetricKind) {
        self.metrics.entry(name.to_string()).or_insert_with(|| self.fresh(kind));
    }

    pub fn increment(&self, name: &str) {
        self.add(name, 1);
    }

    pub fn add(&self, name: &str, n: u64) {
        self.with_metric(name, MetricKind::Counter, |metric| {
            if let Metric::Counter(count) = metric {
                count.fetch_add(n, Ordering::Relaxed);
            }
        });
    }

    pub fn add_rate(&self, name: &str, value: bool) {
        self.with_metric(name, MetricKind::Rate, |metric| {
            if let Metric::Rate(state) = metric {
                let mut state = state.lock();
                state.total += 1;
                if value {
                    state.passes += 1;
                }
            }
        });
    }

    pub fn add_sample(&self, name: &str, value: f64) {
        self.with_metric(name, MetricKind::Trend, |metric| {
            if let Metric::Trend(state) = metric {
                state.lock().add(value);
            }
        });
    }

    /// Record a duration sample in milliseconds.
    pub fn add_duration(&self, name: &str, value: Duration) {
        self.add_sample(name, value.as_secs_f64() * 1000.0);
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Point-in-time read. Each metric is read atomically on its own; there is no
    /// cross-metric consistency.
    pub fn snapshot(&self) -> MetricSnapshot {
        let elapsed = self.elapsed();
        let secs = elapsed.as_secs_f64();
        let metrics = self
            .metrics
            .iter()
            .map(|entry| {
                let value = match entry.value() {
                    Metric::Counter(count) => {
                        let count = count.load(Ordering::Relaxed);
                        let per_second = if secs > 0.0 { count as f64 / secs } else { 0.0 };
                        MetricValue::Counter(CounterSnapshot { count, per_second })
                    }
                    Metric::Rate(state) => {
                        let state = state.lock();
                        MetricValue::Rate(RateSnapshot::new(state.passes, state.total))
                    }
                    Metric::Trend(state) => MetricValue::Trend(state.lock().snapshot()),
                };
                (entry.key().clone(), value)
            })
            .collect();
        MetricSnapshot { elapsed, metrics }
    }

    fn fresh(&self, kind: MetricKind) -> Metric {
        match kind {
            MetricKind::Counter => Metric::Counter(AtomicU64::new(0)),
            MetricKind::Rate => Metric::Rate(Mutex::new(RateState::default())),
            MetricKind::Trend => Metric::Trend(Mutex::new(TrendState::new(self.strategy))),
        }
    }

    fn with_metric(&self, name: &str, kind: MetricKind, update: impl FnOnce(&Metric)) {
        // Fast path holds only a shard read lock.
        if let Some(metric) = self.metrics.get(name) {
            if metric.kind() == kind {
                update(metric.value());
            } else {
                tracing::warn!(
                    metric = name,
                    expected = ?kind,
                    actual = ?metric.kind(),
                    "metric kind mismatch, sample dropped"
                );
            }
            return;
        }
        let metric = self.metrics.entry(name.to_string()).or_insert_with(|| self.fresh(kind));
        if metric.kind() == kind {
            update(metric.value());
        } else {
            tracing::warn!(
                metric = name,
                expected = ?kind,
                actual = ?metric.kind(),
                "metric kind mismatch, sample dropped"
            );
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CounterSnapshot {
    pub count: u64,
    pub per_second: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RateSnapshot {
    pub passes: u64,
    pub fails: u64,
    pub rate: f64,
}

impl RateSnapshot {
    pub fn new(passes: u64, total: u64) -> Self {
        let rate = if total == 0 { 0.0 } else { passes as f64 / total as f64 };
        Self { passes, fails: total - passes, rate }
    }

    pub fn total(&self) -> u64 {
        self.passes + self.fails
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TrendSnapshot {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub med: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    #[serde(skip)]
    sorted: Vec<f64>,
}

impl TrendSnapshot {
    /// Arbitrary percentile, `p` in `0.0..=1.0`. Returns 0 for an empty trend.
    pub fn percentile(&self, p: f64) -> f64 {
        percentile(&self.sorted, p)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetricValue {
    Counter(CounterSnapshot),
    Rate(RateSnapshot),
    Trend(TrendSnapshot),
}

impl MetricValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Counter(_) => MetricKind::Counter,
            MetricValue::Rate(_) => MetricKind::Rate,
            MetricValue::Trend(_) => MetricKind::Trend,
        }
    }

    /// Number of events recorded. Counters report their value.
    pub fn samples(&self) -> u64 {
        match self {
            MetricValue::Counter(c) => c.count,
            MetricValue::Rate(r) => r.total(),
            MetricValue::Trend(t) => t.count,
        }
    }

    /// True when there is nothing to aggregate. A declared counter always holds a value,
    /// so it is never empty, even at zero.
    pub fn is_empty(&self) -> bool {
        match self {
            MetricValue::Counter(_) => false,
            MetricValue::Rate(_) | MetricValue::Trend(_) => self.samples() == 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSnapshot {
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    pub metrics: BTreeMap<String, MetricValue>,
}

impl MetricSnapshot {
    pub fn get(&self, name: &str) -> Option<&MetricValue> {
        self.metrics.get(name)
    }

    /// Counter value, 0 if the counter is absent.
    pub fn count(&self, name: &str) -> u64 {
        match self.metrics.get(name) {
            Some(MetricValue::Counter(c)) => c.count,
            _ => 0,
        }
    }

    pub fn rate(&self, name: &str) -> Option<&RateSnapshot> {
        match self.metrics.get(name) {
            Some(MetricValue::Rate(r)) => Some(r),
            _ => None,
        }
    }

    pub fn trend(&self, name: &str) -> Option<&TrendSnapshot> {
        match self.metrics.get(name) {
            Some(MetricValue::Trend(t)) => Some(t),
            _ => None,
        }
    }
}

fn serialize_secs<S: serde::Serializer>(
    d: &Duration,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// Element at index `floor(p * n)` of an ascending slice; 0 for an empty slice.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = (p.clamp(0.0, 1.0) * sorted.len() as f64).floor() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

use std::sync::Arc;
use std::time::Duration;
use surge_engine::metrics::{
    self, MetricKind, MetricSink, MetricValue, RateSnapshot, TrendStrategy,
};

#[test]
fn test_counter_concurrent_increments() {
    for n in [1usize, 100, 10_000] {
        let sink = Arc::new(MetricSink::default());
        let threads = 8;
        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let sink = Arc::clone(&sink);
                std::thread::spawn(move || {
                    // Spread n increments over the threads, remainder on thread 0.
                    let share = n / threads + if t == 0 { n % threads } else { 0 };
                    for _ in 0..share {
                        sink.increment(metrics::HTTP_REQS);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(sink.snapshot().count(metrics::HTTP_REQS), n as u64, "n = {n}");
    }
}

#[test]
fn test_rate_is_true_fraction() {
    let sink = MetricSink::default();
    for i in 0..100 {
        sink.add_rate(metrics::ERRORS, i < 7);
    }
    let rate = *sink.snapshot().rate(metrics::ERRORS).unwrap();
    assert_eq!(rate.passes, 7);
    assert_eq!(rate.fails, 93);
    assert_eq!(rate.total(), 100);
    assert!((rate.rate - 0.07).abs() < 1e-12);
}

#[test]
fn test_rate_snapshot_empty_is_zero() {
    let r = RateSnapshot::new(0, 0);
    assert_eq!(r.rate, 0.0);
    assert_eq!(r.total(), 0);
}

#[test]
fn test_trend_statistics() {
    let sink = MetricSink::default();
    // Inserted out of order: sorted is [100, 200, ..., 1000], n = 10
    for v in [500.0, 100.0, 1000.0, 300.0, 200.0, 700.0, 400.0, 900.0, 600.0, 800.0] {
        sink.add_sample(metrics::HTTP_REQ_DURATION, v);
    }
    let snapshot = sink.snapshot();
    let trend = snapshot.trend(metrics::HTTP_REQ_DURATION).unwrap();
    assert_eq!(trend.count, 10);
    assert_eq!(trend.min, 100.0);
    assert_eq!(trend.max, 1000.0);
    assert_eq!(trend.avg, 550.0);
    // index floor(p * n)
    assert_eq!(trend.med, 600.0);
    assert_eq!(trend.p90, 1000.0);
    assert_eq!(trend.p95, 1000.0);
    assert_eq!(trend.percentile(0.25), 300.0);
    assert_eq!(trend.percentile(0.0), 100.0);
}

#[test]
fn test_durations_recorded_in_milliseconds() {
    let sink = MetricSink::default();
    sink.add_duration(metrics::ITERATION_DURATION, Duration::from_millis(120));
    let snapshot = sink.snapshot();
    let trend = snapshot.trend(metrics::ITERATION_DURATION).unwrap();
    assert!((trend.avg - 120.0).abs() < 1e-9);
}

#[test]
fn test_reservoir_keeps_exact_extremes_and_bounded_samples() {
    let sink = MetricSink::new(TrendStrategy::Reservoir { capacity: 64 });
    for v in 1..=10_000 {
        sink.add_sample("latency", v as f64);
    }
    let snapshot = sink.snapshot();
    let trend = snapshot.trend("latency").unwrap();
    assert_eq!(trend.count, 10_000);
    assert_eq!(trend.min, 1.0);
    assert_eq!(trend.max, 10_000.0);
    assert!((trend.avg - 5000.5).abs() < 1e-9);
    // Percentiles come from the reservoir and are only estimates.
    assert!(trend.p95 >= 1.0 && trend.p95 <= 10_000.0);
}

#[test]
fn test_declared_metrics_appear_with_zero_samples() {
    let sink = MetricSink::default();
    sink.declare(metrics::ERRORS, MetricKind::Rate);
    sink.declare(metrics::ITERATIONS, MetricKind::Counter);
    sink.declare(metrics::HTTP_REQ_DURATION, MetricKind::Trend);
    let snapshot = sink.snapshot();
    assert_eq!(snapshot.get(metrics::ERRORS).unwrap().samples(), 0);
    assert_eq!(snapshot.count(metrics::ITERATIONS), 0);
    assert_eq!(snapshot.trend(metrics::HTTP_REQ_DURATION).unwrap().count, 0);
    assert!(snapshot.get("never_written").is_none());
}

#[test]
fn test_kind_mismatch_drops_sample() {
    let sink = MetricSink::default();
    sink.increment("mixed");
    sink.add_rate("mixed", true);
    sink.add_sample("mixed", 1.0);
    let snapshot = sink.snapshot();
    match snapshot.get("mixed").unwrap() {
        MetricValue::Counter(c) => assert_eq!(c.count, 1),
        other => panic!("expected counter, got {other:?}"),
    }
}

#[test]
fn test_check_sub_metric_name() {
    assert_eq!(metrics::check_metric_name("status is 200"), "checks{status is 200}");
}

#[test]
fn test_snapshot_serializes_with_kind_tags() {
    let sink = MetricSink::default();
    sink.increment(metrics::ITERATIONS);
    sink.add_rate(metrics::CHECKS, true);
    let json = serde_json::to_value(sink.snapshot()).unwrap();
    assert_eq!(json["metrics"]["iterations"]["type"], "counter");
    assert_eq!(json["metrics"]["iterations"]["count"], 1);
    assert_eq!(json["metrics"]["checks"]["type"], "rate");
    assert_eq!(json["metrics"]["checks"]["rate"], 1.0);
}

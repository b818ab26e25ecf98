use surge_common::SurgeError;
use surge_engine::metrics::{self, MetricKind, MetricSink, MetricSnapshot};
use surge_engine::threshold::{
    evaluate, Aggregate, Comparison, RuleOutcome, ThresholdExpr, ThresholdRule, ViolationReason,
};

fn errors_at(fails: u32, total: u32) -> MetricSnapshot {
    let sink = MetricSink::default();
    for i in 0..total {
        sink.add_rate(metrics::ERRORS, i < fails);
    }
    sink.snapshot()
}

#[test]
fn test_parse_expressions() {
    let e: ThresholdExpr = "p(95)<500".parse().unwrap();
    assert_eq!(e.aggregate, Aggregate::Percentile(95.0));
    assert_eq!(e.comparison, Comparison::Lt);
    assert_eq!(e.bound, 500.0);

    let e: ThresholdExpr = " rate <= 0.05 ".parse().unwrap();
    assert_eq!(e.aggregate, Aggregate::Rate);
    assert_eq!(e.comparison, Comparison::Le);

    let e: ThresholdExpr = "count>1000".parse().unwrap();
    assert_eq!(e.aggregate, Aggregate::Count);
    assert_eq!(e.comparison, Comparison::Gt);

    let e: ThresholdExpr = "p(99.9)!=0".parse().unwrap();
    assert_eq!(e.aggregate, Aggregate::Percentile(99.9));
    assert_eq!(e.comparison, Comparison::Ne);
    assert_eq!(e.to_string(), "p(99.9)!=0");
}

#[test]
fn test_parse_rejects_garbage() {
    for bad in ["", "p(95)", "p95<500", "p(101)<1", "rate<abc", "median<3", "avg<inf"] {
        assert!(
            matches!(bad.parse::<ThresholdExpr>(), Err(SurgeError::Configuration(_))),
            "{bad:?} should not parse"
        );
    }
}

#[test]
fn test_error_rate_threshold() {
    let rule = ThresholdRule::parse(metrics::ERRORS, "rate<0.05").unwrap();

    let verdict = evaluate(&errors_at(6, 100), std::slice::from_ref(&rule));
    assert!(!verdict.passed);
    assert_eq!(verdict.violations.len(), 1);
    let v = &verdict.violations[0];
    assert_eq!(v.rule.description, "errors: rate<0.05");
    assert!((v.observed.unwrap() - 0.06).abs() < 1e-12);
    assert_eq!(v.reason, ViolationReason::ConditionFailed);

    let verdict = evaluate(&errors_at(4, 100), &[rule]);
    assert!(verdict.passed);
    assert!(verdict.violations.is_empty());
}

#[test]
fn test_violations_in_declaration_order() {
    let sink = MetricSink::default();
    for v in [100.0, 200.0, 900.0] {
        sink.add_sample(metrics::HTTP_REQ_DURATION, v);
    }
    sink.add_rate(metrics::ERRORS, true);
    let rules = vec![
        ThresholdRule::parse(metrics::HTTP_REQ_DURATION, "p(95)<400").unwrap(),
        ThresholdRule::parse(metrics::HTTP_REQ_DURATION, "avg<1000").unwrap(),
        ThresholdRule::parse(metrics::ERRORS, "rate<0.1").unwrap(),
    ];
    let verdict = evaluate(&sink.snapshot(), &rules);
    let failed: Vec<_> = verdict.violated_rules().map(|r| r.description.as_str()).collect();
    assert_eq!(failed, vec!["http_req_duration: p(95)<400", "errors: rate<0.1"]);
}

#[test]
fn test_missing_metric_is_violation() {
    let rule = ThresholdRule::parse("transaction_duration", "p(95)<400").unwrap();
    let verdict = evaluate(&MetricSink::default().snapshot(), &[rule.clone().allow_empty(true)]);
    assert!(!verdict.passed);
    assert_eq!(verdict.violations[0].reason, ViolationReason::MissingMetric);
}

#[test]
fn test_empty_metric_needs_allow_empty() {
    let sink = MetricSink::default();
    sink.declare(metrics::HTTP_REQ_DURATION, MetricKind::Trend);
    let snapshot = sink.snapshot();

    let strict = ThresholdRule::parse(metrics::HTTP_REQ_DURATION, "p(95)<500").unwrap();
    assert!(matches!(
        strict.check(&snapshot),
        RuleOutcome::Violated { reason: ViolationReason::NoSamples, .. }
    ));
    assert_eq!(strict.clone().allow_empty(true).check(&snapshot), RuleOutcome::Passed);
}

#[test]
fn test_zero_counter_is_a_value() {
    let sink = MetricSink::default();
    sink.declare(metrics::ERRORS_TRANSPORT, MetricKind::Counter);
    let snapshot = sink.snapshot();

    let clean = ThresholdRule::parse(metrics::ERRORS_TRANSPORT, "count<1").unwrap();
    assert_eq!(clean.check(&snapshot), RuleOutcome::Passed);

    let busy = ThresholdRule::parse(metrics::ERRORS_TRANSPORT, "count>0").unwrap();
    assert_eq!(
        busy.check(&snapshot),
        RuleOutcome::Violated { observed: Some(0.0), reason: ViolationReason::ConditionFailed }
    );
}

#[test]
fn test_aggregate_kind_mismatch() {
    let sink = MetricSink::default();
    sink.add_rate(metrics::ERRORS, false);
    let rule = ThresholdRule::parse(metrics::ERRORS, "p(95)<1").unwrap();
    assert!(matches!(
        rule.check(&sink.snapshot()),
        RuleOutcome::Violated { reason: ViolationReason::NotApplicable(MetricKind::Rate), .. }
    ));
}

#[test]
fn test_counter_aggregates() {
    let sink = MetricSink::default();
    sink.add(metrics::SUCCESSFUL_TRANSACTIONS, 1001);
    let snapshot = sink.snapshot();
    let over = ThresholdRule::parse(metrics::SUCCESSFUL_TRANSACTIONS, "count>1000").unwrap();
    assert!(evaluate(&snapshot, &[over]).passed);
    let too_high = ThresholdRule::parse(metrics::SUCCESSFUL_TRANSACTIONS, "count>=2000").unwrap();
    assert!(!evaluate(&snapshot, &[too_high]).passed);
}

#[test]
fn test_custom_rule() {
    let sink = MetricSink::default();
    sink.add(metrics::HTTP_REQS, 10);
    sink.add(metrics::ITERATIONS, 5);
    let rule = ThresholdRule::custom(metrics::HTTP_REQS, "two requests per iteration", |s| {
        s.count(metrics::HTTP_REQS) == 2 * s.count(metrics::ITERATIONS)
    });
    assert!(evaluate(&sink.snapshot(), &[rule]).passed);
}

#[test]
fn test_no_rules_passes() {
    assert!(evaluate(&MetricSink::default().snapshot(), &[]).passed);
}

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use surge_common::{Result, SurgeError};

use crate::metrics::{MetricSnapshot, MetricValue};

/// Statistic a threshold expression reads from a metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregate {
    /// Counter value, or number of samples of a trend.
    Count,
    /// Fraction of true events for a rate; events per second for a counter.
    Rate,
    Avg,
    Min,
    Max,
    Med,
    /// `p(N)` with N in percent.
    Percentile(f64),
}

impl Aggregate {
    /// Read this aggregate from `value`, or `None` if it does not apply to the metric kind.
    pub fn read(&self, value: &MetricValue) -> Option<f64> {
        match (self, value) {
            (Aggregate::Count, MetricValue::Counter(c)) => Some(c.count as f64),
            (Aggregate::Rate, MetricValue::Counter(c)) => Some(c.per_second),
            (Aggregate::Rate, MetricValue::Rate(r)) => Some(r.rate),
            (Aggregate::Count, MetricValue::Trend(t)) => Some(t.count as f64),
            (Aggregate::Avg, MetricValue::Trend(t)) => Some(t.avg),
            (Aggregate::Min, MetricValue::Trend(t)) => Some(t.min),
            (Aggregate::Max, MetricValue::Trend(t)) => Some(t.max),
            (Aggregate::Med, MetricValue::Trend(t)) => Some(t.med),
            (Aggregate::Percentile(p), MetricValue::Trend(t)) => Some(t.percentile(p / 100.0)),
            _ => None,
        }
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregate::Count => f.write_str("count"),
            Aggregate::Rate => f.write_str("rate"),
            Aggregate::Avg => f.write_str("avg"),
            Aggregate::Min => f.write_str("min"),
            Aggregate::Max => f.write_str("max"),
            Aggregate::Med => f.write_str("med"),
            Aggregate::Percentile(p) => write!(f, "p({p})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparison {
    pub fn holds(&self, observed: f64, bound: f64) -> bool {
        match self {
            Comparison::Lt => observed < bound,
            Comparison::Le => observed <= bound,
            Comparison::Gt => observed > bound,
            Comparison::Ge => observed >= bound,
            Comparison::Eq => observed == bound,
            Comparison::Ne => observed != bound,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
        }
    }
}

/// Parsed `aggregate op number` expression, e.g. `p(95)<500` or `rate < 0.05`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdExpr {
    pub aggregate: Aggregate,
    pub comparison: Comparison,
    pub bound: f64,
}

impl fmt::Display for ThresholdExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.aggregate, self.comparison.symbol(), self.bound)
    }
}

impl FromStr for ThresholdExpr {
    type Err = SurgeError;

    fn from_str(raw: &str) -> Result<Self> {
        let invalid = |why: &str| SurgeError::config(format!("invalid threshold {raw:?}: {why}"));

        let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        // Two-character operators must be tried before their one-character prefixes.
        let (op_pos, comparison, op_len) = [
            ("<=", Comparison::Le),
            (">=", Comparison::Ge),
            ("==", Comparison::Eq),
            ("!=", Comparison::Ne),
            ("<", Comparison::Lt),
            (">", Comparison::Gt),
        ]
        .iter()
        .find_map(|(sym, cmp)| compact.find(sym).map(|pos| (pos, *cmp, sym.len())))
        .ok_or_else(|| invalid("missing comparison operator"))?;

        let lhs = &compact[..op_pos];
        let rhs = &compact[op_pos + op_len..];

        let aggregate = match lhs {
            "count" => Aggregate::Count,
            "rate" => Aggregate::Rate,
            "avg" => Aggregate::Avg,
            "min" => Aggregate::Min,
            "max" => Aggregate::Max,
            "med" => Aggregate::Med,
            _ => {
                let inner = lhs
                    .strip_prefix("p(")
                    .and_then(|s| s.strip_suffix(')'))
                    .ok_or_else(|| invalid("unknown aggregate"))?;
                let p: f64 = inner.parse().map_err(|_| invalid("percentile is not a number"))?;
                if !(0.0..=100.0).contains(&p) {
                    return Err(invalid("percentile must be between 0 and 100"));
                }
                Aggregate::Percentile(p)
            }
        };

        let bound: f64 = rhs.parse().map_err(|_| invalid("bound is not a number"))?;
        if !bound.is_finite() {
            return Err(invalid("bound must be finite"));
        }

        Ok(ThresholdExpr { aggregate, comparison, bound })
    }
}

type Predicate = Arc<dyn Fn(&MetricSnapshot) -> bool + Send + Sync>;

/// What a rule checks.
#[derive(Clone)]
pub enum Condition {
    Expr(ThresholdExpr),
    /// Arbitrary predicate over the whole snapshot. The rule's metric must still be
    /// present for it to run.
    Custom(Predicate),
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Expr(expr) => f.debug_tuple("Expr").field(expr).finish(),
            Condition::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Pass/fail condition over one metric, declared per run.
#[derive(Debug, Clone)]
pub struct ThresholdRule {
    pub metric: String,
    pub condition: Condition,
    pub description: String,
    /// Pass vacuously when a rate or trend exists but recorded nothing. Counters are
    /// read as their value, so `count<1` on a declared counter passes at zero.
    pub allow_empty: bool,
    /// Evaluate during the run and stop it as soon as the rule is violated.
    pub abort_on_fail: bool,
}

impl ThresholdRule {
    /// Rule from a textual expression such as `p(95)<500`.
    pub fn parse(metric: impl Into<String>, expr: &str) -> Result<Self> {
        let metric = metric.into();
        if metric.trim().is_empty() {
            return Err(SurgeError::config("threshold metric name is empty"));
        }
        let parsed: ThresholdExpr = expr.parse()?;
        Ok(Self {
            description: format!("{metric}: {}", expr.trim()),
            metric,
            condition: Condition::Expr(parsed),
            allow_empty: false,
            abort_on_fail: false,
        })
    }

    pub fn custom(
        metric: impl Into<String>,
        description: impl Into<String>,
        predicate: impl Fn(&MetricSnapshot) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            metric: metric.into(),
            condition: Condition::Custom(Arc::new(predicate)),
            description: description.into(),
            allow_empty: false,
            abort_on_fail: false,
        }
    }

    pub fn allow_empty(mut self, allow: bool) -> Self {
        self.allow_empty = allow;
        self
    }

    pub fn abort_on_fail(mut self, abort: bool) -> Self {
        self.abort_on_fail = abort;
        self
    }

    /// Evaluate this rule alone against `snapshot`.
    pub fn check(&self, snapshot: &MetricSnapshot) -> RuleOutcome {
        let Some(value) = snapshot.get(&self.metric) else {
            return RuleOutcome::Violated { observed: None, reason: ViolationReason::MissingMetric };
        };
        if value.is_empty() {
            return if self.allow_empty {
                RuleOutcome::Passed
            } else {
                RuleOutcome::Violated { observed: None, reason: ViolationReason::NoSamples }
            };
        }
        match &self.condition {
            Condition::Expr(expr) => match expr.aggregate.read(value) {
                None => RuleOutcome::Violated {
                    observed: None,
                    reason: ViolationReason::NotApplicable(value.kind()),
                },
                Some(observed) if expr.comparison.holds(observed, expr.bound) => {
                    RuleOutcome::Passed
                }
                Some(observed) => RuleOutcome::Violated {
                    observed: Some(observed),
                    reason: ViolationReason::ConditionFailed,
                },
            },
            Condition::Custom(predicate) => {
                if predicate(snapshot) {
                    RuleOutcome::Passed
                } else {
                    RuleOutcome::Violated {
                        observed: None,
                        reason: ViolationReason::ConditionFailed,
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViolationReason {
    ConditionFailed,
    MissingMetric,
    NoSamples,
    NotApplicable(crate::metrics::MetricKind),
}

impl fmt::Display for ViolationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationReason::ConditionFailed => f.write_str("condition not met"),
            ViolationReason::MissingMetric => f.write_str("metric not recorded"),
            ViolationReason::NoSamples => f.write_str("metric has no samples"),
            ViolationReason::NotApplicable(kind) => {
                write!(f, "aggregate does not apply to a {kind:?} metric")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    Passed,
    Violated { observed: Option<f64>, reason: ViolationReason },
}

#[derive(Debug, Clone)]
pub struct Violation {
    pub rule: ThresholdRule,
    pub observed: Option<f64>,
    pub reason: ViolationReason,
}

/// Final pass/fail of a run. Built once by [`evaluate`].
#[derive(Debug, Clone)]
pub struct RunVerdict {
    pub passed: bool,
    /// Violations in rule declaration order.
    pub violations: Vec<Violation>,
}

impl RunVerdict {
    pub fn violated_rules(&self) -> impl Iterator<Item = &ThresholdRule> {
        self.violations.iter().map(|v| &v.rule)
    }
}

/// Evaluate every rule independently against `snapshot`.
pub fn evaluate(snapshot: &MetricSnapshot, rules: &[ThresholdRule]) -> RunVerdict {
    let violations: Vec<Violation> = rules
        .iter()
        .filter_map(|rule| match rule.check(snapshot) {
            RuleOutcome::Passed => None,
            RuleOutcome::Violated { observed, reason } => {
                Some(Violation { rule: rule.clone(), observed, reason })
            }
        })
        .collect();
    RunVerdict { passed: violations.is_empty(), violations }
}

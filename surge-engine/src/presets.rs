use rand::Rng;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use surge_common::{RequestSpec, Result};

use crate::check::Check;
use crate::metrics;
use crate::pacing::Pacing;
use crate::ramp::{RampProfile, Stage};
use crate::scenario::Scenario;
use crate::threshold::ThresholdRule;
use crate::workload::{IterationContext, Step, Workload};

pub const HEALTH_PATH: &str = "/health";
pub const READY_PATH: &str = "/ready";
pub const VALIDATE_PATH: &str = "/api/v1/validate";

const CURRENCY: &str = "MXN";
/// Pause between the smoke probes, inside one iteration.
const SMOKE_STEP_PAUSE: Duration = Duration::from_secs(1);

/// Built-in scenarios against the transaction validation API.
///
/// | Preset | Peak workers | Length | Pacing     | Thresholds                                   |
/// |--------|--------------|--------|------------|----------------------------------------------|
/// | Smoke  |       1      |  1 m   | 2 s        | p(95) < 500 ms, errors < 10 %                |
/// | Load   |      20      | 16 m   | 1 s to 3 s | p(95) < 400, p(99) < 600, errors < 5 %, >1000 |
/// | Stress |     150      | 24 m   | 0.5 s      | p(95) < 1000 ms, errors < 15 %               |
/// | Spike  |     200      |  7 m   | 1 s        | p(95) < 2000 ms                              |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Smoke,
    Load,
    Stress,
    Spike,
}

impl Preset {
    pub const ALL: [Preset; 4] = [Preset::Smoke, Preset::Load, Preset::Stress, Preset::Spike];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "smoke" => Some(Preset::Smoke),
            "load" => Some(Preset::Load),
            "stress" => Some(Preset::Stress),
            "spike" => Some(Preset::Spike),
            _ => None,
        }
    }

    pub fn as_name(&self) -> &'static str {
        match self {
            Preset::Smoke => "smoke",
            Preset::Load => "load",
            Preset::Stress => "stress",
            Preset::Spike => "spike",
        }
    }

    pub fn stages(&self) -> Vec<Stage> {
        let m = |mins: u64| Duration::from_secs(mins * 60);
        let s = Duration::from_secs;
        match self {
            Preset::Smoke => vec![Stage::new(Duration::ZERO, 1), Stage::new(m(1), 1)],
            Preset::Load => vec![
                Stage::new(m(2), 10),
                Stage::new(m(5), 10),
                Stage::new(m(2), 20),
                Stage::new(m(5), 20),
                Stage::new(m(2), 0),
            ],
            Preset::Stress => vec![
                Stage::new(m(2), 50),
                Stage::new(m(5), 50),
                Stage::new(m(2), 100),
                Stage::new(m(5), 100),
                Stage::new(m(2), 150),
                Stage::new(m(5), 150),
                Stage::new(m(3), 0),
            ],
            Preset::Spike => vec![
                Stage::new(s(30), 10),
                Stage::new(m(1), 10),
                Stage::new(s(30), 200),
                Stage::new(m(3), 200),
                Stage::new(s(30), 10),
                Stage::new(m(1), 10),
                Stage::new(s(30), 0),
            ],
        }
    }

    pub fn profile(&self) -> Result<RampProfile> {
        RampProfile::new(self.stages())
    }

    pub fn pacing(&self) -> Pacing {
        match self {
            Preset::Smoke => Pacing::Fixed(Duration::from_secs(2)),
            Preset::Load => Pacing::Uniform {
                min: Duration::from_secs(1),
                max: Duration::from_secs(3),
            },
            Preset::Stress => Pacing::Fixed(Duration::from_millis(500)),
            Preset::Spike => Pacing::Fixed(Duration::from_secs(1)),
        }
    }

    pub fn thresholds(&self) -> Result<Vec<ThresholdRule>> {
        let rules: &[(&str, &str)] = match self {
            Preset::Smoke => {
                &[(metrics::HTTP_REQ_DURATION, "p(95)<500"), (metrics::ERRORS, "rate<0.1")]
            }
            Preset::Load => &[
                (metrics::HTTP_REQ_DURATION, "p(95)<400"),
                (metrics::HTTP_REQ_DURATION, "p(99)<600"),
                (metrics::ERRORS, "rate<0.05"),
                (metrics::SUCCESSFUL_TRANSACTIONS, "count>1000"),
            ],
            Preset::Stress => {
                &[(metrics::HTTP_REQ_DURATION, "p(95)<1000"), (metrics::ERRORS, "rate<0.15")]
            }
            Preset::Spike => &[(metrics::HTTP_REQ_DURATION, "p(95)<2000")],
        };
        rules.iter().map(|(metric, expr)| ThresholdRule::parse(*metric, expr)).collect()
    }

    pub fn workload(&self) -> Arc<dyn Workload> {
        Arc::new(PresetWorkload::new(*self))
    }

    /// The complete built-in scenario for this preset.
    pub fn scenario(&self) -> Result<Scenario> {
        Ok(Scenario::new(self.as_name(), self.profile()?, self.workload())
            .with_pacing(self.pacing())
            .with_thresholds(self.thresholds()?))
    }
}

/// Request plan shared by all presets; the preset decides the steps and their checks.
pub struct PresetWorkload {
    preset: Preset,
    health_checks: Arc<[Check]>,
    ready_checks: Arc<[Check]>,
    validate_checks: Arc<[Check]>,
}

impl PresetWorkload {
    pub fn new(preset: Preset) -> Self {
        let validate_checks: Arc<[Check]> = match preset {
            Preset::Smoke => Arc::from(vec![
                Check::status_in("validate status is 200 or 500", &[200, 500]),
                Check::body_not_empty("validate has response"),
                Check::latency_below("validate latency < 300ms", Duration::from_millis(300)),
            ]),
            Preset::Load => Arc::from(vec![
                Check::status(200),
                Check::status_not(500),
                Check::has_json_field("has transaction result", "transactionId"),
                Check::latency_below("latency acceptable", Duration::from_millis(500)),
            ]),
            Preset::Stress => {
                Arc::from(vec![Check::status_in("status is 200 or 500", &[200, 500])])
            }
            Preset::Spike => Arc::from(Vec::new()),
        };
        Self {
            preset,
            health_checks: Arc::from(vec![
                Check::new("health status is 200", |r| r.status == 200),
                Check::json_field_equals("health response has status", "status", json!("healthy")),
            ]),
            ready_checks: Arc::from(vec![Check::new("ready status is 200", |r| r.status == 200)]),
            validate_checks,
        }
    }
}

impl Workload for PresetWorkload {
    fn plan(&self, ctx: &IterationContext) -> Vec<Step> {
        let payload =
            transaction_payload(self.preset, ctx, unix_millis(), &mut rand::thread_rng());
        let validate = Step::new(
            RequestSpec::post_json(VALIDATE_PATH, payload),
            Arc::clone(&self.validate_checks),
        );
        match self.preset {
            Preset::Smoke => vec![
                Step::new(RequestSpec::get(HEALTH_PATH), Arc::clone(&self.health_checks))
                    .then_pause(SMOKE_STEP_PAUSE),
                Step::new(RequestSpec::get(READY_PATH), Arc::clone(&self.ready_checks))
                    .then_pause(SMOKE_STEP_PAUSE),
                validate,
            ],
            Preset::Load | Preset::Stress | Preset::Spike => vec![validate],
        }
    }
}

/// Body of the validate request for one iteration. Exposed for deterministic testing.
pub fn transaction_payload(
    preset: Preset,
    ctx: &IterationContext,
    now_ms: u128,
    rng: &mut impl Rng,
) -> Value {
    let vu = ctx.worker_id;
    let iter = ctx.iteration;
    match preset {
        Preset::Smoke => json!({
            "transactionId": format!("txn-{now_ms}-{}", uuid::Uuid::new_v4()),
            "amount": rng.gen_range(100..10_100),
            "currency": CURRENCY,
            "userId": format!("user-{}", rng.gen_range(0..1000)),
        }),
        Preset::Load => json!({
            "transactionId": format!("load-{now_ms}-{vu}-{iter}"),
            "amount": rng.gen_range(100..50_100),
            "currency": CURRENCY,
            "userId": format!("user-{vu}"),
            "merchantId": format!("merchant-{}", rng.gen_range(0..100)),
        }),
        Preset::Stress => json!({
            "transactionId": format!("stress-{now_ms}-{vu}-{iter}"),
            "amount": rng.gen_range(1_000..101_000),
            "currency": CURRENCY,
            "userId": format!("user-{vu}"),
        }),
        Preset::Spike => json!({
            "transactionId": format!("spike-{now_ms}-{vu}"),
            "amount": rng.gen_range(0.0..10_000.0),
            "currency": CURRENCY,
        }),
    }
}

fn unix_millis() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis()).unwrap_or_default()
}

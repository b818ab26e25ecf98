use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use surge_common::{Result, SurgeError};

use crate::pacing::Pacing;
use crate::presets::Preset;
use crate::ramp::{RampProfile, Stage};
use crate::scenario::Scenario;
use crate::threshold::ThresholdRule;

/// JSON scenario document loaded with `--scenario-file`.
///
/// ```json
/// {
///   "name": "checkout-ramp",
///   "workload": "load",
///   "stages": [{ "duration": "30s", "target": 10 }, { "duration": "1m", "target": 0 }],
///   "pacing": { "uniform": { "min": "1s", "max": "3s" } },
///   "thresholds": {
///     "http_req_duration": ["p(95)<400", "p(99)<600"],
///     "errors": { "threshold": "rate<0.05", "abortOnFail": true }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ScenarioFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Built-in request plan: smoke | load | stress | spike
    pub workload: String,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub stages: Vec<StageEntry>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub vus: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub duration: Option<HumanDuration>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u64>,

    /// Defaults to the workload preset's pacing.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pacing: Option<PacingEntry>,

    /// Metric name to rules, in declaration order.
    #[serde(skip_serializing_if = "IndexMap::is_empty", default)]
    pub thresholds: IndexMap<String, ThresholdEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageEntry {
    pub duration: HumanDuration,
    pub target: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacingEntry {
    None,
    Fixed(HumanDuration),
    Uniform { min: HumanDuration, max: HumanDuration },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ThresholdEntry {
    Many(Vec<ThresholdSpec>),
    One(ThresholdSpec),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ThresholdSpec {
    Expr(String),
    #[serde(rename_all = "camelCase")]
    Detailed {
        threshold: String,
        #[serde(default)]
        abort_on_fail: bool,
        #[serde(default)]
        allow_empty: bool,
    },
}

/// Duration written as a humantime string (`"1m30s"`) or as whole seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HumanDuration(pub Duration);

impl Serialize for HumanDuration {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(self.0).to_string())
    }
}

impl<'de> Deserialize<'de> for HumanDuration {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl<'de> serde::de::Visitor<'de> for V {
            type Value = HumanDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a duration such as \"30s\" or a number of seconds")
            }

            fn visit_u64<E>(self, v: u64) -> std::result::Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(HumanDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> std::result::Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(|secs| HumanDuration(Duration::from_secs(secs)))
                    .map_err(|_| E::custom("duration must be non-negative"))
            }

            fn visit_f64<E>(self, v: f64) -> std::result::Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Duration::try_from_secs_f64(v).map(HumanDuration).map_err(E::custom)
            }

            fn visit_str<E>(self, v: &str) -> std::result::Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                humantime::parse_duration(v).map(HumanDuration).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(V)
    }
}

impl ScenarioFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SurgeError::config(format!("failed to read scenario file {}: {e}", path.display()))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            SurgeError::config(format!("invalid scenario file {}: {e}", path.display()))
        })
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| SurgeError::config(format!("invalid scenario file: {e}")))
    }

    pub fn into_scenario(self) -> Result<Scenario> {
        let preset = Preset::from_name(&self.workload).ok_or_else(|| {
            SurgeError::config(format!(
                "unknown workload {:?}, expected smoke, load, stress or spike",
                self.workload
            ))
        })?;

        let profile = match (self.stages.is_empty(), self.vus, self.duration) {
            (false, None, None) => RampProfile::new(
                self.stages.iter().map(|s| Stage::new(s.duration.0, s.target)).collect(),
            )?,
            (true, Some(vus), Some(duration)) => RampProfile::constant(vus, duration.0)?,
            (true, None, None) => {
                return Err(SurgeError::config("scenario needs either stages or vus and duration"))
            }
            (false, _, _) => {
                return Err(SurgeError::config("stages cannot be combined with vus or duration"))
            }
            (true, _, _) => {
                return Err(SurgeError::config("vus and duration must be given together"))
            }
        };

        let pacing = match self.pacing {
            None => preset.pacing(),
            Some(PacingEntry::None) => Pacing::None,
            Some(PacingEntry::Fixed(d)) => Pacing::Fixed(d.0),
            Some(PacingEntry::Uniform { min, max }) => Pacing::uniform(min.0, max.0)?,
        };

        let mut thresholds = Vec::new();
        for (metric, entry) in &self.thresholds {
            let specs = match entry {
                ThresholdEntry::Many(specs) => specs.as_slice(),
                ThresholdEntry::One(spec) => std::slice::from_ref(spec),
            };
            for spec in specs {
                thresholds.push(spec.to_rule(metric)?);
            }
        }

        let name = self.name.unwrap_or_else(|| preset.as_name().to_string());
        let scenario = Scenario::new(name, profile, preset.workload())
            .with_pacing(pacing)
            .with_thresholds(thresholds)
            .with_iterations(self.iterations);
        scenario.validate()?;
        Ok(scenario)
    }
}

impl ThresholdSpec {
    fn to_rule(&self, metric: &str) -> Result<ThresholdRule> {
        match self {
            ThresholdSpec::Expr(expr) => ThresholdRule::parse(metric, expr),
            ThresholdSpec::Detailed { threshold, abort_on_fail, allow_empty } => {
                Ok(ThresholdRule::parse(metric, threshold)?
                    .abort_on_fail(*abort_on_fail)
                    .allow_empty(*allow_empty))
            }
        }
    }
}

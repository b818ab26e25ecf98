use std::fmt;
use std::sync::Arc;
use surge_common::{Result, SurgeError};

use crate::pacing::Pacing;
use crate::ramp::RampProfile;
use crate::threshold::ThresholdRule;
use crate::workload::Workload;

/// Everything the engine needs to run one load scenario.
#[derive(Clone)]
pub struct Scenario {
    pub name: String,
    pub profile: RampProfile,
    pub workload: Arc<dyn Workload>,
    pub pacing: Pacing,
    pub thresholds: Vec<ThresholdRule>,
    /// Total iteration budget shared by all workers.
    pub iterations: Option<u64>,
}

impl Scenario {
    pub fn new(name: impl Into<String>, profile: RampProfile, workload: Arc<dyn Workload>) -> Self {
        Self {
            name: name.into(),
            profile,
            workload,
            pacing: Pacing::None,
            thresholds: Vec::new(),
            iterations: None,
        }
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_thresholds(mut self, thresholds: Vec<ThresholdRule>) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_iterations(mut self, iterations: Option<u64>) -> Self {
        self.iterations = iterations;
        self
    }

    /// Fail fast on anything that would make the run meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(SurgeError::config("scenario name cannot be empty"));
        }
        if self.iterations == Some(0) {
            return Err(SurgeError::config("iteration budget must be at least 1"));
        }
        if let Pacing::Uniform { min, max } = self.pacing {
            if min > max {
                return Err(SurgeError::config("pacing range is inverted"));
            }
        }
        if let Some(rule) = self.thresholds.iter().find(|r| r.metric.trim().is_empty()) {
            return Err(SurgeError::config(format!(
                "threshold {:?} has no metric",
                rule.description
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scenario")
            .field("name", &self.name)
            .field("profile", &self.profile)
            .field("pacing", &self.pacing)
            .field("thresholds", &self.thresholds)
            .field("iterations", &self.iterations)
            .finish_non_exhaustive()
    }
}

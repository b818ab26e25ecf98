use serde::{Deserialize, Serialize};
use std::time::Duration;
use surge_common::{Result, SurgeError};

/// One leg of a ramp: move linearly from the previous target to `target` over `duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub duration: Duration,
    pub target: u32,
}

impl Stage {
    pub fn new(duration: Duration, target: u32) -> Self {
        Self { duration, target }
    }
}

/// Ordered stage list. Concurrency starts at 0 before the first stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RampProfile {
    stages: Vec<Stage>,
}

impl RampProfile {
    pub fn new(stages: Vec<Stage>) -> Result<Self> {
        if stages.is_empty() {
            return Err(SurgeError::config("ramp profile has no stages"));
        }
        let profile = Self { stages };
        if profile.total_duration().is_zero() {
            return Err(SurgeError::config("ramp profile has zero total duration"));
        }
        Ok(profile)
    }

    /// `vus` workers for the whole of `duration`: an instant jump followed by a hold.
    pub fn constant(vus: u32, duration: Duration) -> Result<Self> {
        Self::new(vec![Stage::new(Duration::ZERO, vus), Stage::new(duration, vus)])
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    /// Highest target any stage reaches.
    pub fn peak(&self) -> u32 {
        self.stages.iter().map(|s| s.target).max().unwrap_or(0)
    }
}

/// Pure mapping from elapsed run time to target concurrency.
#[derive(Debug, Clone)]
pub struct RampScheduler {
    profile: RampProfile,
}

impl RampScheduler {
    pub fn new(profile: RampProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &RampProfile {
        &self.profile
    }

    /// Target concurrency at `elapsed`, or `None` once the ramp is over.
    ///
    /// At exactly the total duration the final stage target is returned; anything past it
    /// means the run is complete. Zero-duration stages jump without interpolation.
    pub fn target_at(&self, elapsed: Duration) -> Option<u32> {
        let t = elapsed.as_secs_f64();
        let mut from = 0u32;
        let mut start = 0.0f64;

        for stage in self.profile.stages() {
            let span = stage.duration.as_secs_f64();
            if span == 0.0 {
                from = stage.target;
                continue;
            }
            let end = start + span;
            if t < end {
                let fraction = (t - start) / span;
                let value = from as f64 + fraction * (stage.target as f64 - from as f64);
                return Some(value.round() as u32);
            }
            from = stage.target;
            start = end;
        }

        if elapsed <= self.profile.total_duration() {
            Some(from)
        } else {
            None
        }
    }

    /// Same as [`RampScheduler::target_at`] for a raw seconds value, rejecting negative,
    /// non-finite and unrepresentable input.
    pub fn target_at_secs(&self, secs: f64) -> Result<Option<u32>> {
        if secs < 0.0 {
            return Err(SurgeError::InvalidTime(format!("{secs}s")));
        }
        let elapsed = Duration::try_from_secs_f64(secs)
            .map_err(|e| SurgeError::InvalidTime(format!("{secs}s: {e}")))?;
        Ok(self.target_at(elapsed))
    }

    /// Index of the stage active at `elapsed`, for progress logging.
    pub fn stage_index_at(&self, elapsed: Duration) -> Option<usize> {
        let mut end = Duration::ZERO;
        for (idx, stage) in self.profile.stages().iter().enumerate() {
            end += stage.duration;
            if elapsed < end {
                return Some(idx);
            }
        }
        if elapsed <= end {
            self.profile.stages().len().checked_sub(1)
        } else {
            None
        }
    }
}

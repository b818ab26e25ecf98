use rand::Rng;
use std::time::Duration;
use surge_common::{Result, SurgeError};
use tokio::sync::watch;

/// Think time applied after every iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pacing {
    #[default]
    None,
    Fixed(Duration),
    /// Uniformly distributed in `min..=max`.
    Uniform { min: Duration, max: Duration },
}

impl Pacing {
    pub fn uniform(min: Duration, max: Duration) -> Result<Self> {
        if min > max {
            return Err(SurgeError::config(format!(
                "pacing range is inverted: min {min:?} > max {max:?}"
            )));
        }
        Ok(Pacing::Uniform { min, max })
    }

    pub fn draw(&self, rng: &mut impl Rng) -> Duration {
        match *self {
            Pacing::None => Duration::ZERO,
            Pacing::Fixed(d) => d,
            Pacing::Uniform { min, max } if min == max => min,
            Pacing::Uniform { min, max } => {
                let nanos = rng.gen_range(min.as_nanos()..=max.as_nanos());
                Duration::from_nanos(nanos as u64)
            }
        }
    }

    /// Sleep for one drawn pause. Returns `false` if `stop` fired (or its sender went
    /// away) before the pause elapsed.
    pub async fn pause(&self, stop: &mut watch::Receiver<bool>) -> bool {
        let delay = self.draw(&mut rand::thread_rng());
        if *stop.borrow() {
            return false;
        }
        if delay.is_zero() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = stop.wait_for(|stopped| *stopped) => false,
        }
    }
}

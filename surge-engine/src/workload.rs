use std::sync::Arc;
use std::time::Duration;
use surge_common::RequestSpec;

use crate::check::Check;

/// Identifies one iteration for request construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationContext {
    /// 1-based virtual worker id.
    pub worker_id: u64,
    /// 0-based iteration number within this worker.
    pub iteration: u64,
}

/// One request of an iteration and the checks applied to its response.
#[derive(Debug, Clone)]
pub struct Step {
    pub request: RequestSpec,
    pub checks: Arc<[Check]>,
    /// Think time after this step, inside the iteration. Cut short by retire/stop.
    pub pause: Option<Duration>,
}

impl Step {
    pub fn new(request: RequestSpec, checks: Arc<[Check]>) -> Self {
        Self { request, checks, pause: None }
    }

    pub fn unchecked(request: RequestSpec) -> Self {
        Self::new(request, Arc::from(Vec::new()))
    }

    pub fn then_pause(mut self, pause: Duration) -> Self {
        self.pause = Some(pause);
        self
    }
}

/// Builds the requests of one iteration. Steps run in order.
pub trait Workload: Send + Sync {
    fn plan(&self, ctx: &IterationContext) -> Vec<Step>;
}

impl<F> Workload for F
where
    F: Fn(&IterationContext) -> Vec<Step> + Send + Sync,
{
    fn plan(&self, ctx: &IterationContext) -> Vec<Step> {
        self(ctx)
    }
}

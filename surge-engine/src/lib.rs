pub mod check;
pub mod engine;
pub mod metrics;
pub mod pacing;
pub mod pool;
pub mod presets;
pub mod ramp;
pub mod runner;
pub mod scenario;
pub mod scenario_file;
pub mod threshold;
pub mod transport;
pub mod workload;

pub use engine::{Engine, EngineConfig, RunResult};
pub use scenario::Scenario;

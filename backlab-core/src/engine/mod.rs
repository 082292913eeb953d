//! Simulation engine: configuration, run status and the daily loop.

pub mod loop_runner;
pub mod progress;
pub mod state;

pub use loop_runner::{run_backtest, run_backtest_with};
pub use progress::{RunControl, RunProgress};
pub use state::{EngineConfig, EngineError, EngineRun, RunStatus};

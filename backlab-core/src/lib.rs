//! BackLab Core: cost model, portfolio ledger, price history, strategy
//! policies and the daily simulation loop.
//!
//! - Domain types (positions, trade log, daily snapshots, the ledger)
//! - Cost model with slippage, commission and sell-side tax
//! - Validated price history with a no-look-ahead view
//! - Six strategy policies behind one `Policy` enum
//! - Daily loop with cancellation and progress reporting

pub mod data;
pub mod domain;
pub mod engine;
pub mod execution;
pub mod indicators;
pub mod policy;

pub use data::{PriceHistory, PriceProvider, PriceRow, Universe};
pub use domain::{DailySnapshot, Portfolio, Side, TradeRecord};
pub use engine::{run_backtest, run_backtest_with, EngineConfig, EngineError, EngineRun, RunStatus};
pub use execution::CostConfig;
pub use policy::Policy;

//! BackLab Runner: run orchestration, metrics, reports and export.
//!
//! This crate builds on `backlab-core` to provide:
//! - TOML run configuration with deterministic run ids
//! - Price loading from any `PriceProvider`
//! - Single runs, background run handles and parallel batches
//! - Performance metrics, cost summary, per-instrument and benchmark reports
//! - JSON / CSV / Markdown export

pub mod batch;
pub mod config;
pub mod data_loader;
pub mod export;
pub mod handle;
pub mod metrics;
pub mod report;
pub mod result;
pub mod runner;

pub use batch::{run_batch, run_batch_on_data, summarize, BatchItem, BatchOptions, BatchSummaryRow};
pub use config::{ConfigError, RunConfig, RunId, RunSection};
pub use data_loader::{load_prices, LoadError, LoadedData};
pub use export::{
    daily_detail, export_daily_detail_csv, export_json, export_snapshots_csv, export_trades_csv,
    generate_report, import_json, load_artifacts, save_artifacts, save_daily_detail, DailyDetailRow,
};
pub use handle::{RunEvent, RunHandle};
pub use metrics::PerformanceMetrics;
pub use report::{BenchmarkComparison, CostSummary, CurvePoint, InstrumentPerformance};
pub use result::{BacktestResult, RunMetadata, RunOutcome, SCHEMA_VERSION};
pub use runner::{load_for, resolve_universe, run_backtest_from_data, run_single_backtest, run_to_outcome, RunError};

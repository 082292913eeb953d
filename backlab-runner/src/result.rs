//! The result handed back to the caller of a run.

use crate::config::{RunConfig, RunId};
use crate::data_loader::LoadedData;
use crate::metrics::PerformanceMetrics;
use crate::report::{
    benchmark_comparison, cumulative_return_points, drawdown_points, instrument_performance,
    BenchmarkComparison, CostSummary, CurvePoint, InstrumentPerformance,
};
use crate::runner::RunError;
use backlab_core::domain::{DailySnapshot, Position, TradeRecord};
use backlab_core::engine::{EngineRun, RunStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current schema version for persisted results.
pub const SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: RunId,
    pub label: String,
    pub strategy: String,
    pub status: RunStatus,
    pub initial_capital: f64,
    pub start_date: chrono::NaiveDate,
    pub end_date: chrono::NaiveDate,
    /// Trading days in the requested range. Larger than the snapshot count
    /// when the run was cancelled.
    pub trading_days: usize,
    /// Instruments the run actually traded.
    pub instruments: Vec<String>,
    /// Instruments dropped for lack of price rows.
    #[serde(default)]
    pub dropped: Vec<String>,
    pub dataset_hash: String,
}

/// Everything a finished (or cancelled) run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub metadata: RunMetadata,
    pub config: RunConfig,
    pub metrics: PerformanceMetrics,
    pub snapshots: Vec<DailySnapshot>,
    pub trades: Vec<TradeRecord>,
    pub drawdown_curve: Vec<CurvePoint>,
    pub cumulative_returns: Vec<CurvePoint>,
    pub cost_summary: CostSummary,
    pub instrument_performance: Vec<InstrumentPerformance>,
    #[serde(default)]
    pub benchmark: Option<BenchmarkComparison>,
    /// Days each held instrument was valued at a stale price.
    #[serde(default)]
    pub carried_forward: BTreeMap<String, usize>,
    pub final_positions: Vec<Position>,
}

impl BacktestResult {
    /// Derive metrics and reports from a raw engine run.
    pub fn build(config: &RunConfig, loaded: &LoadedData, run: EngineRun) -> Self {
        let metrics = PerformanceMetrics::compute(
            &run.snapshots,
            &run.trades,
            run.initial_capital,
            config.run.risk_free_rate,
        );

        let instrument_performance = match (run.snapshots.first(), run.snapshots.last()) {
            (Some(first), Some(last)) => instrument_performance(
                &loaded.history,
                &loaded.universe,
                &run.universe,
                first.date,
                last.date,
                &run.trades,
            ),
            _ => Vec::new(),
        };

        let benchmark = match (&loaded.universe.benchmark, &loaded.benchmark) {
            (Some(id), Some(rows)) => benchmark_comparison(id, rows, &run.snapshots),
            _ => None,
        };

        Self {
            schema_version: SCHEMA_VERSION,
            metadata: RunMetadata {
                run_id: config.run_id(),
                label: config.label(),
                strategy: config.strategy.name().to_string(),
                status: run.status,
                initial_capital: run.initial_capital,
                start_date: config.run.start_date,
                end_date: config.run.end_date,
                trading_days: run.trading_days,
                instruments: run.universe.clone(),
                dropped: loaded.dropped.clone(),
                dataset_hash: loaded.dataset_hash.clone(),
            },
            config: config.clone(),
            metrics,
            drawdown_curve: drawdown_points(&run.snapshots),
            cumulative_returns: cumulative_return_points(&run.snapshots),
            cost_summary: CostSummary::new(run.cost_totals, run.initial_capital),
            instrument_performance,
            benchmark,
            carried_forward: run.carried_forward,
            final_positions: run.final_positions,
            snapshots: run.snapshots,
            trades: run.trades,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.metadata.status == RunStatus::Completed
    }

    pub fn equity_curve(&self) -> Vec<f64> {
        self.snapshots.iter().map(|s| s.equity).collect()
    }

    pub fn rejected_trades(&self) -> impl Iterator<Item = &TradeRecord> {
        self.trades.iter().filter(|t| t.is_rejected())
    }
}

/// Terminal outcome of a run as seen by the host.
#[derive(Debug)]
pub enum RunOutcome {
    /// Every trading day ran. May still contain rejected trades.
    Completed(Box<BacktestResult>),
    /// Stopped early; holds the days that finished.
    Cancelled(Box<BacktestResult>),
    Failed(RunError),
}

impl RunOutcome {
    pub fn status(&self) -> RunStatus {
        match self {
            RunOutcome::Completed(_) => RunStatus::Completed,
            RunOutcome::Cancelled(_) => RunStatus::Cancelled,
            RunOutcome::Failed(_) => RunStatus::Failed,
        }
    }

    pub fn result(&self) -> Option<&BacktestResult> {
        match self {
            RunOutcome::Completed(r) | RunOutcome::Cancelled(r) => Some(r),
            RunOutcome::Failed(_) => None,
        }
    }

    pub fn into_result(self) -> Result<BacktestResult, RunError> {
        match self {
            RunOutcome::Completed(r) | RunOutcome::Cancelled(r) => Ok(*r),
            RunOutcome::Failed(e) => Err(e),
        }
    }
}

impl From<Result<BacktestResult, RunError>> for RunOutcome {
    fn from(res: Result<BacktestResult, RunError>) -> Self {
        match res {
            Ok(r) if r.is_complete() => RunOutcome::Completed(Box::new(r)),
            Ok(r) => RunOutcome::Cancelled(Box::new(r)),
            Err(e) => RunOutcome::Failed(e),
        }
    }
}

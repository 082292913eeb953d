//! Backtest runner: wires config, data loading, the engine and metrics.
//!
//! Two entry points:
//! - `run_single_backtest()`: loads prices from a provider, then runs. Used by the CLI.
//! - `run_backtest_from_data()`: takes already-loaded prices and a run
//!   control (cancel flag, progress). Used by batch runs and run handles.

use backlab_core::data::{Instrument, PriceProvider, Universe};
use backlab_core::engine::{run_backtest_with, EngineError, RunControl};
use thiserror::Error;
use tracing::info;

use crate::config::{ConfigError, RunConfig};
use crate::data_loader::{load_prices, LoadError, LoadedData};
use crate::result::{BacktestResult, RunOutcome};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("data error: {0}")]
    Data(#[from] LoadError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("run worker stopped unexpectedly")]
    WorkerLost,
}

/// Universe for a run: an explicit universe wins, else `run.instruments`.
/// `run.benchmark` fills in a missing benchmark.
pub fn resolve_universe(config: &RunConfig, universe: Option<&Universe>) -> Universe {
    let mut resolved = match universe {
        Some(u) if !u.is_empty() => u.clone(),
        _ => Universe::new(config.run.instruments.iter().map(Instrument::new).collect()),
    };
    if resolved.benchmark.is_none() {
        resolved.benchmark = config.run.benchmark.clone();
    }
    resolved
}

/// Load prices for the configured range (plus warmup) and run.
pub fn run_single_backtest(
    config: &RunConfig,
    universe: Option<&Universe>,
    provider: &dyn PriceProvider,
) -> Result<BacktestResult, RunError> {
    let loaded = load_for(config, universe, provider)?;
    run_backtest_from_data(config, &loaded, &RunControl::new())
}

/// Load the prices a config needs.
pub fn load_for(
    config: &RunConfig,
    universe: Option<&Universe>,
    provider: &dyn PriceProvider,
) -> Result<LoadedData, RunError> {
    config.validate()?;
    let universe = resolve_universe(config, universe);
    if universe.is_empty() {
        return Err(EngineError::EmptyUniverse.into());
    }
    Ok(load_prices(
        provider,
        &universe,
        config.history_start(),
        config.run.end_date,
    )?)
}

/// Run on pre-loaded prices. No I/O.
pub fn run_backtest_from_data(
    config: &RunConfig,
    loaded: &LoadedData,
    control: &RunControl<'_>,
) -> Result<BacktestResult, RunError> {
    config.validate()?;
    let tradable = loaded.tradable();
    let run = run_backtest_with(
        &loaded.history,
        &tradable,
        &config.strategy,
        &config.engine_config(),
        control,
    )?;
    let result = BacktestResult::build(config, loaded, run);

    let m = &result.metrics;
    info!(
        run_id = %result.metadata.run_id,
        strategy = %result.metadata.strategy,
        status = ?result.metadata.status,
        days = m.trading_days,
        final_equity = m.final_equity,
        total_return = m.total_return,
        max_drawdown = m.max_drawdown,
        "run summarized"
    );
    Ok(result)
}

/// `run_backtest_from_data` folded into a host-facing outcome.
pub fn run_to_outcome(config: &RunConfig, loaded: &LoadedData, control: &RunControl<'_>) -> RunOutcome {
    run_backtest_from_data(config, loaded, control).into()
}

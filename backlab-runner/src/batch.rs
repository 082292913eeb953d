//! Parallel batch runs over independent configs.
//!
//! Each config gets its own engine run (and its own Portfolio); nothing is
//! shared between runs except read-only price data.

use backlab_core::data::{PriceProvider, Universe};
use backlab_core::engine::RunControl;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::RunConfig;
use crate::data_loader::LoadedData;
use crate::result::BacktestResult;
use crate::runner::{run_backtest_from_data, run_single_backtest, RunError};

/// One finished entry of a batch, in input order.
#[derive(Debug)]
pub struct BatchItem {
    pub label: String,
    pub run_id: String,
    pub outcome: Result<BacktestResult, RunError>,
}

/// Compact row for printing or exporting batch results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummaryRow {
    pub label: String,
    pub strategy: String,
    pub total_return: f64,
    pub annualized_return: f64,
    pub max_drawdown: f64,
    pub sharpe: f64,
    pub trades: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOptions {
    /// Worker threads; `None` uses rayon's global pool.
    pub threads: Option<usize>,
}

/// Run every config, each loading its own prices from `provider`.
pub fn run_batch(
    configs: &[RunConfig],
    universe: Option<&Universe>,
    provider: &dyn PriceProvider,
    opts: BatchOptions,
) -> Vec<BatchItem> {
    in_pool(opts, || {
        configs
            .par_iter()
            .map(|config| item(config, run_single_backtest(config, universe, provider)))
            .collect()
    })
}

/// Run every config against the same pre-loaded prices.
pub fn run_batch_on_data(configs: &[RunConfig], data: &LoadedData, opts: BatchOptions) -> Vec<BatchItem> {
    in_pool(opts, || {
        configs
            .par_iter()
            .map(|config| {
                item(
                    config,
                    run_backtest_from_data(config, data, &RunControl::new()),
                )
            })
            .collect()
    })
}

fn item(config: &RunConfig, outcome: Result<BacktestResult, RunError>) -> BatchItem {
    let label = config.label();
    match &outcome {
        Ok(r) => info!(label = %label, total_return = r.metrics.total_return, "batch run done"),
        Err(e) => warn!(label = %label, error = %e, "batch run failed"),
    }
    BatchItem {
        label,
        run_id: config.run_id(),
        outcome,
    }
}

fn in_pool<F>(opts: BatchOptions, job: F) -> Vec<BatchItem>
where
    F: FnOnce() -> Vec<BatchItem> + Send,
{
    match opts.threads.filter(|&n| n > 0) {
        Some(n) => match rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .thread_name(|i| format!("backlab-batch-{i}"))
            .build()
        {
            Ok(pool) => pool.install(job),
            Err(e) => {
                warn!(error = %e, "could not build batch pool, using the global pool");
                job()
            }
        },
        None => job(),
    }
}

/// Successful runs ordered by total return, best first.
pub fn summarize(items: &[BatchItem]) -> Vec<BatchSummaryRow> {
    let mut rows: Vec<BatchSummaryRow> = items
        .iter()
        .filter_map(|item| {
            let r = item.outcome.as_ref().ok()?;
            Some(BatchSummaryRow {
                label: item.label.clone(),
                strategy: r.metadata.strategy.clone(),
                total_return: r.metrics.total_return,
                annualized_return: r.metrics.annualized_return,
                max_drawdown: r.metrics.max_drawdown,
                sharpe: r.metrics.sharpe,
                trades: r.metrics.filled_trades,
            })
        })
        .collect();
    rows.sort_by(|a, b| b.total_return.total_cmp(&a.total_return));
    rows
}

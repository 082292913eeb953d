//! Supplementary reports built next to the metrics: dated curves, cost
//! summary, per-instrument performance and the benchmark comparison.

use crate::metrics::{cumulative_returns, drawdown_curve, equity_series, max_drawdown, total_return};
use backlab_core::data::{PriceHistory, PriceRow, Universe};
use backlab_core::domain::{CostTotals, DailySnapshot, TradeRecord};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One dated value of a derived series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub date: NaiveDate,
    pub value: f64,
}

fn dated(snapshots: &[DailySnapshot], values: Vec<f64>) -> Vec<CurvePoint> {
    snapshots
        .iter()
        .zip(values)
        .map(|(s, value)| CurvePoint { date: s.date, value })
        .collect()
}

pub fn drawdown_points(snapshots: &[DailySnapshot]) -> Vec<CurvePoint> {
    dated(snapshots, drawdown_curve(&equity_series(snapshots)))
}

pub fn cumulative_return_points(snapshots: &[DailySnapshot]) -> Vec<CurvePoint> {
    dated(snapshots, cumulative_returns(&equity_series(snapshots)))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostSummary {
    pub slippage: f64,
    pub commission: f64,
    pub tax: f64,
    pub total: f64,
    /// `total / initial_capital`.
    pub cost_ratio: f64,
}

impl CostSummary {
    pub fn new(totals: CostTotals, initial_capital: f64) -> Self {
        let total = totals.total();
        Self {
            slippage: totals.slippage,
            commission: totals.commission,
            tax: totals.tax,
            total,
            cost_ratio: if initial_capital > 0.0 { total / initial_capital } else { 0.0 },
        }
    }
}

/// How one instrument itself moved over the run, plus what the strategy
/// realized on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentPerformance {
    pub instrument: String,
    pub name: String,
    pub start_price: f64,
    pub end_price: f64,
    /// Close-to-close over the run.
    pub total_return: f64,
    pub max_drawdown: f64,
    pub filled_trades: usize,
    pub realized_pnl: f64,
}

/// Per-instrument performance over `[start, end]`, best return first.
/// Instruments with fewer than two rows in range are skipped.
pub fn instrument_performance(
    history: &PriceHistory,
    universe: &Universe,
    instruments: &[String],
    start: NaiveDate,
    end: NaiveDate,
    trades: &[TradeRecord],
) -> Vec<InstrumentPerformance> {
    let mut out: Vec<InstrumentPerformance> = instruments
        .iter()
        .filter_map(|id| {
            let closes = closes_in_range(history.series(id)?, start, end);
            if closes.len() < 2 {
                return None;
            }
            let fills = trades.iter().filter(|t| t.instrument == *id && t.is_filled());
            let (filled_trades, realized_pnl) = fills.fold((0, 0.0), |(n, pnl), t| {
                (n + 1, pnl + t.realized_pnl.unwrap_or(0.0))
            });
            Some(InstrumentPerformance {
                instrument: id.clone(),
                name: universe.label(id),
                start_price: closes[0],
                end_price: closes[closes.len() - 1],
                total_return: total_return(&closes),
                max_drawdown: max_drawdown(&closes),
                filled_trades,
                realized_pnl,
            })
        })
        .collect();
    out.sort_by(|a, b| b.total_return.total_cmp(&a.total_return));
    out
}

fn closes_in_range(rows: &[PriceRow], start: NaiveDate, end: NaiveDate) -> Vec<f64> {
    rows.iter()
        .filter(|r| r.date >= start && r.date <= end)
        .map(|r| r.close)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkComparison {
    pub instrument: String,
    pub total_return: f64,
    pub max_drawdown: f64,
    /// Strategy total return minus benchmark total return.
    pub excess_return: f64,
    /// Benchmark closes scaled so the first point equals the strategy's
    /// starting equity.
    pub curve: Vec<CurvePoint>,
}

/// Compare the run against a benchmark series over the run's dates.
/// `None` when there are no snapshots or no benchmark rows in that span.
pub fn benchmark_comparison(
    instrument: &str,
    rows: &[PriceRow],
    snapshots: &[DailySnapshot],
) -> Option<BenchmarkComparison> {
    let first = snapshots.first()?;
    let last = snapshots.last()?;
    let in_range: Vec<&PriceRow> = rows
        .iter()
        .filter(|r| r.date >= first.date && r.date <= last.date)
        .collect();
    let base = in_range.first()?.close;
    if base <= 0.0 {
        return None;
    }

    let closes: Vec<f64> = in_range.iter().map(|r| r.close).collect();
    let bench_return = total_return(&closes);
    let curve = in_range
        .iter()
        .map(|r| CurvePoint {
            date: r.date,
            value: first.equity * r.close / base,
        })
        .collect();

    Some(BenchmarkComparison {
        instrument: instrument.to_string(),
        total_return: bench_return,
        max_drawdown: max_drawdown(&closes),
        excess_return: total_return(&equity_series(snapshots)) - bench_return,
        curve,
    })
}

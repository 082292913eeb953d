//! Performance metrics. Pure functions: equity series and/or trade log in,
//! scalar or series out. All ratios are fractions (0.05 = 5%).
//!
//! Returns are measured from the first snapshot's equity, so costs paid on
//! the first day are part of the base. Profit/loss is measured against the
//! configured starting capital.

use backlab_core::domain::{DailySnapshot, Side, TradeRecord};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Summary statistics for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub initial_capital: f64,
    pub final_equity: f64,
    pub profit_loss: f64,
    pub total_return: f64,
    pub annualized_return: f64,
    /// Annualized sample stdev of daily returns.
    pub volatility: f64,
    /// Most negative peak-to-trough decline, `<= 0`.
    pub max_drawdown: f64,
    pub max_drawdown_peak: Option<NaiveDate>,
    pub max_drawdown_trough: Option<NaiveDate>,
    pub sharpe: f64,
    pub risk_free_rate: f64,
    /// Winning closed sells over all closed sells.
    pub win_rate: f64,
    pub closed_trades: usize,
    pub winning_trades: usize,
    pub filled_trades: usize,
    pub rejected_trades: usize,
    pub trading_days: usize,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl PerformanceMetrics {
    pub fn compute(
        snapshots: &[DailySnapshot],
        trades: &[TradeRecord],
        initial_capital: f64,
        risk_free_rate: f64,
    ) -> Self {
        let equity = equity_series(snapshots);
        let final_equity = equity.last().copied().unwrap_or(initial_capital);
        let span = max_drawdown_span(&equity);
        let closed = closed_trades(trades);
        let winning = closed.iter().filter(|t| t.is_winner()).count();

        Self {
            initial_capital,
            final_equity,
            profit_loss: final_equity - initial_capital,
            total_return: total_return(&equity),
            annualized_return: annualized_return(&equity),
            volatility: annualized_volatility(&equity),
            max_drawdown: max_drawdown(&equity),
            max_drawdown_peak: span.map(|(peak, _)| snapshots[peak].date),
            max_drawdown_trough: span.map(|(_, trough)| snapshots[trough].date),
            sharpe: sharpe_ratio(&equity, risk_free_rate),
            risk_free_rate,
            win_rate: win_rate(trades),
            closed_trades: closed.len(),
            winning_trades: winning,
            filled_trades: trades.iter().filter(|t| t.is_filled()).count(),
            rejected_trades: trades.iter().filter(|t| t.is_rejected()).count(),
            trading_days: snapshots.len(),
            start_date: snapshots.first().map(|s| s.date),
            end_date: snapshots.last().map(|s| s.date),
        }
    }
}

pub fn equity_series(snapshots: &[DailySnapshot]) -> Vec<f64> {
    snapshots.iter().map(|s| s.equity).collect()
}

// ─── Returns ────────────────────────────────────────────────────────

/// `equity[t] / equity[t-1] - 1`, one shorter than the input.
pub fn daily_returns(equity: &[f64]) -> Vec<f64> {
    equity
        .windows(2)
        .map(|w| if w[0] > 0.0 { w[1] / w[0] - 1.0 } else { 0.0 })
        .collect()
}

/// `equity[t] / equity[0] - 1` for every day, starting at 0.
pub fn cumulative_returns(equity: &[f64]) -> Vec<f64> {
    match equity.first() {
        Some(&base) if base > 0.0 => equity.iter().map(|e| e / base - 1.0).collect(),
        _ => vec![0.0; equity.len()],
    }
}

pub fn total_return(equity: &[f64]) -> f64 {
    match (equity.first(), equity.last()) {
        (Some(&first), Some(&last)) if first > 0.0 => last / first - 1.0,
        _ => 0.0,
    }
}

/// `(final / initial)^(252 / n) - 1` with `n` the number of snapshots.
pub fn annualized_return(equity: &[f64]) -> f64 {
    let n = equity.len();
    match (equity.first(), equity.last()) {
        (Some(&first), Some(&last)) if first > 0.0 && last > 0.0 && n > 1 => {
            (last / first).powf(TRADING_DAYS_PER_YEAR / n as f64) - 1.0
        }
        _ => 0.0,
    }
}

pub fn annualized_volatility(equity: &[f64]) -> f64 {
    std_dev(&daily_returns(equity)) * TRADING_DAYS_PER_YEAR.sqrt()
}

/// `(mean(daily) - rf/252) / stdev(daily) * sqrt(252)`; 0 when the
/// stdev is zero or there are fewer than two daily returns.
pub fn sharpe_ratio(equity: &[f64], risk_free_rate: f64) -> f64 {
    let returns = daily_returns(equity);
    if returns.len() < 2 {
        return 0.0;
    }
    let std = std_dev(&returns);
    if std < 1e-15 {
        return 0.0;
    }
    let excess = mean(&returns) - risk_free_rate / TRADING_DAYS_PER_YEAR;
    excess / std * TRADING_DAYS_PER_YEAR.sqrt()
}

// ─── Drawdown ───────────────────────────────────────────────────────

/// `(equity[t] - running_peak) / running_peak` for every day.
pub fn drawdown_curve(equity: &[f64]) -> Vec<f64> {
    let mut peak = f64::MIN;
    equity
        .iter()
        .map(|&e| {
            peak = peak.max(e);
            if peak > 0.0 {
                (e - peak) / peak
            } else {
                0.0
            }
        })
        .collect()
}

pub fn max_drawdown(equity: &[f64]) -> f64 {
    drawdown_curve(equity).into_iter().fold(0.0, f64::min)
}

/// Indices of the peak and trough of the deepest drawdown. `None` when
/// equity never falls below a prior peak.
pub fn max_drawdown_span(equity: &[f64]) -> Option<(usize, usize)> {
    let mut peak_idx = 0;
    let mut worst: Option<(usize, usize, f64)> = None;
    for (i, &e) in equity.iter().enumerate() {
        if e > equity[peak_idx] {
            peak_idx = i;
        }
        let peak = equity[peak_idx];
        if peak <= 0.0 {
            continue;
        }
        let dd = (e - peak) / peak;
        if dd < worst.map_or(0.0, |w| w.2) {
            worst = Some((peak_idx, i, dd));
        }
    }
    worst.map(|(p, t, _)| (p, t))
}

// ─── Trades ─────────────────────────────────────────────────────────

/// Filled sells: the trades that realize P&L.
pub fn closed_trades(trades: &[TradeRecord]) -> Vec<&TradeRecord> {
    trades
        .iter()
        .filter(|t| t.is_filled() && t.side == Side::Sell)
        .collect()
}

pub fn win_rate(trades: &[TradeRecord]) -> f64 {
    let closed = closed_trades(trades);
    if closed.is_empty() {
        return 0.0;
    }
    closed.iter().filter(|t| t.is_winner()).count() as f64 / closed.len() as f64
}

// ─── Helpers ────────────────────────────────────────────────────────

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation; 0 for fewer than two values.
pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

//! Indicators over a visible slice of price rows.
//!
//! Every indicator is a pure function of the rows it is given. Strategies
//! pass the rows from a `HistoryView`, which stops at the current day, so a
//! value at day t can never depend on data after t.

pub mod sma;
pub mod volatility;

pub use sma::Sma;
pub use volatility::{daily_returns, sample_std_dev, RealizedVol};

use crate::data::PriceRow;

/// Trait for indicators.
///
/// `compute` returns a series the same length as `rows`; the first
/// `lookback()` values are `f64::NAN`. `latest` is the value at the last row,
/// or `None` when there is not enough history.
pub trait Indicator: Send + Sync {
    fn name(&self) -> &str;

    fn lookback(&self) -> usize;

    fn compute(&self, rows: &[PriceRow]) -> Vec<f64>;

    fn latest(&self, rows: &[PriceRow]) -> Option<f64>;
}

#[cfg(test)]
pub(crate) const DEFAULT_EPSILON: f64 = 1e-10;

#[cfg(test)]
pub(crate) fn assert_approx(actual: f64, expected: f64, eps: f64) {
    assert!(
        (actual - expected).abs() < eps,
        "expected {expected}, got {actual} (eps={eps})"
    );
}

/// Rows with the given closes on consecutive days starting 2024-01-02.
#[cfg(test)]
pub(crate) fn make_rows(closes: &[f64]) -> Vec<PriceRow> {
    let base = chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| PriceRow::new(base + chrono::Duration::days(i as i64), close, close, 1000))
        .collect()
}

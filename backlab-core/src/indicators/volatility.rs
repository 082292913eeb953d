//! Realized volatility: sample standard deviation of simple daily returns
//! over the last `lookback` returns (i.e. the last `lookback + 1` closes).

use super::Indicator;
use crate::data::PriceRow;

/// Simple returns between consecutive values.
pub fn daily_returns(values: &[f64]) -> Vec<f64> {
    values.windows(2).map(|w| w[1] / w[0] - 1.0).collect()
}

/// Sample standard deviation (n - 1). `None` for fewer than two values.
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(var.sqrt())
}

#[derive(Debug, Clone)]
pub struct RealizedVol {
    lookback: usize,
    name: String,
}

impl RealizedVol {
    pub fn new(lookback: usize) -> Self {
        assert!(lookback >= 2, "volatility lookback must be >= 2");
        Self {
            lookback,
            name: format!("rvol_{lookback}"),
        }
    }
}

impl Indicator for RealizedVol {
    fn name(&self) -> &str {
        &self.name
    }

    /// Two returns (three closes) are the minimum for a sample deviation.
    fn lookback(&self) -> usize {
        2
    }

    fn compute(&self, rows: &[PriceRow]) -> Vec<f64> {
        (0..rows.len())
            .map(|i| self.latest(&rows[..=i]).unwrap_or(f64::NAN))
            .collect()
    }

    fn latest(&self, rows: &[PriceRow]) -> Option<f64> {
        let start = rows.len().saturating_sub(self.lookback + 1);
        let closes: Vec<f64> = rows[start..].iter().map(|r| r.close).collect();
        sample_std_dev(&daily_returns(&closes))
    }
}

//! Simple Moving Average (SMA) of closes over a trailing window.
//! Lookback: period - 1 (first valid value at index period-1).

use super::Indicator;
use crate::data::PriceRow;

#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    name: String,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "SMA period must be >= 1");
        Self {
            period,
            name: format!("sma_{period}"),
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, rows: &[PriceRow]) -> Vec<f64> {
        let n = rows.len();
        let mut result = vec![f64::NAN; n];
        if n < self.period {
            return result;
        }

        let mut sum: f64 = rows[..self.period].iter().map(|r| r.close).sum();
        result[self.period - 1] = sum / self.period as f64;
        for i in self.period..n {
            sum += rows[i].close - rows[i - self.period].close;
            result[i] = sum / self.period as f64;
        }
        result
    }

    fn latest(&self, rows: &[PriceRow]) -> Option<f64> {
        if rows.len() < self.period {
            return None;
        }
        let window = &rows[rows.len() - self.period..];
        Some(window.iter().map(|r| r.close).sum::<f64>() / self.period as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_rows, DEFAULT_EPSILON};

    #[test]
    fn sma_5_basic() {
        let rows = make_rows(&[10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0]);
        let result = Sma::new(5).compute(&rows);

        assert_eq!(result.len(), 7);
        for v in &result[..4] {
            assert!(v.is_nan());
        }
        assert_approx(result[4], 12.0, DEFAULT_EPSILON);
        assert_approx(result[5], 13.0, DEFAULT_EPSILON);
        assert_approx(result[6], 14.0, DEFAULT_EPSILON);
    }

    #[test]
    fn latest_matches_last_computed() {
        let rows = make_rows(&[5.0, 7.0, 9.0, 4.0, 8.0, 6.0]);
        let sma = Sma::new(3);
        let series = sma.compute(&rows);
        assert_approx(sma.latest(&rows).unwrap(), *series.last().unwrap(), DEFAULT_EPSILON);
    }

    #[test]
    fn latest_none_when_insufficient() {
        let rows = make_rows(&[1.0, 2.0]);
        assert_eq!(Sma::new(3).latest(&rows), None);
        assert!(Sma::new(2).latest(&rows).is_some());
    }

    #[test]
    fn sma_lookback() {
        assert_eq!(Sma::new(20).lookback(), 19);
        assert_eq!(Sma::new(1).lookback(), 0);
    }
}

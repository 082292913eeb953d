//! Deterministic synthetic price series for demos, tests and benchmarks.
//!
//! The RNG is seeded from a BLAKE3 hash of the instrument id (plus an optional
//! salt), so the same id always produces the same path. Weekends are skipped.

use super::provider::PriceRow;
use chrono::{Datelike, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Parameters for a random-walk series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticSpec {
    pub start_price: f64,
    /// Daily returns are drawn uniformly from `[-max_move, max_move)` around `drift`.
    pub max_move: f64,
    pub drift: f64,
    pub seed: u64,
}

impl Default for SyntheticSpec {
    fn default() -> Self {
        Self {
            start_price: 100.0,
            max_move: 0.03,
            drift: 0.0,
            seed: 0,
        }
    }
}

pub fn synthetic_series(instrument: &str, start: NaiveDate, end: NaiveDate) -> Vec<PriceRow> {
    synthetic_series_with(instrument, start, end, &SyntheticSpec::default())
}

pub fn synthetic_series_with(
    instrument: &str,
    start: NaiveDate,
    end: NaiveDate,
    spec: &SyntheticSpec,
) -> Vec<PriceRow> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(instrument.as_bytes());
    hasher.update(&spec.seed.to_le_bytes());
    let seed: [u8; 32] = *hasher.finalize().as_bytes();
    let mut rng = StdRng::from_seed(seed);

    let mut rows = Vec::new();
    let mut price = spec.start_price;
    let mut current = start;
    while current <= end {
        if matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
            current += chrono::Duration::days(1);
            continue;
        }
        let noise = if spec.max_move > 0.0 {
            rng.gen_range(-spec.max_move..spec.max_move)
        } else {
            0.0
        };
        let daily_return = spec.drift + noise;
        let open = price;
        let close = (price * (1.0 + daily_return)).max(0.01);
        let volume = rng.gen_range(100_000..5_000_000u64);
        rows.push(PriceRow::new(current, open, close, volume));
        price = close;
        current += chrono::Duration::days(1);
    }
    rows
}

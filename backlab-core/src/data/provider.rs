//! Price provider trait and structured error types.
//!
//! A `PriceProvider` hands out daily rows per instrument. The engine never
//! talks to a provider directly; the runner loads rows up front and builds a
//! validated `PriceHistory` from them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// One trading day for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRow {
    pub date: NaiveDate,
    pub open: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: u64,
}

impl PriceRow {
    pub fn new(date: NaiveDate, open: f64, close: f64, volume: u64) -> Self {
        Self {
            date,
            open,
            close,
            volume,
        }
    }
}

#[derive(Debug, Error)]
pub enum PriceError {
    #[error("no price data for instrument: {instrument}")]
    NotFound { instrument: String },

    #[error("I/O error reading {path}: {message}")]
    Io { path: String, message: String },

    #[error("parse error in {path}: {message}")]
    Parse { path: String, message: String },

    #[error("malformed price data for {instrument}: {message}")]
    Malformed { instrument: String, message: String },
}

/// Source of daily price rows.
pub trait PriceProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Rows for `instrument` with `start <= date <= end`, sorted ascending.
    /// An instrument that exists but has no rows in range yields `Ok(vec![])`.
    fn fetch(
        &self,
        instrument: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceRow>, PriceError>;
}

/// Provider backed by rows already in memory. Used by tests, benches and the
/// synthetic data path.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProvider {
    series: BTreeMap<String, Vec<PriceRow>>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, instrument: impl Into<String>, rows: Vec<PriceRow>) -> Self {
        self.insert(instrument, rows);
        self
    }

    /// Rows are stored as given; ordering is checked when a history is built.
    pub fn insert(&mut self, instrument: impl Into<String>, rows: Vec<PriceRow>) {
        self.series.insert(instrument.into(), rows);
    }
}

impl PriceProvider for InMemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    fn fetch(
        &self,
        instrument: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceRow>, PriceError> {
        let rows = self
            .series
            .get(instrument)
            .ok_or_else(|| PriceError::NotFound {
                instrument: instrument.to_string(),
            })?;
        Ok(rows
            .iter()
            .filter(|r| r.date >= start && r.date <= end)
            .cloned()
            .collect())
    }
}

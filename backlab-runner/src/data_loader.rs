//! Price loading for the runner.
//!
//! Pulls rows for every universe instrument (and the optional benchmark)
//! from a `PriceProvider` and validates them into a `PriceHistory`.
//! Instruments with no rows in range are dropped with a warning; if none
//! remain, the engine reports `EmptyUniverse` when the run starts.

use backlab_core::data::{PriceError, PriceHistory, PriceProvider, PriceRow, Universe};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("price data error: {0}")]
    Price(#[from] PriceError),

    #[error("invalid load range: {start} is after {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
}

/// Validated prices for one run.
#[derive(Debug)]
pub struct LoadedData {
    pub history: PriceHistory,
    /// Universe as requested. Dropped instruments stay listed here so the
    /// report can name them.
    pub universe: Universe,
    /// Instruments the provider had no rows for.
    pub dropped: Vec<String>,
    /// Benchmark rows in range, when a benchmark was requested and found.
    pub benchmark: Option<Vec<PriceRow>>,
    /// BLAKE3 over every loaded row.
    pub dataset_hash: String,
}

impl LoadedData {
    /// Instruments that actually have rows, in universe order.
    pub fn tradable(&self) -> Vec<String> {
        self.universe
            .ids()
            .into_iter()
            .filter(|id| self.history.contains(id))
            .collect()
    }
}

/// Load `[start, end]` rows for the universe and its benchmark.
pub fn load_prices(
    provider: &dyn PriceProvider,
    universe: &Universe,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<LoadedData, LoadError> {
    if start > end {
        return Err(LoadError::InvalidRange { start, end });
    }

    let mut series: BTreeMap<String, Vec<PriceRow>> = BTreeMap::new();
    let mut dropped = Vec::new();

    for instrument in &universe.instruments {
        match fetch_rows(provider, &instrument.id, start, end)? {
            Some(rows) => {
                debug!(instrument = %instrument.id, rows = rows.len(), provider = provider.name(), "loaded");
                series.insert(instrument.id.clone(), rows);
            }
            None => {
                warn!(instrument = %instrument.id, %start, %end, "no price rows in range, dropping");
                dropped.push(instrument.id.clone());
            }
        }
    }

    let benchmark = match &universe.benchmark {
        Some(id) => match fetch_rows(provider, id, start, end)? {
            Some(rows) => {
                // Same checks as tradable series.
                PriceHistory::from_series([(id.clone(), rows.clone())])?;
                Some(rows)
            }
            None => {
                warn!(benchmark = %id, "no benchmark rows in range");
                None
            }
        },
        None => None,
    };

    let history = PriceHistory::new(series)?;
    let dataset_hash = history.content_hash();

    Ok(LoadedData {
        history,
        universe: universe.clone(),
        dropped,
        benchmark,
        dataset_hash,
    })
}

/// `Ok(None)` when the provider has nothing for the instrument.
fn fetch_rows(
    provider: &dyn PriceProvider,
    instrument: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Option<Vec<PriceRow>>, PriceError> {
    match provider.fetch(instrument, start, end) {
        Ok(rows) if rows.is_empty() => Ok(None),
        Ok(rows) => Ok(Some(rows)),
        Err(PriceError::NotFound { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

//! Validated multi-instrument price history and the date-bounded view handed
//! to strategies.
//!
//! Series are kept per instrument (no forward-fill). The trading calendar is
//! the union of all series' dates. A `HistoryView` exposes only rows dated on
//! or before its cutoff, so a policy cannot read past the current day.

use super::provider::{PriceError, PriceRow};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default)]
pub struct PriceHistory {
    series: BTreeMap<String, Vec<PriceRow>>,
    calendar: Vec<NaiveDate>,
}

impl PriceHistory {
    /// Build a history, rejecting unsorted or duplicate dates and
    /// non-finite or non-positive prices.
    pub fn new(series: BTreeMap<String, Vec<PriceRow>>) -> Result<Self, PriceError> {
        let mut dates = BTreeSet::new();
        for (instrument, rows) in &series {
            validate_series(instrument, rows)?;
            dates.extend(rows.iter().map(|r| r.date));
        }
        Ok(Self {
            series,
            calendar: dates.into_iter().collect(),
        })
    }

    pub fn from_series<I, S>(series: I) -> Result<Self, PriceError>
    where
        I: IntoIterator<Item = (S, Vec<PriceRow>)>,
        S: Into<String>,
    {
        Self::new(series.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Union of all dates across instruments, ascending.
    pub fn calendar(&self) -> &[NaiveDate] {
        &self.calendar
    }

    /// Union calendar of the given instruments within `[start, end]`.
    pub fn trading_days(&self, instruments: &[String], start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        let mut days = BTreeSet::new();
        for id in instruments {
            if let Some(rows) = self.series.get(id) {
                let lo = rows.partition_point(|r| r.date < start);
                let hi = rows.partition_point(|r| r.date <= end);
                days.extend(rows[lo..hi].iter().map(|r| r.date));
            }
        }
        days.into_iter().collect()
    }

    pub fn instruments(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn contains(&self, instrument: &str) -> bool {
        self.series.contains_key(instrument)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Full series. Reporting only; strategies go through `view`.
    pub fn series(&self, instrument: &str) -> Option<&[PriceRow]> {
        self.series.get(instrument).map(Vec::as_slice)
    }

    pub fn row_on(&self, instrument: &str, date: NaiveDate) -> Option<&PriceRow> {
        let rows = self.series.get(instrument)?;
        rows.binary_search_by_key(&date, |r| r.date)
            .ok()
            .map(|i| &rows[i])
    }

    pub fn close_on(&self, instrument: &str, date: NaiveDate) -> Option<f64> {
        self.row_on(instrument, date).map(|r| r.close)
    }

    pub fn view(&self, cutoff: NaiveDate) -> HistoryView<'_> {
        HistoryView {
            history: self,
            cutoff,
        }
    }

    /// Content hash over every row, for run fingerprints.
    pub fn content_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for (instrument, rows) in &self.series {
            hasher.update(instrument.as_bytes());
            for r in rows {
                hasher.update(r.date.to_string().as_bytes());
                hasher.update(&r.open.to_le_bytes());
                hasher.update(&r.close.to_le_bytes());
                hasher.update(&r.volume.to_le_bytes());
            }
        }
        hasher.finalize().to_hex().to_string()
    }
}

fn validate_series(instrument: &str, rows: &[PriceRow]) -> Result<(), PriceError> {
    let malformed = |message: String| PriceError::Malformed {
        instrument: instrument.to_string(),
        message,
    };
    for pair in rows.windows(2) {
        if pair[1].date <= pair[0].date {
            return Err(malformed(format!(
                "dates not strictly ascending at {} -> {}",
                pair[0].date, pair[1].date
            )));
        }
    }
    for r in rows {
        if !r.close.is_finite() || r.close <= 0.0 {
            return Err(malformed(format!("close {} on {}", r.close, r.date)));
        }
        if !r.open.is_finite() || r.open < 0.0 {
            return Err(malformed(format!("open {} on {}", r.open, r.date)));
        }
    }
    Ok(())
}

/// Read-only window over a `PriceHistory`, bounded by a cutoff date.
#[derive(Debug, Clone, Copy)]
pub struct HistoryView<'a> {
    history: &'a PriceHistory,
    cutoff: NaiveDate,
}

impl<'a> HistoryView<'a> {
    pub fn cutoff(&self) -> NaiveDate {
        self.cutoff
    }

    /// Rows for `instrument` dated on or before the cutoff.
    pub fn rows(&self, instrument: &str) -> &'a [PriceRow] {
        match self.history.series.get(instrument) {
            Some(rows) => {
                let end = rows.partition_point(|r| r.date <= self.cutoff);
                &rows[..end]
            }
            None => &[],
        }
    }

    /// Close on the cutoff date itself. `None` if the instrument did not
    /// trade that day.
    pub fn quote(&self, instrument: &str) -> Option<f64> {
        self.rows(instrument)
            .last()
            .filter(|r| r.date == self.cutoff)
            .map(|r| r.close)
    }

    /// Most recent close on or before the cutoff.
    pub fn last_close(&self, instrument: &str) -> Option<f64> {
        self.rows(instrument).last().map(|r| r.close)
    }
}

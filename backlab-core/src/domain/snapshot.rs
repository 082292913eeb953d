use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// End-of-day valuation. One per trading day of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySnapshot {
    pub date: NaiveDate,
    pub cash: f64,
    pub position_value: f64,
    pub equity: f64,
}

impl DailySnapshot {
    /// Equity is always derived, never passed in.
    pub fn new(date: NaiveDate, cash: f64, position_value: f64) -> Self {
        Self {
            date,
            cash,
            position_value,
            equity: cash + position_value,
        }
    }
}

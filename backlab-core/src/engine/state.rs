//! Engine configuration, run status, errors and the raw run output.

use crate::data::PriceError;
use crate::domain::{CostTotals, DailySnapshot, Position, TradeRecord};
use crate::execution::{CostConfig, CostConfigError};
use crate::policy::{PolicyError, Sizing};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("universe is empty: no instrument has price data in range")]
    EmptyUniverse,

    #[error("invalid date range: {0}")]
    InvalidDateRange(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("malformed price data: {0}")]
    MalformedPriceData(String),

    #[error("invalid run status transition: {from:?} -> {to:?}")]
    InvalidTransition { from: RunStatus, to: RunStatus },
}

impl From<PolicyError> for EngineError {
    fn from(e: PolicyError) -> Self {
        EngineError::InvalidConfig(e.to_string())
    }
}

impl From<CostConfigError> for EngineError {
    fn from(e: CostConfigError) -> Self {
        EngineError::InvalidConfig(e.to_string())
    }
}

impl From<PriceError> for EngineError {
    fn from(e: PriceError) -> Self {
        match e {
            PriceError::Malformed { .. } | PriceError::Parse { .. } => {
                EngineError::MalformedPriceData(e.to_string())
            }
            other => EngineError::InvalidConfig(other.to_string()),
        }
    }
}

/// Lifecycle of a run. `Completed`, `Failed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled)
    }

    pub fn can_transition_to(self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (RunStatus::Idle, RunStatus::Running)
                | (RunStatus::Idle, RunStatus::Failed)
                | (RunStatus::Running, RunStatus::Completed)
                | (RunStatus::Running, RunStatus::Failed)
                | (RunStatus::Running, RunStatus::Cancelled)
        )
    }

    pub fn transition(self, next: RunStatus) -> Result<RunStatus, EngineError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(EngineError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

/// Configuration for a single run. Immutable once the run starts.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub initial_capital: f64,
    pub cost: CostConfig,
    pub sizing: Sizing,
}

impl EngineConfig {
    pub fn new(start: NaiveDate, end: NaiveDate, initial_capital: f64) -> Self {
        Self {
            start,
            end,
            initial_capital,
            cost: CostConfig::frictionless(),
            sizing: Sizing::WholeUnits,
        }
    }

    pub fn with_cost(mut self, cost: CostConfig) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_sizing(mut self, sizing: Sizing) -> Self {
        self.sizing = sizing;
        self
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.start > self.end {
            return Err(EngineError::InvalidDateRange(format!(
                "start {} is after end {}",
                self.start, self.end
            )));
        }
        if !self.initial_capital.is_finite() || self.initial_capital <= 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "initial capital must be positive, got {}",
                self.initial_capital
            )));
        }
        self.cost.validate()?;
        Ok(())
    }
}

/// Raw output of the daily loop, before metrics.
#[derive(Debug, Clone)]
pub struct EngineRun {
    /// `Completed`, or `Cancelled` when the run stopped early.
    pub status: RunStatus,
    pub initial_capital: f64,
    /// Instruments actually traded, in universe order.
    pub universe: Vec<String>,
    /// Trading days in the requested range.
    pub trading_days: usize,
    /// One per processed day. Shorter than `trading_days` when cancelled.
    pub snapshots: Vec<DailySnapshot>,
    pub trades: Vec<TradeRecord>,
    pub final_positions: Vec<Position>,
    pub cost_totals: CostTotals,
    /// Days each held instrument was valued at a stale price.
    pub carried_forward: BTreeMap<String, usize>,
}

impl EngineRun {
    pub fn is_complete(&self) -> bool {
        self.status == RunStatus::Completed
    }

    pub fn final_equity(&self) -> f64 {
        self.snapshots
            .last()
            .map_or(self.initial_capital, |s| s.equity)
    }

    pub fn filled_trades(&self) -> impl Iterator<Item = &TradeRecord> {
        self.trades.iter().filter(|t| t.is_filled())
    }

    pub fn rejected_count(&self) -> usize {
        self.trades.iter().filter(|t| t.is_rejected()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn status_transitions() {
        assert!(RunStatus::Idle.can_transition_to(RunStatus::Running));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Cancelled));
        assert!(!RunStatus::Completed.can_transition_to(RunStatus::Running));
        assert!(!RunStatus::Idle.can_transition_to(RunStatus::Completed));
        assert!(RunStatus::Cancelled.transition(RunStatus::Running).is_err());
        assert!(RunStatus::Failed.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
    }

    #[test]
    fn config_validation() {
        assert!(EngineConfig::new(d(1), d(31), 1_000.0).validate().is_ok());
        assert!(matches!(
            EngineConfig::new(d(31), d(1), 1_000.0).validate(),
            Err(EngineError::InvalidDateRange(_))
        ));
        assert!(matches!(
            EngineConfig::new(d(1), d(31), 0.0).validate(),
            Err(EngineError::InvalidConfig(_))
        ));
        let bad_cost = EngineConfig::new(d(1), d(31), 1_000.0).with_cost(CostConfig::new(2.0, 0.0, 0.0));
        assert!(bad_cost.validate().is_err());
    }

    #[test]
    fn price_errors_map_to_engine_errors() {
        let e: EngineError = PriceError::Malformed {
            instrument: "A".into(),
            message: "x".into(),
        }
        .into();
        assert!(matches!(e, EngineError::MalformedPriceData(_)));
    }
}

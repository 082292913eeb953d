//! Strategy policies.
//!
//! A policy is a pure decision function: it receives a `StrategyContext`
//! (today's date, a history view that ends today, a read-only portfolio and
//! its own persisted state) and returns trade intents plus its next state.
//! Policies never touch the ledger; the engine applies intents.

mod composite;
mod equal_weight;
mod plan;
mod rebalance;
mod trailing_stop;
mod trend_filter;

pub use composite::{CompositeParams, CompositionRule, Member, StopVote, TrendVote};
pub use equal_weight::EqualWeightParams;
pub use plan::{inverse_volatility_weights, REBALANCE_BAND_UNITS};
pub use rebalance::{CustomWeightsParams, RebalanceParams};
pub use trailing_stop::{ReentryRule, StopRule, TrailingStopParams};
pub use trend_filter::TrendFilterParams;

use crate::data::HistoryView;
use crate::domain::{Portfolio, Side};
pub use crate::domain::IntentReason;
use crate::execution::CostConfig;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    #[error("invalid parameter {name}: {message}")]
    InvalidParam { name: &'static str, message: String },
}

pub(crate) fn invalid(name: &'static str, message: impl Into<String>) -> PolicyError {
    PolicyError::InvalidParam {
        name,
        message: message.into(),
    }
}

/// Whole units or fractional quantities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sizing {
    #[default]
    WholeUnits,
    Fractional,
}

impl Sizing {
    pub fn is_fractional(self) -> bool {
        self == Sizing::Fractional
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeIntent {
    pub instrument: String,
    pub side: Side,
    pub quantity: f64,
    pub reason: IntentReason,
}

impl TradeIntent {
    pub fn buy(instrument: impl Into<String>, quantity: f64, reason: IntentReason) -> Self {
        Self {
            instrument: instrument.into(),
            side: Side::Buy,
            quantity,
            reason,
        }
    }

    pub fn sell(instrument: impl Into<String>, quantity: f64, reason: IntentReason) -> Self {
        Self {
            instrument: instrument.into(),
            side: Side::Sell,
            quantity,
            reason,
        }
    }
}

/// Day and price of the last exit from an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExitMark {
    pub day: usize,
    pub price: f64,
}

/// State a policy carries from one day to the next. Owned by the engine,
/// replaced wholesale by each `Decision`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyState {
    /// Day index of the last scheduled check or rebalance.
    pub last_rebalance: Option<usize>,
    /// Highest close seen per held instrument since entry.
    pub high_water: BTreeMap<String, f64>,
    pub exits: BTreeMap<String, ExitMark>,
}

impl PolicyState {
    /// True on the first day and every `interval` days after the last run.
    pub fn rebalance_due(&self, day_index: usize, interval: usize) -> bool {
        match self.last_rebalance {
            None => true,
            Some(last) => day_index.saturating_sub(last) >= interval,
        }
    }

    /// Drop high-water marks for instruments no longer held.
    pub(crate) fn retain_held(&mut self, portfolio: &Portfolio) {
        self.high_water.retain(|id, _| portfolio.holds(id));
    }
}

/// Everything a policy may look at on one day.
pub struct StrategyContext<'a> {
    pub date: NaiveDate,
    pub day_index: usize,
    pub universe: &'a [String],
    pub history: HistoryView<'a>,
    pub portfolio: &'a Portfolio,
    pub sizing: Sizing,
    pub state: &'a PolicyState,
}

impl StrategyContext<'_> {
    pub fn quote(&self, instrument: &str) -> Option<f64> {
        self.history.quote(instrument)
    }

    pub fn cost(&self) -> &CostConfig {
        self.portfolio.cost_config()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub intents: Vec<TradeIntent>,
    pub state: PolicyState,
}

impl Decision {
    pub fn hold(state: PolicyState) -> Self {
        Self {
            intents: Vec::new(),
            state,
        }
    }
}

/// The strategy to run, with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Policy {
    EqualWeight(EqualWeightParams),
    Rebalance(RebalanceParams),
    CustomWeights(CustomWeightsParams),
    TrailingStop(TrailingStopParams),
    TrendFilter(TrendFilterParams),
    Composite(CompositeParams),
}

impl Default for Policy {
    fn default() -> Self {
        Policy::EqualWeight(EqualWeightParams::default())
    }
}

impl Policy {
    pub fn name(&self) -> &'static str {
        match self {
            Policy::EqualWeight(_) => "equal_weight",
            Policy::Rebalance(_) => "rebalance",
            Policy::CustomWeights(_) => "custom_weights",
            Policy::TrailingStop(_) => "trailing_stop",
            Policy::TrendFilter(_) => "trend_filter",
            Policy::Composite(_) => "composite",
        }
    }

    pub fn validate(&self, universe: &[String]) -> Result<(), PolicyError> {
        match self {
            Policy::EqualWeight(_) => Ok(()),
            Policy::Rebalance(p) => p.validate(),
            Policy::CustomWeights(p) => p.validate(universe),
            Policy::TrailingStop(p) => p.validate(),
            Policy::TrendFilter(p) => p.validate(),
            Policy::Composite(p) => p.validate(),
        }
    }

    pub fn decide(&self, ctx: &StrategyContext<'_>) -> Decision {
        match self {
            Policy::EqualWeight(p) => p.decide(ctx),
            Policy::Rebalance(p) => p.decide(ctx),
            Policy::CustomWeights(p) => p.decide(ctx),
            Policy::TrailingStop(p) => p.decide(ctx),
            Policy::TrendFilter(p) => p.decide(ctx),
            Policy::Composite(p) => p.decide(ctx),
        }
    }
}

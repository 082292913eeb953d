//! Moving-average trend filter.
//!
//! On every `interval`-th trading day each instrument is compared with its
//! trailing SMA. Holdings that closed at or below the average are sold; the
//! instruments above it are brought to equal shares of equity. An instrument
//! without `window` closes of history has no signal and is left alone.

use super::plan::OrderPlan;
use super::{invalid, Decision, IntentReason, PolicyError, StrategyContext};
use crate::indicators::{Indicator, Sma};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Trend {
    Above,
    Below,
}

/// Close vs trailing SMA over `window` rows, if there is enough history and
/// a quote today.
pub(crate) fn trend_signal(ctx: &StrategyContext<'_>, instrument: &str, window: usize) -> Option<Trend> {
    let price = ctx.quote(instrument)?;
    let sma = Sma::new(window).latest(ctx.history.rows(instrument))?;
    Some(if price > sma { Trend::Above } else { Trend::Below })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendFilterParams {
    pub window: usize,
    pub interval: usize,
}

impl Default for TrendFilterParams {
    fn default() -> Self {
        Self {
            window: 20,
            interval: 5,
        }
    }
}

impl TrendFilterParams {
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.window == 0 {
            return Err(invalid("window", "must be >= 1"));
        }
        if self.interval == 0 {
            return Err(invalid("interval", "must be >= 1"));
        }
        Ok(())
    }

    pub fn decide(&self, ctx: &StrategyContext<'_>) -> Decision {
        let mut state = ctx.state.clone();
        if !state.rebalance_due(ctx.day_index, self.interval) {
            return Decision::hold(state);
        }
        state.last_rebalance = Some(ctx.day_index);

        let mut plan = OrderPlan::new(ctx);
        let mut above = Vec::new();
        for id in ctx.universe {
            match trend_signal(ctx, id, self.window) {
                Some(Trend::Above) => above.push(id.clone()),
                Some(Trend::Below) => {
                    plan.sell_all(id, IntentReason::TrendExit);
                }
                None => {}
            }
        }

        if !above.is_empty() {
            let w = 1.0 / above.len() as f64;
            let weights: BTreeMap<String, f64> = above.into_iter().map(|id| (id, w)).collect();
            plan.rebalance_to(&weights, IntentReason::TrendEntry);
        }

        Decision {
            intents: plan.finish(),
            state,
        }
    }
}

//! Periodic rebalancing, to equal weights or to fixed custom weights.

use super::plan::OrderPlan;
use super::{invalid, Decision, IntentReason, PolicyError, StrategyContext};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Every `interval` trading days, restore equal weights across the universe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RebalanceParams {
    pub interval: usize,
}

impl Default for RebalanceParams {
    fn default() -> Self {
        Self { interval: 20 }
    }
}

impl RebalanceParams {
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.interval == 0 {
            return Err(invalid("interval", "must be >= 1"));
        }
        Ok(())
    }

    pub fn decide(&self, ctx: &StrategyContext<'_>) -> Decision {
        if ctx.universe.is_empty() {
            return Decision::hold(ctx.state.clone());
        }
        let w = 1.0 / ctx.universe.len() as f64;
        let weights = ctx.universe.iter().map(|id| (id.clone(), w)).collect();
        rebalance_on_schedule(ctx, self.interval, &weights)
    }
}

/// Every `interval` trading days, restore the configured weights. Weights
/// must be non-negative and sum to at most 1; the remainder stays in cash.
/// Universe members without a weight are held at zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomWeightsParams {
    pub weights: BTreeMap<String, f64>,
    pub interval: usize,
}

impl Default for CustomWeightsParams {
    fn default() -> Self {
        Self {
            weights: BTreeMap::new(),
            interval: 20,
        }
    }
}

impl CustomWeightsParams {
    pub fn validate(&self, universe: &[String]) -> Result<(), PolicyError> {
        if self.interval == 0 {
            return Err(invalid("interval", "must be >= 1"));
        }
        if self.weights.is_empty() {
            return Err(invalid("weights", "at least one weight is required"));
        }
        for (id, &w) in &self.weights {
            if !w.is_finite() || w < 0.0 {
                return Err(invalid("weights", format!("{id} has weight {w}")));
            }
            if !universe.iter().any(|u| u == id) {
                return Err(invalid("weights", format!("{id} is not in the universe")));
            }
        }
        let sum: f64 = self.weights.values().sum();
        if sum > 1.0 + WEIGHT_SUM_TOLERANCE {
            return Err(invalid("weights", format!("weights sum to {sum:.6}, above 1")));
        }
        Ok(())
    }

    pub fn decide(&self, ctx: &StrategyContext<'_>) -> Decision {
        let weights = ctx
            .universe
            .iter()
            .map(|id| (id.clone(), self.weights.get(id).copied().unwrap_or(0.0)))
            .collect();
        rebalance_on_schedule(ctx, self.interval, &weights)
    }
}

fn rebalance_on_schedule(
    ctx: &StrategyContext<'_>,
    interval: usize,
    weights: &BTreeMap<String, f64>,
) -> Decision {
    let mut state = ctx.state.clone();
    if !state.rebalance_due(ctx.day_index, interval) {
        return Decision::hold(state);
    }
    state.last_rebalance = Some(ctx.day_index);

    let mut plan = OrderPlan::new(ctx);
    plan.rebalance_to(weights, IntentReason::Rebalance);
    Decision {
        intents: plan.finish(),
        state,
    }
}

//! Buy-and-hold equal weight: split starting cash evenly across the universe
//! on the first day, then hold.

use super::plan::OrderPlan;
use super::{Decision, IntentReason, StrategyContext};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EqualWeightParams {}

impl EqualWeightParams {
    pub fn decide(&self, ctx: &StrategyContext<'_>) -> Decision {
        let mut state = ctx.state.clone();
        if state.last_rebalance.is_some() || ctx.universe.is_empty() {
            return Decision::hold(state);
        }
        state.last_rebalance = Some(ctx.day_index);

        let allocation = ctx.portfolio.cash() / ctx.universe.len() as f64;
        let mut plan = OrderPlan::new(ctx);
        for id in ctx.universe {
            plan.buy_value(id, allocation, IntentReason::Allocate);
        }
        Decision {
            intents: plan.finish(),
            state,
        }
    }
}

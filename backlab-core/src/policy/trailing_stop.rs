//! Trailing stop with inverse-volatility entries.
//!
//! For each held instrument the high-water mark is the highest close since
//! entry. The holding is sold when `close <= high_water * (1 - stop_pct)`.
//! After an exit the instrument sits out `cooldown` trading days; what
//! happens next is set by the re-entry rule. Cash is deployed into eligible,
//! unheld instruments in proportion to inverse realized volatility.

use super::plan::{inverse_volatility_weights, OrderPlan};
use super::{invalid, Decision, ExitMark, IntentReason, PolicyError, PolicyState, StrategyContext};
use crate::data::PriceRow;
use crate::indicators::{Indicator, RealizedVol};
use serde::{Deserialize, Serialize};

/// How far below the high-water mark the stop sits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StopRule {
    /// Fixed fraction, e.g. 0.10 for 10%.
    Fixed { pct: f64 },
    /// `multiplier * daily realized vol`, clamped to `[min_pct, max_pct]`.
    /// Falls back to `max_pct` until there is enough history for a vol estimate.
    Volatility {
        multiplier: f64,
        min_pct: f64,
        max_pct: f64,
    },
}

impl Default for StopRule {
    fn default() -> Self {
        StopRule::Fixed { pct: 0.10 }
    }
}

impl StopRule {
    pub fn validate(&self) -> Result<(), PolicyError> {
        let in_unit = |x: f64| x.is_finite() && x > 0.0 && x < 1.0;
        match *self {
            StopRule::Fixed { pct } if !in_unit(pct) => {
                Err(invalid("stop.pct", format!("must be in (0, 1), got {pct}")))
            }
            StopRule::Volatility { multiplier, .. } if !(multiplier.is_finite() && multiplier > 0.0) => {
                Err(invalid("stop.multiplier", "must be positive"))
            }
            StopRule::Volatility { min_pct, max_pct, .. }
                if !in_unit(min_pct) || !in_unit(max_pct) || min_pct > max_pct =>
            {
                Err(invalid(
                    "stop.min_pct/max_pct",
                    format!("need 0 < min_pct <= max_pct < 1, got {min_pct}..{max_pct}"),
                ))
            }
            _ => Ok(()),
        }
    }

    pub fn stop_pct(&self, rows: &[PriceRow], lookback: usize) -> f64 {
        match *self {
            StopRule::Fixed { pct } => pct,
            StopRule::Volatility {
                multiplier,
                min_pct,
                max_pct,
            } => RealizedVol::new(lookback.max(2))
                .latest(rows)
                .map_or(max_pct, |vol| (multiplier * vol).clamp(min_pct, max_pct)),
        }
    }

    /// True when `price` has fallen through the stop below `high_water`.
    pub fn is_breached(&self, price: f64, high_water: f64, rows: &[PriceRow], lookback: usize) -> bool {
        price <= high_water * (1.0 - self.stop_pct(rows, lookback))
    }
}

/// What an instrument needs before it can be bought again after an exit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReentryRule {
    /// Never re-enter after a stop-out.
    Never,
    /// Re-enter once the cooldown has elapsed.
    AfterCooldown,
    /// Re-enter once the cooldown has elapsed and the close is back at or
    /// above the exit price.
    #[default]
    OnRecovery,
}

impl ReentryRule {
    pub fn allows(&self, exit: Option<&ExitMark>, day_index: usize, cooldown: usize, price: f64) -> bool {
        let Some(exit) = exit else {
            return true;
        };
        let cooled = day_index.saturating_sub(exit.day) > cooldown;
        match self {
            ReentryRule::Never => false,
            ReentryRule::AfterCooldown => cooled,
            ReentryRule::OnRecovery => cooled && price >= exit.price,
        }
    }
}

/// Raise the high-water mark for `instrument` to `price` and return it.
pub(crate) fn raise_high_water(state: &mut PolicyState, instrument: &str, price: f64) -> f64 {
    let hwm = state
        .high_water
        .entry(instrument.to_string())
        .or_insert(price);
    if price > *hwm {
        *hwm = price;
    }
    *hwm
}

pub(crate) fn record_exit(state: &mut PolicyState, instrument: &str, day: usize, price: f64) {
    state.high_water.remove(instrument);
    state.exits.insert(instrument.to_string(), ExitMark { day, price });
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrailingStopParams {
    /// Returns used for the volatility estimate.
    pub lookback: usize,
    pub stop: StopRule,
    /// Trading days an exited instrument must sit out.
    pub cooldown: usize,
    pub reentry: ReentryRule,
}

impl Default for TrailingStopParams {
    fn default() -> Self {
        Self {
            lookback: 20,
            stop: StopRule::default(),
            cooldown: 5,
            reentry: ReentryRule::default(),
        }
    }
}

impl TrailingStopParams {
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.lookback < 2 {
            return Err(invalid("lookback", "must be >= 2"));
        }
        self.stop.validate()
    }

    pub fn decide(&self, ctx: &StrategyContext<'_>) -> Decision {
        let mut state = ctx.state.clone();
        state.retain_held(ctx.portfolio);
        let mut plan = OrderPlan::new(ctx);

        for id in ctx.universe {
            if !ctx.portfolio.holds(id) {
                continue;
            }
            let Some(price) = ctx.quote(id) else {
                continue;
            };
            let hwm = raise_high_water(&mut state, id, price);
            let rows = ctx.history.rows(id);
            if self.stop.is_breached(price, hwm, rows, self.lookback)
                && plan.sell_all(id, IntentReason::StopExit)
            {
                record_exit(&mut state, id, ctx.day_index, price);
            }
        }

        let candidates: Vec<String> = ctx
            .universe
            .iter()
            .filter(|id| plan.held(id) == 0.0 && !ctx.portfolio.holds(id))
            .filter(|id| match ctx.quote(id) {
                Some(price) => self.reentry.allows(
                    state.exits.get(id.as_str()),
                    ctx.day_index,
                    self.cooldown,
                    price,
                ),
                None => false,
            })
            .cloned()
            .collect();

        if !candidates.is_empty() {
            let available = plan.cash();
            for (id, w) in inverse_volatility_weights(ctx, &candidates, self.lookback) {
                if plan.buy_value(&id, available * w, IntentReason::Entry).is_some() {
                    if let Some(price) = ctx.quote(&id) {
                        state.high_water.insert(id.clone(), price);
                    }
                    state.exits.remove(&id);
                }
            }
        }

        Decision {
            intents: plan.finish(),
            state,
        }
    }
}

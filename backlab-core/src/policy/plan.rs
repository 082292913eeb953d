//! Order planning shared by the policies.
//!
//! An `OrderPlan` projects cash and holdings forward as intents are added, so
//! a policy never asks for more than the ledger can fill: sells credit their
//! net proceeds, buys are clamped to the projected cash after costs.
//! Intents come out sells first, then buys, which is the order the engine
//! applies them in.

use super::{IntentReason, StrategyContext, TradeIntent};
use crate::indicators::{Indicator, RealizedVol};
use std::collections::BTreeMap;

/// Held positions within this many units of their target are left alone.
/// Applies to every `rebalance_to` caller: periodic rebalance, custom weights
/// and the trend filter.
pub const REBALANCE_BAND_UNITS: f64 = 2.0;

const MIN_VOL: f64 = 1e-8;

pub(crate) struct OrderPlan<'c, 'a> {
    ctx: &'c StrategyContext<'a>,
    sells: Vec<TradeIntent>,
    buys: Vec<TradeIntent>,
    cash: f64,
    holdings: BTreeMap<String, f64>,
}

impl<'c, 'a> OrderPlan<'c, 'a> {
    pub fn new(ctx: &'c StrategyContext<'a>) -> Self {
        let holdings = ctx
            .portfolio
            .positions()
            .filter(|p| !p.is_flat())
            .map(|p| (p.instrument.clone(), p.quantity))
            .collect();
        Self {
            ctx,
            sells: Vec::new(),
            buys: Vec::new(),
            cash: ctx.portfolio.cash(),
            holdings,
        }
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn held(&self, instrument: &str) -> f64 {
        self.holdings.get(instrument).copied().unwrap_or(0.0)
    }

    /// Projected equity: cash plus holdings at today's quote, or their last
    /// mark when the instrument has no quote today.
    pub fn equity(&self) -> f64 {
        let holdings: f64 = self
            .holdings
            .iter()
            .map(|(id, qty)| qty * self.price_or_mark(id))
            .sum();
        self.cash + holdings
    }

    fn price_or_mark(&self, instrument: &str) -> f64 {
        self.ctx
            .quote(instrument)
            .or_else(|| self.ctx.portfolio.position(instrument).map(|p| p.last_mark))
            .or_else(|| self.ctx.history.last_close(instrument))
            .unwrap_or(0.0)
    }

    pub fn sell_all(&mut self, instrument: &str, reason: IntentReason) -> bool {
        let qty = self.held(instrument);
        self.sell(instrument, qty, reason)
    }

    /// Queue a sell. No-op without a quote today or a holding to sell.
    pub fn sell(&mut self, instrument: &str, quantity: f64, reason: IntentReason) -> bool {
        let Some(price) = self.ctx.quote(instrument) else {
            return false;
        };
        let quantity = quantity.min(self.held(instrument));
        if quantity <= 0.0 {
            return false;
        }
        self.cash += self.ctx.cost().sell_proceeds(price, quantity);
        let remaining = self.held(instrument) - quantity;
        if remaining > 0.0 {
            self.holdings.insert(instrument.to_string(), remaining);
        } else {
            self.holdings.remove(instrument);
        }
        self.sells.push(TradeIntent::sell(instrument, quantity, reason));
        true
    }

    /// Buy as much as `allocation` buys, capped by projected cash.
    pub fn buy_value(&mut self, instrument: &str, allocation: f64, reason: IntentReason) -> Option<f64> {
        let price = self.ctx.quote(instrument)?;
        let budget = allocation.min(self.cash);
        let qty = self
            .ctx
            .cost()
            .max_affordable(budget, price, self.ctx.sizing.is_fractional());
        self.push_buy(instrument, price, qty, reason)
    }

    /// Buy `quantity` units, reduced to what projected cash covers.
    pub fn buy_units(&mut self, instrument: &str, quantity: f64, reason: IntentReason) -> Option<f64> {
        let price = self.ctx.quote(instrument)?;
        let affordable = self
            .ctx
            .cost()
            .max_affordable(self.cash, price, self.ctx.sizing.is_fractional());
        self.push_buy(instrument, price, quantity.min(affordable), reason)
    }

    fn push_buy(&mut self, instrument: &str, price: f64, qty: f64, reason: IntentReason) -> Option<f64> {
        if qty <= 0.0 {
            return None;
        }
        self.cash -= self.ctx.cost().buy_outlay(price, qty);
        *self.holdings.entry(instrument.to_string()).or_insert(0.0) += qty;
        self.buys.push(TradeIntent::buy(instrument, qty, reason));
        Some(qty)
    }

    /// Move the listed instruments toward `weight * equity`. Instruments not
    /// in `weights` are untouched; a weight of zero closes the holding.
    /// Existing holdings are only topped up or trimmed when they are more than
    /// `REBALANCE_BAND_UNITS` away from target.
    pub fn rebalance_to(&mut self, weights: &BTreeMap<String, f64>, reason: IntentReason) {
        let equity = self.equity();
        let fractional = self.ctx.sizing.is_fractional();
        let targets: Vec<(String, f64)> = weights
            .iter()
            .filter_map(|(id, &w)| {
                let price = self.ctx.quote(id)?;
                let target = self.ctx.cost().max_affordable(equity * w, price, fractional);
                Some((id.clone(), target))
            })
            .collect();

        for (id, target) in &targets {
            let held = self.held(id);
            if held > 0.0 && (*target == 0.0 || held - target > REBALANCE_BAND_UNITS) {
                self.sell(id, held - target, reason);
            }
        }
        for (id, target) in &targets {
            let held = self.held(id);
            if *target > 0.0 && (held == 0.0 || target - held > REBALANCE_BAND_UNITS) {
                self.buy_units(id, target - held, reason);
            }
        }
    }

    pub fn finish(mut self) -> Vec<TradeIntent> {
        self.sells.append(&mut self.buys);
        self.sells
    }
}

/// Weights proportional to 1 / realized volatility over `lookback` returns.
/// Instruments with too little history get an inverse-vol of 1.0.
pub fn inverse_volatility_weights(
    ctx: &StrategyContext<'_>,
    instruments: &[String],
    lookback: usize,
) -> Vec<(String, f64)> {
    let vol = RealizedVol::new(lookback.max(2));
    let raw: Vec<(String, f64)> = instruments
        .iter()
        .map(|id| {
            let inv = vol
                .latest(ctx.history.rows(id))
                .map_or(1.0, |v| 1.0 / v.max(MIN_VOL));
            (id.clone(), inv)
        })
        .collect();
    let total: f64 = raw.iter().map(|(_, w)| w).sum();
    if total <= 0.0 {
        return Vec::new();
    }
    raw.into_iter().map(|(id, w)| (id, w / total)).collect()
}

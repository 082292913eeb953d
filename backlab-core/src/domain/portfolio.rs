//! Portfolio ledger: cash, holdings and the trade log.
//!
//! The ledger is the only place cash and holdings change. Every mutation goes
//! through `buy` or `sell`, which either fill completely or append a rejected
//! entry and return an error, leaving cash and holdings untouched. Cash never
//! goes negative and quantities are never negative.

use super::position::{Position, QTY_EPSILON};
use super::snapshot::DailySnapshot;
use super::trade::{IntentReason, RejectReason, Side, TradeRecord, TradeStatus};
use crate::execution::CostConfig;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("insufficient funds for {instrument}: need {required:.2}, have {available:.2}")]
    InsufficientFunds {
        instrument: String,
        required: f64,
        available: f64,
    },

    #[error("insufficient shares of {instrument}: requested {requested}, held {held}")]
    InsufficientShares {
        instrument: String,
        requested: f64,
        held: f64,
    },

    #[error("invalid trade for {instrument}: price={price}, quantity={quantity}")]
    InvalidTrade {
        instrument: String,
        price: f64,
        quantity: f64,
    },
}

impl LedgerError {
    pub fn reject_reason(&self) -> RejectReason {
        match self {
            LedgerError::InsufficientFunds { .. } => RejectReason::InsufficientFunds,
            LedgerError::InsufficientShares { .. } => RejectReason::InsufficientShares,
            LedgerError::InvalidTrade { .. } => RejectReason::InvalidTrade,
        }
    }
}

/// Result of an end-of-day valuation.
#[derive(Debug, Clone, PartialEq)]
pub struct Valuation {
    pub snapshot: DailySnapshot,
    /// Held instruments that had no quote and were valued at their last mark.
    pub carried_forward: Vec<String>,
}

/// Running totals of every cost charged on filled trades.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CostTotals {
    pub slippage: f64,
    pub commission: f64,
    pub tax: f64,
}

impl CostTotals {
    pub fn total(&self) -> f64 {
        self.slippage + self.commission + self.tax
    }
}

#[derive(Debug, Clone)]
pub struct Portfolio {
    cash: f64,
    initial_capital: f64,
    cost: CostConfig,
    positions: BTreeMap<String, Position>,
    trades: Vec<TradeRecord>,
    costs: CostTotals,
}

impl Portfolio {
    pub fn new(initial_capital: f64, cost: CostConfig) -> Self {
        Self {
            cash: initial_capital,
            initial_capital,
            cost,
            positions: BTreeMap::new(),
            trades: Vec::new(),
            costs: CostTotals::default(),
        }
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    pub fn cost_config(&self) -> &CostConfig {
        &self.cost
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn position(&self, instrument: &str) -> Option<&Position> {
        self.positions.get(instrument).filter(|p| !p.is_flat())
    }

    pub fn holds(&self, instrument: &str) -> bool {
        self.position(instrument).is_some()
    }

    pub fn quantity(&self, instrument: &str) -> f64 {
        self.position(instrument).map_or(0.0, |p| p.quantity)
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn into_trades(self) -> Vec<TradeRecord> {
        self.trades
    }

    pub fn cost_totals(&self) -> CostTotals {
        self.costs
    }

    /// Value of all holdings at their last marks.
    pub fn position_value(&self) -> f64 {
        self.positions.values().map(Position::market_value).sum()
    }

    /// Cash + holdings at their last marks.
    pub fn equity(&self) -> f64 {
        self.cash + self.position_value()
    }

    /// Buy `quantity` units at market `price`. Fills completely or not at all.
    pub fn buy(
        &mut self,
        date: NaiveDate,
        instrument: &str,
        price: f64,
        quantity: f64,
    ) -> Result<TradeRecord, LedgerError> {
        if let Err(e) = check_trade(instrument, price, quantity) {
            return Err(self.reject_with(date, instrument, Side::Buy, price, quantity, e));
        }

        let applied = self.cost.apply_cost(price, quantity, Side::Buy);
        let outlay = -applied.cash_flow();
        if outlay > self.cash {
            let err = LedgerError::InsufficientFunds {
                instrument: instrument.to_string(),
                required: outlay,
                available: self.cash,
            };
            return Err(self.reject_with(date, instrument, Side::Buy, price, quantity, err));
        }

        self.cash -= outlay;
        self.positions
            .entry(instrument.to_string())
            .and_modify(|p| {
                p.add(quantity, applied.exec_price);
                p.last_mark = price;
            })
            .or_insert_with(|| Position::new(instrument, quantity, applied.exec_price, price));
        self.costs.slippage += applied.slippage;
        self.costs.commission += applied.commission;

        let record = TradeRecord {
            date,
            instrument: instrument.to_string(),
            side: Side::Buy,
            quantity,
            price,
            exec_price: applied.exec_price,
            slippage: applied.slippage,
            commission: applied.commission,
            tax: 0.0,
            cost: applied.total(),
            realized_pnl: None,
            status: TradeStatus::Filled,
            reject_reason: None,
            reason: None,
        };
        self.trades.push(record.clone());
        Ok(record)
    }

    /// Sell `quantity` units at market `price`. Fills completely or not at all.
    pub fn sell(
        &mut self,
        date: NaiveDate,
        instrument: &str,
        price: f64,
        quantity: f64,
    ) -> Result<TradeRecord, LedgerError> {
        if let Err(e) = check_trade(instrument, price, quantity) {
            return Err(self.reject_with(date, instrument, Side::Sell, price, quantity, e));
        }

        let held = self.quantity(instrument);
        if quantity > held + QTY_EPSILON {
            let err = LedgerError::InsufficientShares {
                instrument: instrument.to_string(),
                requested: quantity,
                held,
            };
            return Err(self.reject_with(date, instrument, Side::Sell, price, quantity, err));
        }
        let quantity = quantity.min(held);

        let applied = self.cost.apply_cost(price, quantity, Side::Sell);
        let proceeds = applied.cash_flow();
        let mut realized = 0.0;
        if let Some(pos) = self.positions.get_mut(instrument) {
            realized = proceeds - pos.avg_price * quantity;
            pos.quantity -= quantity;
            pos.last_mark = price;
            if pos.is_flat() {
                self.positions.remove(instrument);
            }
        }
        self.cash += proceeds;
        self.costs.slippage += applied.slippage;
        self.costs.commission += applied.commission;
        self.costs.tax += applied.tax;

        let record = TradeRecord {
            date,
            instrument: instrument.to_string(),
            side: Side::Sell,
            quantity,
            price,
            exec_price: applied.exec_price,
            slippage: applied.slippage,
            commission: applied.commission,
            tax: applied.tax,
            cost: applied.total(),
            realized_pnl: Some(realized),
            status: TradeStatus::Filled,
            reject_reason: None,
            reason: None,
        };
        self.trades.push(record.clone());
        Ok(record)
    }

    /// Record a trade that could not be attempted, e.g. no quote that day.
    pub fn reject(
        &mut self,
        date: NaiveDate,
        instrument: &str,
        side: Side,
        price: f64,
        quantity: f64,
        reason: RejectReason,
    ) {
        self.trades.push(rejected_record(date, instrument, side, price, quantity, reason));
    }

    /// Attach the policy's reason to the most recent log entry.
    pub fn label_last_trade(&mut self, reason: IntentReason) {
        if let Some(last) = self.trades.last_mut() {
            last.reason = Some(reason);
        }
    }

    fn reject_with(
        &mut self,
        date: NaiveDate,
        instrument: &str,
        side: Side,
        price: f64,
        quantity: f64,
        err: LedgerError,
    ) -> LedgerError {
        self.reject(date, instrument, side, price, quantity, err.reject_reason());
        err
    }

    /// Value every holding. Instruments with a quote are re-marked; the rest
    /// keep their last mark and are reported as carried forward.
    pub fn mark_to_market<F>(&mut self, date: NaiveDate, quote: F) -> Valuation
    where
        F: Fn(&str) -> Option<f64>,
    {
        let mut carried_forward = Vec::new();
        for (instrument, pos) in self.positions.iter_mut() {
            match quote(instrument) {
                Some(price) => pos.last_mark = price,
                None => carried_forward.push(instrument.clone()),
            }
        }
        Valuation {
            snapshot: DailySnapshot::new(date, self.cash, self.position_value()),
            carried_forward,
        }
    }
}

fn check_trade(instrument: &str, price: f64, quantity: f64) -> Result<(), LedgerError> {
    if price.is_finite() && price > 0.0 && quantity.is_finite() && quantity > 0.0 {
        Ok(())
    } else {
        Err(LedgerError::InvalidTrade {
            instrument: instrument.to_string(),
            price,
            quantity,
        })
    }
}

fn rejected_record(
    date: NaiveDate,
    instrument: &str,
    side: Side,
    price: f64,
    quantity: f64,
    reason: RejectReason,
) -> TradeRecord {
    // Keep the log serializable: JSON has no NaN.
    let finite = |x: f64| if x.is_finite() { x } else { 0.0 };
    TradeRecord {
        date,
        instrument: instrument.to_string(),
        side,
        quantity: finite(quantity),
        price: finite(price),
        exec_price: finite(price),
        slippage: 0.0,
        commission: 0.0,
        tax: 0.0,
        cost: 0.0,
        realized_pnl: None,
        status: TradeStatus::Rejected,
        reject_reason: Some(reason),
        reason: None,
    }
}

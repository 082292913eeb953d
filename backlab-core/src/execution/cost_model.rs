//! Cost model: slippage, commission and sell-side tax.
//!
//! Slippage is directional. Buyers pay `price * (1 + slippage_rate)`, sellers
//! receive `price * (1 - slippage_rate)`. Commission is charged on the
//! notional at the slipped price, on both sides. Tax is charged on sells only,
//! also on the slipped notional. All rates are fractions (0.001 = 0.1%).

use crate::domain::Side;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CostConfigError {
    #[error("{name} must be a finite rate in [0, 1), got {value}")]
    RateOutOfRange { name: &'static str, value: f64 },
}

/// Cost configuration for a run. Immutable once the run starts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostConfig {
    pub slippage_rate: f64,
    pub commission_rate: f64,
    pub tax_rate: f64,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self::frictionless()
    }
}

/// Breakdown of one priced trade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AppliedCost {
    pub side: Side,
    pub market_price: f64,
    pub exec_price: f64,
    pub quantity: f64,
    pub slippage: f64,
    pub commission: f64,
    pub tax: f64,
}

impl AppliedCost {
    /// Signed per-unit price adjustment from slippage.
    pub fn price_delta(&self) -> f64 {
        self.exec_price - self.market_price
    }

    /// Gross value at the execution price.
    pub fn notional(&self) -> f64 {
        self.exec_price * self.quantity
    }

    pub fn total(&self) -> f64 {
        self.slippage + self.commission + self.tax
    }

    /// Cash change for the account: negative for buys, positive for sells.
    pub fn cash_flow(&self) -> f64 {
        match self.side {
            Side::Buy => -(self.notional() + self.commission),
            Side::Sell => self.notional() - self.commission - self.tax,
        }
    }
}

impl CostConfig {
    pub fn new(slippage_rate: f64, commission_rate: f64, tax_rate: f64) -> Self {
        Self {
            slippage_rate,
            commission_rate,
            tax_rate,
        }
    }

    pub fn frictionless() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn validate(&self) -> Result<(), CostConfigError> {
        for (name, value) in [
            ("slippage_rate", self.slippage_rate),
            ("commission_rate", self.commission_rate),
            ("tax_rate", self.tax_rate),
        ] {
            if !value.is_finite() || !(0.0..1.0).contains(&value) {
                return Err(CostConfigError::RateOutOfRange { name, value });
            }
        }
        Ok(())
    }

    /// Price a trade of `quantity` units at market `price`.
    pub fn apply_cost(&self, price: f64, quantity: f64, side: Side) -> AppliedCost {
        let exec_price = match side {
            Side::Buy => price * (1.0 + self.slippage_rate),
            Side::Sell => price * (1.0 - self.slippage_rate),
        };
        let notional = exec_price * quantity;
        let tax = match side {
            Side::Buy => 0.0,
            Side::Sell => notional * self.tax_rate,
        };
        let mut applied = AppliedCost {
            side,
            market_price: price,
            exec_price,
            quantity,
            slippage: 0.0,
            commission: notional * self.commission_rate,
            tax,
        };
        applied.slippage = applied.price_delta().abs() * quantity;
        applied
    }

    /// Total cash needed to buy `quantity` units at `price`.
    pub fn buy_outlay(&self, price: f64, quantity: f64) -> f64 {
        -self.apply_cost(price, quantity, Side::Buy).cash_flow()
    }

    /// Net cash received from selling `quantity` units at `price`.
    pub fn sell_proceeds(&self, price: f64, quantity: f64) -> f64 {
        self.apply_cost(price, quantity, Side::Sell).cash_flow()
    }

    /// Largest quantity whose buy outlay fits in `budget`. Whole units unless
    /// `fractional` is set. Never returns a quantity the ledger would reject
    /// for insufficient funds.
    pub fn max_affordable(&self, budget: f64, price: f64, fractional: bool) -> f64 {
        if !budget.is_finite() || !price.is_finite() || budget <= 0.0 || price <= 0.0 {
            return 0.0;
        }
        let unit = price * (1.0 + self.slippage_rate) * (1.0 + self.commission_rate);
        let mut qty = budget / unit;
        if fractional {
            // Shave until rounding can no longer push the outlay over budget.
            while qty > 0.0 && self.buy_outlay(price, qty) > budget {
                qty *= 1.0 - 1e-12;
            }
        } else {
            qty = qty.floor();
            while qty > 0.0 && self.buy_outlay(price, qty) > budget {
                qty -= 1.0;
            }
        }
        qty.max(0.0)
    }
}

//! Execution friction: slippage, commission and transaction tax.

pub mod cost_model;

pub use cost_model::{AppliedCost, CostConfig, CostConfigError};

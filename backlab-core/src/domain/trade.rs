//! Trade log entries. Every buy or sell the engine attempts ends up here,
//! filled or rejected.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a trade. The engine is long-only, so a sell always reduces
/// an existing holding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Filled,
    Rejected,
}

/// Why a trade was refused. Rejections are recorded in the log and the run
/// continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    InsufficientFunds,
    InsufficientShares,
    InvalidTrade,
    MissingPriceData,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectReason::InsufficientFunds => "insufficient_funds",
            RejectReason::InsufficientShares => "insufficient_shares",
            RejectReason::InvalidTrade => "invalid_trade",
            RejectReason::MissingPriceData => "missing_price_data",
        };
        f.write_str(s)
    }
}

/// Why a policy asked for a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentReason {
    Allocate,
    Rebalance,
    Entry,
    StopExit,
    TrendEntry,
    TrendExit,
    CompositeEntry,
    CompositeExit,
}

impl IntentReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentReason::Allocate => "allocate",
            IntentReason::Rebalance => "rebalance",
            IntentReason::Entry => "entry",
            IntentReason::StopExit => "stop_exit",
            IntentReason::TrendEntry => "trend_entry",
            IntentReason::TrendExit => "trend_exit",
            IntentReason::CompositeEntry => "composite_entry",
            IntentReason::CompositeExit => "composite_exit",
        }
    }
}

impl fmt::Display for IntentReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry in the append-only trade log.
///
/// `price` is the market close the trade was requested at; `exec_price` is
/// the price after slippage. For rejected entries the cost fields are zero
/// and `exec_price` equals `price`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub date: NaiveDate,
    pub instrument: String,
    pub side: Side,
    pub quantity: f64,
    pub price: f64,
    pub exec_price: f64,
    pub slippage: f64,
    pub commission: f64,
    pub tax: f64,
    /// Slippage + commission + tax.
    pub cost: f64,
    /// Realized P&L net of all costs. Only set on filled sells.
    pub realized_pnl: Option<f64>,
    pub status: TradeStatus,
    pub reject_reason: Option<RejectReason>,
    /// The policy's reason, set by the engine when the trade came from an intent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<IntentReason>,
}

impl TradeRecord {
    pub fn is_filled(&self) -> bool {
        self.status == TradeStatus::Filled
    }

    pub fn is_rejected(&self) -> bool {
        self.status == TradeStatus::Rejected
    }

    /// A closed trade that made money after costs.
    pub fn is_winner(&self) -> bool {
        self.realized_pnl.is_some_and(|pnl| pnl > 0.0)
    }
}

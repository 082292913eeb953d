//! Domain types: positions, the portfolio ledger, trade log, daily snapshots.

pub mod portfolio;
pub mod position;
pub mod snapshot;
pub mod trade;

pub use portfolio::{CostTotals, LedgerError, Portfolio, Valuation};
pub use position::{Position, QTY_EPSILON};
pub use snapshot::DailySnapshot;
pub use trade::{IntentReason, RejectReason, Side, TradeRecord, TradeStatus};

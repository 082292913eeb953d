//! Daily simulation loop.
//!
//! For each trading day in range, in order:
//! 1. Build a history view that ends today and ask the policy for intents.
//! 2. Apply intents at today's close, sells first. Intents for an instrument
//!    without a quote today are logged as rejected; ledger refusals are
//!    logged by the ledger. Neither stops the run.
//! 3. Mark holdings to market, carrying stale prices forward, and record a
//!    snapshot.
//!
//! The cancel flag is checked before each day. A cancelled run returns the
//! days processed so far with status `Cancelled`.

use super::progress::RunControl;
use super::state::{EngineConfig, EngineError, EngineRun, RunStatus};
use crate::data::PriceHistory;
use crate::domain::{Portfolio, RejectReason, Side};
use crate::policy::{Policy, PolicyState, StrategyContext, TradeIntent};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Run a backtest with no cancellation or progress reporting.
pub fn run_backtest(
    history: &PriceHistory,
    universe: &[String],
    policy: &Policy,
    config: &EngineConfig,
) -> Result<EngineRun, EngineError> {
    run_backtest_with(history, universe, policy, config, &RunControl::new())
}

pub fn run_backtest_with(
    history: &PriceHistory,
    universe: &[String],
    policy: &Policy,
    config: &EngineConfig,
    control: &RunControl<'_>,
) -> Result<EngineRun, EngineError> {
    config.validate()?;

    let mut tradable: Vec<String> = Vec::with_capacity(universe.len());
    for id in universe {
        if tradable.contains(id) {
            continue;
        }
        if history.contains(id) {
            tradable.push(id.clone());
        } else {
            warn!(instrument = %id, "no price series, excluded from run");
        }
    }
    if tradable.is_empty() {
        return Err(EngineError::EmptyUniverse);
    }
    policy.validate(&tradable)?;

    let days = history.trading_days(&tradable, config.start, config.end);
    if days.is_empty() {
        return Err(EngineError::InvalidDateRange(format!(
            "no trading days between {} and {}",
            config.start, config.end
        )));
    }

    let mut status = RunStatus::Idle.transition(RunStatus::Running)?;
    info!(
        policy = policy.name(),
        instruments = tradable.len(),
        days = days.len(),
        start = %days[0],
        end = %days[days.len() - 1],
        "backtest started"
    );

    let total = days.len();
    control.start(total);

    let mut portfolio = Portfolio::new(config.initial_capital, config.cost);
    let mut state = PolicyState::default();
    let mut snapshots = Vec::with_capacity(total);
    let mut carried_forward: BTreeMap<String, usize> = BTreeMap::new();

    for (day_index, &date) in days.iter().enumerate() {
        if control.is_cancelled() {
            info!(day = day_index, total, "backtest cancelled");
            status = status.transition(RunStatus::Cancelled)?;
            break;
        }

        let view = history.view(date);
        let decision = {
            let ctx = StrategyContext {
                date,
                day_index,
                universe: &tradable,
                history: view,
                portfolio: &portfolio,
                sizing: config.sizing,
                state: &state,
            };
            policy.decide(&ctx)
        };
        state = decision.state;

        let mut intents = decision.intents;
        // Stable sort keeps each side in the policy's order.
        intents.sort_by_key(|i| i.side == Side::Buy);
        for intent in &intents {
            apply_intent(&mut portfolio, date, intent, view.quote(&intent.instrument));
        }

        let valuation = portfolio.mark_to_market(date, |id| view.quote(id));
        for id in valuation.carried_forward {
            debug!(instrument = %id, %date, "no quote, carrying last price forward");
            *carried_forward.entry(id).or_default() += 1;
        }
        debug_assert!(valuation.snapshot.cash >= 0.0, "cash went negative");

        control.day(day_index, total, &valuation.snapshot);
        snapshots.push(valuation.snapshot);
    }

    if status == RunStatus::Running {
        status = status.transition(RunStatus::Completed)?;
    }

    let final_positions = portfolio.positions().cloned().collect();
    let cost_totals = portfolio.cost_totals();
    let trades = portfolio.into_trades();
    let run = EngineRun {
        status,
        initial_capital: config.initial_capital,
        universe: tradable,
        trading_days: total,
        snapshots,
        trades,
        final_positions,
        cost_totals,
        carried_forward,
    };
    info!(
        status = ?run.status,
        days = run.snapshots.len(),
        trades = run.filled_trades().count(),
        rejected = run.rejected_count(),
        final_equity = run.final_equity(),
        "backtest finished"
    );
    Ok(run)
}

fn apply_intent(portfolio: &mut Portfolio, date: NaiveDate, intent: &TradeIntent, quote: Option<f64>) {
    let Some(price) = quote else {
        debug!(instrument = %intent.instrument, %date, side = %intent.side, "rejected: no quote");
        portfolio.reject(
            date,
            &intent.instrument,
            intent.side,
            0.0,
            intent.quantity,
            RejectReason::MissingPriceData,
        );
        portfolio.label_last_trade(intent.reason);
        return;
    };
    let result = match intent.side {
        Side::Buy => portfolio.buy(date, &intent.instrument, price, intent.quantity),
        Side::Sell => portfolio.sell(date, &intent.instrument, price, intent.quantity),
    };
    match result {
        Ok(fill) => debug!(
            instrument = %fill.instrument,
            %date,
            side = %fill.side,
            quantity = fill.quantity,
            price = fill.exec_price,
            reason = ?intent.reason,
            "filled"
        ),
        Err(e) => debug!(instrument = %intent.instrument, %date, error = %e, "rejected"),
    }
    portfolio.label_last_trade(intent.reason);
}

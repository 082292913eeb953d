//! End-to-end engine scenarios over small hand-built price histories.

use backlab_core::data::{PriceHistory, PriceRow};
use backlab_core::domain::{RejectReason, Side, TradeStatus};
use backlab_core::engine::{run_backtest, EngineConfig, EngineError, RunStatus};
use backlab_core::execution::CostConfig;
use backlab_core::policy::{
    CompositeParams, CustomWeightsParams, EqualWeightParams, Policy, RebalanceParams,
    TrailingStopParams, TrendFilterParams,
};
use chrono::NaiveDate;

fn day(i: usize) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i as i64)
}

fn rows(closes: &[f64]) -> Vec<PriceRow> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| PriceRow::new(day(i), c, c, 1_000))
        .collect()
}

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn config(days: usize, capital: f64) -> EngineConfig {
    EngineConfig::new(day(0), day(days - 1), capital)
}

#[test]
fn flat_prices_equal_weight_keeps_capital() {
    let h = PriceHistory::from_series([
        ("A", rows(&[100.0, 100.0, 100.0])),
        ("B", rows(&[50.0, 50.0, 50.0])),
    ])
    .unwrap();
    let run = run_backtest(&h, &ids(&["A", "B"]), &Policy::default(), &config(3, 1_000_000.0)).unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.final_equity(), 1_000_000.0);
    let fills: Vec<_> = run.filled_trades().collect();
    assert_eq!(fills.len(), 2);
    assert!(fills.iter().all(|t| t.date == day(0) && t.side == Side::Buy));
}

#[test]
fn zero_cost_buy_and_hold_matches_hand_valuation() {
    let h = PriceHistory::from_series([
        ("A", rows(&[37.0, 41.5, 39.25, 44.0])),
        ("B", rows(&[12.3, 11.9, 13.4, 12.8])),
        ("C", rows(&[250.0, 240.0, 260.0, 271.0])),
    ])
    .unwrap();
    let universe = ids(&["A", "B", "C"]);
    let run = run_backtest(
        &h,
        &universe,
        &Policy::EqualWeight(EqualWeightParams::default()),
        &config(4, 100_000.0),
    )
    .unwrap();

    let finals = [44.0, 12.8, 271.0];
    let mut spent = 0.0;
    let mut held_value = 0.0;
    for (id, final_price) in universe.iter().zip(finals) {
        let buy = run.filled_trades().find(|t| &t.instrument == id).unwrap();
        spent += buy.quantity * buy.price;
        held_value += buy.quantity * final_price;
    }
    let leftover = 100_000.0 - spent;
    let last = run.snapshots.last().unwrap();
    assert!((last.cash - leftover).abs() < 1e-9);
    assert!((run.final_equity() - (held_value + leftover)).abs() < 1e-9);
}

#[test]
fn every_snapshot_is_solvent_and_consistent() {
    let h = PriceHistory::from_series([
        ("A", rows(&[100.0, 104.0, 97.0, 110.0, 90.0, 95.0, 120.0, 118.0])),
        ("B", rows(&[20.0, 19.0, 21.0, 22.5, 23.0, 18.0, 17.5, 19.0])),
    ])
    .unwrap();
    let cfg = config(8, 50_000.0).with_cost(CostConfig::new(0.001, 0.00015, 0.0023));
    let policies = [
        Policy::EqualWeight(EqualWeightParams::default()),
        Policy::Rebalance(RebalanceParams { interval: 2 }),
        Policy::TrailingStop(TrailingStopParams::default()),
        Policy::TrendFilter(TrendFilterParams { window: 3, interval: 1 }),
        Policy::Composite(CompositeParams::default()),
    ];
    for policy in &policies {
        let run = run_backtest(&h, &ids(&["A", "B"]), policy, &cfg).unwrap();
        for s in &run.snapshots {
            assert!(s.cash >= 0.0, "{}: negative cash on {}", policy.name(), s.date);
            assert_eq!(s.equity, s.cash + s.position_value, "{}", policy.name());
        }
    }
}

#[test]
fn trend_filter_waits_for_full_window() {
    let closes: Vec<f64> = (0..10).map(|i| 100.0 + i as f64).collect();
    let h = PriceHistory::from_series([("A", rows(&closes))]).unwrap();
    let policy = Policy::TrendFilter(TrendFilterParams { window: 6, interval: 1 });
    let run = run_backtest(&h, &ids(&["A"]), &policy, &config(10, 10_000.0)).unwrap();

    let first = run.filled_trades().next().unwrap();
    assert_eq!(first.date, day(5));
    assert!(run.snapshots[..5].iter().all(|s| s.position_value == 0.0));
}

#[test]
fn window_longer_than_history_never_trades() {
    let h = PriceHistory::from_series([("A", rows(&[1.0, 2.0, 3.0, 4.0]))]).unwrap();
    let policy = Policy::TrendFilter(TrendFilterParams { window: 50, interval: 1 });
    let run = run_backtest(&h, &ids(&["A"]), &policy, &config(4, 10_000.0)).unwrap();
    assert!(run.trades.is_empty());
    assert_eq!(run.final_equity(), 10_000.0);
}

#[test]
fn trailing_stop_exits_then_reenters_on_recovery() {
    // Peak 120 on day 2, stop 10% -> exit at 100 on day 3. Cooldown 1 day,
    // recovery above 100 on day 6.
    let h = PriceHistory::from_series([("A", rows(&[100.0, 110.0, 120.0, 100.0, 98.0, 99.0, 105.0, 106.0]))]).unwrap();
    let policy = Policy::TrailingStop(TrailingStopParams {
        cooldown: 1,
        ..Default::default()
    });
    let run = run_backtest(&h, &ids(&["A"]), &policy, &config(8, 10_000.0)).unwrap();
    let fills: Vec<_> = run.filled_trades().collect();

    assert_eq!(fills[0].side, Side::Buy);
    assert_eq!(fills[0].date, day(0));
    assert_eq!(fills[1].side, Side::Sell);
    assert_eq!(fills[1].date, day(3));
    assert_eq!(fills[2].side, Side::Buy);
    assert_eq!(fills[2].date, day(6));
}

#[test]
fn halted_instrument_is_carried_forward_and_run_continues() {
    let mut b = rows(&[50.0, 50.0, 50.0, 50.0]);
    b.remove(2);
    let h = PriceHistory::from_series([("A", rows(&[100.0, 100.0, 200.0, 200.0])), ("B", b)]).unwrap();
    let policy = Policy::CustomWeights(CustomWeightsParams {
        weights: [("A".to_string(), 0.5), ("B".to_string(), 0.5)].into_iter().collect(),
        interval: 2,
    });
    let run = run_backtest(&h, &ids(&["A", "B"]), &policy, &config(4, 10_000.0)).unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.snapshots.len(), 4);
    assert_eq!(run.carried_forward.get("B"), Some(&1));
    // Day 2: A rebalanced down to 37 units at 200; B untouched, valued at 50.
    let halted = &run.snapshots[2];
    assert_eq!(halted.position_value, 37.0 * 200.0 + 100.0 * 50.0);
    assert_eq!(halted.equity, 15_000.0);
    assert!(run
        .filled_trades()
        .filter(|t| t.date == day(2))
        .all(|t| t.instrument == "A"));
}

#[test]
fn insufficient_funds_rejection_is_logged() {
    use backlab_core::domain::Portfolio;
    let mut p = Portfolio::new(1_000.0, CostConfig::frictionless());
    let before_cash = p.cash();
    assert!(p.buy(day(0), "A", 100.0, 11.0).is_err());
    assert_eq!(p.cash(), before_cash);
    assert!(p.positions().next().is_none());
    let entry = &p.trades()[0];
    assert_eq!(entry.status, TradeStatus::Rejected);
    assert_eq!(entry.reject_reason, Some(RejectReason::InsufficientFunds));
}

#[test]
fn identical_inputs_identical_runs() {
    let h = PriceHistory::from_series([
        ("A", rows(&[10.0, 11.0, 9.0, 12.0, 13.0, 11.0])),
        ("B", rows(&[5.0, 5.5, 5.2, 4.9, 5.1, 5.3])),
    ])
    .unwrap();
    let policy = Policy::Composite(CompositeParams::default());
    let cfg = config(6, 10_000.0).with_cost(CostConfig::new(0.001, 0.001, 0.002));
    let a = run_backtest(&h, &ids(&["A", "B"]), &policy, &cfg).unwrap();
    let b = run_backtest(&h, &ids(&["A", "B"]), &policy, &cfg).unwrap();
    assert_eq!(a.snapshots, b.snapshots);
    assert_eq!(a.trades, b.trades);
}

#[test]
fn invalid_policy_params_fail_before_trading() {
    let h = PriceHistory::from_series([("A", rows(&[1.0, 2.0]))]).unwrap();
    let policy = Policy::Rebalance(RebalanceParams { interval: 0 });
    assert!(matches!(
        run_backtest(&h, &ids(&["A"]), &policy, &config(2, 1_000.0)),
        Err(EngineError::InvalidConfig(_))
    ));
}

#[test]
fn single_day_run() {
    let h = PriceHistory::from_series([("A", rows(&[10.0]))]).unwrap();
    let run = run_backtest(&h, &ids(&["A"]), &Policy::default(), &config(1, 1_000.0)).unwrap();
    assert_eq!(run.snapshots.len(), 1);
    assert_eq!(run.final_equity(), 1_000.0);
}

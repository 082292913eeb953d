//! Integration tests for the runner: every strategy on synthetic CSV data.
//!
//! Prices are written once per test into a temp directory through
//! `CsvDirProvider`, so the whole path (CSV -> history -> engine -> metrics)
//! is exercised.

use std::sync::Arc;

use backlab_core::data::{synthetic_series, CsvDirProvider, InMemoryProvider, PriceRow, Universe};
use backlab_core::engine::{RunControl, RunStatus};
use backlab_core::execution::CostConfig;
use backlab_core::policy::{CompositeParams, Policy};
use backlab_runner::{
    load_for, run_backtest_from_data, run_batch, run_batch_on_data, run_single_backtest, summarize,
    BacktestResult, BatchOptions, RunConfig, RunEvent, RunHandle, RunOutcome,
};
use chrono::NaiveDate;
use proptest::prelude::*;

const IDS: [&str; 3] = ["AAA", "BBB", "CCC"];

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn write_prices(dir: &std::path::Path) -> CsvDirProvider {
    let provider = CsvDirProvider::new(dir);
    for id in IDS {
        provider
            .write_series(id, &synthetic_series(id, date(2023, 1, 2), date(2023, 6, 30)))
            .unwrap();
    }
    provider
}

fn base_toml(strategy: &str) -> String {
    format!(
        r#"
[run]
start_date = "2023-03-01"
end_date = "2023-06-30"
initial_capital = 10000000.0
warmup_days = 45
instruments = ["AAA", "BBB", "CCC"]

[cost]
slippage_rate = 0.001
commission_rate = 0.00015
tax_rate = 0.0018

[strategy]
{strategy}
"#
    )
}

fn strategy_tables() -> Vec<(&'static str, String)> {
    vec![
        ("equal_weight", base_toml(r#"type = "equal_weight""#)),
        ("rebalance", base_toml("type = \"rebalance\"\ninterval = 10")),
        (
            "custom_weights",
            base_toml("type = \"custom_weights\"\ninterval = 10\nweights = { AAA = 0.5, BBB = 0.3, CCC = 0.2 }"),
        ),
        (
            "trailing_stop",
            base_toml(
                "type = \"trailing_stop\"\nlookback = 20\ncooldown = 3\nstop = { mode = \"volatility\", multiplier = 2.0, min_pct = 0.03, max_pct = 0.10 }",
            ),
        ),
        ("trend_filter", base_toml("type = \"trend_filter\"\nwindow = 20\ninterval = 5")),
    ]
}

fn assert_ledger_consistent(result: &BacktestResult) {
    for s in &result.snapshots {
        assert!(s.cash >= -1e-6, "negative cash on {}: {}", s.date, s.cash);
        assert!(s.position_value >= 0.0);
        assert!((s.equity - (s.cash + s.position_value)).abs() < 1e-6);
    }
    for pair in result.snapshots.windows(2) {
        assert!(pair[0].date < pair[1].date);
    }
}

#[test]
fn every_strategy_runs_end_to_end_from_csv() {
    let dir = tempfile::tempdir().unwrap();
    let provider = write_prices(dir.path());

    for (name, toml) in strategy_tables() {
        let config = RunConfig::from_toml(&toml).unwrap_or_else(|e| panic!("{name}: {e}"));
        let result = run_single_backtest(&config, None, &provider).unwrap_or_else(|e| panic!("{name}: {e}"));

        assert!(result.is_complete(), "{name} did not complete");
        assert_eq!(result.snapshots.len(), result.metadata.trading_days, "{name}");
        assert_eq!(result.snapshots[0].date, date(2023, 3, 1), "{name}");
        assert_eq!(result.metadata.instruments.len(), 3, "{name}");
        assert!(result.metrics.filled_trades > 0, "{name} never traded");
        assert!(result.cost_summary.total > 0.0, "{name} paid no costs");
        assert_ledger_consistent(&result);
    }
}

#[test]
fn composite_runs_with_default_members() {
    let dir = tempfile::tempdir().unwrap();
    let provider = write_prices(dir.path());
    let config = RunConfig::new(date(2023, 3, 1), date(2023, 6, 30), 10_000_000.0)
        .with_instruments(IDS)
        .with_strategy(Policy::Composite(CompositeParams::default()));

    let result = run_single_backtest(&config, None, &provider).unwrap();
    assert!(result.is_complete());
    assert_ledger_consistent(&result);
}

#[test]
fn repeated_runs_are_identical() {
    let dir = tempfile::tempdir().unwrap();
    let provider = write_prices(dir.path());
    let (_, toml) = &strategy_tables()[3];
    let config = RunConfig::from_toml(toml).unwrap();

    let a = run_single_backtest(&config, None, &provider).unwrap();
    let b = run_single_backtest(&config, None, &provider).unwrap();
    assert_eq!(a.metadata, b.metadata);
    assert_eq!(a.snapshots, b.snapshots);
    assert_eq!(a.trades, b.trades);
    assert_eq!(a.metrics, b.metrics);
}

#[test]
fn missing_instrument_is_dropped_and_reported() {
    let dir = tempfile::tempdir().unwrap();
    let provider = write_prices(dir.path());
    let config = RunConfig::new(date(2023, 3, 1), date(2023, 3, 31), 1_000_000.0)
        .with_instruments(["AAA", "NOPE"]);

    let result = run_single_backtest(&config, None, &provider).unwrap();
    assert_eq!(result.metadata.instruments, vec!["AAA"]);
    assert_eq!(result.metadata.dropped, vec!["NOPE"]);
}

#[test]
fn benchmark_is_compared_when_configured() {
    let dir = tempfile::tempdir().unwrap();
    let provider = write_prices(dir.path());
    let universe = Universe::from_ids(["AAA", "BBB"]).with_benchmark("CCC");
    let config = RunConfig::new(date(2023, 3, 1), date(2023, 6, 30), 1_000_000.0);

    let result = run_single_backtest(&config, Some(&universe), &provider).unwrap();
    let bench = result.benchmark.as_ref().expect("benchmark comparison");
    assert_eq!(bench.instrument, "CCC");
    assert_eq!(bench.curve.len(), result.snapshots.len());
    assert!((bench.excess_return - (result.metrics.total_return - bench.total_return)).abs() < 1e-12);
    assert_eq!(result.metadata.instruments, vec!["AAA", "BBB"]);
}

#[test]
fn handle_reports_progress_and_completes() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(write_prices(dir.path()));
    let config = RunConfig::from_toml(&strategy_tables()[1].1).unwrap();

    let handle = RunHandle::spawn_with_provider(config.clone(), None, provider.clone()).unwrap();
    assert_eq!(handle.run_id(), config.run_id());

    let events: Vec<RunEvent> = handle.events().iter().collect();
    let outcome = handle.wait();
    assert_eq!(outcome.status(), RunStatus::Completed);
    let result = outcome.result().unwrap();

    assert!(matches!(events.first(), Some(RunEvent::Started { .. })));
    assert_eq!(
        events.last(),
        Some(&RunEvent::Finished {
            status: RunStatus::Completed
        })
    );
    let days = events.iter().filter(|e| matches!(e, RunEvent::Day { .. })).count();
    assert_eq!(days, result.snapshots.len());

    let direct = run_single_backtest(&config, None, provider.as_ref()).unwrap();
    assert_eq!(direct.snapshots, result.snapshots);
}

#[test]
fn cancelled_handle_keeps_a_prefix_of_the_full_run() {
    let dir = tempfile::tempdir().unwrap();
    let provider = write_prices(dir.path());
    let config = RunConfig::from_toml(&strategy_tables()[0].1).unwrap();
    let data = Arc::new(load_for(&config, None, &provider).unwrap());
    let full = run_backtest_from_data(&config, &data, &RunControl::new()).unwrap();

    let handle = RunHandle::spawn(config, Arc::clone(&data)).unwrap();
    for event in handle.events().iter() {
        if matches!(event, RunEvent::Day { .. } | RunEvent::Finished { .. }) {
            break;
        }
    }
    handle.cancel();

    let outcome = handle.wait();
    let status = outcome.status();
    assert!(matches!(status, RunStatus::Cancelled | RunStatus::Completed));
    let partial = outcome.result().unwrap();
    assert!(!partial.snapshots.is_empty());
    assert_eq!(partial.snapshots[..], full.snapshots[..partial.snapshots.len()]);
    if status == RunStatus::Cancelled {
        assert!(partial.snapshots.len() <= full.snapshots.len());
        assert_eq!(partial.metadata.trading_days, full.metadata.trading_days);
    }
}

#[test]
fn failed_load_surfaces_through_handle() {
    let provider = Arc::new(InMemoryProvider::new());
    let config = RunConfig::new(date(2023, 3, 1), date(2023, 3, 31), 1_000.0).with_instruments(["AAA"]);
    let handle = RunHandle::spawn_with_provider(config, None, provider).unwrap();
    let outcome = handle.wait();
    assert!(matches!(outcome, RunOutcome::Failed(_)));
    assert_eq!(outcome.status(), RunStatus::Failed);
}

#[test]
fn batch_matches_individual_runs() {
    let dir = tempfile::tempdir().unwrap();
    let provider = write_prices(dir.path());
    let configs: Vec<RunConfig> = strategy_tables()
        .iter()
        .map(|(_, toml)| RunConfig::from_toml(toml).unwrap())
        .collect();

    let items = run_batch(&configs, None, &provider, BatchOptions { threads: Some(2) });
    assert_eq!(items.len(), configs.len());
    for (item, config) in items.iter().zip(&configs) {
        assert_eq!(item.run_id, config.run_id());
        let single = run_single_backtest(config, None, &provider).unwrap();
        let batched = item.outcome.as_ref().unwrap();
        assert_eq!(batched.snapshots, single.snapshots);
    }

    let rows = summarize(&items);
    assert_eq!(rows.len(), configs.len());
    for pair in rows.windows(2) {
        assert!(pair[0].total_return >= pair[1].total_return);
    }
}

#[test]
fn batch_on_shared_data_keeps_failures_separate() {
    let dir = tempfile::tempdir().unwrap();
    let provider = write_prices(dir.path());
    let good = RunConfig::from_toml(&strategy_tables()[0].1).unwrap();
    let data = load_for(&good, None, &provider).unwrap();

    let mut bad = good.clone();
    bad.run.initial_capital = -1.0;

    let items = run_batch_on_data(&[good, bad], &data, BatchOptions::default());
    assert!(items[0].outcome.is_ok());
    assert!(items[1].outcome.is_err());
    assert_eq!(summarize(&items).len(), 1);
}

fn flat_provider(days: usize) -> InMemoryProvider {
    let start = date(2024, 1, 1);
    let rows = |base: f64, step: f64| -> Vec<PriceRow> {
        (0..days)
            .map(|i| {
                let close = base + step * i as f64;
                PriceRow::new(start + chrono::Duration::days(i as i64), close, close, 1_000)
            })
            .collect()
    };
    InMemoryProvider::new()
        .with_series("AAA", rows(100.0, 1.0))
        .with_series("BBB", rows(50.0, -0.5))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn ledger_holds_for_any_costs(
        capital in 1_000.0f64..1_000_000.0,
        slippage in 0.0f64..0.01,
        commission in 0.0f64..0.01,
        tax in 0.0f64..0.01,
        interval in 1usize..6,
    ) {
        let config = RunConfig::new(date(2024, 1, 1), date(2024, 1, 20), capital)
            .with_instruments(["AAA", "BBB"])
            .with_cost(CostConfig::new(slippage, commission, tax))
            .with_strategy(Policy::Rebalance(backlab_core::policy::RebalanceParams { interval }));
        let result = run_single_backtest(&config, None, &flat_provider(20)).unwrap();

        prop_assert_eq!(result.snapshots.len(), 20);
        for s in &result.snapshots {
            prop_assert!(s.cash >= -1e-6);
            prop_assert!((s.equity - (s.cash + s.position_value)).abs() < 1e-6);
        }
        prop_assert!(result.metrics.final_equity <= capital * 1.25);
    }
}

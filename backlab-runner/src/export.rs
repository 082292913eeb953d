//! Export: JSON, CSV and Markdown artifacts for a `BacktestResult`.
//!
//! - **JSON**: full round-trip serialization with schema versioning
//! - **CSV**: daily snapshots, the trade log, and a per-day per-instrument
//!   detail table
//! - **Markdown**: human-readable single-run report
//!
//! Every persisted result carries `schema_version`. Newer versions are
//! rejected on load.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use backlab_core::data::{PriceHistory, Universe};
use backlab_core::domain::{DailySnapshot, Side, TradeRecord, QTY_EPSILON};
use chrono::NaiveDate;
use serde::Serialize;

use crate::result::{BacktestResult, SCHEMA_VERSION};

// ─── JSON export ────────────────────────────────────────────────────

pub fn export_json(result: &BacktestResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize BacktestResult to JSON")
}

/// Deserialize a `BacktestResult`, rejecting schema versions newer than ours.
pub fn import_json(json: &str) -> Result<BacktestResult> {
    let result: BacktestResult =
        serde_json::from_str(json).context("failed to deserialize BacktestResult from JSON")?;
    if result.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            result.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(result)
}

// ─── CSV export ─────────────────────────────────────────────────────

pub const SNAPSHOT_CSV_HEADER: [&str; 5] = ["date", "cash", "position_value", "equity", "daily_return"];

/// One row per snapshot. `daily_return` is 0 on the first day.
///
/// Money columns are rounded to cents and `equity` is the sum of the rounded
/// `cash` and `position_value`, so every row adds up as written.
pub fn export_snapshots_csv(snapshots: &[DailySnapshot]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(SNAPSHOT_CSV_HEADER)?;

    let mut prev: Option<f64> = None;
    for s in snapshots {
        let daily = match prev {
            Some(p) if p > 0.0 => s.equity / p - 1.0,
            _ => 0.0,
        };
        prev = Some(s.equity);
        let cash = cents(s.cash);
        let position_value = cents(s.position_value);
        wtr.write_record([
            s.date.to_string(),
            format!("{:.2}", cash as f64 / 100.0),
            format!("{:.2}", position_value as f64 / 100.0),
            format!("{:.2}", (cash + position_value) as f64 / 100.0),
            format!("{:.6}", daily),
        ])?;
    }
    finish(wtr)
}

fn cents(x: f64) -> i64 {
    (x * 100.0).round() as i64
}

/// Trade log, filled and rejected entries alike.
pub fn export_trades_csv(trades: &[TradeRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "date",
        "instrument",
        "side",
        "quantity",
        "price",
        "exec_price",
        "slippage",
        "commission",
        "tax",
        "total_cost",
        "realized_pnl",
        "status",
        "reject_reason",
        "reason",
    ])?;

    for t in trades {
        wtr.write_record([
            t.date.to_string(),
            t.instrument.clone(),
            t.side.to_string(),
            format!("{:.6}", t.quantity),
            format!("{:.4}", t.price),
            format!("{:.4}", t.exec_price),
            format!("{:.2}", t.slippage),
            format!("{:.2}", t.commission),
            format!("{:.2}", t.tax),
            format!("{:.2}", t.cost),
            t.realized_pnl.map(|p| format!("{p:.2}")).unwrap_or_default(),
            if t.is_filled() { "filled" } else { "rejected" }.to_string(),
            t.reject_reason.map(|r| r.to_string()).unwrap_or_default(),
            t.reason.map(|r| r.to_string()).unwrap_or_default(),
        ])?;
    }
    finish(wtr)
}

/// What happened to one instrument on one day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyDetailRow {
    pub date: NaiveDate,
    pub instrument: String,
    pub name: String,
    pub open: f64,
    pub close: f64,
    pub volume: u64,
    /// `BUY`, `SELL`, `BUY+SELL` or `HOLD`.
    pub action: String,
    pub quantity_traded: f64,
    /// Execution price of the day's last fill, 0 when nothing traded.
    pub exec_price: f64,
    pub trade_cost: f64,
    pub holding_quantity: f64,
    pub holding_value: f64,
    pub portfolio_equity: f64,
    pub portfolio_cash: f64,
}

/// Rebuild per-day holdings from the trade log and emit a row for every
/// instrument that traded or was held on a day it had a quote.
pub fn daily_detail(result: &BacktestResult, history: &PriceHistory, universe: &Universe) -> Vec<DailyDetailRow> {
    let mut fills: BTreeMap<(NaiveDate, &str), Vec<&TradeRecord>> = BTreeMap::new();
    for t in result.trades.iter().filter(|t| t.is_filled()) {
        fills.entry((t.date, t.instrument.as_str())).or_default().push(t);
    }

    let mut holdings: BTreeMap<&str, f64> = BTreeMap::new();
    let mut rows = Vec::new();

    for snap in &result.snapshots {
        for id in &result.metadata.instruments {
            let todays = fills.get(&(snap.date, id.as_str()));
            let (mut bought, mut sold) = (false, false);
            let (mut traded, mut cost, mut exec_price) = (0.0, 0.0, 0.0);
            for t in todays.into_iter().flatten() {
                let held = holdings.entry(id.as_str()).or_insert(0.0);
                match t.side {
                    Side::Buy => {
                        bought = true;
                        *held += t.quantity;
                    }
                    Side::Sell => {
                        sold = true;
                        *held -= t.quantity;
                    }
                }
                traded += t.quantity;
                cost += t.cost;
                exec_price = t.exec_price;
            }
            let held = holdings.get(id.as_str()).copied().unwrap_or(0.0);
            if held <= QTY_EPSILON {
                holdings.remove(id.as_str());
            }

            let Some(row) = history.row_on(id, snap.date) else {
                continue;
            };
            let action = match (bought, sold) {
                (true, true) => "BUY+SELL",
                (true, false) => "BUY",
                (false, true) => "SELL",
                (false, false) if held > QTY_EPSILON => "HOLD",
                (false, false) => continue,
            };
            let held = if held > QTY_EPSILON { held } else { 0.0 };

            rows.push(DailyDetailRow {
                date: snap.date,
                instrument: id.clone(),
                name: universe.label(id),
                open: row.open,
                close: row.close,
                volume: row.volume,
                action: action.to_string(),
                quantity_traded: traded,
                exec_price,
                trade_cost: cost,
                holding_quantity: held,
                holding_value: held * row.close,
                portfolio_equity: snap.equity,
                portfolio_cash: snap.cash,
            });
        }
    }
    rows
}

pub fn export_daily_detail_csv(rows: &[DailyDetailRow]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    for row in rows {
        wtr.serialize(row)?;
    }
    finish(wtr)
}

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String> {
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the artifact set for one run under `output_dir/{label}_{run_id[..8]}/`:
/// - `result.json`: the full `BacktestResult`
/// - `equity.csv`: daily snapshots
/// - `trades.csv`: the trade log
///
/// Returns the run directory.
pub fn save_artifacts(result: &BacktestResult, output_dir: &Path) -> Result<PathBuf> {
    let short_id: String = result.metadata.run_id.chars().take(8).collect();
    let run_dir = output_dir.join(format!("{}_{}", sanitize(&result.metadata.label), short_id));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    write(&run_dir.join("result.json"), &export_json(result)?)?;
    write(&run_dir.join("equity.csv"), &export_snapshots_csv(&result.snapshots)?)?;
    write(&run_dir.join("trades.csv"), &export_trades_csv(&result.trades)?)?;
    Ok(run_dir)
}

/// Write `daily_detail.csv` next to the other artifacts.
pub fn save_daily_detail(
    result: &BacktestResult,
    history: &PriceHistory,
    universe: &Universe,
    run_dir: &Path,
) -> Result<PathBuf> {
    let path = run_dir.join("daily_detail.csv");
    let rows = daily_detail(result, history, universe);
    write(&path, &export_daily_detail_csv(&rows)?)?;
    Ok(path)
}

pub fn load_artifacts(dir: &Path) -> Result<BacktestResult> {
    let path = dir.join("result.json");
    let json = std::fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
    import_json(&json)
}

fn write(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))
}

fn sanitize(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

// ─── Markdown report ────────────────────────────────────────────────

pub fn generate_report(result: &BacktestResult) -> String {
    let mut md = String::with_capacity(2048);
    let meta = &result.metadata;
    let m = &result.metrics;

    md.push_str("# Backtest Report\n\n");

    md.push_str("## Metadata\n\n");
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Label | {} |\n", meta.label));
    md.push_str(&format!("| Strategy | {} |\n", meta.strategy));
    md.push_str(&format!("| Status | {:?} |\n", meta.status));
    md.push_str(&format!("| Period | {} to {} |\n", meta.start_date, meta.end_date));
    md.push_str(&format!("| Initial Capital | {:.0} |\n", meta.initial_capital));
    md.push_str(&format!(
        "| Days | {} of {} |\n",
        result.snapshots.len(),
        meta.trading_days
    ));
    md.push_str(&format!("| Instruments | {} |\n", meta.instruments.join(", ")));
    if !meta.dropped.is_empty() {
        md.push_str(&format!("| Dropped | {} |\n", meta.dropped.join(", ")));
    }
    md.push_str(&format!("| Run Id | {} |\n", meta.run_id));
    md.push_str(&format!("| Dataset Hash | {} |\n", meta.dataset_hash));
    md.push('\n');

    md.push_str("## Performance Summary\n\n");
    md.push_str("| Metric | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Final Equity | {:.0} |\n", m.final_equity));
    md.push_str(&format!("| Profit/Loss | {:.0} |\n", m.profit_loss));
    md.push_str(&format!("| Total Return | {:.2}% |\n", m.total_return * 100.0));
    md.push_str(&format!("| Annualized Return | {:.2}% |\n", m.annualized_return * 100.0));
    md.push_str(&format!("| Volatility | {:.2}% |\n", m.volatility * 100.0));
    md.push_str(&format!("| Max Drawdown | {:.2}% |\n", m.max_drawdown * 100.0));
    if let (Some(peak), Some(trough)) = (m.max_drawdown_peak, m.max_drawdown_trough) {
        md.push_str(&format!("| Drawdown Period | {peak} to {trough} |\n"));
    }
    md.push_str(&format!("| Sharpe | {:.2} |\n", m.sharpe));
    md.push_str(&format!("| Win Rate | {:.1}% |\n", m.win_rate * 100.0));
    md.push_str(&format!(
        "| Trades | {} filled, {} rejected |\n",
        m.filled_trades, m.rejected_trades
    ));
    md.push('\n');

    let c = &result.cost_summary;
    md.push_str("## Costs\n\n");
    md.push_str("| Slippage | Commission | Tax | Total | % of Capital |\n");
    md.push_str("| ---: | ---: | ---: | ---: | ---: |\n");
    md.push_str(&format!(
        "| {:.0} | {:.0} | {:.0} | {:.0} | {:.3}% |\n\n",
        c.slippage,
        c.commission,
        c.tax,
        c.total,
        c.cost_ratio * 100.0
    ));

    if let Some(b) = &result.benchmark {
        md.push_str("## Benchmark\n\n");
        md.push_str(&format!(
            "{}: return {:.2}%, max drawdown {:.2}%, excess return {:.2}%\n\n",
            b.instrument,
            b.total_return * 100.0,
            b.max_drawdown * 100.0,
            b.excess_return * 100.0
        ));
    }

    if !result.instrument_performance.is_empty() {
        md.push_str("## Instruments\n\n");
        md.push_str("| Instrument | Name | Return | Max DD | Trades | Realized P&L |\n");
        md.push_str("| --- | --- | ---: | ---: | ---: | ---: |\n");
        for p in &result.instrument_performance {
            md.push_str(&format!(
                "| {} | {} | {:.2}% | {:.2}% | {} | {:.0} |\n",
                p.instrument,
                p.name,
                p.total_return * 100.0,
                p.max_drawdown * 100.0,
                p.filled_trades,
                p.realized_pnl
            ));
        }
        md.push('\n');
    }

    if !result.carried_forward.is_empty() {
        md.push_str("## Data Quality\n\n");
        for (id, days) in &result.carried_forward {
            md.push_str(&format!("- {id}: valued at a stale price on {days} day(s)\n"));
        }
        md.push('\n');
    }

    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::runner::{load_for, run_backtest_from_data};
    use backlab_core::data::{InMemoryProvider, PriceRow};
    use backlab_core::engine::RunControl;

    fn d(i: usize) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i as i64)
    }

    fn provider() -> InMemoryProvider {
        let rows = |base: f64| -> Vec<PriceRow> {
            (0..5)
                .map(|i| PriceRow::new(d(i), base, base + i as f64, 100))
                .collect()
        };
        InMemoryProvider::new()
            .with_series("A", rows(10.0))
            .with_series("B", rows(20.0))
    }

    fn config() -> RunConfig {
        RunConfig::new(d(0), d(4), 1_000.0).with_instruments(["A", "B"])
    }

    fn run() -> (BacktestResult, crate::data_loader::LoadedData) {
        let cfg = config();
        let loaded = load_for(&cfg, None, &provider()).unwrap();
        let result = run_backtest_from_data(&cfg, &loaded, &RunControl::new()).unwrap();
        (result, loaded)
    }

    #[test]
    fn json_round_trip() {
        let (result, _) = run();
        let json = export_json(&result).unwrap();
        let back = import_json(&json).unwrap();
        assert_eq!(back.metadata.run_id, result.metadata.run_id);
        assert_eq!(back.snapshots.len(), result.snapshots.len());
        assert_eq!(back.trades.len(), result.trades.len());
        assert_eq!(back.trades[0].reason, result.trades[0].reason);
        for t in &back.trades {
            assert!((t.cost - (t.slippage + t.commission + t.tax)).abs() < 1e-9);
        }
        assert!((back.metrics.final_equity - result.metrics.final_equity).abs() < 1e-9);
        assert_eq!(back.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn exported_trades_carry_documented_keys() {
        let cfg = config().with_cost(backlab_core::execution::CostConfig::new(0.001, 0.00015, 0.0023));
        let loaded = load_for(&cfg, None, &provider()).unwrap();
        let result = run_backtest_from_data(&cfg, &loaded, &RunControl::new()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&export_json(&result).unwrap()).unwrap();

        let snap = value["snapshots"][0].as_object().unwrap();
        for key in ["date", "cash", "position_value", "equity"] {
            assert!(snap.contains_key(key), "snapshot missing {key}");
        }
        let trades = value["trades"].as_array().unwrap();
        assert!(!trades.is_empty());
        for (json, rec) in trades.iter().zip(&result.trades) {
            let obj = json.as_object().unwrap();
            for key in ["date", "instrument", "side", "quantity", "price", "cost", "status"] {
                assert!(obj.contains_key(key), "trade missing {key}");
            }
            let cost = obj["cost"].as_f64().unwrap();
            assert!(cost > 0.0);
            assert!((cost - (rec.slippage + rec.commission + rec.tax)).abs() < 1e-9);
        }
        for key in ["total_return", "max_drawdown", "volatility", "annualized_return"] {
            assert!(value["metrics"].get(key).is_some(), "metrics missing {key}");
        }
    }

    #[test]
    fn newer_schema_version_is_rejected() {
        let (result, _) = run();
        let mut value: serde_json::Value = serde_json::from_str(&export_json(&result).unwrap()).unwrap();
        value["schema_version"] = serde_json::json!(SCHEMA_VERSION + 1);
        let err = import_json(&value.to_string()).unwrap_err();
        assert!(err.to_string().contains("unsupported schema version"));
    }

    #[test]
    fn snapshot_csv_has_fixed_header_and_one_row_per_day() {
        let (result, _) = run();
        let csv = export_snapshots_csv(&result.snapshots).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("date,cash,position_value,equity,daily_return"));
        let rows: Vec<&str> = lines.collect();
        assert_eq!(rows.len(), 5);
        assert!(rows[0].starts_with("2024-01-01,"));
        assert!(rows[0].ends_with(",0.000000"));
    }

    #[test]
    fn snapshot_csv_rows_add_up_to_the_cent() {
        let snaps = vec![
            DailySnapshot::new(d(0), 0.004, 0.004),
            DailySnapshot::new(d(1), 100.005, 250.125),
            DailySnapshot::new(d(2), 1_234.565, 0.0),
        ];
        let csv = export_snapshots_csv(&snaps).unwrap();
        for line in csv.lines().skip(1) {
            let cols: Vec<&str> = line.split(',').collect();
            let cents = |s: &str| (s.parse::<f64>().unwrap() * 100.0).round() as i64;
            assert_eq!(cents(cols[1]) + cents(cols[2]), cents(cols[3]), "row {line}");
        }
        assert!(csv.lines().nth(1).unwrap().starts_with("2024-01-01,0.00,0.00,0.00,"));
    }

    #[test]
    fn trades_csv_lists_every_trade() {
        let (result, _) = run();
        let csv = export_trades_csv(&result.trades).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert!(lines[0].starts_with("date,instrument,side,quantity"));
        assert_eq!(lines.len(), result.trades.len() + 1);
        assert!(lines[1].contains(",filled,"));
        assert!(lines[1].ends_with(",allocate"));
    }

    #[test]
    fn daily_detail_marks_buy_then_hold() {
        let (result, loaded) = run();
        let rows = daily_detail(&result, &loaded.history, &loaded.universe);
        assert_eq!(rows.len(), 10);

        let first: Vec<&DailyDetailRow> = rows.iter().filter(|r| r.date == d(0)).collect();
        assert!(first.iter().all(|r| r.action == "BUY"));
        let a0 = first.iter().find(|r| r.instrument == "A").unwrap();
        assert_eq!(a0.holding_quantity, 50.0);
        assert_eq!(a0.quantity_traded, 50.0);

        let a4 = rows.iter().find(|r| r.date == d(4) && r.instrument == "A").unwrap();
        assert_eq!(a4.action, "HOLD");
        assert_eq!(a4.quantity_traded, 0.0);
        assert_eq!(a4.holding_value, 50.0 * 14.0);
    }

    #[test]
    fn daily_detail_csv_has_header_from_fields() {
        let (result, loaded) = run();
        let rows = daily_detail(&result, &loaded.history, &loaded.universe);
        let csv = export_daily_detail_csv(&rows).unwrap();
        assert!(csv.starts_with("date,instrument,name,open,close,volume,action,"));
    }

    #[test]
    fn artifacts_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let (result, loaded) = run();
        let run_dir = save_artifacts(&result, dir.path()).unwrap();
        assert!(run_dir.join("result.json").exists());
        assert!(run_dir.join("equity.csv").exists());
        assert!(run_dir.join("trades.csv").exists());

        let name = run_dir.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.ends_with(&result.metadata.run_id[..8]));

        let detail = save_daily_detail(&result, &loaded.history, &loaded.universe, &run_dir).unwrap();
        assert!(detail.exists());

        let back = load_artifacts(&run_dir).unwrap();
        assert_eq!(back.metadata, result.metadata);
        assert_eq!(back.metrics.filled_trades, result.metrics.filled_trades);
    }

    #[test]
    fn sanitize_replaces_path_characters() {
        assert_eq!(sanitize("equal weight/A,B"), "equal_weight_A_B");
    }

    #[test]
    fn report_has_core_sections() {
        let (result, _) = run();
        let md = generate_report(&result);
        assert!(md.starts_with("# Backtest Report"));
        assert!(md.contains("## Performance Summary"));
        assert!(md.contains("## Costs"));
        assert!(md.contains("## Instruments"));
        assert!(!md.contains("## Benchmark"));
    }
}

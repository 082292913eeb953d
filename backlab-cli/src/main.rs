//! BackLab CLI: run, batch and synthetic-data commands.
//!
//! Commands:
//! - `run`: execute one backtest from a TOML config against a CSV price directory
//! - `batch`: execute several configs in parallel and print a ranking
//! - `synthetic`: write deterministic random-walk CSV series for demos
//!
//! Logging goes through `tracing`; set `RUST_LOG` to override the `info` default.

use anyhow::{anyhow, bail, Context, Result};
use backlab_core::data::{synthetic_series_with, CsvDirProvider, SyntheticSpec, Universe};
use backlab_runner::{
    generate_report, load_for, run_batch_on_data, save_artifacts, save_daily_detail, summarize,
    BacktestResult, BatchOptions, RunConfig, RunEvent, RunHandle, RunOutcome,
};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "backlab", about = "BackLab: daily-bar portfolio backtesting")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a backtest from a TOML config file.
    Run {
        /// Path to the run config (TOML).
        #[arg(long)]
        config: PathBuf,

        /// Universe file (TOML). Overrides `run.instruments`.
        #[arg(long)]
        universe: Option<PathBuf>,

        /// Directory holding one `<instrument>.csv` per instrument.
        #[arg(long, default_value = "data")]
        data: PathBuf,

        /// Output directory for artifacts.
        #[arg(long, default_value = "results")]
        output: PathBuf,

        /// Also write the per-day per-instrument detail CSV.
        #[arg(long, default_value_t = false)]
        detail: bool,
    },
    /// Execute several configs over the same price data.
    Batch {
        /// Run config files (TOML).
        #[arg(required = true)]
        configs: Vec<PathBuf>,

        /// Universe file (TOML). Overrides each config's instruments.
        #[arg(long)]
        universe: Option<PathBuf>,

        #[arg(long, default_value = "data")]
        data: PathBuf,

        #[arg(long, default_value = "results")]
        output: PathBuf,

        /// Worker threads. Defaults to one per core.
        #[arg(long)]
        threads: Option<usize>,
    },
    /// Write synthetic price CSVs.
    Synthetic {
        /// Instrument ids to generate.
        #[arg(required = true)]
        instruments: Vec<String>,

        /// Start date (YYYY-MM-DD).
        #[arg(long)]
        start: String,

        /// End date (YYYY-MM-DD).
        #[arg(long)]
        end: String,

        #[arg(long, default_value = "data")]
        out: PathBuf,

        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            universe,
            data,
            output,
            detail,
        } => run_cmd(&config, universe.as_deref(), &data, &output, detail),
        Commands::Batch {
            configs,
            universe,
            data,
            output,
            threads,
        } => batch_cmd(&configs, universe.as_deref(), &data, &output, threads),
        Commands::Synthetic {
            instruments,
            start,
            end,
            out,
            seed,
        } => synthetic_cmd(&instruments, &start, &end, &out, seed),
    }
}

fn load_universe(path: Option<&Path>) -> Result<Option<Universe>> {
    path.map(|p| Universe::from_file(p).map_err(|e| anyhow!("{}: {e}", p.display())))
        .transpose()
}

fn run_cmd(config_path: &Path, universe: Option<&Path>, data: &Path, output: &Path, detail: bool) -> Result<()> {
    let config = RunConfig::from_file(config_path)?;
    let universe = load_universe(universe)?;
    let provider = CsvDirProvider::new(data);

    let loaded = Arc::new(load_for(&config, universe.as_ref(), &provider)?);
    let handle = RunHandle::spawn(config, Arc::clone(&loaded)).context("failed to start run worker")?;
    info!(run_id = %handle.run_id(), "run started");

    for event in handle.events().iter() {
        match event {
            RunEvent::Started { total_days } => info!(total_days, "simulating"),
            RunEvent::Day {
                day_index,
                total_days,
                date,
                equity,
            } if (day_index + 1) % 50 == 0 || day_index + 1 == total_days => {
                info!(day = day_index + 1, total_days, %date, equity, "progress");
            }
            RunEvent::Day { .. } => {}
            RunEvent::Finished { .. } => break,
        }
    }

    let result = match handle.wait() {
        RunOutcome::Completed(result) => result,
        RunOutcome::Cancelled(result) => {
            warn!("run was cancelled, saving partial result");
            result
        }
        RunOutcome::Failed(e) => return Err(e.into()),
    };

    print_summary(&result);

    let run_dir = save_artifacts(&result, output)?;
    std::fs::write(run_dir.join("report.md"), generate_report(&result))
        .with_context(|| format!("failed to write report in {}", run_dir.display()))?;
    if detail {
        save_daily_detail(&result, &loaded.history, &loaded.universe, &run_dir)?;
    }
    println!("Artifacts saved to: {}", run_dir.display());
    Ok(())
}

fn batch_cmd(
    config_paths: &[PathBuf],
    universe: Option<&Path>,
    data: &Path,
    output: &Path,
    threads: Option<usize>,
) -> Result<()> {
    let configs = config_paths
        .iter()
        .map(|p| RunConfig::from_file(p).with_context(|| format!("loading {}", p.display())))
        .collect::<Result<Vec<_>>>()?;
    let universe = load_universe(universe)?;
    let provider = CsvDirProvider::new(data);

    // One load covering every config's date range. The universe is shared:
    // --universe, else the first config's instruments.
    let start = configs
        .iter()
        .map(RunConfig::history_start)
        .min()
        .ok_or_else(|| anyhow!("no configs given"))?;
    let end = configs
        .iter()
        .map(|c| c.run.end_date)
        .max()
        .ok_or_else(|| anyhow!("no configs given"))?;
    let mut span = configs[0].clone();
    span.run.start_date = start;
    span.run.end_date = end;
    span.run.warmup_days = 0;
    let loaded = load_for(&span, universe.as_ref(), &provider)?;

    let items = run_batch_on_data(&configs, &loaded, BatchOptions { threads });

    let mut failed = 0;
    for item in &items {
        match &item.outcome {
            Ok(result) => {
                let dir = save_artifacts(result, output)?;
                info!(label = %item.label, dir = %dir.display(), "saved");
            }
            Err(e) => {
                failed += 1;
                eprintln!("{} failed: {e}", item.label);
            }
        }
    }

    println!();
    println!(
        "{:<24} {:<16} {:>10} {:>10} {:>10} {:>8} {:>7}",
        "Label", "Strategy", "Return", "CAGR", "MaxDD", "Sharpe", "Trades"
    );
    println!("{}", "-".repeat(91));
    for row in summarize(&items) {
        println!(
            "{:<24} {:<16} {:>9.2}% {:>9.2}% {:>9.2}% {:>8.2} {:>7}",
            row.label,
            row.strategy,
            row.total_return * 100.0,
            row.annualized_return * 100.0,
            row.max_drawdown * 100.0,
            row.sharpe,
            row.trades
        );
    }

    if failed > 0 {
        bail!("{failed} of {} runs failed", items.len());
    }
    Ok(())
}

fn synthetic_cmd(instruments: &[String], start: &str, end: &str, out: &Path, seed: u64) -> Result<()> {
    let start = NaiveDate::parse_from_str(start, "%Y-%m-%d").context("invalid --start")?;
    let end = NaiveDate::parse_from_str(end, "%Y-%m-%d").context("invalid --end")?;
    if start > end {
        bail!("--start {start} is after --end {end}");
    }

    let provider = CsvDirProvider::new(out);
    let spec = SyntheticSpec {
        seed,
        ..SyntheticSpec::default()
    };
    for id in instruments {
        let rows = synthetic_series_with(id, start, end, &spec);
        provider.write_series(id, &rows)?;
        println!("{id}: {} rows -> {}", rows.len(), provider.path_for(id).display());
    }
    Ok(())
}

fn print_summary(result: &BacktestResult) {
    let meta = &result.metadata;
    let m = &result.metrics;
    println!();
    println!("=== Backtest Result ===");
    println!("Strategy:       {}", meta.strategy);
    println!("Status:         {:?}", meta.status);
    println!("Period:         {} to {}", meta.start_date, meta.end_date);
    println!("Days:           {} of {}", result.snapshots.len(), meta.trading_days);
    println!("Instruments:    {}", meta.instruments.join(", "));
    println!("Trades:         {} filled, {} rejected", m.filled_trades, m.rejected_trades);
    println!();
    println!("--- Performance ---");
    println!("Final Equity:   {:.0}", m.final_equity);
    println!("Profit/Loss:    {:.0}", m.profit_loss);
    println!("Total Return:   {:.2}%", m.total_return * 100.0);
    println!("Annualized:     {:.2}%", m.annualized_return * 100.0);
    println!("Volatility:     {:.2}%", m.volatility * 100.0);
    println!("Sharpe:         {:.3}", m.sharpe);
    println!("Max Drawdown:   {:.2}%", m.max_drawdown * 100.0);
    println!("Win Rate:       {:.1}%", m.win_rate * 100.0);
    println!("Costs:          {:.0}", result.cost_summary.total);
    for warning in &meta.dropped {
        println!("WARNING: no price data for {warning}");
    }
    println!();
}

//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;

use crate::adapters::csv_adapter::CsvPriceAdapter;
use crate::adapters::equity_report_adapter::CsvEquityReport;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::memory_adapter::InMemoryPriceAdapter;
use crate::domain::alpha::{AlphaModel, FixedSignals, SingleSignal, TimeSignals};
use crate::domain::backtest::{Backtest, BacktestConfig, FailureReport};
use crate::domain::config_validation::{
    DEFAULT_INITIAL_CAPITAL, allocation_failure_policy, alpha_kind, optional_bool, optional_f64,
    parse_date, rebalance_frequency, redistribution, required, required_weights,
    validate_alpha_config, validate_backtest_config,
};
use crate::domain::error::RebalancerError;
use crate::domain::metrics::Metrics;
use crate::domain::portfolio::EquityPoint;
use crate::domain::regime::moving_average_regime;
use crate::domain::universe::{StaticUniverse, parse_assets};
use crate::domain::{AssetId, Signal};
use crate::ports::config_port::ConfigPort;
use crate::ports::report_port::{NamedCurve, ReportPort};
use crate::ports::universe_port::Universe;

/// Fallback for `[data] csv_dir`.
pub const CSV_DIR_ENV: &str = "REBALANCER_CSV_DIR";

const AGGRESSIVE: &str = "aggressive";
const DEFENSIVE: &str = "defensive";

#[derive(Parser, Debug)]
#[command(name = "rebalancer", about = "Calendar-driven portfolio rebalancing backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the strategy (and benchmark, if configured) backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Write the daily equity curves to this CSV file
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Validate and summarise the config without loading data
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Print the rebalance dates the config resolves to
    Calendar {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Backtest {
            config,
            output,
            dry_run,
        } => {
            if dry_run {
                run_dry_run(&config)
            } else {
                run_backtest(&config, output.as_deref())
            }
        }
        Command::Validate { config } => run_validate(&config),
        Command::Calendar { config } => run_calendar(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, RebalancerError> {
    eprintln!("Loading config from {}", path.display());
    FileConfigAdapter::from_file(path)
}

/// Validate `[backtest]`, `[strategy]` and, when present, `[benchmark]`.
pub fn validate_config(adapter: &dyn ConfigPort) -> Result<(), RebalancerError> {
    validate_backtest_config(adapter)?;
    validate_alpha_config(adapter, "strategy")?;
    if adapter.has_section("benchmark") {
        validate_alpha_config(adapter, "benchmark")?;
    }
    Ok(())
}

pub fn build_backtest_config(adapter: &dyn ConfigPort) -> Result<BacktestConfig, RebalancerError> {
    Ok(BacktestConfig {
        start_date: parse_date(adapter, "start_date")?,
        end_date: parse_date(adapter, "end_date")?,
        initial_capital: optional_f64(
            adapter,
            "backtest",
            "initial_capital",
            DEFAULT_INITIAL_CAPITAL,
        )?,
        frequency: rebalance_frequency(adapter)?,
        long_only: optional_bool(adapter, "backtest", "long_only", true)?,
        cash_buffer: optional_f64(adapter, "backtest", "cash_buffer_percentage", 0.0)?,
        min_trade_threshold: optional_f64(adapter, "backtest", "min_trade_threshold", 0.0)?,
        cash_tolerance: optional_f64(adapter, "backtest", "cash_tolerance", 0.0)?,
        redistribution: redistribution(adapter)?,
        on_allocation_error: allocation_failure_policy(adapter)?,
    })
}

pub fn universe_assets(adapter: &dyn ConfigPort) -> Result<Vec<AssetId>, RebalancerError> {
    let assets = required(adapter, "backtest", "assets")?;
    parse_assets(&assets).map_err(|e| RebalancerError::ConfigInvalid {
        section: "backtest".into(),
        key: "assets".into(),
        reason: e.to_string(),
    })
}

/// Assets a model section trades, from its weight lists.
pub fn alpha_assets(
    adapter: &dyn ConfigPort,
    section: &str,
) -> Result<BTreeSet<AssetId>, RebalancerError> {
    let keys: Vec<&str> = match alpha_kind(adapter, section).as_str() {
        "regime" => vec![AGGRESSIVE, DEFENSIVE],
        "single" => Vec::new(),
        _ => vec!["weights"],
    };
    let mut assets = BTreeSet::new();
    for key in keys {
        assets.extend(required_weights(adapter, section, key)?.into_keys());
    }
    Ok(assets)
}

/// Every asset whose prices the run needs: the universe, each model's
/// weights and any regime signal asset.
pub fn required_price_assets(adapter: &dyn ConfigPort) -> Result<Vec<AssetId>, RebalancerError> {
    let mut assets: BTreeSet<AssetId> = universe_assets(adapter)?.into_iter().collect();
    for section in model_sections(adapter) {
        assets.extend(alpha_assets(adapter, section)?);
        if alpha_kind(adapter, section) == "regime" {
            assets.insert(required(adapter, section, "signal_asset")?.trim().to_uppercase());
        }
    }
    Ok(assets.into_iter().collect())
}

/// `[data] csv_dir`, falling back to the environment.
pub fn resolve_csv_dir(adapter: &dyn ConfigPort) -> Option<PathBuf> {
    adapter
        .get_string("data", "csv_dir")
        .filter(|s| !s.trim().is_empty())
        .or_else(|| std::env::var(CSV_DIR_ENV).ok())
        .map(PathBuf::from)
}

/// Build the alpha model configured in `section`.
pub fn build_alpha<'a>(
    adapter: &dyn ConfigPort,
    section: &str,
    prices: &InMemoryPriceAdapter,
    universe: &'a dyn Universe,
) -> Result<Box<dyn AlphaModel + 'a>, RebalancerError> {
    match alpha_kind(adapter, section).as_str() {
        "single" => {
            let value = optional_f64(adapter, section, "value", 1.0)?;
            Ok(Box::new(SingleSignal::new(value, universe)))
        }
        "regime" => {
            let asset = required(adapter, section, "signal_asset")?.trim().to_uppercase();
            let window = adapter.get_int(section, "ma_window", 200).max(1) as usize;
            let closes = prices.closes(&asset);
            if closes.is_empty() {
                return Err(RebalancerError::Data {
                    reason: format!("no prices for regime signal asset {asset}"),
                });
            }
            let regimes = moving_average_regime(&closes, window, AGGRESSIVE, DEFENSIVE);
            let mut allocations: BTreeMap<String, Signal> = BTreeMap::new();
            for label in [AGGRESSIVE, DEFENSIVE] {
                allocations.insert(label.to_string(), required_weights(adapter, section, label)?);
            }
            Ok(Box::new(TimeSignals::new(allocations, regimes)))
        }
        _ => Ok(Box::new(FixedSignals::new(required_weights(
            adapter, section, "weights",
        )?))),
    }
}

/// Result of one named run.
pub struct RunOutcome {
    pub name: String,
    pub curve: Vec<EquityPoint>,
    pub rebalances: usize,
    pub failure: Option<FailureReport>,
    pub error: Option<RebalancerError>,
}

pub fn run_one(
    name: &str,
    config: BacktestConfig,
    prices: &InMemoryPriceAdapter,
    universe: &dyn Universe,
    alpha: &dyn AlphaModel,
) -> RunOutcome {
    let mut backtest = match Backtest::new(config, prices, prices, universe, alpha) {
        Ok(bt) => bt,
        Err(e) => {
            return RunOutcome {
                name: name.to_string(),
                curve: Vec::new(),
                rebalances: 0,
                failure: None,
                error: Some(e),
            };
        }
    };
    let error = backtest.run().err();
    RunOutcome {
        name: name.to_string(),
        curve: backtest.equity_curve().map(<[_]>::to_vec).unwrap_or_default(),
        rebalances: backtest.rebalance_events().len(),
        failure: backtest.failure().cloned(),
        error,
    }
}

fn model_sections(adapter: &dyn ConfigPort) -> Vec<&'static str> {
    if adapter.has_section("benchmark") {
        vec!["strategy", "benchmark"]
    } else {
        vec!["strategy"]
    }
}

fn load_prices(
    adapter: &dyn ConfigPort,
    assets: &[AssetId],
) -> Result<InMemoryPriceAdapter, RebalancerError> {
    let dir = resolve_csv_dir(adapter).ok_or_else(|| RebalancerError::ConfigMissing {
        section: "data".into(),
        key: "csv_dir".into(),
    })?;
    eprintln!("Loading {} price series from {}", assets.len(), dir.display());
    CsvPriceAdapter::new(dir).load(assets)
}

pub fn run_backtest(config_path: &Path, output_path: Option<&Path>) -> Result<(), RebalancerError> {
    // Stage 1: Load and validate config
    let adapter = load_config(config_path)?;
    validate_config(&adapter)?;
    let bt_config = build_backtest_config(&adapter)?;

    // Stage 2: Load prices
    let prices = load_prices(&adapter, &required_price_assets(&adapter)?)?;

    // Stage 3: Universes and alpha models
    let assets = universe_assets(&adapter)?;
    let strategy_universe = StaticUniverse::new(assets.iter().cloned());
    let strategy_alpha = build_alpha(&adapter, "strategy", &prices, &strategy_universe)?;

    let has_benchmark = adapter.has_section("benchmark");
    let benchmark_universe = if has_benchmark {
        let mut members: BTreeSet<AssetId> = assets.iter().cloned().collect();
        members.extend(alpha_assets(&adapter, "benchmark")?);
        Some(StaticUniverse::new(members))
    } else {
        None
    };
    let benchmark_alpha = match &benchmark_universe {
        Some(u) => Some(build_alpha(&adapter, "benchmark", &prices, u)?),
        None => None,
    };

    // Stage 4: Run strategy and benchmark side by side
    eprintln!(
        "Running backtest: {} assets, {} to {}, rebalance {}",
        assets.len(),
        bt_config.start_date,
        bt_config.end_date,
        bt_config.frequency
    );
    let (strategy, benchmark) = thread::scope(|s| {
        let (prices, config) = (&prices, &bt_config);
        let (universe, alpha) = (&strategy_universe, &*strategy_alpha);
        let strategy = s.spawn(move || run_one("strategy", config.clone(), prices, universe, alpha));
        let benchmark = match (&benchmark_universe, &benchmark_alpha) {
            (Some(u), Some(a)) => {
                let handle =
                    s.spawn(move || run_one("benchmark", config.clone(), prices, u, &**a));
                Some(join(handle))
            }
            _ => None,
        };
        (join(strategy), benchmark)
    });

    // Stage 5: Console summary
    let risk_free_rate = optional_f64(&adapter, "backtest", "risk_free_rate", 0.0)?;
    print_summary(&strategy, risk_free_rate);
    if let Some(b) = &benchmark {
        print_summary(b, risk_free_rate);
    }

    // Stage 6: Equity curve CSV
    if let Some(path) = output_path {
        let mut curves = vec![NamedCurve {
            name: &strategy.name,
            points: &strategy.curve,
        }];
        if let Some(b) = &benchmark {
            curves.push(NamedCurve {
                name: &b.name,
                points: &b.curve,
            });
        }
        CsvEquityReport.write(&curves, &path.to_string_lossy())?;
        eprintln!("\nEquity curves written to: {}", path.display());
    }

    match (strategy.error, benchmark.and_then(|b| b.error)) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn join(handle: thread::ScopedJoinHandle<'_, RunOutcome>) -> RunOutcome {
    handle
        .join()
        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
}

fn print_summary(outcome: &RunOutcome, risk_free_rate: f64) {
    eprintln!("\n=== {} ===", outcome.name);
    if let Some(failure) = &outcome.failure {
        let asset = failure
            .asset
            .as_deref()
            .map(|a| format!(" ({a})"))
            .unwrap_or_default();
        eprintln!("HALTED on {}{}: {}", failure.date, asset, failure.reason);
    } else if let Some(e) = &outcome.error {
        eprintln!("FAILED: {e}");
        return;
    }

    let m = Metrics::compute(&outcome.curve, risk_free_rate);
    eprintln!("Final Equity:     {:.2}", m.final_equity);
    eprintln!("Total Return:     {:.2}%", m.total_return * 100.0);
    eprintln!("Annualized:       {:.2}%", m.annualized_return * 100.0);
    eprintln!("Volatility:       {:.2}%", m.volatility * 100.0);
    eprintln!("Sharpe Ratio:     {:.2}", m.sharpe_ratio);
    eprintln!("Sortino Ratio:    {:.2}", m.sortino_ratio);
    eprintln!("Max Drawdown:     -{:.1}%", m.max_drawdown * 100.0);
    eprintln!("Max DD Duration:  {} days", m.max_drawdown_duration);
    eprintln!("Rebalances:       {}", outcome.rebalances);
}

pub fn run_dry_run(config_path: &Path) -> Result<(), RebalancerError> {
    let adapter = load_config(config_path)?;
    validate_config(&adapter)?;
    eprintln!("Config validated successfully");

    let bt_config = build_backtest_config(&adapter)?;
    eprintln!("\nBacktest:");
    eprintln!("  period:         {} to {}", bt_config.start_date, bt_config.end_date);
    eprintln!("  capital:        {:.2}", bt_config.initial_capital);
    eprintln!("  rebalance:      {}", bt_config.frequency);
    eprintln!("  long only:      {}", bt_config.long_only);
    eprintln!("  cash buffer:    {}", bt_config.cash_buffer);
    eprintln!("  redistribution: {}", bt_config.redistribution);
    eprintln!("  on alloc error: {}", bt_config.on_allocation_error);
    eprintln!("\nUniverse:");
    eprintln!("  assets: {}", universe_assets(&adapter)?.join(", "));

    for section in model_sections(&adapter) {
        eprintln!("\n{section}:");
        eprintln!("  alpha: {}", alpha_kind(&adapter, section));
        let traded: Vec<AssetId> = alpha_assets(&adapter, section)?.into_iter().collect();
        if !traded.is_empty() {
            eprintln!("  weighted assets: {}", traded.join(", "));
        }
    }

    match resolve_csv_dir(&adapter) {
        Some(dir) => eprintln!("\nData: {}", dir.display()),
        None => eprintln!("\nData: not configured ([data] csv_dir or {CSV_DIR_ENV})"),
    }
    eprintln!("\nDry run complete: configuration is valid");
    Ok(())
}

pub fn run_validate(config_path: &Path) -> Result<(), RebalancerError> {
    let adapter = load_config(config_path)?;
    validate_config(&adapter)?;
    eprintln!("Config validated successfully");
    Ok(())
}

pub fn run_calendar(config_path: &Path) -> Result<(), RebalancerError> {
    let adapter = load_config(config_path)?;
    validate_backtest_config(&adapter)?;
    let bt_config = build_backtest_config(&adapter)?;
    let assets = universe_assets(&adapter)?;
    let prices = load_prices(&adapter, &assets)?;

    let universe = StaticUniverse::new(assets);
    let idle = FixedSignals::new(Signal::new());
    let backtest = Backtest::new(bt_config, &prices, &prices, &universe, &idle)?;

    for date in backtest.rebalance_calendar().dates() {
        println!("{date}");
    }
    eprintln!(
        "{} rebalance dates over {} trading days",
        backtest.rebalance_calendar().len(),
        backtest.trading_days().len()
    );
    Ok(())
}

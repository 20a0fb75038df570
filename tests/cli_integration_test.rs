//! CLI integration tests for config handling and command orchestration.
//!
//! Tests cover:
//! - Config parsing (build_backtest_config, universe_assets)
//! - Price asset resolution across strategy and benchmark sections
//! - Alpha model construction for each kind
//! - Validate, dry-run and calendar commands with real INI files on disk
//! - Full backtest from CSV price files to the equity curve CSV

mod common;

use chrono::Weekday;
use common::*;
use rebalancer::adapters::file_config_adapter::FileConfigAdapter;
use rebalancer::adapters::memory_adapter::InMemoryPriceAdapter;
use rebalancer::cli;
use rebalancer::domain::backtest::AllocationFailurePolicy;
use rebalancer::domain::calendar::RebalanceFrequency;
use rebalancer::domain::construction::Redistribution;
use rebalancer::domain::error::RebalancerError;
use rebalancer::domain::universe::StaticUniverse;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;

fn write_temp_ini(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn write_price_csv(dir: &Path, symbol: &str, closes: &[(chrono::NaiveDate, f64)]) {
    let mut text = String::from("Date,Open,High,Low,Close,Adj Close,Volume\n");
    for (d, c) in closes {
        text.push_str(&format!("{d},{c},{c},{c},{c},{c},1000\n"));
    }
    std::fs::write(dir.join(format!("{symbol}.csv")), text).unwrap();
}

/// A price directory holding SPY and AGG for Q1 2020.
fn price_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    let (start, end) = (date(2020, 1, 1), date(2020, 3, 31));
    write_price_csv(dir.path(), "SPY", &trending_series(300.0, 0.001, start, end));
    write_price_csv(dir.path(), "AGG", &flat_series(110.0, start, end));
    dir
}

fn config_text(csv_dir: &Path, extra: &str) -> String {
    format!(
        r#"
[data]
csv_dir = {}

[backtest]
initial_capital = 100000.0
start_date = 2020-01-01
end_date = 2020-03-31
assets = EQ:SPY, EQ:AGG
rebalance = end_of_month
cash_buffer_percentage = 0.01
risk_free_rate = 0.02

[strategy]
alpha = fixed
weights = EQ:SPY=0.6, EQ:AGG=0.4
{extra}"#,
        csv_dir.display()
    )
}

const BENCHMARK: &str = r#"
[benchmark]
alpha = fixed
weights = EQ:SPY=1.0
"#;

mod config_loading {
    use super::*;

    #[test]
    fn build_backtest_config_reads_every_key() {
        let adapter = FileConfigAdapter::from_string(
            r#"
[backtest]
initial_capital = 250000
start_date = 2019-06-03
end_date = 2020-06-30
assets = EQ:SPY
rebalance = weekly
rebalance_weekday = thursday
long_only = false
cash_buffer_percentage = 0.05
min_trade_threshold = 0.002
cash_tolerance = 1.5
redistribution = cash
on_allocation_error = skip_and_hold
"#,
        )
        .unwrap();

        let config = cli::build_backtest_config(&adapter).unwrap();
        assert_eq!(config.initial_capital, 250_000.0);
        assert_eq!(config.start_date, date(2019, 6, 3));
        assert_eq!(config.end_date, date(2020, 6, 30));
        assert_eq!(config.frequency, RebalanceFrequency::Weekly(Weekday::Thu));
        assert!(!config.long_only);
        assert_eq!(config.cash_buffer, 0.05);
        assert_eq!(config.min_trade_threshold, 0.002);
        assert_eq!(config.cash_tolerance, 1.5);
        assert_eq!(config.redistribution, Redistribution::Cash);
        assert_eq!(config.on_allocation_error, AllocationFailurePolicy::SkipAndHold);
    }

    #[test]
    fn build_backtest_config_defaults() {
        let adapter = FileConfigAdapter::from_string(
            "[backtest]\nstart_date = 2020-01-01\nend_date = 2020-12-31\nrebalance = daily\n",
        )
        .unwrap();

        let config = cli::build_backtest_config(&adapter).unwrap();
        assert_eq!(config.initial_capital, 100_000.0);
        assert_eq!(config.frequency, RebalanceFrequency::EveryNDays(1));
        assert!(config.long_only);
        assert_eq!(config.cash_buffer, 0.0);
        assert_eq!(config.redistribution, Redistribution::ProRata);
        assert_eq!(config.on_allocation_error, AllocationFailurePolicy::Halt);
    }

    #[test]
    fn missing_start_date_is_reported() {
        let adapter =
            FileConfigAdapter::from_string("[backtest]\nend_date = 2020-12-31\nrebalance = daily\n")
                .unwrap();
        match cli::build_backtest_config(&adapter) {
            Err(RebalancerError::ConfigMissing { section, key }) => {
                assert_eq!(section, "backtest");
                assert_eq!(key, "start_date");
            }
            other => panic!("expected ConfigMissing, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn unparseable_values_are_not_replaced_by_defaults() {
        let base = "[backtest]\nstart_date = 2020-01-01\nend_date = 2020-12-31\nrebalance = daily\n";
        for (line, expected_key) in [
            ("cash_buffer_percentage = ten percent", "cash_buffer_percentage"),
            ("min_trade_threshold = 0.0.1", "min_trade_threshold"),
            ("cash_tolerance = NaN", "cash_tolerance"),
            ("initial_capital = 1,000,000", "initial_capital"),
            ("long_only = maybe", "long_only"),
        ] {
            let adapter = FileConfigAdapter::from_string(&format!("{base}{line}\n")).unwrap();
            match cli::build_backtest_config(&adapter) {
                Err(RebalancerError::ConfigInvalid { section, key, .. }) => {
                    assert_eq!(section, "backtest");
                    assert_eq!(key, expected_key);
                }
                other => panic!("expected ConfigInvalid for {line}, got {:?}", other.map(|_| ())),
            }
        }
    }

    #[test]
    fn universe_assets_are_normalised() {
        let adapter =
            FileConfigAdapter::from_string("[backtest]\nassets = eq:spy, EQ:AGG\n").unwrap();
        assert_eq!(
            cli::universe_assets(&adapter).unwrap(),
            vec!["EQ:SPY".to_string(), "EQ:AGG".to_string()]
        );
    }

    #[test]
    fn validate_config_checks_benchmark_section() {
        let dir = TempDir::new().unwrap();
        let text = config_text(dir.path(), "\n[benchmark]\nalpha = momentum\n");
        let adapter = FileConfigAdapter::from_string(&text).unwrap();

        match cli::validate_config(&adapter) {
            Err(RebalancerError::ConfigInvalid { section, key, .. }) => {
                assert_eq!(section, "benchmark");
                assert_eq!(key, "alpha");
            }
            other => panic!("expected ConfigInvalid, got {:?}", other),
        }
    }

    #[test]
    fn validate_config_accepts_good_file() {
        let dir = TempDir::new().unwrap();
        let adapter = FileConfigAdapter::from_string(&config_text(dir.path(), BENCHMARK)).unwrap();
        assert!(cli::validate_config(&adapter).is_ok());
    }
}

mod asset_resolution {
    use super::*;

    #[test]
    fn includes_benchmark_weights_and_regime_signal() {
        let adapter = FileConfigAdapter::from_string(
            r#"
[backtest]
assets = EQ:SPY, EQ:AGG

[strategy]
alpha = regime
signal_asset = eq:vti
ma_window = 50
aggressive = EQ:SPY=0.8, EQ:AGG=0.2
defensive = EQ:SPY=0.2, EQ:AGG=0.8

[benchmark]
alpha = fixed
weights = EQ:QQQ=1.0
"#,
        )
        .unwrap();

        assert_eq!(
            cli::required_price_assets(&adapter).unwrap(),
            vec!["EQ:AGG", "EQ:QQQ", "EQ:SPY", "EQ:VTI"]
        );
    }

    #[test]
    fn single_alpha_adds_no_assets() {
        let adapter = FileConfigAdapter::from_string(
            "[backtest]\nassets = EQ:SPY\n\n[strategy]\nalpha = single\nvalue = 1.0\n",
        )
        .unwrap();
        assert!(cli::alpha_assets(&adapter, "strategy").unwrap().is_empty());
        assert_eq!(cli::required_price_assets(&adapter).unwrap(), vec!["EQ:SPY"]);
    }

    #[test]
    fn csv_dir_from_config() {
        let adapter = FileConfigAdapter::from_string("[data]\ncsv_dir = /srv/prices\n").unwrap();
        assert_eq!(
            cli::resolve_csv_dir(&adapter),
            Some(std::path::PathBuf::from("/srv/prices"))
        );
    }
}

mod alpha_models {
    use super::*;

    fn prices() -> InMemoryPriceAdapter {
        let (start, end) = (date(2020, 1, 1), date(2020, 3, 31));
        InMemoryPriceAdapter::new()
            .with_series("EQ:SPY", trending_series(100.0, 0.01, start, end))
            .with_series("EQ:AGG", flat_series(50.0, start, end))
    }

    #[test]
    fn fixed_model_returns_weights() {
        let adapter =
            FileConfigAdapter::from_string("[strategy]\nweights = EQ:SPY=0.7, EQ:AGG=0.3\n")
                .unwrap();
        let universe = StaticUniverse::new(["EQ:SPY", "EQ:AGG"]);
        let alpha = cli::build_alpha(&adapter, "strategy", &prices(), &universe).unwrap();

        let signal = alpha.forecast(date(2020, 2, 3)).unwrap();
        assert_eq!(signal["EQ:SPY"], 0.7);
        assert_eq!(signal["EQ:AGG"], 0.3);
    }

    #[test]
    fn single_model_covers_universe() {
        let adapter =
            FileConfigAdapter::from_string("[strategy]\nalpha = single\nvalue = 0.5\n").unwrap();
        let universe = StaticUniverse::new(["EQ:SPY", "EQ:AGG"]);
        let alpha = cli::build_alpha(&adapter, "strategy", &prices(), &universe).unwrap();

        let signal = alpha.forecast(date(2020, 2, 3)).unwrap();
        assert_eq!(signal.len(), 2);
        assert!(signal.values().all(|v| *v == 0.5));
    }

    #[test]
    fn regime_model_uses_signal_asset_trend() {
        let adapter = FileConfigAdapter::from_string(
            r#"
[strategy]
alpha = regime
signal_asset = EQ:SPY
ma_window = 5
aggressive = EQ:SPY=0.9, EQ:AGG=0.1
defensive = EQ:SPY=0.1, EQ:AGG=0.9
"#,
        )
        .unwrap();
        let universe = StaticUniverse::new(["EQ:SPY", "EQ:AGG"]);
        let alpha = cli::build_alpha(&adapter, "strategy", &prices(), &universe).unwrap();

        // Warm-up bars are defensive; a rising series is aggressive after.
        assert_eq!(alpha.forecast(date(2020, 1, 2)).unwrap()["EQ:SPY"], 0.1);
        assert_eq!(alpha.forecast(date(2020, 2, 3)).unwrap()["EQ:SPY"], 0.9);
    }

    #[test]
    fn regime_model_without_prices_is_data_error() {
        let adapter = FileConfigAdapter::from_string(
            r#"
[strategy]
alpha = regime
signal_asset = EQ:VTI
ma_window = 5
aggressive = EQ:SPY=1.0
defensive = EQ:AGG=1.0
"#,
        )
        .unwrap();
        let universe = StaticUniverse::new(["EQ:SPY", "EQ:AGG"]);
        let result = cli::build_alpha(&adapter, "strategy", &prices(), &universe);
        assert!(matches!(result, Err(RebalancerError::Data { .. })));
    }
}

mod commands {
    use super::*;

    #[test]
    fn validate_missing_file_is_parse_error() {
        let result = cli::run_validate(Path::new("/nonexistent/rebalancer.ini"));
        assert!(matches!(result, Err(RebalancerError::ConfigParse { .. })));
    }

    #[test]
    fn validate_bad_rebalance_is_config_error() {
        let dir = TempDir::new().unwrap();
        let text = config_text(dir.path(), "").replace("end_of_month", "fortnightly");
        let ini = write_temp_ini(&text);

        let err = cli::run_validate(ini.path()).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn dry_run_needs_no_price_files() {
        let dir = TempDir::new().unwrap();
        let ini = write_temp_ini(&config_text(dir.path(), BENCHMARK));
        assert!(cli::run_dry_run(ini.path()).is_ok());
    }

    #[test]
    fn calendar_resolves_month_ends() {
        let dir = price_dir();
        let ini = write_temp_ini(&config_text(dir.path(), ""));
        assert!(cli::run_calendar(ini.path()).is_ok());
    }

    #[test]
    fn calendar_without_price_files_is_data_error() {
        let dir = TempDir::new().unwrap();
        let ini = write_temp_ini(&config_text(dir.path(), ""));
        assert!(matches!(
            cli::run_calendar(ini.path()),
            Err(RebalancerError::Data { .. })
        ));
    }
}

mod full_backtest {
    use super::*;

    #[test]
    fn writes_strategy_and_benchmark_curves() {
        let dir = price_dir();
        let ini = write_temp_ini(&config_text(dir.path(), BENCHMARK));
        let out = dir.path().join("equity.csv");

        cli::run_backtest(ini.path(), Some(&out)).unwrap();

        let text = std::fs::read_to_string(&out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("date,strategy,benchmark"));
        let rows: Vec<&str> = lines.collect();
        assert_eq!(rows.len(), weekdays(date(2020, 1, 1), date(2020, 3, 31)).len());
        assert_eq!(rows[0], "2020-01-01,100000.00,100000.00");
        assert!(rows.iter().all(|r| r.split(',').count() == 3));
    }

    #[test]
    fn runs_without_benchmark_or_output() {
        let dir = price_dir();
        let ini = write_temp_ini(&config_text(dir.path(), ""));
        assert!(cli::run_backtest(ini.path(), None).is_ok());
    }

    #[test]
    fn short_price_file_is_forward_filled() {
        let dir = price_dir();
        // SPY stops at the end of February; AGG keeps the calendar going.
        let closes = trending_series(300.0, 0.001, date(2020, 1, 1), date(2020, 2, 28));
        write_price_csv(dir.path(), "SPY", &closes);

        let ini = write_temp_ini(&config_text(dir.path(), ""));
        let out = dir.path().join("equity.csv");
        cli::run_backtest(ini.path(), Some(&out)).unwrap();

        let text = std::fs::read_to_string(&out).unwrap();
        assert!(text.lines().last().unwrap().starts_with("2020-03-31,"));
    }

    #[test]
    fn missing_price_file_fails_before_running() {
        let dir = TempDir::new().unwrap();
        write_price_csv(
            dir.path(),
            "SPY",
            &flat_series(300.0, date(2020, 1, 1), date(2020, 3, 31)),
        );
        let ini = write_temp_ini(&config_text(dir.path(), ""));
        let out = dir.path().join("equity.csv");

        let result = cli::run_backtest(ini.path(), Some(&out));
        assert!(matches!(result, Err(RebalancerError::Data { .. })));
        assert!(!out.exists());
    }
}

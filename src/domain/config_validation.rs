//! Configuration validation.
//!
//! Checks every key the backtest reads before anything is loaded or
//! simulated, so a bad config fails fast with the section and key at fault.

use crate::domain::Signal;
use crate::domain::backtest::AllocationFailurePolicy;
use crate::domain::calendar::RebalanceFrequency;
use crate::domain::construction::Redistribution;
use crate::domain::error::RebalancerError;
use crate::domain::universe::parse_assets;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

/// Alpha model kinds accepted in `[strategy]` / `[benchmark]`.
pub const ALPHA_KINDS: [&str; 3] = ["fixed", "single", "regime"];

/// Starting cash when `initial_capital` is not set.
pub const DEFAULT_INITIAL_CAPITAL: f64 = 100_000.0;

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), RebalancerError> {
    validate_initial_capital(config)?;
    validate_dates(config)?;
    validate_assets(config)?;
    rebalance_frequency(config)?;
    validate_fraction(config, "cash_buffer_percentage")?;
    validate_non_negative(config, "min_trade_threshold")?;
    validate_non_negative(config, "cash_tolerance")?;
    validate_fraction(config, "risk_free_rate")?;
    optional_bool(config, "backtest", "long_only", true)?;
    redistribution(config)?;
    allocation_failure_policy(config)?;
    Ok(())
}

/// Validate an alpha model section (`strategy` or `benchmark`).
pub fn validate_alpha_config(config: &dyn ConfigPort, section: &str) -> Result<(), RebalancerError> {
    match alpha_kind(config, section).as_str() {
        "fixed" => {
            required_weights(config, section, "weights")?;
        }
        "single" => {
            let value = required(config, section, "value")?;
            match value.trim().parse::<f64>() {
                Ok(v) if v.is_finite() => {}
                _ => return Err(invalid(section, "value", "value must be a number")),
            }
        }
        "regime" => {
            let asset = required(config, section, "signal_asset")?;
            parse_assets(&asset).map_err(|e| invalid(section, "signal_asset", e.to_string()))?;
            if config.get_int(section, "ma_window", 0) < 1 {
                return Err(invalid(section, "ma_window", "ma_window must be at least 1"));
            }
            required_weights(config, section, "aggressive")?;
            required_weights(config, section, "defensive")?;
        }
        other => {
            return Err(invalid(
                section,
                "alpha",
                format!("unknown alpha '{other}', expected one of {}", ALPHA_KINDS.join(", ")),
            ));
        }
    }
    Ok(())
}

/// The `alpha` key of a model section, lower-cased; `fixed` when absent.
pub fn alpha_kind(config: &dyn ConfigPort, section: &str) -> String {
    config
        .get_string(section, "alpha")
        .map(|s| s.trim().to_lowercase())
        .unwrap_or_else(|| "fixed".to_string())
}

/// Parse a weight list such as `EQ:SPY=0.6, EQ:AGG=0.4`.
///
/// Asset ids are upper-cased. Errors name `section` and `key`.
pub fn parse_weights(section: &str, key: &str, value: &str) -> Result<Signal, RebalancerError> {
    let mut signal = Signal::new();
    for entry in value.split(',') {
        let entry = entry.trim();
        let Some((asset, weight)) = entry.split_once('=') else {
            return Err(invalid(
                section,
                key,
                format!("expected ASSET=WEIGHT, got '{entry}'"),
            ));
        };
        let asset = asset.trim().to_uppercase();
        parse_assets(&asset).map_err(|e| invalid(section, key, e.to_string()))?;
        let weight: f64 = weight
            .trim()
            .parse()
            .ok()
            .filter(|w: &f64| w.is_finite())
            .ok_or_else(|| invalid(section, key, format!("weight for {asset} is not a number")))?;
        if signal.insert(asset.clone(), weight).is_some() {
            return Err(invalid(section, key, format!("{asset} listed twice")));
        }
    }
    Ok(signal)
}

pub fn parse_date(config: &dyn ConfigPort, key: &str) -> Result<NaiveDate, RebalancerError> {
    let value = required(config, "backtest", key)?;
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| invalid("backtest", key, "invalid date format, expected YYYY-MM-DD"))
}

/// `[backtest] rebalance` with its weekday / interval qualifiers.
pub fn rebalance_frequency(config: &dyn ConfigPort) -> Result<RebalanceFrequency, RebalancerError> {
    let descriptor = required(config, "backtest", "rebalance")?;
    let weekday = config.get_string("backtest", "rebalance_weekday");
    let interval = match config.get_string("backtest", "rebalance_interval") {
        None => None,
        Some(s) => Some(s.trim().parse::<i64>().map_err(|_| {
            invalid("backtest", "rebalance_interval", "interval must be an integer")
        })?),
    };
    RebalanceFrequency::parse(&descriptor, weekday.as_deref(), interval)
        .map_err(|e| invalid("backtest", "rebalance", reason_of(e)))
}

pub fn redistribution(config: &dyn ConfigPort) -> Result<Redistribution, RebalancerError> {
    match config.get_string("backtest", "redistribution") {
        None => Ok(Redistribution::default()),
        Some(s) => Redistribution::parse(&s).ok_or_else(|| {
            invalid(
                "backtest",
                "redistribution",
                format!("unknown policy '{s}', expected pro_rata or cash"),
            )
        }),
    }
}

pub fn allocation_failure_policy(
    config: &dyn ConfigPort,
) -> Result<AllocationFailurePolicy, RebalancerError> {
    match config.get_string("backtest", "on_allocation_error") {
        None => Ok(AllocationFailurePolicy::default()),
        Some(s) => AllocationFailurePolicy::parse(&s).ok_or_else(|| {
            invalid(
                "backtest",
                "on_allocation_error",
                format!("unknown policy '{s}', expected halt or skip_and_hold"),
            )
        }),
    }
}

fn validate_initial_capital(config: &dyn ConfigPort) -> Result<(), RebalancerError> {
    let value = optional_f64(config, "backtest", "initial_capital", DEFAULT_INITIAL_CAPITAL)?;
    if value <= 0.0 {
        return Err(invalid(
            "backtest",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }
    Ok(())
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), RebalancerError> {
    let start = parse_date(config, "start_date")?;
    let end = parse_date(config, "end_date")?;
    if start > end {
        return Err(invalid(
            "backtest",
            "start_date",
            "start_date must not be after end_date",
        ));
    }
    Ok(())
}

fn validate_assets(config: &dyn ConfigPort) -> Result<(), RebalancerError> {
    let assets = required(config, "backtest", "assets")?;
    parse_assets(&assets).map_err(|e| invalid("backtest", "assets", e.to_string()))?;
    Ok(())
}

fn validate_fraction(config: &dyn ConfigPort, key: &str) -> Result<(), RebalancerError> {
    let value = optional_f64(config, "backtest", key, 0.0)?;
    if !(0.0..1.0).contains(&value) {
        return Err(invalid("backtest", key, format!("{key} must be in [0, 1)")));
    }
    Ok(())
}

fn validate_non_negative(config: &dyn ConfigPort, key: &str) -> Result<(), RebalancerError> {
    let value = optional_f64(config, "backtest", key, 0.0)?;
    if value < 0.0 {
        return Err(invalid("backtest", key, format!("{key} must be non-negative")));
    }
    Ok(())
}

/// Read a numeric key, falling back to `default` only when the key is absent.
///
/// A present value that is not a finite number is a `ConfigInvalid` error.
pub fn optional_f64(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, RebalancerError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(s) => match s.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(invalid(section, key, format!("'{s}' is not a number"))),
        },
    }
}

/// Read a boolean key, falling back to `default` only when the key is absent.
pub fn optional_bool(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: bool,
) -> Result<bool, RebalancerError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(s) => parse_bool(&s).ok_or_else(|| {
            invalid(
                section,
                key,
                format!("'{s}' is not a boolean, expected true or false"),
            )
        }),
    }
}

/// Accepts `true/yes/on/1` and `false/no/off/0`, case-insensitively.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

pub fn required_weights(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Signal, RebalancerError> {
    let value = required(config, section, key)?;
    parse_weights(section, key, &value)
}

pub fn required(config: &dyn ConfigPort, section: &str, key: &str) -> Result<String, RebalancerError> {
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(RebalancerError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }),
    }
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> RebalancerError {
    RebalancerError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn reason_of(err: RebalancerError) -> String {
    match err {
        RebalancerError::Configuration { reason } => reason,
        other => other.to_string(),
    }
}

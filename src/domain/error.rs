//! Domain error types.

use chrono::NaiveDate;

/// Top-level error type for rebalancer.
#[derive(Debug, thiserror::Error)]
pub enum RebalancerError {
    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("allocation failed on {date}: {reason}")]
    Allocation { date: NaiveDate, reason: String },

    #[error("no price for {asset} at or before {date}")]
    PriceUnavailable { asset: String, date: NaiveDate },

    #[error(
        "insufficient cash for {asset} on {date}: order costs {required:.2}, cash is {available:.2}"
    )]
    InsufficientCash {
        asset: String,
        date: NaiveDate,
        required: f64,
        available: f64,
    },

    #[error("cannot {operation} while backtest is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("backtest cancelled on {date}")]
    Cancelled { date: NaiveDate },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RebalancerError {
    pub fn configuration(reason: impl Into<String>) -> Self {
        RebalancerError::Configuration {
            reason: reason.into(),
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RebalancerError::Configuration { .. }
                | RebalancerError::ConfigParse { .. }
                | RebalancerError::ConfigMissing { .. }
                | RebalancerError::ConfigInvalid { .. }
        )
    }

    /// The asset the failure concerns, when there is one.
    pub fn asset(&self) -> Option<&str> {
        match self {
            RebalancerError::PriceUnavailable { asset, .. }
            | RebalancerError::InsufficientCash { asset, .. } => Some(asset),
            _ => None,
        }
    }
}

impl From<&RebalancerError> for std::process::ExitCode {
    fn from(err: &RebalancerError) -> Self {
        let code: u8 = match err {
            RebalancerError::Io(_) | RebalancerError::Data { .. } => 1,
            RebalancerError::Configuration { .. }
            | RebalancerError::ConfigParse { .. }
            | RebalancerError::ConfigMissing { .. }
            | RebalancerError::ConfigInvalid { .. } => 2,
            RebalancerError::Allocation { .. } | RebalancerError::InsufficientCash { .. } => 3,
            RebalancerError::PriceUnavailable { .. } => 4,
            RebalancerError::InvalidState { .. } | RebalancerError::Cancelled { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, 31).unwrap()
    }

    #[test]
    fn price_unavailable_message_names_asset_and_date() {
        let err = RebalancerError::PriceUnavailable {
            asset: "EQ:SPY".into(),
            date: date(),
        };
        assert_eq!(err.to_string(), "no price for EQ:SPY at or before 2020-01-31");
        assert_eq!(err.asset(), Some("EQ:SPY"));
    }

    #[test]
    fn insufficient_cash_message_formats_amounts() {
        let err = RebalancerError::InsufficientCash {
            asset: "EQ:AGG".into(),
            date: date(),
            required: 1500.0,
            available: 1000.0,
        };
        assert!(err.to_string().contains("order costs 1500.00, cash is 1000.00"));
    }

    #[test]
    fn configuration_variants_are_grouped() {
        assert!(RebalancerError::configuration("bad").is_configuration());
        assert!(
            RebalancerError::ConfigMissing {
                section: "backtest".into(),
                key: "start_date".into(),
            }
            .is_configuration()
        );
        assert!(
            !RebalancerError::Cancelled { date: date() }.is_configuration()
        );
    }

    #[test]
    fn invalid_state_message() {
        let err = RebalancerError::InvalidState {
            operation: "read the equity curve",
            state: "not started",
        };
        assert_eq!(
            err.to_string(),
            "cannot read the equity curve while backtest is not started"
        );
        assert_eq!(err.asset(), None);
    }
}

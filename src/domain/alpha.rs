//! Alpha models: pluggable sources of per-asset forecasts.

use crate::domain::error::RebalancerError;
use crate::domain::time_series::TimeIndexed;
use crate::domain::{AssetId, Signal};
use crate::ports::universe_port::Universe;
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Produces the per-asset signal for "now".
///
/// Implementations must not depend on calls for earlier dates; the engine
/// only calls `forecast` on rebalance dates.
pub trait AlphaModel: Send + Sync {
    fn forecast(&self, date: NaiveDate) -> Result<Signal, RebalancerError>;
}

/// The same static allocation table on every date.
#[derive(Debug, Clone)]
pub struct FixedSignals {
    signal: Signal,
}

impl FixedSignals {
    pub fn new(signal: Signal) -> Self {
        FixedSignals { signal }
    }
}

impl AlphaModel for FixedSignals {
    fn forecast(&self, _date: NaiveDate) -> Result<Signal, RebalancerError> {
        Ok(self.signal.clone())
    }
}

/// One scalar for every current member of a universe.
pub struct SingleSignal<'a> {
    value: f64,
    universe: &'a dyn Universe,
}

impl<'a> SingleSignal<'a> {
    pub fn new(value: f64, universe: &'a dyn Universe) -> Self {
        SingleSignal { value, universe }
    }
}

impl AlphaModel for SingleSignal<'_> {
    fn forecast(&self, date: NaiveDate) -> Result<Signal, RebalancerError> {
        Ok(self
            .universe
            .members_at(date)
            .into_iter()
            .map(|asset| (asset, self.value))
            .collect())
    }
}

/// Allocation chosen by a regime label that changes over time.
///
/// The label in force on a date is the most recent one at or before it,
/// so a rebalance on a non-labelled day uses the previous label.
#[derive(Debug, Clone)]
pub struct TimeSignals {
    allocations: BTreeMap<String, Signal>,
    regimes: TimeIndexed<String>,
}

impl TimeSignals {
    pub fn new(allocations: BTreeMap<String, Signal>, regimes: TimeIndexed<String>) -> Self {
        TimeSignals {
            allocations,
            regimes,
        }
    }

    pub fn regime_at(&self, date: NaiveDate) -> Option<&str> {
        self.regimes.at_or_before(date).map(|(_, label)| label.as_str())
    }
}

impl AlphaModel for TimeSignals {
    fn forecast(&self, date: NaiveDate) -> Result<Signal, RebalancerError> {
        let label = self.regime_at(date).ok_or_else(|| RebalancerError::Allocation {
            date,
            reason: "no regime label at or before this date".to_string(),
        })?;
        log::debug!("regime on {date}: {label}");
        self.allocations
            .get(label)
            .cloned()
            .ok_or_else(|| RebalancerError::Allocation {
                date,
                reason: format!("no allocation configured for regime '{label}'"),
            })
    }
}

/// Build a signal from `(asset, weight)` pairs.
pub fn signal_from<I, S>(pairs: I) -> Signal
where
    I: IntoIterator<Item = (S, f64)>,
    S: Into<AssetId>,
{
    pairs.into_iter().map(|(a, w)| (a.into(), w)).collect()
}

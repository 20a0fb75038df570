//! Portfolio construction: signals to constrained target weights.

use crate::domain::error::RebalancerError;
use crate::domain::{AssetId, Signal, TargetWeights};
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::fmt;

/// What happens to the weight of a signalled asset that is not in the
/// universe on the rebalance date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Redistribution {
    /// Spread it over the surviving assets in proportion to their weights.
    #[default]
    ProRata,
    /// Leave it uninvested.
    Cash,
}

impl Redistribution {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "pro_rata" | "prorata" => Some(Redistribution::ProRata),
            "cash" => Some(Redistribution::Cash),
            _ => None,
        }
    }
}

impl fmt::Display for Redistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Redistribution::ProRata => write!(f, "pro rata"),
            Redistribution::Cash => write!(f, "cash"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstructionConfig {
    pub long_only: bool,
    /// Fraction of equity held back as cash, in `[0, 1)`.
    pub cash_buffer: f64,
    pub redistribution: Redistribution,
}

impl Default for ConstructionConfig {
    fn default() -> Self {
        ConstructionConfig {
            long_only: true,
            cash_buffer: 0.0,
            redistribution: Redistribution::ProRata,
        }
    }
}

impl ConstructionConfig {
    /// Largest total (long-only) or net exposure allowed.
    pub fn investable(&self) -> f64 {
        1.0 - self.cash_buffer
    }
}

/// Turn a signal into target weights for the given universe members.
///
/// Steps:
/// 1. Reject non-finite signal values
/// 2. Long-only: zero out negative weights; fail if exposure was asked for
///    on members but nothing positive remains
/// 3. Drop non-members, redistributing their weight per config
/// 4. Scale down so total (long-only) or net (long/short) exposure is
///    within `1 - cash_buffer`
pub fn construct_weights(
    signal: &Signal,
    members: &BTreeSet<AssetId>,
    config: &ConstructionConfig,
    date: NaiveDate,
) -> Result<TargetWeights, RebalancerError> {
    if let Some((asset, value)) = signal.iter().find(|(_, v)| !v.is_finite()) {
        return Err(RebalancerError::Allocation {
            date,
            reason: format!("signal for {asset} is not finite ({value})"),
        });
    }

    let (mut weights, mut dropped): (TargetWeights, TargetWeights) = signal
        .iter()
        .map(|(a, w)| (a.clone(), *w))
        .partition(|(a, _)| members.contains(a));

    if config.long_only {
        let mandated = weights.values().any(|w| *w != 0.0);
        for (asset, w) in weights.iter_mut() {
            if *w < 0.0 {
                log::warn!("{date}: dropping short weight {w} for {asset} in long-only portfolio");
                *w = 0.0;
            }
        }
        weights.retain(|_, w| *w > 0.0);
        if mandated && weights.is_empty() {
            return Err(RebalancerError::Allocation {
                date,
                reason: "all weights are non-positive in a long-only portfolio".to_string(),
            });
        }
        dropped.retain(|_, w| *w > 0.0);
    } else {
        weights.retain(|_, w| *w != 0.0);
        dropped.retain(|_, w| *w != 0.0);
    }

    redistribute(&mut weights, &dropped, config.redistribution, date);

    let total: f64 = weights.values().sum();
    if config.long_only {
        if total > config.investable() {
            let scale = config.investable() / total;
            weights.values_mut().for_each(|w| *w *= scale);
        }
    } else if total.abs() > config.investable() {
        let scale = config.investable() / total.abs();
        weights.values_mut().for_each(|w| *w *= scale);
    }

    Ok(weights)
}

/// Spread the gross weight of `dropped` over `weights` in proportion to
/// each survivor's gross weight, keeping signs.
fn redistribute(
    weights: &mut TargetWeights,
    dropped: &TargetWeights,
    redistribution: Redistribution,
    date: NaiveDate,
) {
    if dropped.is_empty() {
        return;
    }

    let dropped_gross: f64 = dropped.values().map(|w| w.abs()).sum();
    let kept_gross: f64 = weights.values().map(|w| w.abs()).sum();
    let names: Vec<&str> = dropped.keys().map(String::as_str).collect();

    match redistribution {
        Redistribution::ProRata if kept_gross > 0.0 => {
            let scale = (kept_gross + dropped_gross) / kept_gross;
            weights.values_mut().for_each(|w| *w *= scale);
            log::warn!(
                "{date}: {} not in universe, redistributing {dropped_gross:.4} pro rata",
                names.join(", ")
            );
        }
        _ => {
            log::warn!(
                "{date}: {} not in universe, leaving {dropped_gross:.4} in cash",
                names.join(", ")
            );
        }
    }
}

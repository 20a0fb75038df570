//! Core domain types and backtest engine.

use std::collections::BTreeMap;

pub mod error;
pub mod time_series;
pub mod universe;
pub mod alpha;
pub mod regime;
pub mod calendar;
pub mod construction;
pub mod position;
pub mod portfolio;
pub mod orders;
pub mod backtest;
pub mod metrics;
pub mod config_validation;

/// Class-prefixed instrument key, e.g. `EQ:SPY`.
pub type AssetId = String;

/// Scalar forecast per asset, produced fresh by each alpha model call.
pub type Signal = BTreeMap<AssetId, f64>;

/// Fraction of total equity per asset; absent assets have zero weight.
pub type TargetWeights = BTreeMap<AssetId, f64>;

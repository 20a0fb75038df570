//! Asset universes.
//!
//! Parses asset lists from configuration and provides the two membership
//! models the engine uses: a fixed set, and a set whose members join on
//! a given date.

use crate::domain::AssetId;
use crate::ports::universe_port::Universe;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashSet};

#[derive(Debug, Clone, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in asset list")]
    EmptyToken,

    #[error("duplicate asset: {0}")]
    DuplicateAsset(String),

    #[error("asset {0} is missing its class prefix (expected e.g. EQ:{0})")]
    MissingClassPrefix(String),
}

/// Parse a comma-separated list of class-prefixed assets (`EQ:SPY, EQ:AGG`).
///
/// Identifiers are upper-cased; order is preserved.
pub fn parse_assets(input: &str) -> Result<Vec<AssetId>, UniverseError> {
    let mut assets = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let asset = trimmed.to_uppercase();
        match asset.split_once(':') {
            Some((class, symbol)) if !class.is_empty() && !symbol.is_empty() => {}
            _ => return Err(UniverseError::MissingClassPrefix(asset)),
        }
        if !seen.insert(asset.clone()) {
            return Err(UniverseError::DuplicateAsset(asset));
        }
        assets.push(asset);
    }

    Ok(assets)
}

/// The symbol part of a class-prefixed asset id (`EQ:SPY` → `SPY`).
pub fn symbol_of(asset: &str) -> &str {
    asset.split_once(':').map(|(_, s)| s).unwrap_or(asset)
}

/// Same membership on every date.
#[derive(Debug, Clone)]
pub struct StaticUniverse {
    assets: BTreeSet<AssetId>,
}

impl StaticUniverse {
    pub fn new<I, S>(assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<AssetId>,
    {
        StaticUniverse {
            assets: assets.into_iter().map(Into::into).collect(),
        }
    }

    pub fn count(&self) -> usize {
        self.assets.len()
    }
}

impl Universe for StaticUniverse {
    fn members_at(&self, _date: NaiveDate) -> BTreeSet<AssetId> {
        self.assets.clone()
    }
}

/// Assets become members from their listing date onwards.
#[derive(Debug, Clone, Default)]
pub struct DynamicUniverse {
    listed_from: BTreeMap<AssetId, NaiveDate>,
}

impl DynamicUniverse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_asset(mut self, asset: impl Into<AssetId>, listed_from: NaiveDate) -> Self {
        self.listed_from.insert(asset.into(), listed_from);
        self
    }
}

impl Universe for DynamicUniverse {
    fn members_at(&self, date: NaiveDate) -> BTreeSet<AssetId> {
        self.listed_from
            .iter()
            .filter(|(_, from)| **from <= date)
            .map(|(asset, _)| asset.clone())
            .collect()
    }
}

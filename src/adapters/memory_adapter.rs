//! In-memory price store.
//!
//! Serves as both the price provider and the market calendar: the trading
//! days are the union of every asset's bar dates.

use crate::domain::AssetId;
use crate::domain::error::RebalancerError;
use crate::domain::time_series::TimeIndexed;
use crate::ports::calendar_port::MarketCalendar;
use crate::ports::price_port::PriceSeriesProvider;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default)]
pub struct InMemoryPriceAdapter {
    series: BTreeMap<AssetId, TimeIndexed<f64>>,
}

impl InMemoryPriceAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(mut self, asset: impl Into<AssetId>, date: NaiveDate, price: f64) -> Self {
        self.insert(asset, date, price);
        self
    }

    pub fn with_series<I>(mut self, asset: impl Into<AssetId>, prices: I) -> Self
    where
        I: IntoIterator<Item = (NaiveDate, f64)>,
    {
        self.series.insert(asset.into(), prices.into_iter().collect());
        self
    }

    pub fn insert(&mut self, asset: impl Into<AssetId>, date: NaiveDate, price: f64) {
        self.series.entry(asset.into()).or_default().insert(date, price);
    }

    pub fn assets(&self) -> impl Iterator<Item = &str> + '_ {
        self.series.keys().map(String::as_str)
    }

    pub fn series(&self, asset: &str) -> Option<&TimeIndexed<f64>> {
        self.series.get(asset)
    }

    /// `(date, close)` pairs for one asset in date order.
    pub fn closes(&self, asset: &str) -> Vec<(NaiveDate, f64)> {
        self.series
            .get(asset)
            .map(|s| s.iter().map(|(d, p)| (d, *p)).collect())
            .unwrap_or_default()
    }
}

impl PriceSeriesProvider for InMemoryPriceAdapter {
    fn price_at(&self, asset: &str, date: NaiveDate) -> Result<f64, RebalancerError> {
        self.series
            .get(asset)
            .and_then(|s| s.at_or_before(date))
            .map(|(_, price)| *price)
            .ok_or_else(|| RebalancerError::PriceUnavailable {
                asset: asset.to_string(),
                date,
            })
    }
}

impl MarketCalendar for InMemoryPriceAdapter {
    fn trading_days(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        let days: BTreeSet<NaiveDate> = self
            .series
            .values()
            .flat_map(|s| s.dates())
            .filter(|d| *d >= start && *d <= end)
            .collect();
        days.into_iter().collect()
    }
}

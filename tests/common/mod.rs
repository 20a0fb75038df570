#![allow(dead_code)]

use chrono::{Datelike, NaiveDate, Weekday};
use rebalancer::adapters::memory_adapter::InMemoryPriceAdapter;
use rebalancer::domain::AssetId;
use rebalancer::domain::backtest::BacktestConfig;
use rebalancer::domain::calendar::RebalanceFrequency;
use rebalancer::domain::error::RebalancerError;
use rebalancer::ports::calendar_port::MarketCalendar;
use rebalancer::ports::price_port::PriceSeriesProvider;
use std::collections::HashSet;

/// Price provider with injectable gaps on top of an in-memory store.
pub struct MockPriceProvider {
    pub prices: InMemoryPriceAdapter,
    pub gaps: HashSet<(AssetId, NaiveDate)>,
}

impl MockPriceProvider {
    pub fn new() -> Self {
        Self {
            prices: InMemoryPriceAdapter::new(),
            gaps: HashSet::new(),
        }
    }

    pub fn with_series(mut self, asset: &str, series: Vec<(NaiveDate, f64)>) -> Self {
        self.prices = self.prices.with_series(asset, series);
        self
    }

    pub fn with_gap(mut self, asset: &str, date: NaiveDate) -> Self {
        self.gaps.insert((asset.to_string(), date));
        self
    }
}

impl PriceSeriesProvider for MockPriceProvider {
    fn price_at(&self, asset: &str, date: NaiveDate) -> Result<f64, RebalancerError> {
        if self.gaps.contains(&(asset.to_string(), date)) {
            return Err(RebalancerError::PriceUnavailable {
                asset: asset.to_string(),
                date,
            });
        }
        self.prices.price_at(asset, date)
    }
}

impl MarketCalendar for MockPriceProvider {
    fn trading_days(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        self.prices.trading_days(start, end)
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn weekdays(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .collect()
}

/// Constant price on every weekday in `[start, end]`.
pub fn flat_series(price: f64, start: NaiveDate, end: NaiveDate) -> Vec<(NaiveDate, f64)> {
    weekdays(start, end).into_iter().map(|d| (d, price)).collect()
}

/// Price compounding by `daily_return` each weekday from `start_price`.
pub fn trending_series(
    start_price: f64,
    daily_return: f64,
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<(NaiveDate, f64)> {
    weekdays(start, end)
        .into_iter()
        .enumerate()
        .map(|(i, d)| (d, start_price * (1.0 + daily_return).powi(i as i32)))
        .collect()
}

/// Q1 2020 with default long-only settings.
pub fn q1_config(frequency: RebalanceFrequency) -> BacktestConfig {
    BacktestConfig::new(date(2020, 1, 1), date(2020, 3, 31), 100_000.0, frequency)
}

//! Portfolio ledger: cash, positions and valuation.
//!
//! The ledger is the only thing that mutates holdings. Orders are applied
//! one at a time at the provider's price for the order date.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use super::error::RebalancerError;
use super::orders::Order;
use super::position::Position;
use super::{AssetId, TargetWeights};
use crate::ports::price_port::PriceSeriesProvider;

/// Slack allowed before a long-only ledger's negative equity counts as a bug.
const EQUITY_TOLERANCE: f64 = 1e-6;

/// Relative float slack on the cash check, so a fully invested rebalance is
/// not refused over rounding in the last digit.
const CASH_ROUNDING: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerConfig {
    /// How far cash may go below zero before an order is refused.
    pub cash_tolerance: f64,
    pub long_only: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            cash_tolerance: 0.0,
            long_only: true,
        }
    }
}

/// An order as executed by the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub asset: AssetId,
    pub date: NaiveDate,
    pub quantity: f64,
    pub price: f64,
    /// Signed change in cash (negative for buys).
    pub cash_delta: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub cash: f64,
    pub initial_capital: f64,
    pub positions: BTreeMap<AssetId, Position>,
    config: LedgerConfig,
}

impl Portfolio {
    pub fn new(initial_capital: f64) -> Self {
        Self::with_config(initial_capital, LedgerConfig::default())
    }

    pub fn with_config(initial_capital: f64, config: LedgerConfig) -> Self {
        Portfolio {
            cash: initial_capital,
            initial_capital,
            positions: BTreeMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn get_position(&self, asset: &str) -> Option<&Position> {
        self.positions.get(asset)
    }

    pub fn has_position(&self, asset: &str) -> bool {
        self.positions.contains_key(asset)
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    /// Held quantity, zero when there is no position.
    pub fn quantity(&self, asset: &str) -> f64 {
        self.positions.get(asset).map_or(0.0, |p| p.quantity)
    }

    /// Revalue every position at `date` and return total equity.
    ///
    /// Quantities are untouched. Nothing is updated unless every held asset
    /// has a price.
    pub fn mark_to_market(
        &mut self,
        prices: &dyn PriceSeriesProvider,
        date: NaiveDate,
    ) -> Result<f64, RebalancerError> {
        let marks = self.price_positions(prices, date)?;
        for (asset, price) in marks {
            if let Some(pos) = self.positions.get_mut(&asset) {
                pos.last_price = Some(price);
                pos.marked_on = Some(date);
            }
        }
        self.total_equity(prices, date)
    }

    /// Cash plus the market value of all positions at `date`.
    ///
    /// # Panics
    ///
    /// On a long-only ledger, if the result is negative. Correctly sized
    /// orders can never get there.
    pub fn total_equity(
        &self,
        prices: &dyn PriceSeriesProvider,
        date: NaiveDate,
    ) -> Result<f64, RebalancerError> {
        let position_value: f64 = self
            .price_positions(prices, date)?
            .into_iter()
            .map(|(asset, price)| self.quantity(&asset) * price)
            .sum();
        let equity = self.cash + position_value;
        if self.config.long_only {
            assert!(
                equity >= -EQUITY_TOLERANCE,
                "negative equity {equity} on {date}: order sizing is broken"
            );
        }
        Ok(equity)
    }

    /// Current weight of each held asset at `date`.
    pub fn weights(
        &self,
        prices: &dyn PriceSeriesProvider,
        date: NaiveDate,
    ) -> Result<TargetWeights, RebalancerError> {
        let equity = self.total_equity(prices, date)?;
        if equity == 0.0 {
            return Ok(TargetWeights::new());
        }
        Ok(self
            .price_positions(prices, date)?
            .into_iter()
            .map(|(asset, price)| {
                let w = self.quantity(&asset) * price / equity;
                (asset, w)
            })
            .collect())
    }

    /// Execute `order` at the provider's price for the order date.
    ///
    /// Refuses, without touching state, orders that would take cash below
    /// `-cash_tolerance`. A position whose quantity lands on exactly zero
    /// is removed.
    pub fn apply(
        &mut self,
        order: &Order,
        prices: &dyn PriceSeriesProvider,
    ) -> Result<Fill, RebalancerError> {
        let price = prices.price_at(&order.asset, order.date)?;
        let cost = order.quantity * price;
        let new_cash = self.cash - cost;

        let slack = CASH_ROUNDING * (self.cash.abs() + cost.abs());
        if new_cash < -(self.config.cash_tolerance + slack) {
            return Err(RebalancerError::InsufficientCash {
                asset: order.asset.clone(),
                date: order.date,
                required: cost,
                available: self.cash,
            });
        }

        self.cash = new_cash;
        let position = self
            .positions
            .entry(order.asset.clone())
            .or_insert_with(|| Position::new(order.asset.clone()));
        position.fill(order.quantity, price);
        position.last_price = Some(price);
        position.marked_on = Some(order.date);
        if position.quantity == 0.0 {
            self.positions.remove(&order.asset);
        }

        Ok(Fill {
            asset: order.asset.clone(),
            date: order.date,
            quantity: order.quantity,
            price,
            cash_delta: -cost,
        })
    }

    fn price_positions(
        &self,
        prices: &dyn PriceSeriesProvider,
        date: NaiveDate,
    ) -> Result<Vec<(AssetId, f64)>, RebalancerError> {
        self.positions
            .keys()
            .map(|asset| Ok((asset.clone(), prices.price_at(asset, date)?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_adapter::InMemoryPriceAdapter;
    use approx::assert_abs_diff_eq;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, m, day).unwrap()
    }

    fn prices() -> InMemoryPriceAdapter {
        InMemoryPriceAdapter::new()
            .with_price("EQ:SPY", d(1, 2), 100.0)
            .with_price("EQ:SPY", d(1, 3), 110.0)
            .with_price("EQ:AGG", d(1, 2), 50.0)
    }

    fn order(asset: &str, quantity: f64, date: NaiveDate) -> Order {
        Order {
            asset: asset.to_string(),
            quantity,
            date,
        }
    }

    #[test]
    fn new_portfolio() {
        let portfolio = Portfolio::new(100_000.0);
        assert_abs_diff_eq!(portfolio.cash, 100_000.0);
        assert_abs_diff_eq!(portfolio.initial_capital, 100_000.0);
        assert!(portfolio.positions.is_empty());
        assert_eq!(portfolio.position_count(), 0);
    }

    #[test]
    fn apply_buy_moves_cash_into_position() {
        let mut portfolio = Portfolio::new(100_000.0);
        let fill = portfolio.apply(&order("EQ:SPY", 100.0, d(1, 2)), &prices()).unwrap();

        assert_abs_diff_eq!(fill.price, 100.0);
        assert_abs_diff_eq!(fill.cash_delta, -10_000.0);
        assert_abs_diff_eq!(portfolio.cash, 90_000.0);
        assert_abs_diff_eq!(portfolio.quantity("EQ:SPY"), 100.0);
        assert_abs_diff_eq!(portfolio.get_position("EQ:SPY").unwrap().cost_basis, 10_000.0);
    }

    #[test]
    fn apply_sell_to_exactly_zero_removes_position() {
        let mut portfolio = Portfolio::new(100_000.0);
        let p = prices();
        portfolio.apply(&order("EQ:SPY", 100.0, d(1, 2)), &p).unwrap();
        portfolio.apply(&order("EQ:SPY", -100.0, d(1, 3)), &p).unwrap();

        assert!(!portfolio.has_position("EQ:SPY"));
        assert_abs_diff_eq!(portfolio.cash, 101_000.0);
    }

    #[test]
    fn apply_refuses_order_beyond_cash() {
        let mut portfolio = Portfolio::new(1_000.0);
        let err = portfolio
            .apply(&order("EQ:SPY", 11.0, d(1, 2)), &prices())
            .unwrap_err();

        assert!(matches!(
            err,
            RebalancerError::InsufficientCash { ref asset, .. } if asset == "EQ:SPY"
        ));
        assert_abs_diff_eq!(portfolio.cash, 1_000.0);
        assert!(!portfolio.has_position("EQ:SPY"));
    }

    #[test]
    fn cash_tolerance_allows_small_overdraft() {
        let config = LedgerConfig {
            cash_tolerance: 100.0,
            ..Default::default()
        };
        let mut portfolio = Portfolio::with_config(1_000.0, config);
        portfolio.apply(&order("EQ:SPY", 11.0, d(1, 2)), &prices()).unwrap();
        assert_abs_diff_eq!(portfolio.cash, -100.0);
    }

    #[test]
    fn apply_without_price_fails() {
        let mut portfolio = Portfolio::new(1_000.0);
        let err = portfolio
            .apply(&order("EQ:GLD", 1.0, d(1, 2)), &prices())
            .unwrap_err();
        assert!(matches!(err, RebalancerError::PriceUnavailable { .. }));
    }

    #[test]
    fn mark_to_market_revalues_without_changing_quantity() {
        let mut portfolio = Portfolio::new(100_000.0);
        let p = prices();
        portfolio.apply(&order("EQ:SPY", 100.0, d(1, 2)), &p).unwrap();

        let equity = portfolio.mark_to_market(&p, d(1, 3)).unwrap();
        assert_abs_diff_eq!(equity, 101_000.0);
        let pos = portfolio.get_position("EQ:SPY").unwrap();
        assert_abs_diff_eq!(pos.quantity, 100.0);
        assert_eq!(pos.last_price, Some(110.0));
        assert_eq!(pos.marked_on, Some(d(1, 3)));
    }

    #[test]
    fn mark_to_market_forward_fills_missing_days() {
        let mut portfolio = Portfolio::new(10_000.0);
        let p = prices();
        portfolio.apply(&order("EQ:AGG", 100.0, d(1, 2)), &p).unwrap();
        let equity = portfolio.mark_to_market(&p, d(1, 10)).unwrap();
        assert_abs_diff_eq!(equity, 10_000.0);
    }

    #[test]
    fn mark_to_market_propagates_missing_price() {
        let mut portfolio = Portfolio::new(100_000.0);
        let p = prices();
        portfolio.apply(&order("EQ:SPY", 1.0, d(1, 2)), &p).unwrap();
        let err = portfolio.mark_to_market(&p, d(1, 1)).unwrap_err();
        assert!(matches!(err, RebalancerError::PriceUnavailable { ref asset, .. } if asset == "EQ:SPY"));
    }

    #[test]
    fn total_equity_no_positions() {
        let portfolio = Portfolio::new(100_000.0);
        let equity = portfolio.total_equity(&prices(), d(1, 2)).unwrap();
        assert_abs_diff_eq!(equity, 100_000.0);
    }

    #[test]
    fn weights_reflect_market_values() {
        let mut portfolio = Portfolio::new(100_000.0);
        let p = prices();
        portfolio.apply(&order("EQ:SPY", 250.0, d(1, 2)), &p).unwrap();
        portfolio.apply(&order("EQ:AGG", 500.0, d(1, 2)), &p).unwrap();

        let w = portfolio.weights(&p, d(1, 2)).unwrap();
        assert_abs_diff_eq!(w["EQ:SPY"], 0.25);
        assert_abs_diff_eq!(w["EQ:AGG"], 0.25);
    }

    #[test]
    #[should_panic(expected = "negative equity")]
    fn negative_equity_in_long_only_ledger_panics() {
        let config = LedgerConfig {
            cash_tolerance: f64::INFINITY,
            long_only: true,
        };
        let mut portfolio = Portfolio::with_config(0.0, config);
        let p = InMemoryPriceAdapter::new()
            .with_price("EQ:SPY", d(1, 2), 100.0)
            .with_price("EQ:SPY", d(1, 3), 0.0);
        portfolio.apply(&order("EQ:SPY", 10.0, d(1, 2)), &p).unwrap();
        let _ = portfolio.total_equity(&p, d(1, 3));
    }
}

//! Order generation: the trades that move a ledger onto target weights.

use chrono::NaiveDate;
use std::collections::BTreeSet;

use super::error::RebalancerError;
use super::portfolio::Portfolio;
use super::{AssetId, TargetWeights};
use crate::ports::price_port::PriceSeriesProvider;

/// Weight deltas this small are float noise, not trades.
const WEIGHT_NOISE_FLOOR: f64 = 1e-9;

/// Signed quantity to trade; positive buys, negative sells.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub asset: AssetId,
    pub quantity: f64,
    pub date: NaiveDate,
}

impl Order {
    pub fn is_buy(&self) -> bool {
        self.quantity > 0.0
    }

    pub fn is_sell(&self) -> bool {
        self.quantity < 0.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderGeneratorConfig {
    /// Weight deltas at or below this are left alone.
    pub min_trade_threshold: f64,
    pub long_only: bool,
}

impl Default for OrderGeneratorConfig {
    fn default() -> Self {
        OrderGeneratorConfig {
            min_trade_threshold: 0.0,
            long_only: true,
        }
    }
}

/// Orders for one rebalance, sells first, plus assets that could not be
/// priced and were left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderPlan {
    pub orders: Vec<Order>,
    pub deferred: Vec<AssetId>,
}

impl OrderPlan {
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

/// Compare current and target weights for every held or targeted asset
/// and size the orders that close the gap at `date` prices.
///
/// `total_equity` is the ledger's equity at `date`, passed in so the whole
/// plan is sized against one valuation.
pub fn generate_orders(
    portfolio: &Portfolio,
    prices: &dyn PriceSeriesProvider,
    targets: &TargetWeights,
    total_equity: f64,
    date: NaiveDate,
    config: &OrderGeneratorConfig,
) -> Result<OrderPlan, RebalancerError> {
    let assets: BTreeSet<&AssetId> = portfolio.positions.keys().chain(targets.keys()).collect();
    let threshold = config.min_trade_threshold.max(WEIGHT_NOISE_FLOOR);

    let mut plan = OrderPlan::default();
    let mut buys = Vec::new();

    for asset in assets {
        let price = match prices.price_at(asset, date) {
            Ok(p) => p,
            Err(RebalancerError::PriceUnavailable { .. }) => {
                log::warn!("{date}: no price for {asset}, deferring its rebalance");
                plan.deferred.push(asset.clone());
                continue;
            }
            Err(e) => return Err(e),
        };

        let held = portfolio.quantity(asset);
        let target = targets.get(asset).copied().unwrap_or(0.0);
        let current_ccy = held * price;
        let current = if total_equity > 0.0 {
            current_ccy / total_equity
        } else {
            0.0
        };

        if (target - current).abs() <= threshold {
            continue;
        }

        let mut quantity = if target == 0.0 {
            -held
        } else {
            (target * total_equity - current_ccy) / price
        };
        if config.long_only && quantity < 0.0 {
            quantity = quantity.max(-held.max(0.0));
        }
        if quantity == 0.0 || !quantity.is_finite() {
            continue;
        }

        let order = Order {
            asset: asset.clone(),
            quantity,
            date,
        };
        if order.is_sell() {
            plan.orders.push(order);
        } else {
            buys.push(order);
        }
    }

    plan.orders.extend(buys);
    Ok(plan)
}

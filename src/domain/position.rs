//! Position held by the portfolio ledger.

use crate::domain::AssetId;
use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub asset: AssetId,
    /// Signed, possibly fractional; negative means short.
    pub quantity: f64,
    /// Total amount paid for the current quantity (average-cost method).
    pub cost_basis: f64,
    /// Price and date of the most recent mark to market.
    pub last_price: Option<f64>,
    pub marked_on: Option<NaiveDate>,
}

impl Position {
    pub fn new(asset: impl Into<AssetId>) -> Self {
        Position {
            asset: asset.into(),
            quantity: 0.0,
            cost_basis: 0.0,
            last_price: None,
            marked_on: None,
        }
    }

    pub fn is_long(&self) -> bool {
        self.quantity > 0.0
    }

    pub fn is_short(&self) -> bool {
        self.quantity < 0.0
    }

    /// Signed value at `price`; shorts are worth a negative amount.
    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity * price
    }

    pub fn average_cost(&self) -> f64 {
        if self.quantity == 0.0 {
            0.0
        } else {
            self.cost_basis / self.quantity
        }
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.market_value(price) - self.cost_basis
    }

    /// Add `quantity` (signed) filled at `price`, keeping cost basis on an
    /// average-cost footing.
    pub fn fill(&mut self, quantity: f64, price: f64) {
        let old = self.quantity;
        let new = old + quantity;

        if old == 0.0 || old.signum() == quantity.signum() {
            self.cost_basis += quantity * price;
        } else if new == 0.0 {
            self.cost_basis = 0.0;
        } else if new.signum() == old.signum() {
            self.cost_basis *= new / old;
        } else {
            self.cost_basis = new * price;
        }
        self.quantity = new;
    }
}

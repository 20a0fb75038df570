//! Price series access port trait.

use crate::domain::error::RebalancerError;
use chrono::NaiveDate;

/// Read-only source of daily close prices.
///
/// `price_at` forward-fills: it returns the most recent close at or before
/// `date`, and fails with [`RebalancerError::PriceUnavailable`] when the
/// asset has no price that early.
pub trait PriceSeriesProvider: Send + Sync {
    fn price_at(&self, asset: &str, date: NaiveDate) -> Result<f64, RebalancerError>;
}

//! Market calendar port trait.

use chrono::NaiveDate;

/// Trading-day sequence of the market a universe trades on.
pub trait MarketCalendar: Send + Sync {
    /// Trading days within `[start, end]`, strictly increasing.
    fn trading_days(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate>;
}

//! Universe membership port trait.

use crate::domain::AssetId;
use chrono::NaiveDate;
use std::collections::BTreeSet;

pub trait Universe: Send + Sync {
    fn members_at(&self, date: NaiveDate) -> BTreeSet<AssetId>;
}

//! CSV daily bar adapter.
//!
//! Reads one `<SYMBOL>.csv` per asset from a directory. Files need a `Date`
//! column and an `Adj Close` or `Close` column; other columns are ignored.

use crate::adapters::memory_adapter::InMemoryPriceAdapter;
use crate::domain::error::RebalancerError;
use crate::domain::universe::symbol_of;
use chrono::NaiveDate;
use csv::StringRecord;
use std::fs;
use std::path::{Path, PathBuf};

pub struct CsvPriceAdapter {
    base_path: PathBuf,
}

impl CsvPriceAdapter {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// `EQ:SPY` is read from `SPY.csv`.
    pub fn csv_path(&self, asset: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", symbol_of(asset)))
    }

    /// Load every asset's closes into one in-memory store.
    pub fn load<S: AsRef<str>>(&self, assets: &[S]) -> Result<InMemoryPriceAdapter, RebalancerError> {
        let mut prices = InMemoryPriceAdapter::new();
        for asset in assets {
            let asset = asset.as_ref();
            let closes = self.fetch_closes(asset)?;
            log::info!("loaded {} bars for {asset}", closes.len());
            prices = prices.with_series(asset, closes);
        }
        Ok(prices)
    }

    /// Date-ordered closes for one asset.
    pub fn fetch_closes(&self, asset: &str) -> Result<Vec<(NaiveDate, f64)>, RebalancerError> {
        let path = self.csv_path(asset);
        let content = fs::read_to_string(&path).map_err(|e| RebalancerError::Data {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;
        let mut closes = parse_closes(&content, &path)?;
        closes.sort_by_key(|(d, _)| *d);
        Ok(closes)
    }
}

struct Columns {
    date: usize,
    close: usize,
}

impl Columns {
    fn locate(headers: &StringRecord, path: &Path) -> Result<Self, RebalancerError> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };
        let date = find("date").ok_or_else(|| RebalancerError::Data {
            reason: format!("{}: missing Date column", path.display()),
        })?;
        let close = find("adj close")
            .or_else(|| find("close"))
            .ok_or_else(|| RebalancerError::Data {
                reason: format!("{}: missing Adj Close or Close column", path.display()),
            })?;
        Ok(Columns { date, close })
    }
}

fn parse_closes(content: &str, path: &Path) -> Result<Vec<(NaiveDate, f64)>, RebalancerError> {
    let mut rdr = csv::Reader::from_reader(content.as_bytes());
    let headers = rdr.headers().map_err(|e| RebalancerError::Data {
        reason: format!("{}: CSV header error: {}", path.display(), e),
    })?;
    let cols = Columns::locate(headers, path)?;

    let mut closes = Vec::new();
    for (line, result) in rdr.records().enumerate() {
        let record = result.map_err(|e| RebalancerError::Data {
            reason: format!("{}: CSV parse error: {}", path.display(), e),
        })?;

        let date_str = record.get(cols.date).unwrap_or_default().trim();
        let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").map_err(|e| {
            RebalancerError::Data {
                reason: format!(
                    "{} row {}: invalid date '{}': {}",
                    path.display(),
                    line + 2,
                    date_str,
                    e
                ),
            }
        })?;

        let close_str = record.get(cols.close).unwrap_or_default().trim();
        if close_str.is_empty() || close_str.eq_ignore_ascii_case("null") {
            log::warn!("{}: no close on {date}, skipping row", path.display());
            continue;
        }
        let close: f64 = close_str.parse().map_err(|e| RebalancerError::Data {
            reason: format!(
                "{} row {}: invalid close '{}': {}",
                path.display(),
                line + 2,
                close_str,
                e
            ),
        })?;
        if !close.is_finite() || close <= 0.0 {
            return Err(RebalancerError::Data {
                reason: format!("{}: non-positive close {close} on {date}", path.display()),
            });
        }

        closes.push((date, close));
    }

    Ok(closes)
}

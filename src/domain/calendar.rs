//! Rebalance calendar.
//!
//! Precomputes, once per run, the ordered set of trading days on which the
//! portfolio may be reallocated.

use crate::domain::error::RebalancerError;
use chrono::{Datelike, NaiveDate, Weekday};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebalanceFrequency {
    /// Last trading day of each calendar month.
    EndOfMonth,
    /// Once a week, on the named weekday or the latest trading day before it.
    Weekly(Weekday),
    /// Every n-th trading day, starting with the first.
    EveryNDays(usize),
    /// A single allocation on the first day.
    BuyAndHold,
}

impl RebalanceFrequency {
    /// Parse a frequency descriptor with its optional qualifiers.
    ///
    /// `weekday` is required for `weekly`, `interval` for `every_n_days`.
    pub fn parse(
        descriptor: &str,
        weekday: Option<&str>,
        interval: Option<i64>,
    ) -> Result<Self, RebalancerError> {
        match descriptor.trim().to_lowercase().as_str() {
            "end_of_month" => Ok(RebalanceFrequency::EndOfMonth),
            "weekly" => {
                let wd = weekday.ok_or_else(|| {
                    RebalancerError::configuration("weekly rebalance requires a weekday")
                })?;
                Ok(RebalanceFrequency::Weekly(parse_weekday(wd)?))
            }
            "daily" => Ok(RebalanceFrequency::EveryNDays(1)),
            "every_n_days" => match interval {
                Some(n) if n >= 1 => Ok(RebalanceFrequency::EveryNDays(n as usize)),
                Some(n) => Err(RebalancerError::configuration(format!(
                    "rebalance interval must be at least 1 trading day, got {n}"
                ))),
                None => Err(RebalancerError::configuration(
                    "every_n_days rebalance requires an interval",
                )),
            },
            "buy_and_hold" | "none" => Ok(RebalanceFrequency::BuyAndHold),
            other => Err(RebalancerError::configuration(format!(
                "unrecognized rebalance frequency '{other}'"
            ))),
        }
    }
}

impl fmt::Display for RebalanceFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebalanceFrequency::EndOfMonth => write!(f, "end of month"),
            RebalanceFrequency::Weekly(wd) => write!(f, "weekly ({wd})"),
            RebalanceFrequency::EveryNDays(1) => write!(f, "daily"),
            RebalanceFrequency::EveryNDays(n) => write!(f, "every {n} trading days"),
            RebalanceFrequency::BuyAndHold => write!(f, "buy and hold"),
        }
    }
}

pub fn parse_weekday(value: &str) -> Result<Weekday, RebalancerError> {
    let wd = match value.trim().to_uppercase().as_str() {
        "MON" | "MONDAY" => Weekday::Mon,
        "TUE" | "TUESDAY" => Weekday::Tue,
        "WED" | "WEDNESDAY" => Weekday::Wed,
        "THU" | "THURSDAY" => Weekday::Thu,
        "FRI" | "FRIDAY" => Weekday::Fri,
        "SAT" | "SATURDAY" => Weekday::Sat,
        "SUN" | "SUNDAY" => Weekday::Sun,
        other => {
            return Err(RebalancerError::configuration(format!(
                "unrecognized weekday '{other}'"
            )));
        }
    };
    Ok(wd)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebalanceCalendar {
    dates: BTreeSet<NaiveDate>,
}

impl RebalanceCalendar {
    /// Build the rebalance dates within `[start, end]`.
    ///
    /// `trading_days` may extend past either bound; month and week ends are
    /// resolved against the full sequence before clipping. The final month
    /// or week of the sequence only counts once it is known to be over: a
    /// later trading day exists, or the candidate already falls on the
    /// month's last business day (the target weekday for weekly).
    pub fn build(
        start: NaiveDate,
        end: NaiveDate,
        frequency: RebalanceFrequency,
        trading_days: &[NaiveDate],
    ) -> Result<Self, RebalancerError> {
        if start > end {
            return Err(RebalancerError::configuration(format!(
                "start date {start} is after end date {end}"
            )));
        }

        let days: BTreeSet<NaiveDate> = trading_days.iter().copied().collect();
        let in_range = |d: &NaiveDate| *d >= start && *d <= end;
        let last_known = days.last().copied();
        let followed = |d: &NaiveDate| last_known.is_some_and(|last| last > *d);

        let dates: BTreeSet<NaiveDate> = match frequency {
            RebalanceFrequency::EndOfMonth => last_per_group(&days, |d| (d.year(), d.month()))
                .filter(|d| followed(d) || *d >= last_business_day(*d))
                .filter(in_range)
                .collect(),
            RebalanceFrequency::Weekly(weekday) => {
                let cutoff = weekday.num_days_from_monday();
                let eligible: BTreeSet<NaiveDate> = days
                    .iter()
                    .copied()
                    .filter(|d| d.weekday().num_days_from_monday() <= cutoff)
                    .collect();
                last_per_group(&eligible, |d| {
                    let week = d.iso_week();
                    (week.year(), week.week())
                })
                .filter(|d| followed(d) || d.weekday() == weekday)
                .filter(in_range)
                .collect()
            }
            RebalanceFrequency::EveryNDays(0) => {
                return Err(RebalancerError::configuration(
                    "rebalance interval must be at least 1 trading day",
                ));
            }
            RebalanceFrequency::EveryNDays(n) => {
                days.iter().copied().filter(in_range).step_by(n).collect()
            }
            RebalanceFrequency::BuyAndHold => {
                let first = days.iter().copied().find(in_range).unwrap_or(start);
                BTreeSet::from([first])
            }
        };

        Ok(RebalanceCalendar { dates })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.dates.contains(&date)
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.dates.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

/// Last calendar day of `date`'s month.
pub fn month_end(date: NaiveDate) -> NaiveDate {
    let (y, m) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(y, m, 1)
        .and_then(|first| first.pred_opt())
        .unwrap_or(date)
}

/// Last Monday-to-Friday day of `date`'s month.
fn last_business_day(date: NaiveDate) -> NaiveDate {
    let mut day = month_end(date);
    while matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
        match day.pred_opt() {
            Some(prev) => day = prev,
            None => break,
        }
    }
    day
}

/// Last date of each consecutive run of dates sharing the same key.
fn last_per_group<'a, K, F>(
    days: &'a BTreeSet<NaiveDate>,
    key: F,
) -> impl Iterator<Item = NaiveDate> + 'a
where
    K: PartialEq + 'a,
    F: Fn(&NaiveDate) -> K + 'a,
{
    let mut iter = days.iter().copied().peekable();
    std::iter::from_fn(move || {
        while let Some(day) = iter.next() {
            match iter.peek() {
                Some(next) if key(next) == key(&day) => continue,
                _ => return Some(day),
            }
        }
        None
    })
}

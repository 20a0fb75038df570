//! Date-ordered series with forward-fill lookup.
//!
//! Entries are kept sorted by date so "the most recent value at or before
//! `date`" is a binary search rather than a scan.

use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub struct TimeIndexed<T> {
    entries: Vec<(NaiveDate, T)>,
}

impl<T> Default for TimeIndexed<T> {
    fn default() -> Self {
        TimeIndexed {
            entries: Vec::new(),
        }
    }
}

impl<T> TimeIndexed<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the value at `date`.
    pub fn insert(&mut self, date: NaiveDate, value: T) {
        match self.entries.binary_search_by_key(&date, |(d, _)| *d) {
            Ok(i) => self.entries[i].1 = value,
            Err(i) => self.entries.insert(i, (date, value)),
        }
    }

    /// The most recent entry at or before `date`.
    pub fn at_or_before(&self, date: NaiveDate) -> Option<(NaiveDate, &T)> {
        let idx = self.entries.partition_point(|(d, _)| *d <= date);
        if idx == 0 {
            return None;
        }
        let (d, v) = &self.entries[idx - 1];
        Some((*d, v))
    }

    pub fn get(&self, date: NaiveDate) -> Option<&T> {
        self.entries
            .binary_search_by_key(&date, |(d, _)| *d)
            .ok()
            .map(|i| &self.entries[i].1)
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.entries.iter().map(|(d, _)| *d)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, &T)> + '_ {
        self.entries.iter().map(|(d, v)| (*d, v))
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.entries.first().map(|(d, _)| *d)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.entries.last().map(|(d, _)| *d)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> FromIterator<(NaiveDate, T)> for TimeIndexed<T> {
    fn from_iter<I: IntoIterator<Item = (NaiveDate, T)>>(iter: I) -> Self {
        let mut entries: Vec<(NaiveDate, T)> = iter.into_iter().collect();
        entries.sort_by_key(|(d, _)| *d);
        // Later duplicates win, matching repeated `insert`.
        let mut deduped: Vec<(NaiveDate, T)> = Vec::with_capacity(entries.len());
        for (date, value) in entries {
            match deduped.last_mut() {
                Some(last) if last.0 == date => last.1 = value,
                _ => deduped.push((date, value)),
            }
        }
        TimeIndexed { entries: deduped }
    }
}

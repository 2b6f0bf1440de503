//! Reporting slots: the current month and the three before it

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::Serialize;

use crate::types::{MonthKey, RawRow, ReportingEntry, RobotKey, YearMonth};

/// Reporting rows of one month, indexed by robot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportingSlot {
    pub key: MonthKey,
    pub year_month: YearMonth,
    /// French month name
    pub label: &'static str,
    #[serde(skip)]
    pub entries: BTreeMap<RobotKey, ReportingEntry>,
}

impl ReportingSlot {
    /// Index `rows` fetched for `year_month`. Rows that fail to map, or that
    /// belong to another month, are skipped. A duplicated robot keeps its
    /// last row.
    pub fn from_rows(key: MonthKey, year_month: YearMonth, rows: &[RawRow]) -> Self {
        let entries = rows
            .iter()
            .filter_map(|r| ReportingEntry::from_row(r, year_month))
            .filter(|e| e.year_month == year_month)
            .map(|e| (e.key.clone(), e))
            .collect();
        Self {
            key,
            year_month,
            label: year_month.french_label(),
            entries,
        }
    }

    pub fn entry(&self, key: &RobotKey) -> Option<&ReportingEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The four month slots, always complete.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportingData {
    slots: [ReportingSlot; 4],
}

impl ReportingData {
    pub fn new(slots: [ReportingSlot; 4]) -> Self {
        Self { slots }
    }

    /// Slot for a month key; unknown keys were already folded into `N`
    /// by [`MonthKey::parse`].
    pub fn get_reporting_data(&self, key: MonthKey) -> &ReportingSlot {
        &self.slots[key.offset()]
    }

    pub fn slots(&self) -> &[ReportingSlot; 4] {
        &self.slots
    }

    /// `(key, label)` pairs in `N`..`N-3` order.
    pub fn month_labels(&self) -> Vec<(MonthKey, &'static str)> {
        self.slots.iter().map(|s| (s.key, s.label)).collect()
    }

    /// Agency codes present in any slot.
    pub fn reported_agencies(&self) -> BTreeSet<&str> {
        self.slots
            .iter()
            .flat_map(|s| s.entries.keys())
            .map(|k| k.agency.as_str())
            .collect()
    }
}

/// The four year-months loaded on `today`, `N` first.
pub fn reporting_months(today: NaiveDate) -> [(MonthKey, YearMonth); 4] {
    let current = YearMonth::reporting_month(today);
    MonthKey::ALL.map(|key| (key, current.back(key.offset() as u32)))
}

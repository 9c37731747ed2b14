//! Cycle record normalization
//!
//! Turns the raw, possibly duplicated list of user-entered cycles into an
//! ordered window with at most one cycle per calendar month.

use crate::error::WellnessError;
use crate::models::CycleRecord;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;
use tracing::debug;

/// Maximum number of most recent cycles kept for derivation
pub const MAX_CYCLES: usize = 12;

/// Minimum number of cycles needed to compute any cycle length
pub const MIN_CYCLES: usize = 2;

/// A cycle with parsed dates, ready for metric derivation
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedCycle {
    pub month_key: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub intensity: Option<u8>,
}

impl NormalizedCycle {
    /// Inclusive number of bleeding days
    pub fn menses_days(&self) -> i64 {
        days_between(self.start, self.end) + 1
    }
}

/// Ordered, month-unique window of cycles
///
/// Same-month duplicates are resolved by comparing `updatedAt` (or
/// `createdAt`) as plain strings. This is only meaningful for ISO-8601
/// timestamps; other formats produce an unspecified winner.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedCycleSet {
    cycles: Vec<NormalizedCycle>,
}

impl NormalizedCycleSet {
    pub fn cycles(&self) -> &[NormalizedCycle] {
        &self.cycles
    }

    pub fn len(&self) -> usize {
        self.cycles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cycles.is_empty()
    }
}

/// Normalize with the default window of twelve cycles
pub fn normalize(records: &[CycleRecord]) -> Result<NormalizedCycleSet, WellnessError> {
    normalize_with_limit(records, MAX_CYCLES)
}

/// Filter, deduplicate by month, sort and truncate to the `max_cycles` most recent
pub fn normalize_with_limit(
    records: &[CycleRecord],
    max_cycles: usize,
) -> Result<NormalizedCycleSet, WellnessError> {
    // BTreeMap keeps month keys in ascending order
    let mut by_month: BTreeMap<String, (&CycleRecord, NormalizedCycle)> = BTreeMap::new();

    for record in records {
        let Some(cycle) = parse_cycle(record) else {
            debug!(
                start = ?record.start_date,
                end = ?record.end_date,
                "Dropping incomplete or inverted cycle record"
            );
            continue;
        };

        match by_month.get(&cycle.month_key) {
            Some((kept, _)) if kept.revision() > record.revision() => {
                debug!(month = %cycle.month_key, "Keeping newer duplicate for month");
            }
            _ => {
                by_month.insert(cycle.month_key.clone(), (record, cycle));
            }
        }
    }

    let mut cycles: Vec<NormalizedCycle> = by_month.into_values().map(|(_, c)| c).collect();
    if cycles.len() > max_cycles {
        cycles.drain(..cycles.len() - max_cycles);
    }

    if cycles.len() < MIN_CYCLES {
        return Err(WellnessError::InsufficientData {
            cycles: cycles.len(),
        });
    }

    Ok(NormalizedCycleSet { cycles })
}

fn parse_cycle(record: &CycleRecord) -> Option<NormalizedCycle> {
    let start = parse_calendar_date(record.start_date.as_deref()?)?;
    let end = parse_calendar_date(record.end_date.as_deref()?)?;
    if end < start {
        return None;
    }
    let month_key = match record.explicit_month_key() {
        Some(key) => key.to_string(),
        None => start.format("%Y-%m").to_string(),
    };
    Some(NormalizedCycle {
        month_key,
        start,
        end,
        intensity: record.intensity,
    })
}

/// Accepts `YYYY-MM-DD` or an ISO-8601 date-time, keeping only the date
pub fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|dt| dt.date())
}

/// Signed whole days from `from` to `to`
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

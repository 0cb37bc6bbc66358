//! Month snapshots: prefill derivation from shift history and the
//! timestamp arithmetic the store applies to saved cells.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use super::model::{WorkerId, YearMonth};
use super::time::format_clock;
use crate::api::DayEntry;

/// Half of a 24-hour club day as filed in a cashier report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    Day,
    Night,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftReport {
    pub user_id: WorkerId,
    pub date: NaiveDate,
    pub kind: ReportKind,
}

/// A persisted shift with absolute bounds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftRecord {
    pub user_id: WorkerId,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl ShiftRecord {
    pub fn date(&self) -> NaiveDate {
        self.start.date()
    }

    /// Cell tokens for this shift. A shift ending on a later date reads back
    /// as a double shift.
    pub fn to_day_entry(&self) -> DayEntry {
        DayEntry {
            start: format_clock(self.start.hour() * 60 + self.start.minute()),
            end: format_clock(self.end.hour() * 60 + self.end.minute()),
            both: self.end.date() != self.start.date(),
        }
    }
}

pub const DAY_SHIFT_START: &str = "10:00";
pub const NIGHT_SHIFT_START: &str = "22:00";

/// Cell tokens implied by the report halves filed for one day
pub fn entry_from_reports(kinds: &BTreeSet<ReportKind>) -> Option<DayEntry> {
    let day = kinds.contains(&ReportKind::Day);
    let night = kinds.contains(&ReportKind::Night);
    let (start, end, both) = match (day, night) {
        (true, true) => (DAY_SHIFT_START, DAY_SHIFT_START, true),
        (true, false) => (DAY_SHIFT_START, NIGHT_SHIFT_START, false),
        (false, true) => (NIGHT_SHIFT_START, DAY_SHIFT_START, false),
        (false, false) => return None,
    };
    Some(DayEntry {
        start: start.to_string(),
        end: end.to_string(),
        both,
    })
}

pub fn prefill_key(worker_id: WorkerId, date: NaiveDate) -> String {
    format!("{}:{}", worker_id, date.format("%Y-%m-%d"))
}

pub fn parse_prefill_key(key: &str) -> Option<(WorkerId, NaiveDate)> {
    let (uid, date) = key.split_once(':')?;
    let uid = uid.trim().parse::<WorkerId>().ok()?;
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok()?;
    Some((uid, date))
}

/// Prefill for a month: report-derived entries, overridden by saved shifts
pub fn build_prefill(
    month: YearMonth,
    reports: &[ShiftReport],
    shifts: &[ShiftRecord],
) -> BTreeMap<String, DayEntry> {
    let mut kinds: HashMap<(WorkerId, NaiveDate), BTreeSet<ReportKind>> = HashMap::new();
    for report in reports.iter().filter(|r| month.contains(r.date)) {
        kinds.entry((report.user_id, report.date)).or_default().insert(report.kind);
    }

    let mut prefill = BTreeMap::new();
    for ((uid, date), set) in &kinds {
        if let Some(entry) = entry_from_reports(set) {
            prefill.insert(prefill_key(*uid, *date), entry);
        }
    }

    for shift in shifts.iter().filter(|s| month.contains(s.date())) {
        prefill.insert(prefill_key(shift.user_id, shift.date()), shift.to_day_entry());
    }

    prefill
}

/// Absolute bounds of a cell saved for `date`.
///
/// A double shift whose end is not before its start ends on the next day.
/// Otherwise the end moves to the next day when it is not after the start.
pub fn shift_bounds(
    date: NaiveDate,
    start_minutes: u32,
    end_minutes: u32,
    both: bool,
) -> (NaiveDateTime, NaiveDateTime) {
    let midnight = date.and_time(chrono::NaiveTime::MIN);
    let start = midnight + Duration::minutes(start_minutes as i64);
    let mut end = midnight + Duration::minutes(end_minutes as i64);
    if both && end_minutes >= start_minutes {
        end += Duration::days(1);
    } else if end_minutes <= start_minutes {
        end += Duration::days(1);
    }
    (start, end)
}

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, Local, Months, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::aggregate::{aggregate, RowTotals};
use super::time::TimeParser;

pub type WorkerId = i64;

/// A calendar month, written "YYYY-MM" on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    /// A month whose first day and the first day of the month after both
    /// exist in chrono's calendar
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1)?;
        let (next_year, next_month) = if month == 12 { (year.checked_add(1)?, 1) } else { (year, month + 1) };
        NaiveDate::from_ymd_opt(next_year, next_month, 1)?;
        Some(Self { year, month })
    }

    pub fn current() -> Self {
        let today = Local::now().date_naive();
        // The wall clock never reaches chrono's last month
        Self::new(today.year(), today.month()).unwrap_or(Self { year: 1970, month: 1 })
    }

    /// Parse "YYYY-MM", falling back to the current month for anything else
    pub fn parse_or_current(text: Option<&str>) -> Self {
        text.and_then(|t| t.parse().ok()).unwrap_or_else(Self::current)
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn first_day(&self) -> NaiveDate {
        // Constructors only admit valid months
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or_default()
    }

    /// Following month; stays put at the last month `new` admits
    pub fn next(&self) -> Self {
        let (year, month) = if self.month == 12 { (self.year.saturating_add(1), 1) } else { (self.year, self.month + 1) };
        Self::new(year, month).unwrap_or(*self)
    }

    /// Previous month; stays put at the first month `new` admits
    pub fn prev(&self) -> Self {
        let (year, month) = if self.month == 1 { (self.year.saturating_sub(1), 12) } else { (self.year, self.month - 1) };
        Self::new(year, month).unwrap_or(*self)
    }

    /// First day of this month (inclusive) and of the next (exclusive)
    pub fn bounds(&self) -> (NaiveDate, NaiveDate) {
        let start = self.first_day();
        let end = start.checked_add_months(Months::new(1)).unwrap_or(start);
        (start, end)
    }

    pub fn day_count(&self) -> usize {
        let (start, end) = self.bounds();
        usize::try_from((end - start).num_days()).unwrap_or(0)
    }

    pub fn days(&self) -> Vec<NaiveDate> {
        let start = self.first_day();
        (0..self.day_count())
            .map(|i| start + Duration::days(i as i64))
            .collect()
    }

    /// Date of a 0-based day index within the month
    pub fn date(&self, day_index: usize) -> Option<NaiveDate> {
        if day_index >= self.day_count() {
            return None;
        }
        Some(self.first_day() + Duration::days(day_index as i64))
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (y, m) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| format!("expected YYYY-MM, got {:?}", s))?;
        let year = y.parse::<i32>().map_err(|e| format!("bad year {:?}: {}", y, e))?;
        let month = m.parse::<u32>().map_err(|e| format!("bad month {:?}: {}", m, e))?;
        YearMonth::new(year, month).ok_or_else(|| format!("month out of range: {}", s))
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for YearMonth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Start,
    End,
}

/// One worker's shift on one calendar day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    start: String,
    end: String,
    double_shift: bool,
    span: Option<u32>,
    // Tokens and flag last loaded from or sent to the store
    committed: (String, String, bool),
    // The last send failed, so the next completion sends again
    resend: bool,
}

impl Cell {
    pub fn blank() -> Self {
        Self {
            start: String::new(),
            end: String::new(),
            double_shift: false,
            span: None,
            committed: (String::new(), String::new(), false),
            resend: false,
        }
    }

    /// Build a cell from persisted tokens, normalized for display
    pub fn loaded(start: &str, end: &str, double_shift: bool, parser: &TimeParser) -> Self {
        let mut cell = Self {
            start: start.to_string(),
            end: end.to_string(),
            double_shift,
            ..Self::blank()
        };
        cell.complete(parser);
        cell.mark_committed();
        cell
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    pub fn end(&self) -> &str {
        &self.end
    }

    pub fn double_shift(&self) -> bool {
        self.double_shift
    }

    /// Worked minutes as of the last completed edit
    pub fn span(&self) -> Option<u32> {
        self.span
    }

    pub fn text(&self, side: Side) -> &str {
        match side {
            Side::Start => &self.start,
            Side::End => &self.end,
        }
    }

    /// Replace the raw text of one side while it is being typed
    pub fn set_text(&mut self, side: Side, text: String) {
        match side {
            Side::Start => self.start = text,
            Side::End => self.end = text,
        }
    }

    /// Flip the double-shift flag; this completes the cell
    pub fn set_double_shift(&mut self, double_shift: bool, parser: &TimeParser) {
        self.double_shift = double_shift;
        self.complete(parser);
    }

    /// Normalize both sides and recompute the span in one step
    pub fn complete(&mut self, parser: &TimeParser) {
        self.start = parser.normalize(&self.start);
        self.end = parser.normalize(&self.end);
        self.span = parser.span(&self.start, &self.end, self.double_shift);
    }

    pub fn is_blank(&self) -> bool {
        self.start.trim().is_empty() && self.end.trim().is_empty()
    }

    /// Exactly one side filled in
    pub fn is_half_filled(&self) -> bool {
        self.start.trim().is_empty() != self.end.trim().is_empty()
    }

    /// Whether the last committed tokens had both sides, i.e. the store may
    /// hold a record for this day
    pub fn has_stored_value(&self) -> bool {
        !self.committed.0.trim().is_empty() && !self.committed.1.trim().is_empty()
    }

    pub fn has_uncommitted_change(&self) -> bool {
        self.resend
            || self.committed.0 != self.start
            || self.committed.1 != self.end
            || self.committed.2 != self.double_shift
    }

    pub fn mark_committed(&mut self) {
        self.committed = (self.start.clone(), self.end.clone(), self.double_shift);
        self.resend = false;
    }

    /// The last committed values never reached the store
    pub fn mark_send_failed(&mut self) {
        self.resend = true;
    }
}

/// A worker's line in the month grid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub worker_id: WorkerId,
    pub name: String,
    pub editable: bool,
    pub cells: Vec<Cell>,
}

impl Row {
    /// Month totals, always derived from the current cells
    pub fn totals(&self) -> RowTotals {
        aggregate(self.cells.iter().map(Cell::span))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleMonth {
    pub month: YearMonth,
    pub rows: Vec<Row>,
}

impl ScheduleMonth {
    pub fn row(&self, worker_id: WorkerId) -> Option<&Row> {
        self.rows.iter().find(|r| r.worker_id == worker_id)
    }

    pub fn row_index(&self, worker_id: WorkerId) -> Option<usize> {
        self.rows.iter().position(|r| r.worker_id == worker_id)
    }
}

/// Identity of a cell across reloads: worker and calendar date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellKey {
    pub worker_id: WorkerId,
    pub date: NaiveDate,
}

//! The month grid: rows of cells plus the rules for editing them.
//!
//! Handlers are plain state transitions. They mutate the grid and return the
//! effects the front-end must carry out (saves for the autosaver, focus moves
//! for the widgets); nothing here talks to the store.

use std::collections::BTreeMap;

use chrono::Datelike;
use tracing::{debug, warn};

use super::aggregate::RowTotals;
use super::model::{Cell, CellKey, Row, ScheduleMonth, Side, WorkerId, YearMonth};
use super::permission::PermissionContext;
use super::snapshot::parse_prefill_key;
use super::time::TimeParser;
use crate::api::{BulkRow, BulkSaveRequest, DayEntry, MonthSnapshot, SaveCellRequest};

/// One time field: row index, 0-based day of month and side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub row: usize,
    pub day: usize,
    pub side: Side,
}

impl FieldRef {
    pub fn new(row: usize, day: usize, side: Side) -> Self {
        Self { row, day, side }
    }
}

/// How an edit ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Enter pressed; focus moves on
    Confirm,
    /// Focus went elsewhere
    Blur,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridEvent {
    Focus(FieldRef),
    Input(FieldRef, String),
    Complete(FieldRef, Completion),
    /// Double-shift checkbox changed for a cell
    SetDouble { row: usize, day: usize, double_shift: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridEffect {
    EditStarted(CellKey),
    /// Completed without anything to send
    Normalized(CellKey),
    Save { key: CellKey, request: SaveCellRequest },
    FocusMoved(FieldRef),
}

pub struct ScheduleGrid {
    schedule: ScheduleMonth,
    permission: PermissionContext,
    parser: TimeParser,
    focus: Option<FieldRef>,
}

impl ScheduleGrid {
    /// Build rows from a loaded snapshot. Rows are ordered by worker name and
    /// editability is fixed here for the life of the grid.
    pub fn from_snapshot(snapshot: &MonthSnapshot, parser: TimeParser) -> Self {
        let month = snapshot.month;
        let permission = PermissionContext {
            can_edit_all: snapshot.edit_all,
            can_edit_self: snapshot.edit_self,
            acting_worker_id: snapshot.my_uid,
        };

        let mut staff = snapshot.staff.clone();
        staff.sort_by_key(|m| (m.name.to_lowercase(), m.id));
        staff.dedup_by_key(|m| m.id);

        let mut rows: Vec<Row> = staff
            .iter()
            .map(|member| Row {
                worker_id: member.id,
                name: member.name.clone(),
                editable: permission.can_edit(member.id),
                cells: vec![Cell::blank(); month.day_count()],
            })
            .collect();

        let index: BTreeMap<WorkerId, usize> = rows
            .iter()
            .enumerate()
            .map(|(i, r)| (r.worker_id, i))
            .collect();

        for (key, entry) in &snapshot.prefill {
            let Some((worker_id, date)) = parse_prefill_key(key) else {
                warn!(key = %key, "skipping unreadable prefill key");
                continue;
            };
            let (Some(&row), true) = (index.get(&worker_id), month.contains(date)) else {
                debug!(key = %key, "prefill outside the grid");
                continue;
            };
            let day = date.day0() as usize;
            rows[row].cells[day] = Cell::loaded(&entry.start, &entry.end, entry.both, &parser);
        }

        debug!(%month, rows = rows.len(), editable = rows.iter().filter(|r| r.editable).count(), "grid built");

        Self {
            schedule: ScheduleMonth { month, rows },
            permission,
            parser,
            focus: None,
        }
    }

    pub fn month(&self) -> YearMonth {
        self.schedule.month
    }

    pub fn schedule(&self) -> &ScheduleMonth {
        &self.schedule
    }

    pub fn rows(&self) -> &[Row] {
        &self.schedule.rows
    }

    pub fn permission(&self) -> PermissionContext {
        self.permission
    }

    pub fn parser(&self) -> &TimeParser {
        &self.parser
    }

    pub fn focus(&self) -> Option<FieldRef> {
        self.focus
    }

    pub fn day_count(&self) -> usize {
        self.schedule.month.day_count()
    }

    pub fn cell(&self, row: usize, day: usize) -> Option<&Cell> {
        self.schedule.rows.get(row)?.cells.get(day)
    }

    pub fn totals(&self, row: usize) -> Option<RowTotals> {
        self.schedule.rows.get(row).map(Row::totals)
    }

    pub fn key(&self, row: usize, day: usize) -> Option<CellKey> {
        let worker_id = self.schedule.rows.get(row)?.worker_id;
        let date = self.schedule.month.date(day)?;
        Some(CellKey { worker_id, date })
    }

    pub fn is_editable(&self, row: usize) -> bool {
        self.schedule.rows.get(row).map(|r| r.editable).unwrap_or(false)
    }

    /// Next time field in the row: start then end of each day, wrapping to
    /// the first field
    pub fn next_field(&self, field: FieldRef) -> FieldRef {
        match field.side {
            Side::Start => FieldRef { side: Side::End, ..field },
            Side::End => {
                let day = if field.day + 1 >= self.day_count() { 0 } else { field.day + 1 };
                FieldRef { row: field.row, day, side: Side::Start }
            }
        }
    }

    pub fn handle(&mut self, event: GridEvent) -> Vec<GridEffect> {
        match event {
            GridEvent::Focus(field) => {
                self.focus = Some(field);
                Vec::new()
            }
            GridEvent::Input(field, text) => {
                let Some(key) = self.editable_key(field.row, field.day) else {
                    return Vec::new();
                };
                let cell = &mut self.schedule.rows[field.row].cells[field.day];
                if cell.text(field.side) == text {
                    return Vec::new();
                }
                cell.set_text(field.side, text);
                vec![GridEffect::EditStarted(key)]
            }
            GridEvent::Complete(field, completion) => {
                let Some(key) = self.editable_key(field.row, field.day) else {
                    return Vec::new();
                };
                let mut effects = vec![self.complete_cell(key, field.row, field.day)];
                if completion == Completion::Confirm {
                    let next = self.next_field(field);
                    self.focus = Some(next);
                    effects.push(GridEffect::FocusMoved(next));
                }
                effects
            }
            GridEvent::SetDouble { row, day, double_shift } => {
                let Some(key) = self.editable_key(row, day) else {
                    return Vec::new();
                };
                self.schedule.rows[row].cells[day].set_double_shift(double_shift, &self.parser);
                vec![self.complete_cell(key, row, day)]
            }
        }
    }

    fn editable_key(&self, row: usize, day: usize) -> Option<CellKey> {
        if !self.is_editable(row) {
            return None;
        }
        self.key(row, day)
    }

    /// Normalize and recompute one cell, then decide whether it needs saving
    fn complete_cell(&mut self, key: CellKey, row: usize, day: usize) -> GridEffect {
        let cell = &mut self.schedule.rows[row].cells[day];
        cell.complete(&self.parser);

        // An incomplete cell only needs sending when it clears a stored shift
        let incomplete = cell.is_blank() || cell.is_half_filled();
        if (incomplete && !cell.has_stored_value()) || !cell.has_uncommitted_change() {
            return GridEffect::Normalized(key);
        }

        cell.mark_committed();
        let request = SaveCellRequest {
            user_id: key.worker_id,
            date: key.date,
            start: cell.start().to_string(),
            end: cell.end().to_string(),
            both: cell.double_shift(),
        };
        GridEffect::Save { key, request }
    }

    /// Re-arm a cell whose latest save failed, so completing it again sends
    /// it even when nothing changed
    pub fn mark_send_failed(&mut self, key: CellKey) {
        let Some(row) = self.schedule.row_index(key.worker_id) else {
            return;
        };
        if !self.schedule.month.contains(key.date) {
            return;
        }
        let day = key.date.day0() as usize;
        if let Some(cell) = self.schedule.rows[row].cells.get_mut(day) {
            debug!(key = ?key, "cell will be sent again on completion");
            cell.mark_send_failed();
        }
    }

    /// Whole-month snapshot of every editable row, skipping blank days
    pub fn bulk_request(&self) -> BulkSaveRequest {
        let month = self.schedule.month;
        let rows = self
            .schedule
            .rows
            .iter()
            .filter(|r| r.editable)
            .map(|r| BulkRow {
                user_id: r.worker_id,
                days: r
                    .cells
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| !c.is_blank())
                    .filter_map(|(day, c)| {
                        let date = month.date(day)?;
                        Some((
                            date,
                            DayEntry {
                                start: c.start().trim().to_string(),
                                end: c.end().trim().to_string(),
                                both: c.double_shift(),
                            },
                        ))
                    })
                    .collect(),
            })
            .collect();
        BulkSaveRequest { month, rows }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::StaffMember;
    use chrono::NaiveDate;

    fn snapshot(edit_all: bool, edit_self: bool) -> MonthSnapshot {
        let mut prefill = BTreeMap::new();
        prefill.insert(
            "2:2025-03-02".to_string(),
            DayEntry { start: "22".into(), end: "10".into(), both: false },
        );
        prefill.insert(
            "1:2025-03-03".to_string(),
            DayEntry { start: "10:00".into(), end: "10:00".into(), both: true },
        );
        prefill.insert(
            "1:2025-04-01".to_string(),
            DayEntry { start: "10:00".into(), end: "22:00".into(), both: false },
        );
        MonthSnapshot {
            month: YearMonth::new(2025, 3).unwrap(),
            edit_all,
            edit_self,
            my_uid: 1,
            staff: vec![
                StaffMember { id: 2, name: "zhukov".into() },
                StaffMember { id: 1, name: "Anna".into() },
            ],
            prefill,
        }
    }

    fn grid(edit_all: bool, edit_self: bool) -> ScheduleGrid {
        ScheduleGrid::from_snapshot(&snapshot(edit_all, edit_self), TimeParser::default())
    }

    fn field(row: usize, day: usize, side: Side) -> FieldRef {
        FieldRef::new(row, day, side)
    }

    #[test]
    fn test_rows_sorted_and_prefilled() {
        let grid = grid(true, false);
        assert_eq!(grid.rows()[0].name, "Anna");
        assert_eq!(grid.rows()[1].name, "zhukov");
        assert_eq!(grid.rows()[0].cells.len(), 31);

        let night = grid.cell(1, 1).unwrap();
        assert_eq!(night.start(), "22:00");
        assert_eq!(night.end(), "10:00");
        assert_eq!(night.span(), Some(720));

        // Equal sides are a full day even with the double flag
        assert_eq!(grid.cell(0, 2).unwrap().span(), Some(1440));
        assert_eq!(grid.totals(0).unwrap(), RowTotals { total_minutes: 1440, shift_units: 2 });
    }

    #[test]
    fn test_permission_gate_applied_per_row() {
        let own_only = grid(false, true);
        assert!(own_only.is_editable(0));
        assert!(!own_only.is_editable(1));

        let read_only = grid(false, false);
        assert!(!read_only.rows().iter().any(|r| r.editable));
    }

    #[test]
    fn test_read_only_row_ignores_edits() {
        let mut grid = grid(false, true);
        let f = field(1, 0, Side::Start);
        assert!(grid.handle(GridEvent::Input(f, "9".into())).is_empty());
        assert!(grid.handle(GridEvent::Complete(f, Completion::Confirm)).is_empty());
        assert_eq!(grid.cell(1, 0).unwrap().start(), "");
    }

    #[test]
    fn test_completion_normalizes_and_saves_once() {
        let mut grid = grid(true, false);
        let key = grid.key(0, 0).unwrap();

        let start = field(0, 0, Side::Start);
        assert_eq!(grid.handle(GridEvent::Input(start, "9".into())), vec![GridEffect::EditStarted(key)]);
        // Half-filled: normalized, nothing sent
        assert_eq!(
            grid.handle(GridEvent::Complete(start, Completion::Confirm)),
            vec![GridEffect::Normalized(key), GridEffect::FocusMoved(field(0, 0, Side::End))]
        );
        assert_eq!(grid.cell(0, 0).unwrap().start(), "09:00");

        let end = field(0, 0, Side::End);
        grid.handle(GridEvent::Input(end, "17".into()));
        let effects = grid.handle(GridEvent::Complete(end, Completion::Blur));
        assert_eq!(
            effects,
            vec![GridEffect::Save {
                key,
                request: SaveCellRequest {
                    user_id: 1,
                    date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
                    start: "09:00".into(),
                    end: "17:00".into(),
                    both: false,
                },
            }]
        );
        assert_eq!(grid.totals(0).unwrap(), RowTotals { total_minutes: 480 + 1440, shift_units: 3 });

        // Leaving the field again without changes sends nothing
        assert_eq!(grid.handle(GridEvent::Complete(end, Completion::Blur)), vec![GridEffect::Normalized(key)]);
    }

    #[test]
    fn test_clearing_a_cell_saves_a_delete() {
        let mut grid = grid(true, false);
        let key = grid.key(1, 1).unwrap();
        grid.handle(GridEvent::Input(field(1, 1, Side::Start), String::new()));
        let effects = grid.handle(GridEvent::Complete(field(1, 1, Side::Start), Completion::Blur));
        match &effects[..] {
            [GridEffect::Save { key: k, request }] => {
                assert_eq!(*k, key);
                assert_eq!(request.start, "");
                assert_eq!(request.end, "10:00");
            }
            other => panic!("unexpected effects: {:?}", other),
        }
        assert_eq!(grid.totals(1).unwrap(), RowTotals::default());

        // The stored shift is already gone; clearing the other side sends nothing
        grid.handle(GridEvent::Input(field(1, 1, Side::End), " ".into()));
        assert_eq!(
            grid.handle(GridEvent::Complete(field(1, 1, Side::End), Completion::Blur)),
            vec![GridEffect::Normalized(key)]
        );
        assert!(grid.cell(1, 1).unwrap().is_blank());
    }

    #[test]
    fn test_clearing_one_side_of_a_saved_shift_saves() {
        let mut grid = grid(true, false);
        let key = grid.key(0, 2).unwrap();
        let end = field(0, 2, Side::End);
        grid.handle(GridEvent::Input(end, String::new()));
        let effects = grid.handle(GridEvent::Complete(end, Completion::Confirm));
        assert_eq!(
            effects,
            vec![
                GridEffect::Save {
                    key,
                    request: SaveCellRequest {
                        user_id: 1,
                        date: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
                        start: "10:00".into(),
                        end: String::new(),
                        both: true,
                    },
                },
                GridEffect::FocusMoved(field(0, 3, Side::Start)),
            ]
        );
        assert_eq!(grid.cell(0, 2).unwrap().span(), None);
    }

    #[test]
    fn test_failed_save_is_sent_again_on_completion() {
        let mut grid = grid(true, false);
        let key = grid.key(0, 0).unwrap();
        let end = field(0, 0, Side::End);
        grid.handle(GridEvent::Input(field(0, 0, Side::Start), "9".into()));
        grid.handle(GridEvent::Input(end, "17".into()));
        assert!(matches!(&grid.handle(GridEvent::Complete(end, Completion::Blur))[..], [GridEffect::Save { .. }]));
        assert_eq!(grid.handle(GridEvent::Complete(end, Completion::Blur)), vec![GridEffect::Normalized(key)]);

        grid.mark_send_failed(key);
        let effects = grid.handle(GridEvent::Complete(end, Completion::Confirm));
        assert!(matches!(&effects[..], [GridEffect::Save { key: k, request }, GridEffect::FocusMoved(_)]
            if *k == key && request.start == "09:00" && request.end == "17:00"));

        // Once re-sent, the cell is back to deduplicating
        assert_eq!(grid.handle(GridEvent::Complete(end, Completion::Blur)), vec![GridEffect::Normalized(key)]);
    }

    #[test]
    fn test_mark_send_failed_ignores_unknown_cells() {
        let mut grid = grid(true, false);
        grid.mark_send_failed(CellKey { worker_id: 99, date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap() });
        grid.mark_send_failed(CellKey { worker_id: 1, date: NaiveDate::from_ymd_opt(2025, 4, 1).unwrap() });
        assert!(grid.rows().iter().flat_map(|r| &r.cells).all(|c| !c.has_uncommitted_change()));
    }

    #[test]
    fn test_off_marker_saves_and_zeroes_span() {
        let mut grid = grid(true, false);
        grid.handle(GridEvent::Input(field(1, 1, Side::Start), "вых".into()));
        let effects = grid.handle(GridEvent::Complete(field(1, 1, Side::Start), Completion::Blur));
        assert!(matches!(&effects[..], [GridEffect::Save { request, .. }] if request.start == "OFF"));
        assert_eq!(grid.cell(1, 1).unwrap().span(), None);
    }

    #[test]
    fn test_double_flag_change_saves() {
        let mut grid = grid(true, false);
        grid.handle(GridEvent::Input(field(0, 4, Side::Start), "10".into()));
        grid.handle(GridEvent::Input(field(0, 4, Side::End), "12".into()));
        grid.handle(GridEvent::Complete(field(0, 4, Side::End), Completion::Blur));

        let effects = grid.handle(GridEvent::SetDouble { row: 0, day: 4, double_shift: true });
        assert!(matches!(&effects[..], [GridEffect::Save { request, .. }] if request.both));
        assert_eq!(grid.cell(0, 4).unwrap().span(), Some(1440 + 120));
    }

    #[test]
    fn test_confirm_wraps_within_row() {
        let grid = grid(true, false);
        assert_eq!(grid.next_field(field(0, 5, Side::Start)), field(0, 5, Side::End));
        assert_eq!(grid.next_field(field(0, 5, Side::End)), field(0, 6, Side::Start));
        assert_eq!(grid.next_field(field(1, 30, Side::End)), field(1, 0, Side::Start));
    }

    #[test]
    fn test_bulk_request_covers_editable_non_blank_days() {
        let mut grid = grid(false, true);
        grid.handle(GridEvent::Input(field(0, 9, Side::Start), "OFF".into()));
        grid.handle(GridEvent::Complete(field(0, 9, Side::Start), Completion::Blur));

        let request = grid.bulk_request();
        assert_eq!(request.rows.len(), 1);
        assert_eq!(request.rows[0].user_id, 1);
        let days: Vec<_> = request.rows[0].days.keys().map(|d| d.to_string()).collect();
        assert_eq!(days, vec!["2025-03-03", "2025-03-10"]);
        assert!(request.rows[0].days.values().next().unwrap().both);
    }
}

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;

use super::error::StoreError;
use super::types::*;
use crate::schedule::snapshot::{build_prefill, shift_bounds, ReportKind, ShiftRecord, ShiftReport};
use crate::schedule::time::{parse_clock, TimeParser};
use crate::schedule::{PermissionContext, WorkerId, YearMonth};

/// The persistence operations the schedule grid consumes
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Initialization attributes and prefill for one month
    async fn load_month(&self, month: YearMonth) -> Result<MonthSnapshot, StoreError>;

    /// Persist (or clear) one worker's day
    async fn save_cell(&self, request: &SaveCellRequest) -> Result<CellAck, StoreError>;

    /// Replace the month with a full snapshot
    async fn save_month(&self, request: &BulkSaveRequest) -> Result<BulkAck, StoreError>;
}

/// In-process store with the same save semantics as the schedule server.
/// Backs the offline demo and the tests.
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

struct MemoryState {
    session: PermissionContext,
    staff: Vec<StaffMember>,
    shifts: Vec<ShiftRecord>,
    reports: Vec<ShiftReport>,
    parser: TimeParser,
    offline: bool,
    cell_requests: Vec<SaveCellRequest>,
    bulk_requests: Vec<BulkSaveRequest>,
}

impl MemoryStore {
    pub fn new(session: PermissionContext, staff: Vec<StaffMember>) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                session,
                staff,
                shifts: Vec::new(),
                reports: Vec::new(),
                parser: TimeParser::default(),
                offline: false,
                cell_requests: Vec::new(),
                bulk_requests: Vec::new(),
            }),
        }
    }

    /// A small club roster with a few reports filed early in `month`
    pub fn demo(month: YearMonth) -> Self {
        let staff = vec![
            StaffMember { id: 1, name: "Orlova Maria".to_string() },
            StaffMember { id: 2, name: "Belov Pavel".to_string() },
            StaffMember { id: 3, name: "Kim Daria".to_string() },
            StaffMember { id: 4, name: "Abramov Ilya".to_string() },
        ];
        let session = PermissionContext {
            can_edit_all: true,
            can_edit_self: false,
            acting_worker_id: 1,
        };
        let store = Self::new(session, staff);

        let mut reports = Vec::new();
        for (i, date) in month.days().into_iter().take(10).enumerate() {
            let (user_id, kind) = match i % 3 {
                0 => (2, ReportKind::Day),
                1 => (3, ReportKind::Night),
                _ => (4, ReportKind::Day),
            };
            reports.push(ShiftReport { user_id, date, kind });
            if i == 4 {
                reports.push(ShiftReport { user_id, date, kind: ReportKind::Night });
            }
        }
        store.lock().reports = reports;
        store
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A panicked writer leaves plain data behind; keep serving it
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_reports(self, reports: Vec<ShiftReport>) -> Self {
        self.lock().reports = reports;
        self
    }

    pub fn with_shifts(self, shifts: Vec<ShiftRecord>) -> Self {
        self.lock().shifts = shifts;
        self
    }

    /// Fail every request with a transport error while set
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    pub fn shifts(&self) -> Vec<ShiftRecord> {
        self.lock().shifts.clone()
    }

    pub fn shift_on(&self, user_id: WorkerId, date: NaiveDate) -> Option<ShiftRecord> {
        self.lock()
            .shifts
            .iter()
            .find(|s| s.user_id == user_id && s.date() == date)
            .cloned()
    }

    /// Single-cell requests received so far, in arrival order
    pub fn cell_requests(&self) -> Vec<SaveCellRequest> {
        self.lock().cell_requests.clone()
    }

    pub fn bulk_requests(&self) -> Vec<BulkSaveRequest> {
        self.lock().bulk_requests.clone()
    }
}

impl MemoryState {
    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline {
            return Err(StoreError::Transport("store unreachable".to_string()));
        }
        Ok(())
    }

    /// Bounds for a day's tokens; `Ok(None)` when the day is cleared or off
    fn bounds_for(
        &self,
        date: NaiveDate,
        start: &str,
        end: &str,
        both: bool,
    ) -> Result<Option<ShiftRecordBounds>, ()> {
        let (start, end) = (start.trim(), end.trim());
        if start.is_empty()
            || end.is_empty()
            || self.parser.is_off_marker(start)
            || self.parser.is_off_marker(end)
        {
            return Ok(None);
        }
        let (Some(s), Some(e)) = (parse_clock(start), parse_clock(end)) else {
            return Err(());
        };
        Ok(Some(shift_bounds(date, s, e, both)))
    }
}

type ShiftRecordBounds = (chrono::NaiveDateTime, chrono::NaiveDateTime);

#[async_trait]
impl ScheduleStore for MemoryStore {
    async fn load_month(&self, month: YearMonth) -> Result<MonthSnapshot, StoreError> {
        let state = self.lock();
        state.check_online()?;

        let mut staff = state.staff.clone();
        // Report authors show up even when they left the roster
        for report in state.reports.iter().filter(|r| month.contains(r.date)) {
            if !staff.iter().any(|m| m.id == report.user_id) {
                staff.push(StaffMember {
                    id: report.user_id,
                    name: format!("#{}", report.user_id),
                });
            }
        }

        Ok(MonthSnapshot {
            month,
            edit_all: state.session.can_edit_all,
            edit_self: state.session.can_edit_self,
            my_uid: state.session.acting_worker_id,
            staff,
            prefill: build_prefill(month, &state.reports, &state.shifts),
        })
    }

    async fn save_cell(&self, request: &SaveCellRequest) -> Result<CellAck, StoreError> {
        let mut state = self.lock();
        state.check_online()?;
        state.cell_requests.push(request.clone());

        if request.user_id == 0 {
            return SaveCellResponse::rejected("bad_request").into_ack();
        }
        if !state.session.can_edit(request.user_id) {
            return SaveCellResponse::rejected("forbidden").into_ack();
        }

        let bounds = match state.bounds_for(request.date, &request.start, &request.end, request.both) {
            Ok(bounds) => bounds,
            Err(()) => return SaveCellResponse::rejected("bad_time").into_ack(),
        };

        let before = state.shifts.len();
        state
            .shifts
            .retain(|s| !(s.user_id == request.user_id && s.date() == request.date));
        let removed = before - state.shifts.len();

        let response = match bounds {
            Some((start, end)) => {
                state.shifts.push(ShiftRecord { user_id: request.user_id, start, end });
                SaveCellResponse::upserted()
            }
            None if removed > 0 => SaveCellResponse::deleted(),
            None => SaveCellResponse::rejected("no_change"),
        };
        debug!(user_id = request.user_id, date = %request.date, ok = response.ok, "memory store save-one");
        response.into_ack()
    }

    async fn save_month(&self, request: &BulkSaveRequest) -> Result<BulkAck, StoreError> {
        let mut state = self.lock();
        state.check_online()?;
        state.bulk_requests.push(request.clone());

        let month = request.month;
        let session = state.session;
        // Replace the month for every worker this session may edit
        state
            .shifts
            .retain(|s| !(month.contains(s.date()) && session.can_edit(s.user_id)));

        let mut inserted = Vec::new();
        for row in request.rows.iter().filter(|r| r.user_id != 0 && session.can_edit(r.user_id)) {
            for (date, day) in row.days.iter().filter(|(d, _)| month.contains(**d)) {
                // Unreadable days are skipped rather than failing the batch
                if let Ok(Some((start, end))) = state.bounds_for(*date, &day.start, &day.end, day.both) {
                    inserted.push(ShiftRecord { user_id: row.user_id, start, end });
                }
            }
        }

        let saved = inserted.len() as u32;
        state.shifts.extend(inserted);
        debug!(%month, saved, "memory store bulk save");
        BulkSaveResponse { ok: true, saved: Some(saved), error: None }.into_ack()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn owner_store() -> MemoryStore {
        MemoryStore::new(
            PermissionContext { can_edit_all: true, can_edit_self: false, acting_worker_id: 1 },
            vec![StaffMember { id: 1, name: "A".to_string() }, StaffMember { id: 2, name: "B".to_string() }],
        )
    }

    fn cell(user_id: WorkerId, d: u32, start: &str, end: &str, both: bool) -> SaveCellRequest {
        SaveCellRequest {
            user_id,
            date: date(d),
            start: start.to_string(),
            end: end.to_string(),
            both,
        }
    }

    #[tokio::test]
    async fn test_save_cell_upsert_then_delete() {
        let store = owner_store();
        assert_eq!(store.save_cell(&cell(2, 1, "09:00", "17:00", false)).await, Ok(CellAck::Upserted));
        let shift = store.shift_on(2, date(1)).unwrap();
        assert_eq!(shift.end, date(1).and_hms_opt(17, 0, 0).unwrap());

        // Overwrites rather than duplicates
        store.save_cell(&cell(2, 1, "22:00", "06:00", false)).await.unwrap();
        assert_eq!(store.shifts().len(), 1);
        assert_eq!(store.shift_on(2, date(1)).unwrap().end, date(2).and_hms_opt(6, 0, 0).unwrap());

        assert_eq!(store.save_cell(&cell(2, 1, "OFF", "OFF", false)).await, Ok(CellAck::Deleted));
        assert!(store.shifts().is_empty());
    }

    #[tokio::test]
    async fn test_save_cell_rejections() {
        let store = owner_store();
        let no_change = store.save_cell(&cell(2, 1, "", "", false)).await;
        assert_eq!(no_change, Err(StoreError::Rejected { reason: "no_change".to_string() }));

        let bad_time = store.save_cell(&cell(2, 1, "09:00", "later", false)).await;
        assert_eq!(bad_time, Err(StoreError::Rejected { reason: "bad_time".to_string() }));

        let bad_request = store.save_cell(&cell(0, 1, "09:00", "10:00", false)).await;
        assert_eq!(bad_request, Err(StoreError::Rejected { reason: "bad_request".to_string() }));
    }

    #[tokio::test]
    async fn test_bad_time_keeps_existing_shift() {
        let store = owner_store();
        store.save_cell(&cell(2, 1, "09:00", "17:00", false)).await.unwrap();
        assert!(store.save_cell(&cell(2, 1, "09:00", "nope", false)).await.is_err());
        assert!(store.shift_on(2, date(1)).is_some());
    }

    #[tokio::test]
    async fn test_self_editor_is_limited_to_own_row() {
        let store = MemoryStore::new(
            PermissionContext { can_edit_all: false, can_edit_self: true, acting_worker_id: 1 },
            Vec::new(),
        );
        assert!(store.save_cell(&cell(1, 1, "9", "17", false)).await.is_ok());
        assert_eq!(
            store.save_cell(&cell(2, 1, "9", "17", false)).await,
            Err(StoreError::Rejected { reason: "forbidden".to_string() })
        );
    }

    #[tokio::test]
    async fn test_offline_store_fails_with_transport_error() {
        let store = owner_store();
        store.set_offline(true);
        let result = store.save_cell(&cell(2, 1, "09:00", "17:00", false)).await;
        assert!(result.unwrap_err().is_transport());
        assert!(store.cell_requests().is_empty());
    }

    #[tokio::test]
    async fn test_save_month_replaces_editable_rows() {
        let store = MemoryStore::new(
            PermissionContext { can_edit_all: false, can_edit_self: true, acting_worker_id: 1 },
            Vec::new(),
        )
        .with_shifts(vec![
            ShiftRecord {
                user_id: 1,
                start: date(5).and_hms_opt(9, 0, 0).unwrap(),
                end: date(5).and_hms_opt(18, 0, 0).unwrap(),
            },
            ShiftRecord {
                user_id: 2,
                start: date(5).and_hms_opt(9, 0, 0).unwrap(),
                end: date(5).and_hms_opt(18, 0, 0).unwrap(),
            },
        ]);

        let mut days = std::collections::BTreeMap::new();
        days.insert(date(1), DayEntry { start: "10:00".into(), end: "22:00".into(), both: false });
        days.insert(date(2), DayEntry { start: "OFF".into(), end: "OFF".into(), both: false });
        days.insert(date(3), DayEntry { start: "10:00".into(), end: "10:00".into(), both: true });
        let request = BulkSaveRequest {
            month: YearMonth::new(2025, 3).unwrap(),
            rows: vec![
                BulkRow { user_id: 1, days: days.clone() },
                BulkRow { user_id: 2, days },
            ],
        };

        let ack = store.save_month(&request).await.unwrap();
        assert_eq!(ack.saved, 2);
        // Worker 1's old day 5 is gone; worker 2 was not editable and is untouched
        assert!(store.shift_on(1, date(5)).is_none());
        assert!(store.shift_on(2, date(5)).is_some());
        assert!(store.shift_on(2, date(1)).is_none());
        assert_eq!(store.shift_on(1, date(3)).unwrap().end, date(4).and_hms_opt(10, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_load_month_builds_snapshot() {
        let store = owner_store()
            .with_reports(vec![ShiftReport { user_id: 9, date: date(4), kind: ReportKind::Night }]);
        let snapshot = store.load_month(YearMonth::new(2025, 3).unwrap()).await.unwrap();
        assert!(snapshot.edit_all);
        assert_eq!(snapshot.my_uid, 1);
        assert!(snapshot.staff.iter().any(|m| m.id == 9));
        assert_eq!(snapshot.prefill["9:2025-03-04"].start, "22:00");
    }
}

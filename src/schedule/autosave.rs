//! Autosave reconciliation.
//!
//! Every completed cell edit becomes one save request, sent after a short
//! delay on the tokio runtime. Requests for the same cell are never
//! cancelled, so replies can come back out of order. Each request carries a
//! per-cell sequence number and only the reply to the newest one may change
//! what the cell shows. Outcomes come back through a channel that the UI loop
//! drains, so grid state is only ever touched from one place.
//!
//! Month saves travel the same channel but are independent of cell saves:
//! the store applies whichever arrives last, and a month reply never changes
//! cell feedback.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use super::model::CellKey;
use crate::api::{BulkAck, BulkSaveRequest, CellAck, SaveCellRequest, ScheduleStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutosaveSettings {
    /// Wait before the request goes out
    pub delay: Duration,
    pub saved_flash: Duration,
    pub failed_flash: Duration,
}

impl Default for AutosaveSettings {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(100),
            saved_flash: Duration::from_millis(900),
            failed_flash: Duration::from_millis(1200),
        }
    }
}

/// Where a cell is in its save cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Untouched since load
    Empty,
    Editing,
    /// Completed and normalized, nothing sent for it
    Normalized,
    Pending,
    Synced,
    Failed,
}

/// Transient highlight on a cell's duration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feedback {
    Saved,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkState {
    Idle,
    Pending,
    Saved(u32),
    Failed(String),
}

/// What applying one reply did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acknowledgment {
    Applied { key: CellKey, feedback: Feedback },
    /// A newer request for the cell was issued, or the grid it was sent
    /// from was discarded; the reply was dropped
    Stale { key: CellKey, seq: u64 },
    Bulk(BulkState),
}

#[derive(Debug)]
struct CellSync {
    state: SyncState,
    latest_seq: u64,
    flash: Option<(Feedback, Instant)>,
}

impl Default for CellSync {
    fn default() -> Self {
        Self {
            state: SyncState::Empty,
            latest_seq: 0,
            flash: None,
        }
    }
}

#[derive(Debug)]
enum Outcome {
    Cell {
        key: CellKey,
        seq: u64,
        generation: u64,
        result: Result<CellAck, StoreError>,
    },
    Bulk(Result<BulkAck, StoreError>),
}

pub struct Autosaver {
    store: Arc<dyn ScheduleStore>,
    runtime: Handle,
    settings: AutosaveSettings,
    cells: HashMap<CellKey, CellSync>,
    // Bumped by `reset`; replies issued under an older value are stale
    generation: u64,
    bulk: BulkState,
    result_tx: UnboundedSender<Outcome>,
    result_rx: UnboundedReceiver<Outcome>,
}

impl Autosaver {
    pub fn new(store: Arc<dyn ScheduleStore>, runtime: Handle, settings: AutosaveSettings) -> Self {
        let (result_tx, result_rx) = unbounded_channel();
        Self {
            store,
            runtime,
            settings,
            cells: HashMap::new(),
            generation: 0,
            bulk: BulkState::Idle,
            result_tx,
            result_rx,
        }
    }

    pub fn settings(&self) -> AutosaveSettings {
        self.settings
    }

    pub fn state(&self, key: &CellKey) -> SyncState {
        self.cells.get(key).map(|c| c.state).unwrap_or(SyncState::Empty)
    }

    /// Latest sequence number issued for a cell, 0 if none
    pub fn latest_seq(&self, key: &CellKey) -> u64 {
        self.cells.get(key).map(|c| c.latest_seq).unwrap_or(0)
    }

    pub fn bulk_state(&self) -> &BulkState {
        &self.bulk
    }

    pub fn mark_editing(&mut self, key: CellKey) {
        self.cells.entry(key).or_default().state = SyncState::Editing;
    }

    pub fn mark_normalized(&mut self, key: CellKey) {
        self.cells.entry(key).or_default().state = SyncState::Normalized;
    }

    /// Queue a single-cell save; returns the sequence number it carries
    pub fn submit(&mut self, key: CellKey, request: SaveCellRequest) -> u64 {
        let cell = self.cells.entry(key).or_default();
        cell.latest_seq += 1;
        cell.state = SyncState::Pending;
        let seq = cell.latest_seq;
        let generation = self.generation;

        debug!(worker = key.worker_id, date = %key.date, seq, start = %request.start, end = %request.end, "queueing cell save");

        let store = Arc::clone(&self.store);
        let tx = self.result_tx.clone();
        let delay = self.settings.delay;
        self.runtime.spawn(async move {
            // Gives quick successive edits a moment; does not cancel earlier requests
            tokio::time::sleep(delay).await;
            let result = store.save_cell(&request).await;
            let _ = tx.send(Outcome::Cell { key, seq, generation, result });
        });

        seq
    }

    /// Queue a whole-month save
    pub fn submit_bulk(&mut self, request: BulkSaveRequest) {
        info!(month = %request.month, rows = request.rows.len(), days = request.day_count(), "saving month");
        self.bulk = BulkState::Pending;

        let store = Arc::clone(&self.store);
        let tx = self.result_tx.clone();
        self.runtime.spawn(async move {
            let result = store.save_month(&request).await;
            let _ = tx.send(Outcome::Bulk(result));
        });
    }

    /// Apply every reply that has arrived, without waiting
    pub fn poll(&mut self, now: Instant) -> Vec<Acknowledgment> {
        let mut acks = Vec::new();
        while let Ok(outcome) = self.result_rx.try_recv() {
            acks.push(self.apply(outcome, now));
        }
        acks
    }

    /// Wait for the next reply and apply it
    pub async fn next_acknowledgment(&mut self, now: Instant) -> Option<Acknowledgment> {
        let outcome = self.result_rx.recv().await?;
        Some(self.apply(outcome, now))
    }

    fn apply(&mut self, outcome: Outcome, now: Instant) -> Acknowledgment {
        match outcome {
            Outcome::Cell { key, seq, generation, result } => {
                if generation != self.generation {
                    debug!(worker = key.worker_id, date = %key.date, seq, "dropping save reply from a discarded grid");
                    return Acknowledgment::Stale { key, seq };
                }
                self.apply_cell(key, seq, result, now)
            }
            Outcome::Bulk(result) => {
                self.bulk = match result {
                    Ok(ack) => {
                        info!(saved = ack.saved, "month saved");
                        BulkState::Saved(ack.saved)
                    }
                    Err(e) => {
                        warn!(error = %e, "month save failed");
                        BulkState::Failed(e.to_string())
                    }
                };
                Acknowledgment::Bulk(self.bulk.clone())
            }
        }
    }

    fn apply_cell(
        &mut self,
        key: CellKey,
        seq: u64,
        result: Result<CellAck, StoreError>,
        now: Instant,
    ) -> Acknowledgment {
        let settings = self.settings;
        let cell = self.cells.entry(key).or_default();

        if seq != cell.latest_seq {
            debug!(worker = key.worker_id, date = %key.date, seq, latest = cell.latest_seq, "dropping stale save reply");
            return Acknowledgment::Stale { key, seq };
        }

        let feedback = match result {
            Ok(ack) => {
                debug!(worker = key.worker_id, date = %key.date, seq, ?ack, "cell saved");
                cell.state = SyncState::Synced;
                cell.flash = Some((Feedback::Saved, now + settings.saved_flash));
                Feedback::Saved
            }
            Err(e) => {
                // Not retried: the highlight and this record are all the user gets
                warn!(worker = key.worker_id, date = %key.date, seq, error = %e, "autosave failed");
                cell.state = SyncState::Failed;
                cell.flash = Some((Feedback::Failed, now + settings.failed_flash));
                Feedback::Failed
            }
        };

        Acknowledgment::Applied { key, feedback }
    }

    /// Highlight to show on a cell at `now`, if any
    pub fn feedback(&self, key: &CellKey, now: Instant) -> Option<Feedback> {
        let (feedback, until) = self.cells.get(key)?.flash?;
        (now < until).then_some(feedback)
    }

    /// True while any highlight is showing or a save is outstanding
    pub fn is_busy(&self, now: Instant) -> bool {
        self.bulk == BulkState::Pending
            || self.cells.values().any(|c| {
                c.state == SyncState::Pending || c.flash.map(|(_, until)| now < until).unwrap_or(false)
            })
    }

    /// Forget per-cell state and flashes, e.g. after switching months.
    /// Sequence numbers keep counting so in-flight replies stay stale.
    pub fn reset(&mut self) {
        self.generation += 1;
        for cell in self.cells.values_mut() {
            cell.state = SyncState::Empty;
            cell.flash = None;
        }
        self.bulk = BulkState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MemoryStore;
    use crate::schedule::PermissionContext;
    use chrono::NaiveDate;

    fn key(day: u32) -> CellKey {
        CellKey {
            worker_id: 1,
            date: NaiveDate::from_ymd_opt(2025, 3, day).unwrap(),
        }
    }

    fn request(day: u32, start: &str, end: &str) -> SaveCellRequest {
        SaveCellRequest {
            user_id: 1,
            date: key(day).date,
            start: start.to_string(),
            end: end.to_string(),
            both: false,
        }
    }

    fn autosaver(store: Arc<MemoryStore>) -> Autosaver {
        Autosaver::new(store, Handle::current(), AutosaveSettings::default())
    }

    fn owner_store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::new(
            PermissionContext { can_edit_all: true, can_edit_self: false, acting_worker_id: 1 },
            Vec::new(),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_flashes_then_reverts() {
        let store = owner_store();
        let mut saver = autosaver(store.clone());
        saver.mark_editing(key(1));
        assert_eq!(saver.state(&key(1)), SyncState::Editing);

        saver.submit(key(1), request(1, "09:00", "17:00"));
        assert_eq!(saver.state(&key(1)), SyncState::Pending);

        let now = Instant::now();
        let ack = saver.next_acknowledgment(now).await.unwrap();
        assert_eq!(ack, Acknowledgment::Applied { key: key(1), feedback: Feedback::Saved });
        assert_eq!(saver.state(&key(1)), SyncState::Synced);
        assert_eq!(saver.feedback(&key(1), now), Some(Feedback::Saved));
        assert_eq!(saver.feedback(&key(1), now + Duration::from_millis(899)), Some(Feedback::Saved));
        assert_eq!(saver.feedback(&key(1), now + Duration::from_millis(900)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_flashes_longer_and_is_not_retried() {
        let store = owner_store();
        store.set_offline(true);
        let mut saver = autosaver(store.clone());

        saver.submit(key(2), request(2, "09:00", "17:00"));
        let now = Instant::now();
        let ack = saver.next_acknowledgment(now).await.unwrap();
        assert_eq!(ack, Acknowledgment::Applied { key: key(2), feedback: Feedback::Failed });
        assert_eq!(saver.state(&key(2)), SyncState::Failed);
        assert_eq!(saver.feedback(&key(2), now + Duration::from_millis(1100)), Some(Feedback::Failed));
        assert_eq!(saver.feedback(&key(2), now + Duration::from_millis(1200)), None);

        // Nothing else is in flight
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(saver.poll(now).is_empty());
        assert_eq!(saver.latest_seq(&key(2)), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_counts_as_failure() {
        let store = owner_store();
        let mut saver = autosaver(store.clone());
        // Clearing a day that has no shift is answered with ok:false
        saver.submit(key(3), request(3, "", ""));
        let ack = saver.next_acknowledgment(Instant::now()).await.unwrap();
        assert_eq!(ack, Acknowledgment::Applied { key: key(3), feedback: Feedback::Failed });
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_latest_reply_counts() {
        let store = owner_store();
        let mut saver = autosaver(store.clone());

        let first = saver.submit(key(4), request(4, "09:00", "17:00"));
        let second = saver.submit(key(4), request(4, "10:00", "18:00"));
        assert!(second > first);

        let now = Instant::now();
        let mut acks = vec![
            saver.next_acknowledgment(now).await.unwrap(),
            saver.next_acknowledgment(now).await.unwrap(),
        ];
        acks.sort_by_key(|a| matches!(a, Acknowledgment::Applied { .. }));
        assert_eq!(acks[0], Acknowledgment::Stale { key: key(4), seq: first });
        assert_eq!(acks[1], Acknowledgment::Applied { key: key(4), feedback: Feedback::Saved });

        // Both requests did reach the store
        assert_eq!(store.cell_requests().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_from_before_reset_is_stale() {
        let store = owner_store();
        let mut saver = autosaver(store.clone());

        // Rejected by the store, but its reply must not reach the new grid
        let old = saver.submit(key(7), request(7, "", ""));
        saver.reset();
        assert_eq!(saver.state(&key(7)), SyncState::Empty);
        let new = saver.submit(key(7), request(7, "09:00", "17:00"));
        assert_eq!((old, new), (1, 2));

        let now = Instant::now();
        let mut acks = vec![
            saver.next_acknowledgment(now).await.unwrap(),
            saver.next_acknowledgment(now).await.unwrap(),
        ];
        acks.sort_by_key(|a| matches!(a, Acknowledgment::Applied { .. }));
        assert_eq!(acks[0], Acknowledgment::Stale { key: key(7), seq: old });
        assert_eq!(acks[1], Acknowledgment::Applied { key: key(7), feedback: Feedback::Saved });
        assert_eq!(saver.state(&key(7)), SyncState::Synced);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_drops_replies_still_in_flight() {
        let store = owner_store();
        let mut saver = autosaver(store.clone());
        saver.submit(key(8), request(8, "09:00", "17:00"));
        saver.reset();

        let now = Instant::now();
        let ack = saver.next_acknowledgment(now).await.unwrap();
        assert_eq!(ack, Acknowledgment::Stale { key: key(8), seq: 1 });
        assert_eq!(saver.state(&key(8)), SyncState::Empty);
        assert_eq!(saver.feedback(&key(8), now), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_waits_for_delay() {
        let store = owner_store();
        let mut saver = autosaver(store.clone());
        saver.submit(key(5), request(5, "09:00", "17:00"));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.cell_requests().is_empty());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(store.cell_requests().len(), 1);
        assert_eq!(saver.poll(Instant::now()).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bulk_save_leaves_cell_feedback_alone() {
        let store = owner_store();
        let mut saver = autosaver(store.clone());
        saver.mark_editing(key(6));

        saver.submit_bulk(BulkSaveRequest {
            month: crate::schedule::YearMonth::new(2025, 3).unwrap(),
            rows: Vec::new(),
        });
        assert_eq!(saver.bulk_state(), &BulkState::Pending);

        let now = Instant::now();
        let ack = saver.next_acknowledgment(now).await.unwrap();
        assert_eq!(ack, Acknowledgment::Bulk(BulkState::Saved(0)));
        assert_eq!(saver.state(&key(6)), SyncState::Editing);
        assert_eq!(saver.feedback(&key(6), now), None);
        assert!(!saver.is_busy(now));
    }
}

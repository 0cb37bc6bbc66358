//! The shift time engine: token parsing, spans, totals, permissions, the
//! month grid and autosave reconciliation.

pub mod aggregate;
pub mod autosave;
pub mod grid;
pub mod model;
pub mod permission;
pub mod snapshot;
pub mod time;

pub use aggregate::{aggregate, shift_units, RowTotals};
pub use autosave::{Acknowledgment, AutosaveSettings, Autosaver, BulkState, Feedback, SyncState};
pub use grid::{Completion, FieldRef, GridEffect, GridEvent, ScheduleGrid};
pub use model::{Cell, CellKey, Row, ScheduleMonth, Side, WorkerId, YearMonth};
pub use permission::PermissionContext;
pub use time::{ParsedTime, TimeParser};

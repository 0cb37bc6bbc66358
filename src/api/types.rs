use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::error::StoreError;
use crate::schedule::{WorkerId, YearMonth};

/// Serde adapter for flags the store writes as 0/1.
/// Reads accept either a number or a JSON bool.
pub mod flag {
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        struct FlagVisitor;

        impl<'de> Visitor<'de> for FlagVisitor {
            type Value = bool;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("0, 1 or a boolean")
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<bool, E> {
                Ok(v)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<bool, E> {
                Ok(v != 0)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<bool, E> {
                Ok(v != 0)
            }
        }

        deserializer.deserialize_any(FlagVisitor)
    }
}

/// One day's tokens as the store sees them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayEntry {
    pub start: String,
    pub end: String,
    #[serde(with = "flag", default)]
    pub both: bool,
}

/// Body of `POST /schedule/save-one`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveCellRequest {
    pub user_id: WorkerId,
    pub date: NaiveDate,
    pub start: String,
    pub end: String,
    #[serde(with = "flag")]
    pub both: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkRow {
    pub user_id: WorkerId,
    pub days: BTreeMap<NaiveDate, DayEntry>,
}

/// Body of `POST /schedule/save`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkSaveRequest {
    pub month: YearMonth,
    pub rows: Vec<BulkRow>,
}

impl BulkSaveRequest {
    pub fn day_count(&self) -> usize {
        self.rows.iter().map(|r| r.days.len()).sum()
    }
}

/// Raw `save-one` reply before validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveCellResponse {
    pub ok: bool,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Raw `save` reply before validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkSaveResponse {
    pub ok: bool,
    #[serde(default)]
    pub saved: Option<u32>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Accepted single-cell save
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellAck {
    Upserted,
    Deleted,
}

/// Accepted month save
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkAck {
    pub saved: u32,
}

impl SaveCellResponse {
    pub fn upserted() -> Self {
        Self { ok: true, action: Some("upsert".to_string()), error: None }
    }

    pub fn deleted() -> Self {
        Self { ok: true, action: Some("delete".to_string()), error: None }
    }

    pub fn rejected(reason: &str) -> Self {
        Self { ok: false, action: None, error: Some(reason.to_string()) }
    }

    pub fn into_ack(self) -> Result<CellAck, StoreError> {
        if !self.ok {
            return Err(StoreError::rejected(self.error.as_deref()));
        }
        match self.action.as_deref() {
            None | Some("upsert") => Ok(CellAck::Upserted),
            Some("delete") => Ok(CellAck::Deleted),
            Some(other) => Err(StoreError::Malformed(format!("unknown action {:?}", other))),
        }
    }
}

impl BulkSaveResponse {
    pub fn into_ack(self) -> Result<BulkAck, StoreError> {
        if !self.ok {
            return Err(StoreError::rejected(self.error.as_deref()));
        }
        let saved = self
            .saved
            .ok_or_else(|| StoreError::Malformed("missing saved count".to_string()))?;
        Ok(BulkAck { saved })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffMember {
    pub id: WorkerId,
    pub name: String,
}

/// Everything the grid needs to open a month: who is on staff, what is
/// already scheduled, and what the session may edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthSnapshot {
    pub month: YearMonth,
    #[serde(with = "flag")]
    pub edit_all: bool,
    #[serde(with = "flag")]
    pub edit_self: bool,
    pub my_uid: WorkerId,
    pub staff: Vec<StaffMember>,
    /// Keyed "uid:YYYY-MM-DD"
    #[serde(default)]
    pub prefill: BTreeMap<String, DayEntry>,
}

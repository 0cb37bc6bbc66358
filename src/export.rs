use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::schedule::time::format_duration;
use crate::schedule::{Row, ScheduleGrid};

#[derive(Serialize)]
pub struct MonthReport {
    pub month: String,
    pub exported_at: String,
    pub total_minutes: u32,
    pub workers: Vec<WorkerTotals>,
}

#[derive(Serialize)]
pub struct WorkerTotals {
    pub worker_id: i64,
    pub name: String,
    pub total_minutes: u32,
    /// Same value as `total_minutes`, as "HH:MM"
    pub total_display: String,
    pub shift_units: u32,
}

impl From<&Row> for WorkerTotals {
    fn from(row: &Row) -> Self {
        let totals = row.totals();
        Self {
            worker_id: row.worker_id,
            name: row.name.clone(),
            total_minutes: totals.total_minutes,
            total_display: format_duration(totals.total_minutes),
            shift_units: totals.shift_units,
        }
    }
}

/// Directory next to the executable used when no target is given
fn default_export_dir() -> Result<PathBuf> {
    let exe_path = std::env::current_exe().context("Failed to get exe path")?;
    let exe_dir = exe_path.parent().context("Failed to get exe directory")?;
    Ok(exe_dir.join("schedule-exports"))
}

/// Write the month's per-worker totals to `<dir>/schedule-YYYY-MM.json`.
/// Returns the path of the created file.
pub fn export_month(grid: &ScheduleGrid, dir: Option<&Path>) -> Result<PathBuf> {
    let dir = match dir {
        Some(dir) => dir.to_path_buf(),
        None => default_export_dir()?,
    };
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let workers: Vec<WorkerTotals> = grid.rows().iter().map(WorkerTotals::from).collect();
    let report = MonthReport {
        month: grid.month().to_string(),
        exported_at: Local::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
        total_minutes: workers.iter().map(|w| w.total_minutes).sum(),
        workers,
    };

    let file_path = dir.join(format!("schedule-{}.json", grid.month()));
    let json = serde_json::to_string_pretty(&report).context("Failed to serialize")?;
    fs::write(&file_path, json)
        .with_context(|| format!("Failed to write {}", file_path.display()))?;

    info!(path = %file_path.display(), workers = report.workers.len(), "month exported");
    Ok(file_path)
}

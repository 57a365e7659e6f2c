//! Durable run checkpoints and the start-date decision.
//!
//! Two independent markers: the last completed run (any mode) and the last
//! comprehensive sweep. Reads are fail-open: an unreadable or unparseable
//! marker behaves as if absent, erring toward doing more work rather than
//! skipping a window.

use chrono::{DateTime, Local, NaiveDate};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::constants::{COMPREHENSIVE_RUN_FILE_NAME, LAST_RUN_FILE_NAME};

pub trait CheckpointStore {
    fn last_run(&self) -> Option<DateTime<Local>>;
    fn comprehensive_run(&self) -> Option<DateTime<Local>>;
    fn record_last_run(&self, timestamp: &DateTime<Local>) -> io::Result<()>;
    fn record_comprehensive(&self, timestamp: &DateTime<Local>) -> io::Result<()>;
}

/// Marker files holding one RFC 3339 timestamp each.
pub struct FileCheckpoints {
    last_run_path: PathBuf,
    comprehensive_path: PathBuf,
}

impl FileCheckpoints {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            last_run_path: state_dir.join(LAST_RUN_FILE_NAME),
            comprehensive_path: state_dir.join(COMPREHENSIVE_RUN_FILE_NAME),
        }
    }
}

impl CheckpointStore for FileCheckpoints {
    fn last_run(&self) -> Option<DateTime<Local>> {
        read_marker(&self.last_run_path)
    }

    fn comprehensive_run(&self) -> Option<DateTime<Local>> {
        read_marker(&self.comprehensive_path)
    }

    fn record_last_run(&self, timestamp: &DateTime<Local>) -> io::Result<()> {
        write_marker(&self.last_run_path, timestamp)
    }

    fn record_comprehensive(&self, timestamp: &DateTime<Local>) -> io::Result<()> {
        write_marker(&self.comprehensive_path, timestamp)
    }
}

fn read_marker(path: &Path) -> Option<DateTime<Local>> {
    let raw = fs::read_to_string(path).ok()?;
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|parsed| parsed.with_timezone(&Local))
}

fn write_marker(path: &Path, timestamp: &DateTime<Local>) -> io::Result<()> {
    fs::write(path, timestamp.to_rfc3339())
}

/// A comprehensive sweep runs at most once per calendar day: due when no
/// marker exists or the marker's date is strictly before today.
pub fn comprehensive_due(marker: Option<NaiveDate>, today: NaiveDate) -> bool {
    match marker {
        Some(marker_date) => marker_date < today,
        None => true,
    }
}

/// How far back the next run must search. Each rule falls through to the
/// next when its input is absent rather than aborting.
pub fn determine_start_date(
    comprehensive_due: bool,
    last_run: Option<NaiveDate>,
    dataset_latest: Option<NaiveDate>,
    epoch: NaiveDate,
) -> NaiveDate {
    if !comprehensive_due {
        if let Some(last_run_date) = last_run {
            return last_run_date;
        }
    }
    match dataset_latest {
        Some(latest) => latest,
        None => epoch,
    }
}

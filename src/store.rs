//! Durable, deduplicated dataset of test records.
//!
//! The store is append-only from the agent's perspective: `persist` merges
//! new records under the (`LabNo`, `TestName`) key and rewrites the file
//! wholesale via temp-file-then-rename, so a crash mid-write can never lose
//! previously committed data.

use chrono::NaiveDate;
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::error::StoreError;
use crate::model::TestRecord;

/// Load the persisted dataset. A missing file is an empty dataset; an
/// unreadable or corrupt one is logged and treated as empty rather than
/// failing the run. Entries that do not match the five-field record shape
/// are repaired when the values are recoverable, dropped otherwise.
pub fn load(path: &Path) -> Vec<TestRecord> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return Vec::new(),
        Err(err) => {
            tracing::warn!("Could not read dataset {}: {err}", path.display());
            return Vec::new();
        }
    };

    let values: Vec<Value> = match serde_json::from_str(&raw) {
        Ok(values) => values,
        Err(err) => {
            tracing::warn!(
                "Existing dataset {} is corrupted ({err}). Starting fresh.",
                path.display()
            );
            return Vec::new();
        }
    };

    let total = values.len();
    let records: Vec<TestRecord> = values.iter().filter_map(TestRecord::from_value).collect();
    if records.len() < total {
        tracing::warn!(
            "Dropped {} malformed records while loading {}",
            total - records.len(),
            path.display()
        );
    }
    tracing::info!("Loaded {} existing records", records.len());
    records
}

/// Merge `new_records` into the dataset at `path`, skipping any candidate
/// whose (`LabNo`, `TestName`) key is already present, whether from the
/// existing dataset or from earlier in this same batch. Returns the number
/// of records actually added. An empty input is a successful no-op.
pub fn persist(path: &Path, new_records: &[TestRecord]) -> Result<usize, StoreError> {
    if new_records.is_empty() {
        tracing::info!("No new records to save");
        return Ok(0);
    }

    let mut records = load(path);
    let mut seen: HashSet<(String, String)> = records.iter().map(TestRecord::dedup_key).collect();

    let mut added = 0usize;
    for record in new_records {
        if seen.insert(record.dedup_key()) {
            records.push(record.clone());
            added += 1;
        }
    }

    write_atomic(path, &records)?;
    tracing::info!("Saved {added} new records. Total: {}", records.len());
    Ok(added)
}

/// Latest `EncounterDate` across the dataset, used to bound the next
/// search window when no last-run marker exists.
pub fn latest_encounter_date(records: &[TestRecord]) -> Option<NaiveDate> {
    records.iter().map(|record| record.encounter_date).max()
}

fn write_atomic(path: &Path, records: &[TestRecord]) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(records)?;

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("data.json");
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));

    fs::write(&tmp_path, json).map_err(|source| StoreError::Write {
        path: tmp_path.clone(),
        source,
    })?;
    fs::rename(&tmp_path, path).map_err(|source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

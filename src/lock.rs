//! File-based mutual exclusion for the whole run.
//!
//! The external scheduler can fire a new invocation while the previous one
//! is still sweeping; presence of the lock file means a run is in flight.
//! A lock older than the staleness threshold is treated as abandoned by a
//! crashed process and taken over.

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize)]
struct LockToken {
    pid: u32,
    acquired_at: String,
}

pub struct RunLock {
    path: PathBuf,
    released: bool,
}

impl RunLock {
    /// Try to acquire the run lock. Returns `None` when another run holds a
    /// fresh lock or on any I/O error: fail closed, do not run.
    pub fn acquire(path: &Path, stale_after: Duration) -> Option<Self> {
        if path.exists() {
            match lock_age(path) {
                Some(age) if age > stale_after => {
                    tracing::warn!(
                        "Found stale lock file ({:.1} minutes old). Removing it.",
                        age.as_secs_f64() / 60.0
                    );
                    if let Err(err) = fs::remove_file(path) {
                        tracing::error!("Failed removing stale lock: {err}");
                        return None;
                    }
                }
                Some(_) => {
                    tracing::info!("Another instance is already running. Exiting.");
                    return None;
                }
                None => {
                    tracing::warn!("Could not determine lock file age. Exiting.");
                    return None;
                }
            }
        }

        let token = LockToken {
            pid: std::process::id(),
            acquired_at: Local::now().to_rfc3339(),
        };
        let contents = match serde_json::to_string(&token) {
            Ok(contents) => contents,
            Err(err) => {
                tracing::error!("Failed encoding lock token: {err}");
                return None;
            }
        };
        if let Err(err) = fs::write(path, contents) {
            tracing::error!("Failed to acquire lock: {err}");
            return None;
        }

        tracing::debug!("Lock acquired");
        Some(Self {
            path: path.to_path_buf(),
            released: false,
        })
    }

    /// Idempotent and always safe to call; a missing lock file is not an
    /// error, and removal failures are logged since the process is exiting
    /// anyway.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if self.path.exists() {
            match fs::remove_file(&self.path) {
                Ok(()) => tracing::debug!("Lock released"),
                Err(err) => tracing::error!("Failed to release lock: {err}"),
            }
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        self.release();
    }
}

fn lock_age(path: &Path) -> Option<Duration> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    modified.elapsed().ok()
}

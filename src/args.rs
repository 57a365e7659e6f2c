use clap::Parser;
use std::path::PathBuf;

use crate::constants::{DATA_FILE_NAME, DEFAULT_PORTAL_URL};

#[derive(Debug, Parser)]
#[command(name = "lims_sync")]
#[command(
    about = "Sync newly recorded LIMS patient encounters and their test details into a deduplicated local dataset"
)]
pub struct Args {
    /// LIMS portal base URL. Credentials come from the LIMS_USERNAME and
    /// LIMS_PASSWORD environment variables.
    #[arg(long, default_value = DEFAULT_PORTAL_URL)]
    pub portal_url: String,

    /// Directory holding the dataset, checkpoint markers, and run lock.
    #[arg(long, default_value = ".")]
    pub state_dir: PathBuf,

    /// Dataset JSON path. Defaults to <state-dir>/data.json.
    #[arg(long)]
    pub data_file: Option<PathBuf>,

    /// Max concurrent per-encounter detail fetches against the portal.
    #[arg(long, default_value_t = 4)]
    pub concurrency: usize,

    /// Run a comprehensive day-by-day sweep regardless of the daily marker.
    #[arg(long, default_value_t = false)]
    pub force_comprehensive: bool,

    /// Seconds after which an existing lock file counts as abandoned.
    #[arg(long, default_value_t = 7200)]
    pub lock_stale_seconds: u64,

    /// Also export the merged dataset as delimited text after a successful
    /// merge.
    #[arg(long)]
    pub export_csv: Option<PathBuf>,
}

impl Args {
    pub fn data_file(&self) -> PathBuf {
        self.data_file
            .clone()
            .unwrap_or_else(|| self.state_dir.join(DATA_FILE_NAME))
    }
}

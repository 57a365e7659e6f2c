use chrono::NaiveDate;
use std::time::Duration;

pub const DEFAULT_PORTAL_URL: &str = "http://192.168.10.84:8080";

pub const LOGIN_PAGE_PATH: &str = "/index.php?m=";
pub const AUTH_PATH: &str = "/auth.php";
pub const HOME_PATH: &str = "/home.php";
pub const SEARCH_PATH: &str = "/search.php";
pub const DETAIL_PATH: &str = "/hoverrequest_b.php";

pub const DATA_FILE_NAME: &str = "data.json";
pub const LAST_RUN_FILE_NAME: &str = ".last_run";
pub const COMPREHENSIVE_RUN_FILE_NAME: &str = ".last_comprehensive_run";
pub const LOCK_FILE_NAME: &str = ".lims_fetch.lock";

/// Period label the portal accepts as a recent-data backstop query.
pub const BACKSTOP_PERIOD: &str = "Last 3 Days";

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36";

/// Bulk search queries can take minutes on long windows.
pub const SEARCH_TIMEOUT: Duration = Duration::from_secs(300);
/// Per-encounter detail pages are small; fail fast and move on.
pub const DETAIL_TIMEOUT: Duration = Duration::from_secs(30);

/// Earliest date the dataset covers; the fallback window start when neither
/// checkpoint markers nor existing records are available.
pub fn dataset_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 4, 1).unwrap_or_default()
}

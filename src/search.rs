//! Search strategy against the portal's encounter search endpoint.
//!
//! The portal's date-range search silently truncates above an undocumented
//! result ceiling (around 6k rows), so long windows must be enumerated one
//! exact-date query per day. That comprehensive sweep is slow and reserved
//! for at most once per day or the very first run; every other run takes the
//! fast incremental path.

use chrono::NaiveDate;
use reqwest::Client;
use std::collections::BTreeMap;

use crate::constants::{BACKSTOP_PERIOD, SEARCH_PATH, SEARCH_TIMEOUT};
use crate::error::QueryError;
use crate::extract::parse_listing;
use crate::model::Encounter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// One range query plus an exact-date query for today. Today's
    /// exact-date result is authoritative over the range result.
    Incremental,
    /// One exact-date query per day in the window, plus a relative-period
    /// backstop for just-landed data.
    Comprehensive,
}

/// Run every query the mode calls for and merge the results by `LabNo`,
/// later queries overwriting earlier ones for the same key. A failed query
/// is logged and contributes zero results; the sweep continues.
pub async fn execute(
    client: &Client,
    base_url: &str,
    mode: SearchMode,
    start: NaiveDate,
    today: NaiveDate,
) -> BTreeMap<String, Encounter> {
    let mut merged: BTreeMap<String, Encounter> = BTreeMap::new();

    match mode {
        SearchMode::Comprehensive => {
            let days = (today - start).num_days() + 1;
            tracing::info!("Comprehensive sweep: daily searches for all {days} days");

            for day in start.iter_days().take_while(|day| *day <= today) {
                match search_by_date(client, base_url, day).await {
                    Ok(found) => {
                        tracing::info!(
                            "Date {day}: found {} patients (unique so far: {})",
                            found.len(),
                            merged.len()
                        );
                        merge_by_lab_no(&mut merged, found);
                    }
                    Err(err) => tracing::warn!("Date search failed for {day}: {err}"),
                }
            }

            tracing::info!("Adding period search as backstop for recent data...");
            match search_by_period(client, base_url, BACKSTOP_PERIOD).await {
                Ok(found) => merge_by_lab_no(&mut merged, found),
                Err(err) => tracing::warn!("Period search failed for {BACKSTOP_PERIOD:?}: {err}"),
            }
        }
        SearchMode::Incremental => {
            tracing::info!("Incremental update: range search {start}..{today}");

            match search_by_date_range(client, base_url, start, today).await {
                Ok(found) => merge_by_lab_no(&mut merged, found),
                Err(err) => tracing::warn!("Date range search failed: {err}"),
            }

            // The range query can miss same-day records created after its
            // cache point; re-query today exactly so those win the merge.
            if today >= start {
                match search_by_date(client, base_url, today).await {
                    Ok(found) => merge_by_lab_no(&mut merged, found),
                    Err(err) => tracing::warn!("Date search failed for {today}: {err}"),
                }
            }
        }
    }

    tracing::info!("Total unique patients found: {}", merged.len());
    merged
}

fn merge_by_lab_no(merged: &mut BTreeMap<String, Encounter>, found: Vec<Encounter>) {
    for encounter in found {
        merged.insert(encounter.lab_no.clone(), encounter);
    }
}

async fn search_by_date_range(
    client: &Client,
    base_url: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<Encounter>, QueryError> {
    let params = [
        ("searchtype", "daterange".to_string()),
        ("datepicker", start.to_string()),
        ("datepicker2", end.to_string()),
        ("Get", "Get".to_string()),
    ];
    run_search(client, base_url, &params, "daterange").await
}

async fn search_by_date(
    client: &Client,
    base_url: &str,
    date: NaiveDate,
) -> Result<Vec<Encounter>, QueryError> {
    let params = [
        ("searchtype", "date".to_string()),
        ("datepicker", date.to_string()),
        ("Get", "Get".to_string()),
    ];
    run_search(client, base_url, &params, "date").await
}

async fn search_by_period(
    client: &Client,
    base_url: &str,
    period: &str,
) -> Result<Vec<Encounter>, QueryError> {
    let params = [
        ("searchtype", "period".to_string()),
        ("criteria", period.to_string()),
        ("Get", "Get".to_string()),
    ];
    run_search(client, base_url, &params, "period").await
}

async fn run_search(
    client: &Client,
    base_url: &str,
    params: &[(&str, String)],
    search_method: &str,
) -> Result<Vec<Encounter>, QueryError> {
    let response = client
        .get(format!("{base_url}{SEARCH_PATH}"))
        .query(params)
        .timeout(SEARCH_TIMEOUT)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(QueryError::Status(status));
    }

    let body = response.text().await?;
    Ok(parse_listing(&body, search_method))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encounter(lab_no: &str, src: &str) -> Encounter {
        Encounter {
            encounter_date: NaiveDate::from_ymd_opt(2025, 6, 10).unwrap(),
            invoice_no: "INV-1".to_string(),
            lab_no: lab_no.to_string(),
            src: src.to_string(),
        }
    }

    #[test]
    fn later_queries_overwrite_earlier_ones_for_same_lab_no() {
        // Range query result first, then a same-day exact-date query with an
        // updated Src for the same lab number: the exact-date value wins.
        let mut merged = BTreeMap::new();
        merge_by_lab_no(&mut merged, vec![encounter("123", "OPD")]);
        merge_by_lab_no(&mut merged, vec![encounter("123", "ER"), encounter("124", "OPD")]);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged["123"].src, "ER");
    }

    #[test]
    fn merge_keeps_one_entry_per_lab_no() {
        let mut merged = BTreeMap::new();
        merge_by_lab_no(
            &mut merged,
            vec![encounter("1", "A"), encounter("1", "B"), encounter("2", "A")],
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged["1"].src, "B");
    }
}

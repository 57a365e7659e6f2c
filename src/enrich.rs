//! Per-encounter detail enrichment.
//!
//! Each discovered encounter gets a secondary fetch for its associated test
//! names, expanded into one record per test. Fetches run on a bounded pool;
//! one encounter's failure yields zero records for it and never cancels the
//! others. The merge into the store happens once, after every fetch has
//! settled.

use futures::{StreamExt, stream::FuturesUnordered};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;

use crate::constants::{DETAIL_PATH, DETAIL_TIMEOUT};
use crate::error::QueryError;
use crate::extract::parse_detail;
use crate::model::{Encounter, TestRecord};

pub async fn enrich_encounters(
    client: &Client,
    base_url: &str,
    encounters: Vec<Encounter>,
    concurrency: usize,
) -> Vec<TestRecord> {
    let total = encounters.len();
    tracing::info!("Fetching test details for {total} patients...");

    let progress = ProgressBar::new(total as u64);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} [details {elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
    ) {
        progress.set_style(style.progress_chars("=> "));
    }

    let mut queue = encounters.into_iter();
    let mut in_flight = FuturesUnordered::new();
    for _ in 0..concurrency.max(1) {
        if let Some(encounter) = queue.next() {
            in_flight.push(fetch_tests(client.clone(), base_url.to_string(), encounter));
        }
    }

    let mut records = Vec::new();
    let mut ok = 0usize;
    let mut failed = 0usize;

    while let Some((encounter, result)) = in_flight.next().await {
        progress.inc(1);

        match result {
            Ok(test_names) => {
                ok += 1;
                for test_name in test_names {
                    records.push(encounter.test_record(test_name));
                }
            }
            Err(err) => {
                failed += 1;
                tracing::warn!("Detail fetch failed for lab no {}: {err}", encounter.lab_no);
            }
        }
        progress.set_message(format!("ok={ok} failed={failed}"));

        if let Some(encounter) = queue.next() {
            in_flight.push(fetch_tests(client.clone(), base_url.to_string(), encounter));
        }
    }

    progress.finish_with_message(format!("done: ok={ok} failed={failed}"));
    tracing::info!("Fetched {} test records", records.len());
    records
}

async fn fetch_tests(
    client: Client,
    base_url: String,
    encounter: Encounter,
) -> (Encounter, Result<Vec<String>, QueryError>) {
    let result = fetch_detail(&client, &base_url, &encounter).await;
    (encounter, result)
}

async fn fetch_detail(
    client: &Client,
    base_url: &str,
    encounter: &Encounter,
) -> Result<Vec<String>, QueryError> {
    let response = client
        .get(format!("{base_url}{DETAIL_PATH}"))
        .query(&[
            ("iid", encounter.invoice_no.as_str()),
            ("encounterno", encounter.lab_no.as_str()),
        ])
        .timeout(DETAIL_TIMEOUT)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(QueryError::Status(status));
    }

    let body = response.text().await?;
    Ok(parse_detail(&body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::HashSet;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn encounter(invoice_no: &str, lab_no: &str) -> Encounter {
        Encounter {
            encounter_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            invoice_no: invoice_no.to_string(),
            lab_no: lab_no.to_string(),
            src: "OPD".to_string(),
        }
    }

    const DETAIL_FIXTURE: &str = r#"<table class="table-bordered">
        <tr><th>#</th><th>Code</th><th>Test</th></tr>
        <tr><td>1</td><td>T01</td><td>CBC</td></tr>
    </table>"#;

    /// Minimal loopback portal: serves the detail fixture for every invoice
    /// except the ones listed in `failing`, which get a 500.
    async fn spawn_detail_server(failing: &'static [&'static str]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    let request = String::from_utf8_lossy(&buf[..n]).to_string();
                    let response = if failing.iter().any(|iid| request.contains(&format!("iid={iid}"))) {
                        "HTTP/1.1 500 Internal Server Error\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                            .to_string()
                    } else {
                        format!(
                            "HTTP/1.1 200 OK\r\ncontent-type: text/html\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                            DETAIL_FIXTURE.len(),
                            DETAIL_FIXTURE
                        )
                    };
                    let _ = socket.write_all(response.as_bytes()).await;
                });
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn one_failed_fetch_does_not_lose_the_others() {
        let base_url = spawn_detail_server(&["INV-2"]).await;
        let client = Client::new();
        let encounters = vec![
            encounter("INV-1", "L1"),
            encounter("INV-2", "L2"),
            encounter("INV-3", "L3"),
        ];

        let records = enrich_encounters(&client, &base_url, encounters, 2).await;

        let labs: HashSet<String> = records.iter().map(|r| r.lab_no.clone()).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(labs, HashSet::from(["L1".to_string(), "L3".to_string()]));
        assert!(records.iter().all(|r| r.test_name == "CBC"));

        // The surviving encounters' records still reach the store.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        assert_eq!(crate::store::persist(&path, &records).unwrap(), 2);
        assert_eq!(crate::store::load(&path).len(), 2);
    }

    #[tokio::test]
    async fn failed_fetches_are_contained_not_fatal() {
        // Nothing listens here; every detail fetch fails fast with a
        // connection error and the enricher still settles every encounter.
        let client = Client::new();
        let encounters = vec![
            Encounter {
                encounter_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
                invoice_no: "INV-1".to_string(),
                lab_no: "L1".to_string(),
                src: "OPD".to_string(),
            },
            Encounter {
                encounter_date: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
                invoice_no: "INV-2".to_string(),
                lab_no: "L2".to_string(),
                src: "OPD".to_string(),
            },
        ];

        let records = enrich_encounters(&client, "http://127.0.0.1:9", encounters, 2).await;
        assert!(records.is_empty());
    }
}

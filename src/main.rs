mod args;
mod auth;
mod checkpoint;
mod constants;
mod enrich;
mod error;
mod extract;
mod lock;
mod model;
mod report;
mod search;
mod store;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use reqwest::Client;
use std::fs;
use std::path::Path;
use std::time::Duration;

use args::Args;
use checkpoint::{CheckpointStore, FileCheckpoints};
use constants::{LOCK_FILE_NAME, USER_AGENT, dataset_epoch};
use lock::RunLock;
use model::Encounter;
use search::SearchMode;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    fs::create_dir_all(&args.state_dir).with_context(|| {
        format!(
            "Failed creating state directory {}",
            args.state_dir.display()
        )
    })?;

    let lock_path = args.state_dir.join(LOCK_FILE_NAME);
    let stale_after = Duration::from_secs(args.lock_stale_seconds);
    let Some(mut run_lock) = RunLock::acquire(&lock_path, stale_after) else {
        // Contended: exit with no side effects.
        return Ok(());
    };

    let outcome = run(&args).await;
    run_lock.release();
    outcome
}

async fn run(args: &Args) -> Result<()> {
    tracing::info!("Starting LIMS data fetch...");

    let credentials = auth::credentials_from_env()?;
    let client = Client::builder()
        .cookie_store(true)
        .user_agent(USER_AGENT)
        .build()
        .context("Failed creating HTTP client")?;
    auth::login(&client, &args.portal_url, &credentials).await?;

    let run_started = Local::now();
    let today = run_started.date_naive();
    let checkpoints = FileCheckpoints::new(&args.state_dir);
    let data_file = args.data_file();

    let existing = store::load(&data_file);
    let last_run = checkpoints.last_run();
    let comprehensive_due = args.force_comprehensive
        || checkpoint::comprehensive_due(
            checkpoints.comprehensive_run().map(|ts| ts.date_naive()),
            today,
        );
    let first_run = last_run.is_none() && existing.is_empty();
    let mode = if comprehensive_due || first_run {
        SearchMode::Comprehensive
    } else {
        SearchMode::Incremental
    };
    let start = checkpoint::determine_start_date(
        comprehensive_due,
        last_run.map(|ts| ts.date_naive()),
        store::latest_encounter_date(&existing),
        dataset_epoch(),
    );

    if mode == SearchMode::Comprehensive {
        let days = (today - start).num_days() + 1;
        tracing::warn!("COMPREHENSIVE RUN: fetching {days} days of data. Slower, by design.");
    }
    tracing::info!("Fetching window {start}..{today}");

    let fetch_outcome =
        fetch_and_merge(args, &client, &checkpoints, &data_file, mode, start, today).await;

    // Written even when the fetch phase failed: retrying the same window
    // forever against a persistently failing portal would widen every later
    // window without bound.
    if let Err(err) = checkpoints.record_last_run(&run_started) {
        tracing::error!("Failed to save last run timestamp: {err}");
    } else {
        tracing::info!("Updated last run timestamp");
    }

    tracing::info!("LIMS fetch complete");
    fetch_outcome
}

async fn fetch_and_merge(
    args: &Args,
    client: &Client,
    checkpoints: &FileCheckpoints,
    data_file: &Path,
    mode: SearchMode,
    start: chrono::NaiveDate,
    today: chrono::NaiveDate,
) -> Result<()> {
    let discovered = search::execute(client, &args.portal_url, mode, start, today).await;
    let encounters: Vec<Encounter> = discovered.into_values().collect();

    let records = enrich::enrich_encounters(client, &args.portal_url, encounters, args.concurrency).await;
    store::persist(data_file, &records)
        .with_context(|| format!("Failed persisting dataset {}", data_file.display()))?;

    if args.export_csv.is_some() {
        report::maybe_export(args.export_csv.as_deref(), &store::load(data_file));
    }

    // Search failures are contained per query, so reaching this point means
    // the sweep itself ran to completion; a persist failure above returns
    // before the marker moves.
    if mode == SearchMode::Comprehensive {
        if let Err(err) = checkpoints.record_comprehensive(&Local::now()) {
            tracing::error!("Failed to save comprehensive run timestamp: {err}");
        } else {
            tracing::info!("Comprehensive run completed");
        }
    }

    Ok(())
}

//! Delimited-text export of the merged dataset for downstream consumers.

use anyhow::{Context, Result};
use csv::Writer;
use std::fs;
use std::path::Path;

use crate::model::TestRecord;

/// Best-effort export: the report is a downstream convenience, so a failure
/// here is logged and never blocks the rest of the run.
pub fn maybe_export(output_path: Option<&Path>, records: &[TestRecord]) {
    let Some(output_path) = output_path else {
        return;
    };
    match export_csv(output_path, records) {
        Ok(()) => tracing::info!("Wrote report CSV {}", output_path.display()),
        Err(err) => tracing::error!("Report CSV export failed: {err:#}"),
    }
}

pub fn export_csv(output_path: &Path, records: &[TestRecord]) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed creating report dir {}", parent.display()))?;
        }
    }

    let file_name = output_path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("report.csv");
    let tmp_path = output_path.with_file_name(format!("{file_name}.tmp"));

    let mut writer = Writer::from_path(&tmp_path)
        .with_context(|| format!("Failed creating temp report CSV {}", tmp_path.display()))?;
    writer
        .write_record(["EncounterDate", "InvoiceNo", "LabNo", "Src", "TestName"])
        .context("Failed writing report CSV header")?;

    for record in records {
        writer
            .write_record([
                record.encounter_date.to_string(),
                record.invoice_no.clone(),
                record.lab_no.clone(),
                record.src.clone(),
                record.test_name.clone(),
            ])
            .context("Failed writing report CSV row")?;
    }
    writer.flush().context("Failed flushing report CSV writer")?;

    fs::rename(&tmp_path, output_path).with_context(|| {
        format!(
            "Failed moving temp report {} to {}",
            tmp_path.display(),
            output_path.display()
        )
    })?;
    Ok(())
}

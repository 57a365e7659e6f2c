//! Extraction of structured rows from the portal's HTML responses.
//!
//! Both shapes are tolerant: a malformed row is logged and skipped, and a
//! missing table yields an empty result rather than an error, because
//! absence of data is not a fetch failure.

use chrono::NaiveDate;
use scraper::{Html, Selector};

use crate::error::ParseError;
use crate::model::Encounter;

/// Listing cells: 0 = encounter date (DD-MM-YYYY), 1 = lab no, 3 = invoice
/// no, 7 = source/category. Rows with fewer than 8 cells are malformed.
const LISTING_MIN_CELLS: usize = 8;
const DETAIL_MIN_CELLS: usize = 3;

/// Parse the patient listing table (`<table id="list">`) into encounters.
pub fn parse_listing(html: &str, search_method: &str) -> Vec<Encounter> {
    let mut encounters = Vec::new();

    let Ok(table_selector) = Selector::parse("table#list") else {
        return encounters;
    };
    let Ok(row_selector) = Selector::parse("tr") else {
        return encounters;
    };
    let Ok(cell_selector) = Selector::parse("td") else {
        return encounters;
    };

    let document = Html::parse_document(html);
    let Some(table) = document.select(&table_selector).next() else {
        tracing::warn!("No patient table found using {search_method} search");
        return encounters;
    };

    // First row is the header.
    for row in table.select(&row_selector).skip(1) {
        let cells: Vec<String> = row
            .select(&cell_selector)
            .map(|cell| cell.text().collect::<String>().trim().to_string())
            .collect();

        match listing_row(&cells) {
            Ok(encounter) => encounters.push(encounter),
            Err(reason) => tracing::warn!("Skipping patient row ({search_method}): {reason}"),
        }
    }

    tracing::info!(
        "Found {} patients using {search_method} search",
        encounters.len()
    );
    encounters
}

fn listing_row(cells: &[String]) -> Result<Encounter, ParseError> {
    if cells.len() < LISTING_MIN_CELLS {
        return Err(ParseError::TooFewCells {
            got: cells.len(),
            want: LISTING_MIN_CELLS,
        });
    }

    // The portal renders dates day-first; normalize to calendar dates here
    // so everything downstream is ISO.
    let encounter_date = NaiveDate::parse_from_str(&cells[0], "%d-%m-%Y")
        .map_err(|_| ParseError::BadDate(cells[0].clone()))?;
    let lab_no = required(&cells[1], "LabNo")?;
    let invoice_no = required(&cells[3], "InvoiceNo")?;
    let src = required(&cells[7], "Src")?;

    Ok(Encounter {
        encounter_date,
        invoice_no,
        lab_no,
        src,
    })
}

fn required(value: &str, name: &'static str) -> Result<String, ParseError> {
    if value.is_empty() {
        Err(ParseError::EmptyField(name))
    } else {
        Ok(value.to_string())
    }
}

/// Parse a per-encounter detail response into its test names. The bordered
/// results table lists one test per row; the name sits in the third cell.
pub fn parse_detail(html: &str) -> Vec<String> {
    let mut tests = Vec::new();

    let Ok(table_selector) = Selector::parse("table.table-bordered") else {
        return tests;
    };
    let Ok(row_selector) = Selector::parse("tr") else {
        return tests;
    };
    let Ok(cell_selector) = Selector::parse("td") else {
        return tests;
    };

    let document = Html::parse_document(html);
    let Some(table) = document.select(&table_selector).next() else {
        return tests;
    };

    for row in table.select(&row_selector).skip(1) {
        let cells: Vec<_> = row.select(&cell_selector).collect();
        if cells.len() < DETAIL_MIN_CELLS {
            continue;
        }
        let test_name = cells[2].text().collect::<String>().trim().to_string();
        if !test_name.is_empty() {
            tests.push(test_name);
        }
    }

    tests
}

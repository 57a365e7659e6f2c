//! Error taxonomy for the sync run.
//!
//! The containment level is part of each type's contract: `AuthError` aborts
//! the run before any dataset mutation, `QueryError` is recovered per query
//! as zero results, `ParseError` is recovered per row, and `StoreError` is
//! fatal only on the write side (a corrupt store reads as empty).

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("LIMS credentials are not set (LIMS_USERNAME / LIMS_PASSWORD)")]
    MissingCredentials,
    #[error("rdm token not found on login page")]
    TokenNotFound,
    #[error("login did not land on the home page (ended at {0})")]
    UnexpectedLanding(String),
    #[error("login request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("portal returned status {0}")]
    Status(reqwest::StatusCode),
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("row has {got} cells, expected at least {want}")]
    TooFewCells { got: usize, want: usize },
    #[error("unparseable encounter date {0:?}")]
    BadDate(String),
    #[error("required field {0} is empty")]
    EmptyField(&'static str),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed writing dataset {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed encoding dataset: {0}")]
    Encode(#[from] serde_json::Error),
}

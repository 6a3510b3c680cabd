use std::path::PathBuf;
use thiserror::Error;

/// Setup and persistence failures. Anything in here aborts the run;
/// per-item network failures live in [`crate::fetcher::FetchError`] instead.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("input file {path:?} is missing or unreadable: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("input file {path:?} could not be parsed: {source}")]
    InputFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid id range: start {start} is greater than end {end}")]
    InvalidRange { start: u64, end: u64 },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("checkpoint invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, HarvestError>;

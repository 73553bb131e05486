//! Error taxonomy for the history engine
//!
//! Every variant is scoped to one item or one series; callers log and move on
//! rather than aborting the batch. Only `SourceRead` is fatal to a run.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("No quotes collected for item {item_id}")]
    NoQuotes { item_id: String },

    #[error("Invalid price {price} for item {item_id}")]
    InvalidPrice { item_id: String, price: u64 },

    #[error("Sample for {item_id} at {timestamp} is older than the last stored sample at {last}")]
    OutOfOrderSample {
        item_id: String,
        timestamp: DateTime<Utc>,
        last: DateTime<Utc>,
    },

    #[error("Item id {item_id:?} cannot be used as a file name")]
    InvalidItemId { item_id: String },

    #[error("Malformed persisted state in {path} ({series}): {reason}")]
    MalformedState {
        path: PathBuf,
        series: String,
        reason: String,
    },

    #[error("Failed to write {path}: {source}")]
    PersistenceWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read item source {path}: {reason}")]
    SourceRead { path: PathBuf, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type HistoryResult<T> = Result<T, HistoryError>;

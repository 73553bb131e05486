//! Quote collection worker pool
//!
//! A `QuoteSource` fetches the raw quotes of one item. `collect_quotes` fans
//! items out over a bounded pool, retries failures with back-off, and joins
//! every worker before handing back the feed. Items that never succeed come
//! back with no quotes and resolve to NO_DATA downstream.

use super::backoff::ExponentialBackoff;
use super::config::CollectConfig;
use crate::history_core::{HistoryError, HistoryResult, ItemId, ItemQuotes, Price};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::timeout;

const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

type FetchResult = Result<Vec<Price>, CollectError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollectError {
    #[error("Quote collection timed out")]
    Timeout,

    #[error("Quote collection failed: {0}")]
    Failed(String),

    #[error("Maximum retry attempts exceeded")]
    MaxRetriesExceeded,
}

/// One entry of the item list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedItem {
    pub item_id: ItemId,
    pub item_name: String,
    /// Quotes already listed next to the item, if any
    pub listed_quotes: Vec<Price>,
}

#[derive(Debug, Deserialize)]
struct ItemListEntry {
    #[serde(default)]
    item_name: String,
    #[serde(default)]
    quotes: Vec<Price>,
}

/// Read `{item_id: {item_name, quotes?}}`. Entries without an id or name are
/// skipped; `limit` keeps the first N entries in file order.
pub fn load_item_list(path: &Path, limit: Option<usize>) -> HistoryResult<Vec<TrackedItem>> {
    let source_err = |reason: String| HistoryError::SourceRead {
        path: path.to_path_buf(),
        reason,
    };
    let text = std::fs::read_to_string(path).map_err(|e| source_err(e.to_string()))?;
    // Map keeps file order, which decides the subset kept under `limit`
    let entries: Map<String, Value> =
        serde_json::from_str(&text).map_err(|e| source_err(e.to_string()))?;

    let mut items = Vec::with_capacity(entries.len());
    for (item_id, value) in entries {
        let entry: ItemListEntry = serde_json::from_value(value)
            .map_err(|e| source_err(format!("entry '{}': {}", item_id, e)))?;
        let item_id = item_id.trim().to_string();
        let item_name = entry.item_name.trim().to_string();
        if item_id.is_empty() || item_name.is_empty() {
            log::warn!("Skipping item list entry '{}' without id or name", item_id);
            continue;
        }
        items.push(TrackedItem {
            item_id,
            item_name,
            listed_quotes: entry.quotes,
        });
    }

    if let Some(limit) = limit {
        items.truncate(limit);
    }
    log::info!("📋 Loaded {} tracked items from {}", items.len(), path.display());
    Ok(items)
}

/// Contract of the external scraping collaborator
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn fetch_quotes(&self, item: &TrackedItem) -> Result<Vec<Price>, CollectError>;

    /// Source type for logging
    fn source_type(&self) -> &'static str;
}

/// Serves the quotes listed in the item file
pub struct StaticQuoteSource;

#[async_trait]
impl QuoteSource for StaticQuoteSource {
    async fn fetch_quotes(&self, item: &TrackedItem) -> Result<Vec<Price>, CollectError> {
        Ok(item.listed_quotes.clone())
    }

    fn source_type(&self) -> &'static str {
        "static"
    }
}

/// Runs `<program> <args..> <item_name>` and reads quotes from its stdout
#[derive(Debug, Clone)]
pub struct CommandQuoteSource {
    program: String,
    args: Vec<String>,
}

impl CommandQuoteSource {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Split a whitespace-separated command line. `None` when blank.
    pub fn from_command_line(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }
}

#[async_trait]
impl QuoteSource for CommandQuoteSource {
    async fn fetch_quotes(&self, item: &TrackedItem) -> Result<Vec<Price>, CollectError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(&item.item_name)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| CollectError::Failed(format!("{}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CollectError::Failed(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        Ok(parse_quotes(&String::from_utf8_lossy(&output.stdout)))
    }

    fn source_type(&self) -> &'static str {
        "command"
    }
}

/// Quotes from scraper output: a JSON array of integers, or else every
/// digit run with thousands separators (`1,234,567`). Zeroes are dropped.
pub fn parse_quotes(output: &str) -> Vec<Price> {
    if let Ok(quotes) = serde_json::from_str::<Vec<Price>>(output.trim()) {
        return quotes.into_iter().filter(|p| *p > 0).collect();
    }
    output
        .split(|c: char| !(c.is_ascii_digit() || c == ','))
        .filter_map(|token| {
            let digits: String = token.chars().filter(char::is_ascii_digit).collect();
            digits.parse::<Price>().ok()
        })
        .filter(|p| *p > 0)
        .collect()
}

async fn fetch_with_retry(
    source: &dyn QuoteSource,
    item: &TrackedItem,
    config: &CollectConfig,
) -> Result<Vec<Price>, CollectError> {
    let mut backoff = ExponentialBackoff::new(
        config.retry_delay,
        MAX_RETRY_DELAY,
        config.retries.saturating_sub(1),
    );
    loop {
        let attempt = match timeout(config.timeout, source.fetch_quotes(item)).await {
            Ok(result) => result,
            Err(_) => Err(CollectError::Timeout),
        };
        match attempt {
            Ok(quotes) => return Ok(quotes),
            Err(e) => {
                log::warn!(
                    "⚠️  {} attempt {} for {} failed: {}",
                    source.source_type(),
                    backoff.attempts() + 1,
                    item.item_name,
                    e
                );
                backoff.sleep(&item.item_name).await?;
            }
        }
    }
}

/// Fetch quotes for every item on at most `config.workers` concurrent
/// workers. Every item appears in the result; failures carry no quotes.
pub async fn collect_quotes(
    source: Arc<dyn QuoteSource>,
    items: &[TrackedItem],
    config: &CollectConfig,
) -> BTreeMap<ItemId, ItemQuotes> {
    let mut feed: BTreeMap<ItemId, ItemQuotes> = items
        .iter()
        .map(|item| {
            (
                item.item_id.clone(),
                ItemQuotes {
                    item_id: item.item_id.clone(),
                    item_name: item.item_name.clone(),
                    quotes: Vec::new(),
                },
            )
        })
        .collect();

    let semaphore = Arc::new(Semaphore::new(config.workers.max(1)));
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<(TrackedItem, FetchResult)>();

    for item in items.iter().cloned() {
        let source = Arc::clone(&source);
        let semaphore = Arc::clone(&semaphore);
        let config = config.clone();
        let done_tx = done_tx.clone();
        tokio::spawn(async move {
            let result = match semaphore.acquire_owned().await {
                Ok(_permit) => fetch_with_retry(source.as_ref(), &item, &config).await,
                Err(e) => Err(CollectError::Failed(e.to_string())),
            };
            let _ = done_tx.send((item, result));
        });
    }
    // Closes once every worker has reported or died
    drop(done_tx);

    let mut reported = 0;
    while let Some((item, result)) = done_rx.recv().await {
        reported += 1;
        match result {
            Ok(quotes) => {
                log::debug!("Collected {} quotes for {}", quotes.len(), item.item_name);
                if let Some(entry) = feed.get_mut(&item.item_id) {
                    entry.quotes = quotes;
                }
            }
            Err(e) => {
                log::warn!("❌ Giving up on {}: {}", item.item_name, e);
            }
        }
    }
    if reported < items.len() {
        log::error!(
            "❌ {} collection workers exited without reporting",
            items.len() - reported
        );
    }

    feed
}

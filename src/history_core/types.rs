//! Core data types shared by selection, aggregation and persistence

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Prices are whole currency units; a valid price is always > 0.
pub type Price = u64;

pub type ItemId = String;

/// Outcome of resolving one item's quotes into a canonical price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuoteStatus {
    Normal,
    FallbackPrevious,
    FallbackMedian,
    NoData,
}

impl QuoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteStatus::Normal => "NORMAL",
            QuoteStatus::FallbackPrevious => "FALLBACK_PREVIOUS",
            QuoteStatus::FallbackMedian => "FALLBACK_MEDIAN",
            QuoteStatus::NoData => "NO_DATA",
        }
    }

    /// Any status that produced a price
    pub fn is_resolved(&self) -> bool {
        !matches!(self, QuoteStatus::NoData)
    }

    pub fn is_fallback(&self) -> bool {
        matches!(
            self,
            QuoteStatus::FallbackPrevious | QuoteStatus::FallbackMedian
        )
    }
}

/// Raw quotes for one item as delivered by the collector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemQuotes {
    pub item_id: ItemId,
    pub item_name: String,
    #[serde(default)]
    pub quotes: Vec<Price>,
}

/// A canonical observation (`sample_count == 1`) or a bucket aggregate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Closing edge: timestamp of the last member folded in
    pub timestamp: DateTime<Utc>,
    /// Bucket identity: timestamp of the first member folded in
    pub bucket_start: DateTime<Utc>,
    pub price: Price,
    pub item_id: ItemId,
    pub sample_count: u32,
}

impl PricePoint {
    pub fn sample(item_id: &str, timestamp: DateTime<Utc>, price: Price) -> Self {
        Self {
            timestamp,
            bucket_start: timestamp,
            price,
            item_id: item_id.to_string(),
            sample_count: 1,
        }
    }
}

/// Cross-item total for one run, or a bucket of runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalPoint {
    pub timestamp: DateTime<Utc>,
    pub bucket_start: DateTime<Utc>,
    pub total_price: Price,
    pub average_price: Price,
    pub item_count: u32,
    pub min_price: Price,
    pub max_price: Price,
    #[serde(default = "default_sample_count")]
    pub sample_count: u32,
}

fn default_sample_count() -> u32 {
    1
}

/// Floor a timestamp to the start of its minute.
///
/// Raw samples are keyed by minute bucket, so two observations within the
/// same minute collapse into one.
pub fn minute_bucket(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    timestamp
        .duration_trunc(TimeDelta::minutes(1))
        .unwrap_or(timestamp)
}

/// Integer mean, floored. Returns 0 for an empty input.
pub fn floor_mean(values: impl IntoIterator<Item = u64>) -> u64 {
    let (sum, count) = values
        .into_iter()
        .fold((0u128, 0u128), |(sum, count), v| (sum + v as u128, count + 1));
    if count == 0 {
        return 0;
    }
    u64::try_from(sum / count).unwrap_or(u64::MAX)
}

//! In-memory history owned by one run

use super::raw_store::RawSampleStore;
use super::resolution::Resolution;
use super::ring_buffer::RingBuffer;
use super::series::Series;
use super::types::{ItemId, Price, PricePoint, QuoteStatus, TotalPoint};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Latest canonical price of an item, as published to consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentPrice {
    pub item_name: String,
    pub price: Price,
    pub status: QuoteStatus,
    pub last_updated: DateTime<Utc>,
}

/// All series and buffers. Created empty or by `SeriesStore::load`; series
/// appear lazily the first time an item or resolution is touched.
#[derive(Debug, Clone)]
pub struct HistoryState {
    pub raw: RawSampleStore,
    pub total_samples: RingBuffer<TotalPoint>,
    pub item_series: BTreeMap<ItemId, BTreeMap<String, Series<PricePoint>>>,
    pub total_series: BTreeMap<String, Series<TotalPoint>>,
    pub current: BTreeMap<ItemId, CurrentPrice>,
    pub item_names: BTreeMap<ItemId, String>,
}

impl HistoryState {
    pub fn new(raw_capacity: usize) -> Self {
        Self {
            raw: RawSampleStore::new(raw_capacity),
            total_samples: RingBuffer::new(raw_capacity),
            item_series: BTreeMap::new(),
            total_series: BTreeMap::new(),
            current: BTreeMap::new(),
            item_names: BTreeMap::new(),
        }
    }

    pub fn series(&self, item_id: &str, resolution: &Resolution) -> Option<&Series<PricePoint>> {
        self.item_series
            .get(item_id)
            .and_then(|by_res| by_res.get(resolution.as_str()))
    }

    pub fn series_mut(
        &mut self,
        item_id: &str,
        resolution: &Resolution,
    ) -> &mut Series<PricePoint> {
        self.item_series
            .entry(item_id.to_string())
            .or_default()
            .entry(resolution.as_str().to_string())
            .or_insert_with(|| Series::new(resolution.maxlen()))
    }

    pub fn total_series(&self, resolution: &Resolution) -> Option<&Series<TotalPoint>> {
        self.total_series.get(resolution.as_str())
    }

    /// Price used for fallback decisions
    pub fn previous_price(&self, item_id: &str) -> Option<Price> {
        self.current
            .get(item_id)
            .map(|c| c.price)
            .or_else(|| self.raw.latest(item_id).map(|p| p.price))
    }

    pub fn item_name<'a>(&'a self, item_id: &'a str) -> &'a str {
        self.item_names
            .get(item_id)
            .map(String::as_str)
            .unwrap_or(item_id)
    }
}

//! Per-item bounded buffers of canonical samples at base cadence

use super::error::{HistoryError, HistoryResult};
use super::ring_buffer::RingBuffer;
use super::types::{minute_bucket, ItemId, Price, PricePoint};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// What `RawSampleStore::ingest` did with a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Appended,
    /// Same minute bucket as the last sample: overwritten as a correction
    Replaced,
}

/// Ingest `sample` into a minute-keyed buffer.
///
/// Shared by item buffers and the run-over-run totals buffer.
pub(crate) fn ingest_sample<T>(
    buffer: &mut RingBuffer<T>,
    sample: T,
    timestamp_of: impl Fn(&T) -> DateTime<Utc>,
    owner: &str,
) -> HistoryResult<IngestOutcome> {
    let timestamp = timestamp_of(&sample);
    match buffer.last().map(&timestamp_of) {
        Some(last) if last == timestamp => {
            buffer.replace_last(sample);
            Ok(IngestOutcome::Replaced)
        }
        Some(last) if timestamp < last => Err(HistoryError::OutOfOrderSample {
            item_id: owner.to_string(),
            timestamp,
            last,
        }),
        _ => {
            buffer.push(sample);
            Ok(IngestOutcome::Appended)
        }
    }
}

#[derive(Debug, Clone)]
pub struct RawSampleStore {
    capacity: usize,
    buffers: BTreeMap<ItemId, RingBuffer<PricePoint>>,
}

impl RawSampleStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            buffers: BTreeMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record one canonical observation. The timestamp is floored to its
    /// minute; zero prices and samples older than the last minute bucket are
    /// rejected without touching the buffer.
    pub fn ingest(
        &mut self,
        item_id: &str,
        timestamp: DateTime<Utc>,
        price: Price,
    ) -> HistoryResult<IngestOutcome> {
        if price == 0 {
            return Err(HistoryError::InvalidPrice {
                item_id: item_id.to_string(),
                price,
            });
        }

        let capacity = self.capacity;
        let buffer = self
            .buffers
            .entry(item_id.to_string())
            .or_insert_with(|| RingBuffer::new(capacity));

        let sample = PricePoint::sample(item_id, minute_bucket(timestamp), price);
        ingest_sample(buffer, sample, |p| p.timestamp, item_id)
    }

    /// Restore a persisted buffer, keeping the newest samples within capacity.
    pub(crate) fn restore(&mut self, item_id: &str, samples: Vec<PricePoint>) {
        self.buffers.insert(
            item_id.to_string(),
            RingBuffer::from_vec(samples, self.capacity),
        );
    }

    pub fn buffer(&self, item_id: &str) -> Option<&RingBuffer<PricePoint>> {
        self.buffers.get(item_id)
    }

    pub fn latest(&self, item_id: &str) -> Option<&PricePoint> {
        self.buffers.get(item_id).and_then(|b| b.last())
    }

    pub fn item_ids(&self) -> impl Iterator<Item = &ItemId> {
        self.buffers.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ItemId, &RingBuffer<PricePoint>)> {
        self.buffers.iter()
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

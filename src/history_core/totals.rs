//! Cross-item totals per run and their bucketed series

use super::aggregator::update_series;
use super::error::HistoryResult;
use super::raw_store::{ingest_sample, IngestOutcome};
use super::resolution::Resolution;
use super::ring_buffer::RingBuffer;
use super::selector::Selection;
use super::series::{MergeOutcome, Series};
use super::types::{minute_bucket, ItemId, TotalPoint};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

pub const TOTALS_KEY: &str = "__totals__";

pub struct TotalAggregator;

impl TotalAggregator {
    /// Sum the run's resolved prices. Returns `None` when no item resolved,
    /// so a fully failed run never writes a zero point.
    pub fn compute(
        selections: &BTreeMap<ItemId, Selection>,
        timestamp: DateTime<Utc>,
    ) -> Option<TotalPoint> {
        let prices: Vec<u64> = selections
            .values()
            .filter(|s| s.status.is_resolved())
            .filter_map(|s| s.price)
            .collect();

        let item_count = prices.len() as u32;
        if item_count == 0 {
            return None;
        }
        let total_price: u64 = prices.iter().sum();
        let timestamp = minute_bucket(timestamp);

        Some(TotalPoint {
            timestamp,
            bucket_start: timestamp,
            total_price,
            average_price: total_price / item_count as u64,
            item_count,
            min_price: prices.iter().copied().min()?,
            max_price: prices.iter().copied().max()?,
            sample_count: 1,
        })
    }

    /// Record this run's point in the run-over-run buffer (same minute
    /// replaces) and refresh every resolution's total series from it.
    pub fn apply(
        point: TotalPoint,
        samples: &mut RingBuffer<TotalPoint>,
        series: &mut BTreeMap<String, Series<TotalPoint>>,
        resolutions: &[Resolution],
    ) -> HistoryResult<IngestOutcome> {
        let outcome = ingest_sample(samples, point, |p| p.timestamp, TOTALS_KEY)?;

        for resolution in resolutions {
            let target = series
                .entry(resolution.as_str().to_string())
                .or_insert_with(|| Series::new(resolution.maxlen()));
            if update_series(target, samples.iter(), resolution.bucket_width())
                == Some(MergeOutcome::Stale)
            {
                log::warn!("Stale {} total bucket ignored", resolution);
            }
        }

        Ok(outcome)
    }
}

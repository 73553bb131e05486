//! Greedy bucketing of raw samples into per-resolution series
//!
//! A group opens at a sample and absorbs every following sample that lands
//! less than one bucket width after the group's first sample. The next sample
//! past the width closes the group and opens a new one. Groups are labeled by
//! their last member (closing edge) and identified by their first.

use super::raw_store::RawSampleStore;
use super::resolution::Resolution;
use super::series::{MergeOutcome, Series, SeriesPoint};
use super::types::PricePoint;
use chrono::{DateTime, TimeDelta, Utc};

/// Group time-ordered samples and fold each group.
pub fn group_samples<'a, T, I>(samples: I, bucket_width: TimeDelta) -> Vec<T>
where
    T: SeriesPoint + 'a,
    I: IntoIterator<Item = &'a T>,
{
    group_from(samples, bucket_width, None)
}

/// Greedy grouping where the first group may be pinned to `origin`, a bucket
/// start whose opening sample is no longer in `samples`.
fn group_from<'a, T, I>(
    samples: I,
    bucket_width: TimeDelta,
    origin: Option<DateTime<Utc>>,
) -> Vec<T>
where
    T: SeriesPoint + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut groups = Vec::new();
    let mut members: Vec<T> = Vec::new();
    let mut start = origin;

    for sample in samples {
        let timestamp = sample.timestamp();
        match start {
            Some(s) if timestamp - s < bucket_width => {}
            _ => {
                close_group(&mut groups, &mut members, start);
                start = Some(timestamp);
            }
        }
        members.push(sample.clone());
    }
    close_group(&mut groups, &mut members, start);

    groups
}

fn close_group<T: SeriesPoint>(
    groups: &mut Vec<T>,
    members: &mut Vec<T>,
    start: Option<DateTime<Utc>>,
) {
    if let Some(mut group) = T::fold(members) {
        if let Some(start) = start {
            group.set_bucket_start(start);
        }
        groups.push(group);
    }
    members.clear();
}

/// Bring `series` up to date with `samples`.
///
/// An empty series is back-filled from the full grouping. Otherwise only
/// samples at or after the tail's bucket start are regrouped, with the first
/// group pinned to that start, and the newest group refines the tail or is
/// appended after it.
pub fn update_series<'a, T, I>(
    series: &mut Series<T>,
    samples: I,
    bucket_width: TimeDelta,
) -> Option<MergeOutcome>
where
    T: SeriesPoint + 'a,
    I: IntoIterator<Item = &'a T>,
{
    match series.last().map(|tail| tail.bucket_start()) {
        None => {
            let groups = group_samples(samples, bucket_width);
            let skip = groups.len().saturating_sub(series.maxlen());
            let mut outcome = None;
            for group in groups.into_iter().skip(skip) {
                outcome = Some(series.merge(group));
            }
            outcome
        }
        Some(anchor) => {
            let tail = samples.into_iter().filter(|s| s.timestamp() >= anchor);
            let newest = group_from(tail, bucket_width, Some(anchor)).pop()?;
            Some(series.merge(newest))
        }
    }
}

pub struct ResolutionAggregator {
    resolutions: Vec<Resolution>,
}

impl ResolutionAggregator {
    pub fn new(resolutions: Vec<Resolution>) -> Self {
        Self { resolutions }
    }

    pub fn resolutions(&self) -> &[Resolution] {
        &self.resolutions
    }

    /// Full regrouping of one item's raw buffer at `resolution`.
    pub fn aggregate(
        &self,
        raw: &RawSampleStore,
        item_id: &str,
        resolution: &Resolution,
    ) -> Vec<PricePoint> {
        match raw.buffer(item_id) {
            Some(buffer) => group_samples(buffer.iter(), resolution.bucket_width()),
            None => Vec::new(),
        }
    }

    /// Apply the item's newest group to its series at `resolution`.
    pub fn update(
        &self,
        raw: &RawSampleStore,
        item_id: &str,
        resolution: &Resolution,
        series: &mut Series<PricePoint>,
    ) -> Option<MergeOutcome> {
        let buffer = raw.buffer(item_id)?;
        let outcome = update_series(series, buffer.iter(), resolution.bucket_width());
        if outcome == Some(MergeOutcome::Stale) {
            log::warn!(
                "Stale {} bucket for {} ignored (series tail is newer)",
                resolution,
                item_id
            );
        }
        outcome
    }
}

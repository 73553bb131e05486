//! Bounded, bucket-ordered series with tail-overwrite-or-append merging

use super::ring_buffer::RingBuffer;
use super::types::{floor_mean, PricePoint, TotalPoint};
use chrono::{DateTime, Utc};

/// A point that can be bucketed, folded and validated
pub trait SeriesPoint: Clone {
    fn timestamp(&self) -> DateTime<Utc>;

    /// Identity of the bucket this point represents
    fn bucket_start(&self) -> DateTime<Utc>;

    fn set_bucket_start(&mut self, bucket_start: DateTime<Utc>);

    /// Aggregate an ordered group of members into one right-labeled point.
    /// Returns `None` for an empty group.
    fn fold(members: &[Self]) -> Option<Self>;

    /// Structural checks applied to persisted points
    fn validate(&self) -> Result<(), String>;
}

impl SeriesPoint for PricePoint {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn bucket_start(&self) -> DateTime<Utc> {
        self.bucket_start
    }

    fn set_bucket_start(&mut self, bucket_start: DateTime<Utc>) {
        self.bucket_start = bucket_start;
    }

    fn fold(members: &[Self]) -> Option<Self> {
        let first = members.first()?;
        let last = members.last()?;
        Some(PricePoint {
            timestamp: last.timestamp,
            bucket_start: first.timestamp,
            price: floor_mean(members.iter().map(|p| p.price)),
            item_id: first.item_id.clone(),
            sample_count: members.len() as u32,
        })
    }

    fn validate(&self) -> Result<(), String> {
        if self.price == 0 {
            return Err("price must be positive".to_string());
        }
        if self.sample_count == 0 {
            return Err("sample_count must be at least 1".to_string());
        }
        if self.bucket_start > self.timestamp {
            return Err(format!(
                "bucket_start {} is after timestamp {}",
                self.bucket_start, self.timestamp
            ));
        }
        Ok(())
    }
}

impl SeriesPoint for TotalPoint {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn bucket_start(&self) -> DateTime<Utc> {
        self.bucket_start
    }

    fn set_bucket_start(&mut self, bucket_start: DateTime<Utc>) {
        self.bucket_start = bucket_start;
    }

    fn fold(members: &[Self]) -> Option<Self> {
        let first = members.first()?;
        let last = members.last()?;
        let total_price = floor_mean(members.iter().map(|p| p.total_price));
        let item_count = floor_mean(members.iter().map(|p| p.item_count as u64)).max(1) as u32;
        Some(TotalPoint {
            timestamp: last.timestamp,
            bucket_start: first.timestamp,
            total_price,
            average_price: total_price / item_count as u64,
            item_count,
            min_price: members.iter().map(|p| p.min_price).min()?,
            max_price: members.iter().map(|p| p.max_price).max()?,
            sample_count: members.len() as u32,
        })
    }

    fn validate(&self) -> Result<(), String> {
        if self.item_count == 0 {
            return Err("item_count must be at least 1".to_string());
        }
        if self.total_price == 0 || self.min_price == 0 {
            return Err("prices must be positive".to_string());
        }
        if self.average_price != self.total_price / self.item_count as u64 {
            return Err(format!(
                "average_price {} does not match total {} / count {}",
                self.average_price, self.total_price, self.item_count
            ));
        }
        if self.min_price > self.max_price {
            return Err("min_price exceeds max_price".to_string());
        }
        if self.bucket_start > self.timestamp {
            return Err("bucket_start is after timestamp".to_string());
        }
        Ok(())
    }
}

/// What `Series::merge` did with a group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Appended,
    Refined,
    /// The group belongs before the current tail and was ignored
    Stale,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Series<T> {
    points: RingBuffer<T>,
}

impl<T: SeriesPoint> Series<T> {
    pub fn new(maxlen: usize) -> Self {
        Self {
            points: RingBuffer::new(maxlen),
        }
    }

    /// Rebuild from persisted points after checking every point and the
    /// strict bucket ordering. Oversized input keeps the newest `maxlen`.
    pub fn from_points(points: Vec<T>, maxlen: usize) -> Result<Self, String> {
        let mut previous: Option<DateTime<Utc>> = None;
        for (idx, point) in points.iter().enumerate() {
            point
                .validate()
                .map_err(|reason| format!("point {}: {}", idx, reason))?;
            if let Some(prev) = previous {
                if point.bucket_start() <= prev {
                    return Err(format!(
                        "point {}: bucket_start {} is not after {}",
                        idx,
                        point.bucket_start(),
                        prev
                    ));
                }
            }
            previous = Some(point.bucket_start());
        }
        Ok(Self {
            points: RingBuffer::from_vec(points, maxlen),
        })
    }

    /// Tail-overwrite-or-append: a group with the tail's bucket identity
    /// refines it in place; a later group is appended and the oldest point is
    /// dropped past the cap.
    pub fn merge(&mut self, group: T) -> MergeOutcome {
        match self.points.last().map(|tail| tail.bucket_start()) {
            Some(tail_start) if tail_start == group.bucket_start() => {
                self.points.replace_last(group);
                MergeOutcome::Refined
            }
            Some(tail_start) if group.bucket_start() < tail_start => MergeOutcome::Stale,
            _ => {
                self.points.push(group);
                MergeOutcome::Appended
            }
        }
    }

    pub fn last(&self) -> Option<&T> {
        self.points.last()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn maxlen(&self) -> usize {
        self.points.capacity()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.points.iter()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.points.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + TimeDelta::minutes(minutes)
    }

    fn bucket(start: i64, end: i64, price: u64) -> PricePoint {
        PricePoint {
            timestamp: at(end),
            bucket_start: at(start),
            price,
            item_id: "item".to_string(),
            sample_count: 1,
        }
    }

    #[test]
    fn test_merge_refines_same_bucket() {
        let mut series = Series::new(10);
        assert_eq!(series.merge(bucket(0, 0, 100)), MergeOutcome::Appended);
        assert_eq!(series.merge(bucket(0, 10, 105)), MergeOutcome::Refined);

        assert_eq!(series.len(), 1);
        assert_eq!(series.last().unwrap().price, 105);
        assert_eq!(series.last().unwrap().timestamp, at(10));
    }

    #[test]
    fn test_merge_appends_and_caps() {
        let mut series = Series::new(2);
        series.merge(bucket(0, 0, 1));
        series.merge(bucket(60, 60, 2));
        series.merge(bucket(120, 120, 3));

        let prices: Vec<u64> = series.iter().map(|p| p.price).collect();
        assert_eq!(prices, vec![2, 3]);
    }

    #[test]
    fn test_merge_ignores_stale_group() {
        let mut series = Series::new(5);
        series.merge(bucket(60, 60, 2));
        assert_eq!(series.merge(bucket(0, 0, 1)), MergeOutcome::Stale);
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn test_from_points_rejects_duplicate_buckets() {
        let points = vec![bucket(0, 0, 1), bucket(0, 5, 2)];
        assert!(Series::from_points(points, 5).is_err());
    }

    #[test]
    fn test_from_points_rejects_zero_price() {
        let points = vec![bucket(0, 0, 0)];
        assert!(Series::from_points(points, 5).is_err());
    }

    #[test]
    fn test_from_points_trims_to_cap() {
        let points = vec![bucket(0, 0, 1), bucket(60, 60, 2), bucket(120, 120, 3)];
        let series = Series::from_points(points, 2).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.iter().next().unwrap().price, 2);
    }

    #[test]
    fn test_total_fold_keeps_average_invariant() {
        let member = |minute: i64, total: u64, count: u32| TotalPoint {
            timestamp: at(minute),
            bucket_start: at(minute),
            total_price: total,
            average_price: total / count as u64,
            item_count: count,
            min_price: 10,
            max_price: total,
            sample_count: 1,
        };
        let folded = TotalPoint::fold(&[member(0, 301, 2), member(10, 400, 3)]).unwrap();

        assert_eq!(folded.total_price, 350);
        assert_eq!(folded.item_count, 2);
        assert_eq!(folded.average_price, 175);
        assert_eq!(folded.max_price, 400);
        assert_eq!(folded.bucket_start, at(0));
        assert_eq!(folded.timestamp, at(10));
        assert_eq!(folded.sample_count, 2);
        assert!(folded.validate().is_ok());
    }
}

//! Chart resolutions: bucket width and retention cap

use chrono::TimeDelta;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Resolution {
    name: String,
    bucket_width: TimeDelta,
    maxlen: usize,
}

impl Resolution {
    pub fn new(name: impl Into<String>, bucket_width: TimeDelta, maxlen: usize) -> Self {
        Self {
            name: name.into(),
            bucket_width,
            maxlen: maxlen.max(1),
        }
    }

    /// One week of hourly buckets
    pub fn hour1() -> Self {
        Self::new("1h", TimeDelta::hours(1), 168)
    }

    /// One month of half-day buckets
    pub fn hour12() -> Self {
        Self::new("12h", TimeDelta::hours(12), 60)
    }

    /// One year of daily buckets
    pub fn day1() -> Self {
        Self::new("1d", TimeDelta::days(1), 365)
    }

    pub fn defaults() -> Vec<Resolution> {
        vec![Self::hour1(), Self::hour12(), Self::day1()]
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }

    pub fn bucket_width(&self) -> TimeDelta {
        self.bucket_width
    }

    pub fn maxlen(&self) -> usize {
        self.maxlen
    }

    /// Time span covered by a full series
    pub fn retention(&self) -> TimeDelta {
        self.bucket_width * self.maxlen as i32
    }

    /// strftime pattern for chart labels
    pub fn label_format(&self) -> &'static str {
        if self.bucket_width >= TimeDelta::days(1) {
            "%m/%d"
        } else {
            "%m/%d %H:%M"
        }
    }

    /// Parse a `name:maxlen` spec such as `12h:60`. The bucket width is read
    /// from the name (`<n>m`, `<n>h` or `<n>d`).
    pub fn parse(spec: &str) -> Option<Self> {
        let (name, maxlen) = spec.trim().split_once(':')?;
        let name = name.trim();
        let maxlen: usize = maxlen.trim().parse().ok()?;
        if maxlen == 0 {
            return None;
        }
        let width = parse_width(name)?;
        Some(Self::new(name, width, maxlen))
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

fn parse_width(name: &str) -> Option<TimeDelta> {
    let unit = name.chars().last()?;
    let amount: i64 = name[..name.len() - unit.len_utf8()].parse().ok()?;
    if amount <= 0 {
        return None;
    }
    match unit {
        'm' => TimeDelta::try_minutes(amount),
        'h' => TimeDelta::try_hours(amount),
        'd' => TimeDelta::try_days(amount),
        _ => None,
    }
}

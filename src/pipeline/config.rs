//! Pipeline configuration from environment variables

use crate::history_core::{Resolution, SelectorConfig};
use chrono::TimeDelta;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Settings for the quote collection worker pool
#[derive(Debug, Clone, PartialEq)]
pub struct CollectConfig {
    pub workers: usize,
    /// Per-attempt timeout
    pub timeout: Duration,
    /// Attempts per item, including the first
    pub retries: u32,
    /// First back-off delay; doubles on each retry
    pub retry_delay: Duration,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            timeout: Duration::from_secs(60),
            retries: 3,
            retry_delay: Duration::from_secs(2),
        }
    }
}

/// Configuration for one tracker run
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory holding every persisted history file
    pub history_dir: PathBuf,

    pub selector: SelectorConfig,

    /// Quotes considered per item, taken from the front of the feed
    pub max_quotes: usize,

    /// Base sampling cadence of scheduled runs
    pub sample_interval: TimeDelta,

    /// Raw samples kept per item
    pub raw_capacity: usize,

    pub resolutions: Vec<Resolution>,

    pub collect: CollectConfig,

    /// Cap on items processed per run (None = all)
    pub target_items: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let resolutions = Resolution::defaults();
        let sample_interval = TimeDelta::minutes(60);
        Self {
            history_dir: PathBuf::from("data/price_history"),
            selector: SelectorConfig::standard(),
            max_quotes: 5,
            raw_capacity: derive_raw_capacity(&resolutions, sample_interval),
            sample_interval,
            resolutions,
            collect: CollectConfig::default(),
            target_items: None,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `PRICE_HISTORY_DIR` (default: data/price_history)
    /// - `SELECTION_PROFILE` (default: standard; or strict)
    /// - `MIN_PRICE_THRESHOLD`, `IQR_MULTIPLIER` (default: from profile)
    /// - `MIN_DATA_POINTS` (default: 4)
    /// - `MAX_QUOTES` (default: 5)
    /// - `SAMPLE_INTERVAL_MINS` (default: 60)
    /// - `RAW_CAPACITY` (default: longest retention at sampling cadence)
    /// - `RESOLUTIONS` (default: 1h:168,12h:60,1d:365)
    /// - `COLLECT_WORKERS` (default: 4)
    /// - `COLLECT_TIMEOUT_SECS` (default: 60)
    /// - `COLLECT_RETRIES` (default: 3)
    /// - `COLLECT_RETRY_DELAY_SECS` (default: 2)
    /// - `TARGET_ITEMS` (default: unset)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env` with an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let mut selector = match lookup("SELECTION_PROFILE")
            .map(|s| s.trim().to_lowercase())
            .as_deref()
        {
            None | Some("") | Some("standard") => SelectorConfig::standard(),
            Some("strict") => SelectorConfig::strict(),
            Some(other) => {
                return Err(ConfigError::InvalidValue(format!(
                    "SELECTION_PROFILE must be 'standard' or 'strict', got '{}'",
                    other
                )))
            }
        };
        selector.minimum_price_threshold =
            parse_or(&lookup, "MIN_PRICE_THRESHOLD", selector.minimum_price_threshold);
        selector.iqr_multiplier = parse_or(&lookup, "IQR_MULTIPLIER", selector.iqr_multiplier);
        selector.minimum_data_points =
            parse_or(&lookup, "MIN_DATA_POINTS", selector.minimum_data_points);

        if !selector.iqr_multiplier.is_finite() || selector.iqr_multiplier < 0.0 {
            return Err(ConfigError::InvalidValue(format!(
                "IQR_MULTIPLIER must be a non-negative number, got {}",
                selector.iqr_multiplier
            )));
        }

        let max_quotes = parse_or(&lookup, "MAX_QUOTES", defaults.max_quotes);
        if max_quotes == 0 {
            return Err(ConfigError::InvalidValue("MAX_QUOTES must be at least 1".to_string()));
        }

        let interval_mins: i64 = parse_or(&lookup, "SAMPLE_INTERVAL_MINS", 60);
        let sample_interval = TimeDelta::try_minutes(interval_mins)
            .filter(|d| *d > TimeDelta::zero())
            .ok_or_else(|| {
                ConfigError::InvalidValue(format!(
                    "SAMPLE_INTERVAL_MINS must be positive, got {}",
                    interval_mins
                ))
            })?;

        let resolutions = match lookup("RESOLUTIONS") {
            Some(spec) if !spec.trim().is_empty() => parse_resolutions(&spec)?,
            _ => defaults.resolutions,
        };

        let raw_capacity = match lookup("RAW_CAPACITY")
            .and_then(|s| s.trim().parse::<usize>().ok())
        {
            Some(capacity) if capacity > 0 => capacity,
            _ => derive_raw_capacity(&resolutions, sample_interval),
        };

        let collect = CollectConfig {
            workers: parse_or(&lookup, "COLLECT_WORKERS", defaults.collect.workers),
            timeout: Duration::from_secs(parse_or(
                &lookup,
                "COLLECT_TIMEOUT_SECS",
                defaults.collect.timeout.as_secs(),
            )),
            retries: parse_or(&lookup, "COLLECT_RETRIES", defaults.collect.retries),
            retry_delay: Duration::from_secs(parse_or(
                &lookup,
                "COLLECT_RETRY_DELAY_SECS",
                defaults.collect.retry_delay.as_secs(),
            )),
        };
        if collect.workers == 0 {
            return Err(ConfigError::InvalidValue("COLLECT_WORKERS must be at least 1".to_string()));
        }
        if collect.retries == 0 {
            return Err(ConfigError::InvalidValue("COLLECT_RETRIES must be at least 1".to_string()));
        }

        let target_items = lookup("TARGET_ITEMS")
            .and_then(|s| s.trim().parse::<usize>().ok())
            .filter(|n| *n > 0);

        Ok(Self {
            history_dir: lookup("PRICE_HISTORY_DIR")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.history_dir),
            selector,
            max_quotes,
            sample_interval,
            raw_capacity,
            resolutions,
            collect,
            target_items,
        })
    }
}

/// Longest retention window measured in samples at the base cadence
pub fn derive_raw_capacity(resolutions: &[Resolution], sample_interval: TimeDelta) -> usize {
    let interval = sample_interval.num_minutes().max(1);
    resolutions
        .iter()
        .map(|r| {
            let minutes = r.retention().num_minutes();
            ((minutes + interval - 1) / interval) as usize
        })
        .max()
        .unwrap_or(1)
        .max(1)
}

fn parse_resolutions(spec: &str) -> Result<Vec<Resolution>, ConfigError> {
    let mut resolutions: Vec<Resolution> = Vec::new();
    for part in spec.split(',').filter(|p| !p.trim().is_empty()) {
        let resolution = Resolution::parse(part).ok_or_else(|| {
            ConfigError::InvalidValue(format!(
                "RESOLUTIONS entry '{}' must look like 1h:168",
                part.trim()
            ))
        })?;
        if resolutions.iter().any(|r| r.as_str() == resolution.as_str()) {
            return Err(ConfigError::InvalidValue(format!(
                "RESOLUTIONS lists '{}' twice",
                resolution
            )));
        }
        resolutions.push(resolution);
    }
    if resolutions.is_empty() {
        return Err(ConfigError::InvalidValue("RESOLUTIONS is empty".to_string()));
    }
    Ok(resolutions)
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                log::warn!("Ignoring unparsable {}='{}', using {}", key, raw, default);
                default
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<PipelineConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PipelineConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.history_dir, PathBuf::from("data/price_history"));
        assert_eq!(config.selector, SelectorConfig::standard());
        assert_eq!(config.max_quotes, 5);
        assert_eq!(config.raw_capacity, 8_760);
        assert_eq!(config.resolutions, Resolution::defaults());
        assert_eq!(config.collect, CollectConfig::default());
        assert_eq!(config.target_items, None);
    }

    #[test]
    fn test_custom_config() {
        let config = config_from(&[
            ("PRICE_HISTORY_DIR", "/tmp/history"),
            ("SELECTION_PROFILE", "strict"),
            ("MIN_DATA_POINTS", "5"),
            ("MAX_QUOTES", "7"),
            ("RESOLUTIONS", "30m:48, 1d:30"),
            ("SAMPLE_INTERVAL_MINS", "30"),
            ("COLLECT_WORKERS", "2"),
            ("TARGET_ITEMS", "50"),
        ])
        .unwrap();

        assert_eq!(config.history_dir, PathBuf::from("/tmp/history"));
        assert_eq!(config.selector.minimum_price_threshold, 100_000);
        assert_eq!(config.selector.iqr_multiplier, 1.0);
        assert_eq!(config.selector.minimum_data_points, 5);
        assert_eq!(config.max_quotes, 7);
        assert_eq!(config.resolutions.len(), 2);
        assert_eq!(config.resolutions[0].bucket_width(), TimeDelta::minutes(30));
        // 30 days at 30-minute cadence
        assert_eq!(config.raw_capacity, 1_440);
        assert_eq!(config.collect.workers, 2);
        assert_eq!(config.target_items, Some(50));
    }

    #[test]
    fn test_profile_values_can_be_overridden() {
        let config = config_from(&[
            ("SELECTION_PROFILE", "strict"),
            ("MIN_PRICE_THRESHOLD", "50000"),
        ])
        .unwrap();
        assert_eq!(config.selector.minimum_price_threshold, 50_000);
        assert_eq!(config.selector.iqr_multiplier, 1.0);
    }

    #[test]
    fn test_unparsable_number_falls_back_to_default() {
        let config = config_from(&[("MAX_QUOTES", "many"), ("RAW_CAPACITY", "-3")]).unwrap();
        assert_eq!(config.max_quotes, 5);
        assert_eq!(config.raw_capacity, 8_760);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(config_from(&[("SELECTION_PROFILE", "lenient")]).is_err());
        assert!(config_from(&[("IQR_MULTIPLIER", "-0.5")]).is_err());
        assert!(config_from(&[("RESOLUTIONS", "1h:168,bogus")]).is_err());
        assert!(config_from(&[("RESOLUTIONS", "1h:10,1h:20")]).is_err());
        assert!(config_from(&[("COLLECT_WORKERS", "0")]).is_err());
        assert!(config_from(&[("SAMPLE_INTERVAL_MINS", "0")]).is_err());
    }

    #[test]
    fn test_explicit_raw_capacity() {
        let config = config_from(&[("RAW_CAPACITY", "100")]).unwrap();
        assert_eq!(config.raw_capacity, 100);
    }
}

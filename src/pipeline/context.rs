//! Per-run context: configuration, run time and outcome counters

use super::config::PipelineConfig;
use crate::history_core::{QuoteStatus, SaveReport, Selection};
use chrono::{DateTime, Utc};
use std::fmt;

/// Counters accumulated over one run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub items_seen: usize,
    pub normal: usize,
    pub fallback_previous: usize,
    pub fallback_median: usize,
    pub no_data: usize,
    /// Selected prices the raw store refused
    pub rejected: usize,
    /// Quotes cut by the IQR fence across all items
    pub excluded_quotes: usize,
    pub total_price: Option<u64>,
    pub written_files: usize,
    pub failed_writes: usize,
}

impl RunSummary {
    pub fn resolved(&self) -> usize {
        self.normal + self.fallback_previous + self.fallback_median
    }

    pub fn record_save(&mut self, report: &SaveReport) {
        self.written_files += report.written.len();
        self.failed_writes += report.failed_writes();
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} items: {} normal, {} fallback-previous, {} fallback-median",
            self.items_seen, self.normal, self.fallback_previous, self.fallback_median
        )?;
        write!(
            f,
            ", {} no-data, {} rejected ({} quotes excluded)",
            self.no_data, self.rejected, self.excluded_quotes
        )?;
        if let Some(total) = self.total_price {
            write!(f, ", total {}", total)?;
        }
        if self.written_files > 0 || self.failed_writes > 0 {
            write!(f, "; {} files written, {} failed", self.written_files, self.failed_writes)?;
        }
        Ok(())
    }
}

/// Passed through one run instead of global state
pub struct RunContext<'a> {
    pub config: &'a PipelineConfig,
    pub now: DateTime<Utc>,
    pub summary: RunSummary,
}

impl<'a> RunContext<'a> {
    pub fn new(config: &'a PipelineConfig, now: DateTime<Utc>) -> Self {
        Self {
            config,
            now,
            summary: RunSummary::default(),
        }
    }

    pub fn record_selection(&mut self, selection: &Selection) {
        self.summary.items_seen += 1;
        self.summary.excluded_quotes += selection.excluded_count;
        match selection.status {
            QuoteStatus::Normal => self.summary.normal += 1,
            QuoteStatus::FallbackPrevious => self.summary.fallback_previous += 1,
            QuoteStatus::FallbackMedian => self.summary.fallback_median += 1,
            QuoteStatus::NoData => self.summary.no_data += 1,
        }
    }

    pub fn record_rejected(&mut self) {
        self.summary.rejected += 1;
    }

    pub fn finish(self) -> RunSummary {
        self.summary
    }
}

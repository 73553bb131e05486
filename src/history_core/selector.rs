//! Canonical price selection from a batch of raw quotes
//!
//! Quotes at or below the price floor are display/parsing artifacts and are
//! dropped first. The survivors go through an IQR fence; the cheapest quote
//! inside the fence wins. When nothing survives, the previous canonical price
//! is reused, and failing that the median of the raw batch.

use super::types::{Price, QuoteStatus};

/// Thresholds for quote selection
#[derive(Debug, Clone, PartialEq)]
pub struct SelectorConfig {
    pub minimum_price_threshold: Price,
    pub iqr_multiplier: f64,
    pub minimum_data_points: usize,
}

impl SelectorConfig {
    pub fn standard() -> Self {
        Self {
            minimum_price_threshold: 10_000,
            iqr_multiplier: 1.5,
            minimum_data_points: 4,
        }
    }

    /// Higher floor and a tighter fence
    pub fn strict() -> Self {
        Self {
            minimum_price_threshold: 100_000,
            iqr_multiplier: 1.0,
            minimum_data_points: 4,
        }
    }
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self::standard()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub price: Option<Price>,
    pub status: QuoteStatus,
    /// Quotes rejected by the IQR fence
    pub excluded_count: usize,
    /// Quotes dropped for being at or below the price floor
    pub discarded_count: usize,
}

impl Selection {
    fn no_data() -> Self {
        Self {
            price: None,
            status: QuoteStatus::NoData,
            excluded_count: 0,
            discarded_count: 0,
        }
    }
}

pub struct QuoteSelector {
    config: SelectorConfig,
}

impl QuoteSelector {
    pub fn new(config: SelectorConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(SelectorConfig::standard())
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// Resolve one item's quotes into a single price. Never fails.
    pub fn select(&self, raw_quotes: &[Price], previous_price: Option<Price>) -> Selection {
        if raw_quotes.is_empty() {
            return Selection::no_data();
        }

        let threshold = self.config.minimum_price_threshold;
        let valid: Vec<Price> = raw_quotes
            .iter()
            .copied()
            .filter(|&q| q > threshold)
            .collect();
        let discarded_count = raw_quotes.len() - valid.len();

        let (normal, excluded_count) = self.split_outliers(&valid);

        if let Some(&cheapest) = normal.iter().min() {
            return Selection {
                price: Some(cheapest),
                status: QuoteStatus::Normal,
                excluded_count,
                discarded_count,
            };
        }

        if let Some(previous) = previous_price.filter(|&p| p > threshold) {
            return Selection {
                price: Some(previous),
                status: QuoteStatus::FallbackPrevious,
                excluded_count,
                discarded_count,
            };
        }

        Selection {
            price: median(raw_quotes),
            status: QuoteStatus::FallbackMedian,
            excluded_count,
            discarded_count,
        }
    }

    /// Returns the quotes inside the fence and the number rejected.
    fn split_outliers(&self, quotes: &[Price]) -> (Vec<Price>, usize) {
        if quotes.len() < self.config.minimum_data_points {
            return (quotes.to_vec(), 0);
        }

        let mut sorted: Vec<f64> = quotes.iter().map(|&q| q as f64).collect();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let q1 = percentile(&sorted, 0.25);
        let q3 = percentile(&sorted, 0.75);
        let iqr = q3 - q1;
        if iqr == 0.0 {
            return (quotes.to_vec(), 0);
        }

        let k = self.config.iqr_multiplier;
        let lower = q1 - k * iqr;
        let upper = q3 + k * iqr;

        let normal: Vec<Price> = quotes
            .iter()
            .copied()
            .filter(|&q| {
                let q = q as f64;
                q >= lower && q <= upper
            })
            .collect();
        let excluded = quotes.len() - normal.len();
        (normal, excluded)
    }
}

/// Linear-interpolation percentile over an ascending slice
fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = p * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = rank - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

/// Median of the quotes; the two middle values are floor-averaged for even
/// counts.
fn median(quotes: &[Price]) -> Option<Price> {
    let mut sorted = quotes.to_vec();
    sorted.sort_unstable();
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    if n % 2 == 1 {
        Some(sorted[n / 2])
    } else {
        let (a, b) = (sorted[n / 2 - 1], sorted[n / 2]);
        Some(a / 2 + b / 2 + (a % 2 + b % 2) / 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outlier_excluded_cheapest_selected() {
        let selector = QuoteSelector::with_defaults();
        let selection = selector.select(&[50_000, 51_000, 52_000, 53_000, 9_000_000], None);

        assert_eq!(selection.price, Some(50_000));
        assert_eq!(selection.status, QuoteStatus::Normal);
        assert_eq!(selection.excluded_count, 1);
        assert_eq!(selection.discarded_count, 0);
    }

    #[test]
    fn test_empty_quotes_no_data() {
        let selector = QuoteSelector::with_defaults();
        let selection = selector.select(&[], Some(120_000));

        assert_eq!(selection.price, None);
        assert_eq!(selection.status, QuoteStatus::NoData);
    }

    #[test]
    fn test_too_few_quotes_skips_filtering() {
        let selector = QuoteSelector::with_defaults();
        let selection = selector.select(&[200_000, 210_000, 220_000], None);

        assert_eq!(selection.price, Some(200_000));
        assert_eq!(selection.status, QuoteStatus::Normal);
        assert_eq!(selection.excluded_count, 0);
    }

    #[test]
    fn test_zero_iqr_keeps_everything() {
        let selector = QuoteSelector::with_defaults();
        let selection = selector.select(&[80_000, 80_000, 80_000, 80_000, 81_000], None);

        assert_eq!(selection.price, Some(80_000));
        assert_eq!(selection.excluded_count, 0);
    }

    #[test]
    fn test_low_side_outlier_excluded() {
        let selector = QuoteSelector::with_defaults();
        // 11_000 survives the floor but sits far below the fence
        let selection = selector.select(&[11_000, 500_000, 510_000, 520_000, 530_000], None);

        assert_eq!(selection.price, Some(500_000));
        assert_eq!(selection.excluded_count, 1);
    }

    #[test]
    fn test_below_threshold_discarded() {
        let selector = QuoteSelector::with_defaults();
        let selection = selector.select(&[5_000, 300_000, 310_000], None);

        assert_eq!(selection.price, Some(300_000));
        assert_eq!(selection.discarded_count, 1);
    }

    #[test]
    fn test_all_below_threshold_falls_back_to_previous() {
        let selector = QuoteSelector::with_defaults();
        let selection = selector.select(&[100, 200, 300], Some(150_000));

        assert_eq!(selection.price, Some(150_000));
        assert_eq!(selection.status, QuoteStatus::FallbackPrevious);
        assert_eq!(selection.discarded_count, 3);
    }

    #[test]
    fn test_previous_below_threshold_ignored() {
        let selector = QuoteSelector::with_defaults();
        let selection = selector.select(&[100, 300, 200], Some(9_000));

        assert_eq!(selection.price, Some(200));
        assert_eq!(selection.status, QuoteStatus::FallbackMedian);
    }

    #[test]
    fn test_median_fallback_even_count() {
        let selector = QuoteSelector::with_defaults();
        let selection = selector.select(&[100, 201, 300, 400], None);

        assert_eq!(selection.price, Some(250));
        assert_eq!(selection.status, QuoteStatus::FallbackMedian);
    }

    #[test]
    fn test_strict_profile_tighter_fence() {
        let quotes = [200_000, 210_000, 220_000, 230_000, 255_000];

        let standard = QuoteSelector::with_defaults().select(&quotes, None);
        assert_eq!(standard.excluded_count, 0);

        // Q1=210k, Q3=230k: upper fence is 260k at k=1.5, 250k at k=1.0
        let strict = QuoteSelector::new(SelectorConfig::strict()).select(&quotes, None);
        assert_eq!(strict.excluded_count, 1);
        assert_eq!(strict.price, Some(200_000));
    }

    #[test]
    fn test_percentile_linear_interpolation() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&sorted, 0.25), 1.75);
        assert_eq!(percentile(&sorted, 0.75), 3.25);
        assert_eq!(percentile(&[5.0], 0.75), 5.0);
    }
}

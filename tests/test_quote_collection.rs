//! Integration tests for the quote collection worker pool
//!
//! Mock sources stand in for the external scraper so the pool's concurrency
//! bound, retry policy and timeout handling can be observed directly.

#[cfg(test)]
mod quote_collection_tests {
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use price_history::history_core::Price;
    use price_history::pipeline::{
        collect_quotes, CollectConfig, CollectError, CommandQuoteSource, PipelineConfig,
        PriceHistoryEngine, QuoteSource, StaticQuoteSource, TrackedItem,
    };
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn items(n: usize) -> Vec<TrackedItem> {
        (0..n)
            .map(|i| TrackedItem {
                item_id: format!("item_{}", i),
                item_name: format!("Item {}", i),
                listed_quotes: vec![100_000 + i as u64],
            })
            .collect()
    }

    fn fast_config(workers: usize, retries: u32) -> CollectConfig {
        CollectConfig {
            workers,
            timeout: Duration::from_millis(500),
            retries,
            retry_delay: Duration::from_millis(1),
        }
    }

    /// Tracks how many fetches run at once
    struct SlowSource {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl QuoteSource for SlowSource {
        async fn fetch_quotes(&self, item: &TrackedItem) -> Result<Vec<Price>, CollectError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(item.listed_quotes.clone())
        }

        fn source_type(&self) -> &'static str {
            "slow"
        }
    }

    /// Fails the first `failures` attempts of every item
    struct FlakySource {
        failures: usize,
        attempts: Mutex<HashMap<String, usize>>,
    }

    #[async_trait]
    impl QuoteSource for FlakySource {
        async fn fetch_quotes(&self, item: &TrackedItem) -> Result<Vec<Price>, CollectError> {
            let attempt = {
                let mut attempts = self.attempts.lock().unwrap();
                let count = attempts.entry(item.item_id.clone()).or_insert(0);
                *count += 1;
                *count
            };
            if attempt <= self.failures {
                return Err(CollectError::Failed(format!("attempt {}", attempt)));
            }
            Ok(vec![150_000])
        }

        fn source_type(&self) -> &'static str {
            "flaky"
        }
    }

    struct HangingSource;

    #[async_trait]
    impl QuoteSource for HangingSource {
        async fn fetch_quotes(&self, _item: &TrackedItem) -> Result<Vec<Price>, CollectError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![150_000])
        }

        fn source_type(&self) -> &'static str {
            "hanging"
        }
    }

    #[tokio::test]
    async fn test_pool_respects_worker_bound() {
        let source = Arc::new(SlowSource {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let tracked = items(8);

        let feed = collect_quotes(source.clone(), &tracked, &fast_config(2, 1)).await;

        assert_eq!(feed.len(), 8);
        assert!(feed.values().all(|q| q.quotes.len() == 1));
        assert_eq!(feed["item_3"].quotes, vec![100_003]);
        assert!(source.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(source.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_attempts_are_retried() {
        let source = Arc::new(FlakySource {
            failures: 2,
            attempts: Mutex::new(HashMap::new()),
        });

        let feed = collect_quotes(source.clone(), &items(3), &fast_config(3, 3)).await;

        assert!(feed.values().all(|q| q.quotes == vec![150_000]));
        let attempts = source.attempts.lock().unwrap();
        assert!(attempts.values().all(|&n| n == 3));
    }

    #[tokio::test]
    async fn test_exhausted_retries_yield_no_quotes() {
        let source = Arc::new(FlakySource {
            failures: 5,
            attempts: Mutex::new(HashMap::new()),
        });

        let feed = collect_quotes(source.clone(), &items(2), &fast_config(2, 3)).await;

        assert_eq!(feed.len(), 2);
        assert!(feed.values().all(|q| q.quotes.is_empty()));
        assert_eq!(feed["item_0"].item_name, "Item 0");
    }

    /// Panics on one item, serves the rest
    struct PanickingSource;

    #[async_trait]
    impl QuoteSource for PanickingSource {
        async fn fetch_quotes(&self, item: &TrackedItem) -> Result<Vec<Price>, CollectError> {
            if item.item_id == "item_1" {
                panic!("scraper crashed on {}", item.item_name);
            }
            Ok(item.listed_quotes.clone())
        }

        fn source_type(&self) -> &'static str {
            "panicking"
        }
    }

    #[tokio::test]
    async fn test_panicking_worker_leaves_item_without_quotes() {
        let feed = collect_quotes(Arc::new(PanickingSource), &items(3), &fast_config(2, 1)).await;

        assert_eq!(feed.len(), 3);
        assert!(feed["item_1"].quotes.is_empty());
        assert_eq!(feed["item_0"].quotes, vec![100_000]);
        assert_eq!(feed["item_2"].quotes, vec![100_002]);
    }

    #[tokio::test]
    async fn test_timeout_yields_no_quotes() {
        let config = CollectConfig {
            timeout: Duration::from_millis(20),
            ..fast_config(2, 1)
        };

        let feed = collect_quotes(Arc::new(HangingSource), &items(2), &config).await;

        assert!(feed.values().all(|q| q.quotes.is_empty()));
    }

    #[tokio::test]
    async fn test_command_source_reads_stdout() {
        let source = CommandQuoteSource::new("echo", vec!["1,250,000 1,300,000".to_string()]);
        let item = TrackedItem {
            item_id: "sword".to_string(),
            item_name: "Sword".to_string(),
            listed_quotes: Vec::new(),
        };

        let quotes = source.fetch_quotes(&item).await.unwrap();
        assert_eq!(quotes, vec![1_250_000, 1_300_000]);

        let missing = CommandQuoteSource::new("definitely-not-a-scraper-binary", Vec::new());
        assert!(matches!(
            missing.fetch_quotes(&item).await,
            Err(CollectError::Failed(_))
        ));
    }

    #[tokio::test]
    async fn test_collected_feed_drives_engine() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            history_dir: dir.path().to_path_buf(),
            ..PipelineConfig::default()
        };
        let mut tracked = items(3);
        tracked[2].listed_quotes.clear();

        let feed = collect_quotes(Arc::new(StaticQuoteSource), &tracked, &config.collect).await;
        let (mut engine, _) = PriceHistoryEngine::open(config);
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let (summary, report) = engine.run_and_save(&feed, now);

        assert_eq!(summary.normal, 2);
        assert_eq!(summary.no_data, 1);
        assert_eq!(summary.total_price, Some(200_001));
        assert_eq!(report.failed_writes(), 0);
        assert!(dir.path().join("history_1h.json").exists());
    }
}

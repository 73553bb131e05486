//! Price History Engine - orchestration of one scheduled run
//!
//! ## Architecture
//!
//! ```text
//! feed {item_id → ItemQuotes}
//!     ↓
//! PriceHistoryEngine::run(feed, now)
//!     ↓  per item: QuoteSelector → RawSampleStore → ResolutionAggregator
//!     ↓  then:     TotalAggregator over the run's canonical prices
//! HistoryState
//!     ↓
//! PriceHistoryEngine::save() → SeriesStore
//! ```
//!
//! Runs single-threaded after collection has joined; the engine owns the
//! state exclusively for the whole run.

use super::config::PipelineConfig;
use super::context::{RunContext, RunSummary};
use crate::history_core::{
    CurrentPrice, HistoryError, HistoryState, ItemId, ItemQuotes, LoadReport, QuoteSelector,
    ResolutionAggregator, SaveReport, Selection, Series, SeriesStore, TotalAggregator,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

pub struct PriceHistoryEngine {
    config: PipelineConfig,
    selector: QuoteSelector,
    aggregator: ResolutionAggregator,
    store: SeriesStore,
    state: HistoryState,
}

impl PriceHistoryEngine {
    /// Load persisted history from `config.history_dir`
    pub fn open(config: PipelineConfig) -> (Self, LoadReport) {
        let store = SeriesStore::new(
            config.history_dir.clone(),
            config.resolutions.clone(),
            config.raw_capacity,
        );
        let (state, report) = store.load();
        (Self::with_state(config, store, state), report)
    }

    pub fn with_state(config: PipelineConfig, store: SeriesStore, state: HistoryState) -> Self {
        Self {
            selector: QuoteSelector::new(config.selector.clone()),
            aggregator: ResolutionAggregator::new(config.resolutions.clone()),
            config,
            store,
            state,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn state(&self) -> &HistoryState {
        &self.state
    }

    pub fn store(&self) -> &SeriesStore {
        &self.store
    }

    /// Process one run's feed at `now`. Item failures are logged and
    /// counted; nothing here aborts the run.
    pub fn run(&mut self, feed: &BTreeMap<ItemId, ItemQuotes>, now: DateTime<Utc>) -> RunSummary {
        let config = self.config.clone();
        let mut ctx = RunContext::new(&config, now);
        let mut accepted: BTreeMap<ItemId, Selection> = BTreeMap::new();

        for (item_id, item) in feed {
            if let Some(selection) = self.process_item(&mut ctx, item_id, item) {
                accepted.insert(item_id.clone(), selection);
            }
        }

        self.process_totals(&mut ctx, &accepted);

        let summary = ctx.finish();
        log::info!("📊 Run at {}: {}", now.format("%Y-%m-%d %H:%M"), summary);
        summary
    }

    /// Returns the selection when a price was stored for the item.
    fn process_item(
        &mut self,
        ctx: &mut RunContext<'_>,
        item_id: &ItemId,
        item: &ItemQuotes,
    ) -> Option<Selection> {
        if !item.item_name.is_empty() {
            self.state
                .item_names
                .insert(item_id.clone(), item.item_name.clone());
        }

        let quotes = &item.quotes[..item.quotes.len().min(ctx.config.max_quotes)];
        let previous = self.state.previous_price(item_id);
        let selection = self.selector.select(quotes, previous);
        ctx.record_selection(&selection);

        let Some(price) = selection.price else {
            let err = HistoryError::NoQuotes {
                item_id: item_id.clone(),
            };
            log::warn!("⚠️  {}; keeping stored price", err);
            return None;
        };

        if let Err(e) = self.state.raw.ingest(item_id, ctx.now, price) {
            log::warn!("⚠️  {}", e);
            ctx.record_rejected();
            return None;
        }

        log::debug!(
            "{} ({}): {} [{}], {} excluded, {} below floor",
            item.item_name,
            item_id,
            price,
            selection.status.as_str(),
            selection.excluded_count,
            selection.discarded_count
        );

        let HistoryState {
            raw, item_series, ..
        } = &mut self.state;
        let by_resolution = item_series.entry(item_id.clone()).or_default();
        for resolution in self.aggregator.resolutions() {
            let series = by_resolution
                .entry(resolution.as_str().to_string())
                .or_insert_with(|| Series::new(resolution.maxlen()));
            self.aggregator.update(raw, item_id, resolution, series);
        }

        let item_name = self.state.item_name(item_id).to_string();
        self.state.current.insert(
            item_id.clone(),
            CurrentPrice {
                item_name,
                price,
                status: selection.status,
                last_updated: ctx.now,
            },
        );

        Some(selection)
    }

    fn process_totals(&mut self, ctx: &mut RunContext<'_>, accepted: &BTreeMap<ItemId, Selection>) {
        let Some(point) = TotalAggregator::compute(accepted, ctx.now) else {
            log::warn!("⚠️  No item resolved this run; total series left unchanged");
            return;
        };
        ctx.summary.total_price = Some(point.total_price);

        if let Err(e) = TotalAggregator::apply(
            point,
            &mut self.state.total_samples,
            &mut self.state.total_series,
            self.aggregator.resolutions(),
        ) {
            log::warn!("⚠️  {}", e);
            ctx.record_rejected();
        }
    }

    pub fn save(&self) -> SaveReport {
        self.store.save(&self.state)
    }

    /// `run` followed by `save`, with write counts folded into the summary
    pub fn run_and_save(
        &mut self,
        feed: &BTreeMap<ItemId, ItemQuotes>,
        now: DateTime<Utc>,
    ) -> (RunSummary, SaveReport) {
        let mut summary = self.run(feed, now);
        let report = self.save();
        summary.record_save(&report);
        (summary, report)
    }
}

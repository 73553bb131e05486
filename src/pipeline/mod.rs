//! # Run Pipeline
//!
//! Wraps `history_core` into one scheduled run:
//!
//! 1. `collector` fetches raw quotes for every tracked item on a bounded
//!    worker pool (retry + timeout per item) and joins all workers
//! 2. `engine` selects, ingests and aggregates single-threaded
//! 3. `SeriesStore` persists the result
//!
//! Configuration comes from the environment (`config`); per-run counters
//! travel in a `RunContext` (`context`).

pub mod backoff;
pub mod collector;
pub mod config;
pub mod context;
pub mod engine;

pub use backoff::ExponentialBackoff;
pub use collector::{
    collect_quotes, load_item_list, parse_quotes, CollectError, CommandQuoteSource, QuoteSource,
    StaticQuoteSource, TrackedItem,
};
pub use config::{CollectConfig, ConfigError, PipelineConfig};
pub use context::{RunContext, RunSummary};
pub use engine::PriceHistoryEngine;

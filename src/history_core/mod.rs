//! History Core - Canonical Price Selection and Multi-Resolution Series
//!
//! Turns each run's raw quotes into one canonical price per item, keeps a
//! bounded raw sample history, and folds it into fixed-size series at every
//! configured resolution plus a cross-item total.
//!
//! # Architecture
//!
//! ```text
//! ItemQuotes → QuoteSelector (threshold, IQR, fallbacks)
//!     ↓
//! RawSampleStore (minute buckets, same-minute replace)
//!     ↓
//! ResolutionAggregator (greedy buckets, tail overwrite-or-append)
//!     ↓                         ↘
//! Series<PricePoint>          TotalAggregator → Series<TotalPoint>
//!     ↓
//! SeriesStore → history_<res>.json / total_price_<res>.json
//! ```

pub mod aggregator;
pub mod chart;
pub mod error;
pub mod raw_store;
pub mod resolution;
pub mod ring_buffer;
pub mod selector;
pub mod series;
pub mod state;
pub mod store;
pub mod totals;
pub mod types;

pub use aggregator::{group_samples, update_series, ResolutionAggregator};
pub use chart::{ChartData, Dataset};
pub use error::{HistoryError, HistoryResult};
pub use raw_store::{IngestOutcome, RawSampleStore};
pub use resolution::Resolution;
pub use ring_buffer::RingBuffer;
pub use selector::{QuoteSelector, Selection, SelectorConfig};
pub use series::{MergeOutcome, Series, SeriesPoint};
pub use state::{CurrentPrice, HistoryState};
pub use store::{HistoryStatistics, LoadReport, ResolutionStats, SaveReport, SeriesStore};
pub use totals::{TotalAggregator, TOTALS_KEY};
pub use types::{ItemId, ItemQuotes, Price, PricePoint, QuoteStatus, TotalPoint};

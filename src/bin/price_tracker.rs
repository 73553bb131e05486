//! Price Tracker - one scheduled run of the price history pipeline
//!
//! Reads the tracked item list, collects quotes, selects one canonical price
//! per item, folds it into every resolution and persists the result.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --bin price_tracker -- --items data/items.json
//! cargo run --release --bin price_tracker -- --items data/items.json --scraper "python3 scrape.py"
//! ```
//!
//! ## Environment Variables
//!
//! See `PipelineConfig::from_env` for the full list. `RUST_LOG` sets the log
//! level (default: info).

use chrono::Utc;
use clap::Parser;
use dotenv::dotenv;
use log::{error, info, warn};
use price_history::pipeline::{
    collect_quotes, load_item_list, CommandQuoteSource, PipelineConfig, PriceHistoryEngine,
    QuoteSource, StaticQuoteSource,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "price_tracker", about = "Collect item prices and update their history")]
struct Args {
    /// Item list: {item_id: {item_name, quotes?}}
    #[arg(long)]
    items: PathBuf,

    /// Scraper command, run once per item with the item name appended
    #[arg(long)]
    scraper: Option<String>,

    /// Override PRICE_HISTORY_DIR
    #[arg(long)]
    history_dir: Option<PathBuf>,

    /// Write chart files for these item ids after the run
    #[arg(long = "export-chart")]
    export_chart: Vec<String>,

    /// Write the total/average chart for every resolution
    #[arg(long)]
    export_totals: bool,

    /// Also write a side-by-side chart of two item ids
    #[arg(long, num_args = 2, value_names = ["ITEM_A", "ITEM_B"])]
    compare: Option<Vec<String>>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let args = Args::parse();

    let mut config = PipelineConfig::from_env()?;
    if let Some(dir) = args.history_dir.clone() {
        config.history_dir = dir;
    }

    info!("🚀 Price Tracker");
    info!("   ├─ History dir: {}", config.history_dir.display());
    info!(
        "   ├─ Selection: floor {}, k {}, min points {}, first {} quotes",
        config.selector.minimum_price_threshold,
        config.selector.iqr_multiplier,
        config.selector.minimum_data_points,
        config.max_quotes
    );
    info!(
        "   ├─ Resolutions: {}",
        config
            .resolutions
            .iter()
            .map(|r| format!("{}:{}", r, r.maxlen()))
            .collect::<Vec<_>>()
            .join(", ")
    );
    info!("   └─ Raw capacity: {} samples", config.raw_capacity);

    // The item list is the only input whose failure aborts the run
    let items = load_item_list(&args.items, config.target_items)?;

    let source: Arc<dyn QuoteSource> = match args.scraper.as_deref() {
        Some(command) => match CommandQuoteSource::from_command_line(command) {
            Some(source) => Arc::new(source),
            None => return Err("--scraper must not be blank".into()),
        },
        None => Arc::new(StaticQuoteSource),
    };
    info!(
        "🔍 Collecting quotes for {} items ({} source, {} workers)",
        items.len(),
        source.source_type(),
        config.collect.workers
    );
    let feed = collect_quotes(source, &items, &config.collect).await;

    let (mut engine, load_report) = PriceHistoryEngine::open(config);
    if load_report.malformed > 0 {
        warn!("⚠️  {} persisted series were malformed and reset", load_report.malformed);
    }

    let (summary, save_report) = engine.run_and_save(&feed, Utc::now());
    info!("✅ {}", summary);

    let stats = engine.store().statistics(engine.state());
    info!("📈 History statistics: {} items", stats.total_items);
    for res in &stats.resolutions {
        info!(
            "   ├─ {}: {} items with data (max {} points)",
            res.resolution, res.items_with_data, res.max_points
        );
    }

    export_charts(&engine, &args);

    if save_report.failed_writes() > 0 {
        for (path, reason) in &save_report.failed {
            error!("❌ {}: {}", path.display(), reason);
        }
        return Err(format!("{} history files failed to write", save_report.failed_writes()).into());
    }
    Ok(())
}

fn export_charts(engine: &PriceHistoryEngine, args: &Args) {
    let store = engine.store();
    let state = engine.state();

    for item_id in &args.export_chart {
        for resolution in store.resolutions() {
            match store.export_chart(state, item_id, resolution) {
                Ok(Some(path)) => info!("📁 Chart written: {}", path.display()),
                Ok(None) => warn!("⚠️  No {} data for {}", resolution, item_id),
                Err(e) => error!("❌ Chart export failed for {}: {}", item_id, e),
            }
        }
    }

    if args.export_totals {
        for resolution in store.resolutions() {
            match store.export_total_chart(state, resolution) {
                Ok(Some(path)) => info!("📁 Total chart written: {}", path.display()),
                Ok(None) => warn!("⚠️  No {} totals yet", resolution),
                Err(e) => error!("❌ Total chart export failed: {}", e),
            }
        }
    }

    if let Some(pair) = &args.compare {
        if let [a, b] = pair.as_slice() {
            for resolution in store.resolutions() {
                match store.export_comparison(state, a, b, resolution) {
                    Ok(Some(path)) => info!("📁 Comparison written: {}", path.display()),
                    Ok(None) => {
                        warn!("⚠️  Comparison {} vs {} has no {} data", a, b, resolution)
                    }
                    Err(e) => error!("❌ Comparison export failed: {}", e),
                }
            }
        }
    }
}

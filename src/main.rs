//! # Military News Scraper
//!
//! Scrapes military news from Sina (`mil.news.sina.com.cn`) and ifeng
//! (`mil.ifeng.com`), saving either article text or article images as
//! numbered files and recording every saved path in an xlsx table.
//!
//! ## Usage
//!
//! ```sh
//! mil_news_scraper sina-text
//! mil_news_scraper --target 50 -o ./pics -t pics.xlsx ifeng-images
//! ```
//!
//! ## Architecture
//!
//! Each run is a two-stage pipeline:
//! 1. **Discovery**: collect candidate articles, clicking "load more" in a
//!    headless browser until enough are visible (or reading a static index)
//! 2. **Saving**: fetch each article, extract text or images, write
//!    `001.txt`/`001.jpg`-style files, then export the path table
//!
//! Per-item failures are logged and skipped. The process only exits non-zero
//! for invalid configuration or an unwritable output directory.

use clap::Parser;
use std::error::Error;
use std::path::Path;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod browser;
mod cli;
mod config;
mod discovery;
mod error;
mod extract;
mod http;
mod models;
mod outputs;
mod scrapers;
mod utils;

use cli::Cli;
use config::Config;
use outputs::json::{Manifest, write_manifest};
use outputs::table::write_path_table;
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();

    // Parse CLI
    let args = Cli::parse();
    let kind = args.command.kind();
    info!(scraper = kind.name(), "mil_news_scraper starting up");
    debug!(?args, "Parsed CLI arguments");

    // ---- Load config ----
    let config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };
    let mut scraper_config = kind.config(&config);
    args.apply_overrides(&mut scraper_config);

    // Early check: ensure output dir is writable
    if let Err(e) = ensure_writable_dir(&args.output_dir).await {
        error!(
            path = %args.output_dir,
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    // ---- Discover and save ----
    let output = scrapers::run(kind, scraper_config, Path::new(&args.output_dir)).await?;

    // ---- Path table ----
    match write_path_table(&args.table, &output.items) {
        Ok(Some(path)) => info!(path = %path.display(), rows = output.items.len(), "Path table ready"),
        Ok(None) => {}
        Err(e) => error!(path = %args.table.display(), error = %e, "Failed to write path table"),
    }

    // ---- Manifest ----
    if let Some(path) = &args.manifest {
        let manifest = Manifest {
            summary: output.summary.clone(),
            items: output.items,
        };
        if let Err(e) = write_manifest(&manifest, path).await {
            error!(path = %path.display(), error = %e, "Failed to write manifest");
        }
    }

    let summary = &output.summary;
    if summary.succeeded() {
        info!(
            scraper = %summary.scraper,
            discovery = %summary.discovery,
            candidates = summary.candidates,
            processed = summary.processed,
            saved = summary.saved,
            failed = summary.failed,
            "Run summary"
        );
    } else {
        warn!(
            scraper = %summary.scraper,
            discovery = %summary.discovery,
            candidates = summary.candidates,
            "Run finished without saving anything"
        );
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}

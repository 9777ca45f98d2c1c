//! Site scrapers and the per-article pipeline they share.
//!
//! Each scraper follows the same two-phase pattern:
//!
//! 1. **Discovery**: build the list of candidate articles, either by driving
//!    a "load more" listing in a headless browser through
//!    [`crate::discovery::discover`] or by reading a static listing once
//! 2. **Saving**: visit candidates one at a time, extract the payload, write
//!    numbered files, and record what was saved
//!
//! # Supported Scrapers
//!
//! | Scraper | Module | Listing | Payload |
//! |---------|--------|---------|---------|
//! | `sina-text` | [`sina`] | rendered, load-more button | article text |
//! | `sina-images` | [`sina`] | rendered, load-more button | article images |
//! | `ifeng-text` | [`ifeng`] | rendered, load-more button | article text |
//! | `ifeng-images` | [`ifeng`] | static HTML with embedded JSON | gallery images |
//!
//! Every per-item failure (fetch, parse, download, write) is logged and
//! skipped. The run only comes back empty when discovery finds nothing.

pub mod ifeng;
pub mod sina;

use crate::browser::BrowserSession;
use crate::config::{Config, ScraperConfig};
use crate::discovery::Discovery;
use crate::error::ScrapeError;
use crate::extract::char_len;
use crate::http::Fetcher;
use crate::models::{ArticleText, CandidateItem, ImageRef, RunSummary, SavedItem};
use crate::outputs::files::{FileSink, Naming, extension_from_url};
use crate::utils::{pace, title_key, truncate_for_log};
use chrono::Local;
use std::collections::HashSet;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScraperKind {
    SinaText,
    SinaImages,
    IfengText,
    IfengImages,
}

impl ScraperKind {
    pub fn name(self) -> &'static str {
        match self {
            ScraperKind::SinaText => "sina-text",
            ScraperKind::SinaImages => "sina-images",
            ScraperKind::IfengText => "ifeng-text",
            ScraperKind::IfengImages => "ifeng-images",
        }
    }

    pub fn config(self, config: &Config) -> ScraperConfig {
        match self {
            ScraperKind::SinaText => config.sina_text.clone(),
            ScraperKind::SinaImages => config.sina_images.clone(),
            ScraperKind::IfengText => config.ifeng_text.clone(),
            ScraperKind::IfengImages => config.ifeng_images.clone(),
        }
    }
}

/// Candidates produced by discovery, plus how discovery ended.
#[derive(Debug)]
pub struct Listing {
    pub items: Vec<CandidateItem>,
    pub state: String,
}

impl Listing {
    pub(crate) fn empty(reason: &str) -> Self {
        Self {
            items: Vec::new(),
            state: reason.to_string(),
        }
    }
}

impl From<Discovery> for Listing {
    fn from(d: Discovery) -> Self {
        Self {
            items: d.items,
            state: d.state.to_string(),
        }
    }
}

/// Navigate a fresh browser session to the listing and wait until it is ready.
pub(crate) async fn open_listing(config: &ScraperConfig) -> Result<BrowserSession, ScrapeError> {
    let session = BrowserSession::launch(&config.browser, &config.http.user_agent).await?;
    let ready = async {
        session
            .goto(
                &config.listing_url,
                Duration::from_secs(config.browser.navigation_timeout_secs),
            )
            .await?;
        sleep(Duration::from_millis(config.browser.initial_wait_ms)).await;
        if let Some(selector) = &config.browser.ready_selector {
            session
                .wait_for_selector(
                    selector,
                    Duration::from_secs(config.browser.ready_timeout_secs),
                )
                .await?;
        }
        Ok::<(), ScrapeError>(())
    }
    .await;

    match ready {
        Ok(()) => {
            info!(url = %config.listing_url, "Listing page loaded");
            Ok(session)
        }
        Err(e) => {
            session.close().await;
            Err(e)
        }
    }
}

/// Where an image request takes its Referer from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageReferer {
    /// The scraper's configured default header.
    Configured,
    /// The article page the image was found on.
    Article,
}

#[derive(Debug, Clone, Copy)]
pub struct ImagePolicy {
    /// Also skip articles whose normalized headline was already visited.
    pub dedup_titles: bool,
    pub referer: ImageReferer,
}

/// What a finished run produced.
#[derive(Debug)]
pub struct RunOutput {
    pub summary: RunSummary,
    pub items: Vec<SavedItem>,
}

/// Run-scoped counters and dedup sets.
pub struct RunContext {
    config: ScraperConfig,
    fetcher: Fetcher,
    sink: FileSink,
    saved: Vec<SavedItem>,
    processed: usize,
    failed: usize,
    seen_articles: HashSet<String>,
    seen_titles: HashSet<String>,
    seen_images: HashSet<String>,
}

impl RunContext {
    pub fn new(config: ScraperConfig, fetcher: Fetcher, sink: FileSink) -> Self {
        Self {
            config,
            fetcher,
            sink,
            saved: Vec::new(),
            processed: 0,
            failed: 0,
            seen_articles: HashSet::new(),
            seen_titles: HashSet::new(),
            seen_images: HashSet::new(),
        }
    }

    fn target_reached(&self) -> bool {
        self.sink.saved() >= self.config.target
    }

    /// Claim an article for processing; `false` if it was already seen.
    fn claim_article(&mut self, candidate: &CandidateItem, dedup_titles: bool) -> bool {
        if !self.seen_articles.insert(candidate.url.clone()) {
            return false;
        }
        if dedup_titles {
            let key = title_key(&candidate.title);
            if !key.is_empty() && !self.seen_titles.insert(key) {
                return false;
            }
        }
        true
    }

    /// Fetch, extract and save text for each candidate until the target is met.
    #[instrument(level = "info", skip_all, fields(candidates = candidates.len(), target = self.config.target))]
    pub async fn save_texts<F>(&mut self, candidates: &[CandidateItem], parse: F)
    where
        F: Fn(&str, &CandidateItem) -> Result<ArticleText, ScrapeError>,
    {
        let total = candidates.len();
        for (i, candidate) in candidates.iter().enumerate() {
            if self.target_reached() {
                info!(saved = self.sink.saved(), "Target reached");
                break;
            }
            if !self.claim_article(candidate, false) {
                debug!(url = %candidate.url, "Already processed; skipping");
                continue;
            }
            self.processed += 1;
            info!(
                index = i + 1,
                total,
                title = %truncate_for_log(&candidate.title, 30),
                "Processing article"
            );

            match self.save_text(candidate, &parse).await {
                Ok(item) => {
                    info!(
                        path = %item.path,
                        bytes = item.bytes,
                        progress = self.sink.saved(),
                        target = self.config.target,
                        "Saved article text"
                    );
                    self.saved.push(item);
                }
                Err(e) => {
                    self.failed += 1;
                    warn!(url = %candidate.url, kind = e.kind(), error = %e, "Skipping article");
                }
            }

            pace(self.config.pacing.item_delay_ms).await;
        }
    }

    async fn save_text<F>(&mut self, candidate: &CandidateItem, parse: &F) -> Result<SavedItem, ScrapeError>
    where
        F: Fn(&str, &CandidateItem) -> Result<ArticleText, ScrapeError>,
    {
        let html = self.fetcher.html(&candidate.url).await?;
        let article = parse(&html, candidate)?;

        let chars = char_len(&article.content);
        if chars < self.config.min_body_chars {
            return Err(ScrapeError::Parse(format!(
                "body too short ({chars} < {} chars)",
                self.config.min_body_chars
            )));
        }

        let document = article.to_document();
        let number = self.sink.next_number();
        let path = self.sink.write(document.as_bytes(), ".txt").await?;
        debug!(chars, "Body extracted");

        Ok(SavedItem {
            number,
            path: path.display().to_string(),
            source_url: article.url,
            title: article.title,
            published: Some(article.published).filter(|p| !p.is_empty()),
            description: None,
            bytes: document.len(),
            saved_at: Local::now(),
        })
    }

    /// Visit each candidate, find its images, and download them until the
    /// image target is met.
    #[instrument(level = "info", skip_all, fields(candidates = candidates.len(), target = self.config.target))]
    pub async fn save_images<F>(&mut self, candidates: &[CandidateItem], policy: ImagePolicy, find: F)
    where
        F: Fn(&str, &CandidateItem) -> Vec<ImageRef>,
    {
        let total = candidates.len();
        for (i, candidate) in candidates.iter().enumerate() {
            if self.target_reached() {
                info!(saved = self.sink.saved(), "Target reached");
                break;
            }
            if !self.claim_article(candidate, policy.dedup_titles) {
                debug!(url = %candidate.url, "Duplicate article; skipping");
                continue;
            }
            self.processed += 1;
            info!(
                index = i + 1,
                total,
                title = %truncate_for_log(&candidate.title, 30),
                "Processing article"
            );

            let html = match self.fetcher.html(&candidate.url).await {
                Ok(html) => html,
                Err(e) => {
                    self.failed += 1;
                    warn!(url = %candidate.url, kind = e.kind(), error = %e, "Skipping article");
                    pace(self.config.pacing.item_delay_ms).await;
                    continue;
                }
            };

            let images = find(&html, candidate);
            if images.is_empty() {
                info!(url = %candidate.url, "No images in article");
                pace(self.config.pacing.item_delay_ms).await;
                continue;
            }

            let mut from_article = 0usize;
            for image in &images {
                if self.target_reached() {
                    break;
                }
                if !self.seen_images.insert(image.url.clone()) {
                    continue;
                }
                let referer = match policy.referer {
                    ImageReferer::Article => Some(candidate.url.as_str()),
                    ImageReferer::Configured => None,
                };
                match self.save_image(candidate, image, referer).await {
                    Ok(item) => {
                        debug!(path = %item.path, bytes = item.bytes, "Saved image");
                        from_article += 1;
                        self.saved.push(item);
                    }
                    Err(e) => {
                        self.failed += 1;
                        warn!(url = %image.url, kind = e.kind(), error = %e, "Skipping image");
                    }
                }
                pace(self.config.pacing.image_delay_ms).await;
            }

            info!(
                found = images.len(),
                saved = from_article,
                progress = self.sink.saved(),
                target = self.config.target,
                "Article images done"
            );
            if !self.target_reached() {
                pace(self.config.pacing.item_delay_ms).await;
            }
        }
    }

    async fn save_image(
        &mut self,
        candidate: &CandidateItem,
        image: &ImageRef,
        referer: Option<&str>,
    ) -> Result<SavedItem, ScrapeError> {
        let bytes = self.fetcher.image(&image.url, referer).await?;
        if bytes.len() < self.config.min_image_bytes {
            return Err(ScrapeError::Parse(format!(
                "image too small ({} < {} bytes)",
                bytes.len(),
                self.config.min_image_bytes
            )));
        }

        let ext = extension_from_url(&image.url);
        let number = self.sink.next_number();
        let path = self.sink.write(&bytes, &ext).await?;

        Ok(SavedItem {
            number,
            path: path.display().to_string(),
            source_url: image.url.clone(),
            title: candidate.title.clone(),
            published: candidate.timestamp.clone(),
            description: Some(image.description.clone()).filter(|d| !d.is_empty()),
            bytes: bytes.len(),
            saved_at: Local::now(),
        })
    }

    fn finish(self, kind: ScraperKind, listing: &Listing, elapsed: Duration) -> RunOutput {
        let summary = RunSummary {
            scraper: kind.name().to_string(),
            discovery: listing.state.clone(),
            candidates: listing.items.len(),
            processed: self.processed,
            saved: self.saved.len(),
            failed: self.failed,
            elapsed_secs: elapsed.as_secs_f64(),
        };
        RunOutput {
            summary,
            items: self.saved,
        }
    }
}

/// Run one scraper end to end, writing files into `output_dir`.
///
/// Only configuration problems are returned as errors; every other failure
/// is absorbed into the summary.
#[instrument(level = "info", skip(config, output_dir), fields(scraper = kind.name()))]
pub async fn run(
    kind: ScraperKind,
    config: ScraperConfig,
    output_dir: &Path,
) -> Result<RunOutput, ScrapeError> {
    let start = Instant::now();
    let fetcher = Fetcher::new(&config.http)?;
    let naming = if config.timestamped_names {
        Naming::SequentialWithTime
    } else {
        Naming::Sequential
    };
    info!(target = config.target, url = %config.listing_url, "Starting scraper");

    let listing = match kind {
        ScraperKind::SinaText | ScraperKind::SinaImages => sina::discover(&config).await,
        ScraperKind::IfengText => ifeng::discover_stream(&config).await,
        ScraperKind::IfengImages => ifeng::index_gallery(&fetcher, &config).await,
    };
    info!(count = listing.items.len(), state = %listing.state, "Discovery complete");

    let mut ctx = RunContext::new(config, fetcher, FileSink::new(output_dir, naming));
    if listing.items.is_empty() {
        error!("No articles discovered; nothing to save");
        return Ok(ctx.finish(kind, &listing, start.elapsed()));
    }

    match kind {
        ScraperKind::SinaText => ctx.save_texts(&listing.items, sina::parse_article).await,
        ScraperKind::IfengText => ctx.save_texts(&listing.items, ifeng::parse_article).await,
        ScraperKind::SinaImages => {
            let policy = ImagePolicy {
                dedup_titles: true,
                referer: ImageReferer::Configured,
            };
            ctx.save_images(&listing.items, policy, sina::article_images)
                .await
        }
        ScraperKind::IfengImages => {
            let policy = ImagePolicy {
                dedup_titles: false,
                referer: ImageReferer::Article,
            };
            ctx.save_images(&listing.items, policy, ifeng::article_images)
                .await
        }
    }

    Ok(ctx.finish(kind, &listing, start.elapsed()))
}

//! ifeng military news (`mil.ifeng.com`).
//!
//! Two listings are scraped:
//!
//! - the news stream, which grows through a "load more" control and is
//!   driven in a headless browser
//! - the original-picture gallery index, which ships its whole article list
//!   as a `var allData = {...};` literal in the static HTML
//!
//! Gallery article pages carry their pictures in the same kind of literal
//! (`allData.slideData`), with plain `<img>` tags as a fallback.

use super::{Listing, open_listing};
use crate::browser::BrowserSession;
use crate::config::ScraperConfig;
use crate::discovery::{PageSource, discover as run_discovery};
use crate::error::ScrapeError;
use crate::extract::{BodyRule, TextRule, first_attr, first_body, first_text, first_text_in, resolve, text_of};
use crate::http::Fetcher;
use crate::models::{ArticleText, CandidateItem, DocumentLayout, ImageRef};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

pub const SITE_ROOT: &str = "https://mil.ifeng.com";

const MORE_CONTROL: &str = ".news-stream-basic-more";

const CONTAINERS: &[&str] = &[
    ".article-content",
    ".article-body",
    ".content",
    ".main-content",
    ".text",
    r#"div[class*="content"]"#,
    r#"div[class*="text"]"#,
];

const TIME_RULES: &[TextRule] = &[TextRule::Css("span.time"), TextRule::Css("div.time")];
const CARD_TITLE_RULES: &[TextRule] = &[TextRule::Css("h2"), TextRule::Css("a[title]")];

static STREAM_ITEM: Lazy<Selector> = Lazy::new(|| Selector::parse("li.news_item").unwrap());
static STREAM_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a.news-stream-newsStream-image-link[href]").unwrap());
static STREAM_TIME: Lazy<Selector> = Lazy::new(|| Selector::parse("time").unwrap());
static IMG: Lazy<Selector> = Lazy::new(|| Selector::parse("img").unwrap());

static ALL_DATA: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)var allData = (\{.*?\});").unwrap());
static TRAILING_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*([}\]])").unwrap());

/// The parts of an embedded `allData` literal used here.
#[derive(Debug, Deserialize)]
struct AllData {
    #[serde(default)]
    newsstream: Vec<StreamEntry>,
    #[serde(default, rename = "slideData")]
    slide_data: Vec<Slide>,
}

#[derive(Debug, Deserialize)]
struct StreamEntry {
    url: Option<String>,
    title: Option<String>,
    #[serde(rename = "newsTime")]
    news_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Slide {
    #[serde(rename = "type")]
    kind: Option<String>,
    url: Option<String>,
    description: Option<String>,
}

/// Pull the `allData` literal out of a page and parse it.
///
/// The literal is JavaScript, not JSON; trailing commas are stripped before
/// parsing. Returns `None` when the page has no literal.
fn parse_all_data(html: &str) -> Result<Option<AllData>, ScrapeError> {
    let Some(captures) = ALL_DATA.captures(html) else {
        return Ok(None);
    };
    let cleaned = TRAILING_COMMA.replace_all(&captures[1], "$1");
    serde_json::from_str(&cleaned)
        .map(Some)
        .map_err(|e| ScrapeError::Parse(format!("allData is not valid JSON: {e}")))
}

/// Extract candidates from the rendered news stream.
pub fn parse_stream(html: &str, base: &Url) -> Vec<CandidateItem> {
    let doc = Html::parse_document(html);
    doc.select(&STREAM_ITEM)
        .filter_map(|item| {
            let link = item.select(&STREAM_LINK).next()?;
            let url = resolve(base, link.value().attr("href")?)?;
            let title = first_text_in(item, CARD_TITLE_RULES).unwrap_or_default();
            let time = item.select(&STREAM_TIME).next().map(text_of).unwrap_or_default();
            Some(CandidateItem::new(url, title).with_timestamp(time))
        })
        .collect()
}

/// The rendered ifeng news stream as a discovery source.
pub struct IfengStream<'a> {
    session: &'a BrowserSession,
    base: Url,
    control_timeout: Duration,
}

impl<'a> IfengStream<'a> {
    pub fn new(session: &'a BrowserSession, base: Url, config: &ScraperConfig) -> Self {
        Self {
            session,
            base,
            control_timeout: Duration::from_secs(config.browser.control_timeout_secs),
        }
    }
}

impl PageSource for IfengStream<'_> {
    async fn snapshot(&mut self) -> Result<Vec<CandidateItem>, ScrapeError> {
        let html = self.session.html().await?;
        Ok(parse_stream(&html, &self.base))
    }

    async fn trigger_more(&mut self) -> Result<(), ScrapeError> {
        self.session
            .wait_for_selector(MORE_CONTROL, self.control_timeout)
            .await
            .map_err(|e| ScrapeError::Trigger(e.to_string()))?;
        self.session.click(MORE_CONTROL).await
    }
}

/// Drive the news stream until enough candidates are visible.
#[instrument(level = "info", skip_all, fields(url = %config.listing_url))]
pub async fn discover_stream(config: &ScraperConfig) -> Listing {
    let base = match Url::parse(SITE_ROOT) {
        Ok(base) => base,
        Err(e) => {
            error!(error = %e, "Invalid site root");
            return Listing::empty("failed");
        }
    };
    let session = match open_listing(config).await {
        Ok(session) => session,
        Err(e) => {
            error!(kind = e.kind(), error = %e, "Could not open ifeng stream");
            return Listing::empty("failed");
        }
    };

    let mut stream = IfengStream::new(&session, base, config);
    let found = run_discovery(&mut stream, &config.limits()).await;
    info!(
        count = found.items.len(),
        clicks = found.attempts_made,
        triggers = found.triggers,
        state = %found.state,
        "ifeng stream discovery finished"
    );
    session.close().await;
    found.into()
}

/// Candidates listed in the gallery index's `allData.newsstream`.
pub fn parse_gallery_index(html: &str) -> Result<Vec<CandidateItem>, ScrapeError> {
    let Some(data) = parse_all_data(html)? else {
        return Err(ScrapeError::Parse("no allData literal in listing".to_string()));
    };
    Ok(data
        .newsstream
        .into_iter()
        .filter_map(|entry| {
            let url = entry.url.filter(|u| !u.trim().is_empty())?;
            Some(
                CandidateItem::new(url, entry.title.unwrap_or_default())
                    .with_timestamp(entry.news_time.unwrap_or_default()),
            )
        })
        .collect())
}

/// Fetch the static gallery index once. No discovery loop is needed.
#[instrument(level = "info", skip_all, fields(url = %config.listing_url))]
pub async fn index_gallery(fetcher: &Fetcher, config: &ScraperConfig) -> Listing {
    let parsed = fetcher
        .html(&config.listing_url)
        .await
        .and_then(|html| parse_gallery_index(&html));
    match parsed {
        Ok(items) => {
            info!(count = items.len(), "Indexed gallery articles");
            Listing {
                items,
                state: "static".to_string(),
            }
        }
        Err(e) => {
            error!(kind = e.kind(), error = %e, "Could not index gallery");
            Listing::empty("failed")
        }
    }
}

/// Extract the text payload of an ifeng article page.
pub fn parse_article(html: &str, candidate: &CandidateItem) -> Result<ArticleText, ScrapeError> {
    let doc = Html::parse_document(html);

    let title = first_text(&doc, &[TextRule::Css("h1")]).unwrap_or_else(|| candidate.title.clone());
    let published = first_text(&doc, TIME_RULES)
        .or_else(|| candidate.timestamp.clone())
        .unwrap_or_default();

    let mut rules: Vec<BodyRule> = CONTAINERS.iter().map(|css| BodyRule::ContainerText(css)).collect();
    rules.push(BodyRule::LongParagraphs { min_chars: 20 });
    let content = first_body(&doc, &rules)
        .ok_or_else(|| ScrapeError::Parse("no article body found".to_string()))?;

    Ok(ArticleText {
        title,
        published,
        source: None,
        url: candidate.url.clone(),
        content,
        layout: DocumentLayout::IFENG,
    })
}

/// Pictures of a gallery article: `slideData` first, `<img>` tags otherwise.
pub fn article_images(html: &str, candidate: &CandidateItem) -> Vec<ImageRef> {
    match parse_all_data(html) {
        Ok(Some(data)) => {
            let slides: Vec<ImageRef> = data
                .slide_data
                .into_iter()
                .filter(|slide| slide.kind.as_deref() == Some("pic"))
                .filter_map(|slide| {
                    let url = slide.url.filter(|u| !u.trim().is_empty())?;
                    Some(ImageRef {
                        url,
                        description: slide.description.unwrap_or_default(),
                    })
                })
                .collect();
            if !slides.is_empty() {
                debug!(count = slides.len(), "Images from slideData");
                return slides;
            }
        }
        Ok(None) => {}
        Err(e) => warn!(url = %candidate.url, error = %e, "Ignoring unreadable slideData"),
    }

    let doc = Html::parse_document(html);
    let images: Vec<ImageRef> = doc
        .select(&IMG)
        .filter_map(|img| {
            let src = first_attr(img, &["src", "data-src"])?;
            (src.contains("ucms") && src.contains("http")).then(|| ImageRef {
                url: src,
                description: img.value().attr("alt").unwrap_or_default().to_string(),
            })
        })
        .collect();
    debug!(count = images.len(), "Images from img tags");
    images
}

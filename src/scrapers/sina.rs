//! Sina military news (`mil.news.sina.com.cn`).
//!
//! The homepage feed is rendered client-side and grows when a "load more"
//! control at the bottom of the card list is clicked. Discovery drives it in
//! a headless browser; articles themselves are plain HTML fetched over HTTP.
//!
//! The card markup has changed several times, so every lookup is a priority
//! list of selectors rather than a single one.

use super::{Listing, open_listing};
use crate::browser::BrowserSession;
use crate::config::{SINA_HOME, ScraperConfig};
use crate::discovery::{PageSource, discover as run_discovery};
use crate::error::ScrapeError;
use crate::extract::{
    BodyRule, TextRule, char_len, elements_with_class, first_attr, first_body, first_text,
    first_text_in, resolve, select_each, select_first_matching, text_of,
};
use crate::models::{ArticleText, CandidateItem, DocumentLayout, ImageRef};
use itertools::Itertools;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{debug, error, info, instrument};
use url::Url;

pub const DEFAULT_SOURCE: &str = "新浪军事";

const CARD_SELECTORS: &[&str] = &[
    ".ty-cardlist-w .ty-card",
    ".ty-card",
    ".news-item",
    ".news-list li",
    ".feed-card-item",
    r#"[data-sudaclick*="news"]"#,
];

const SINA_DOMAINS: &[&str] = &[".sina.com.cn", ".sina.cn"];
const HEADING_TAGS: &[&str] = &["h1", "h2", "h3", "h4"];
/// Listing titles must be longer than this many characters.
const MIN_TITLE_CHARS: usize = 5;

const CONTAINERS: &[&str] = &[
    "div.article-content",
    "div.article-body",
    "div#artibody",
    "div.content",
    "div.main-content",
    "div.article",
];

const IMAGE_SELECTORS: &[&str] = &[
    "div.article-content img",
    "div.article-body img",
    "div#artibody img",
    "div.content img",
    "div.main-content img",
    "div.article img",
];

const IMAGE_ATTRS: &[&str] = &["src", "data-src", "data-original"];
const IMAGE_SKIP_KEYWORDS: &[&str] = &["icon", "logo", "spacer", "ad", "gif"];
/// Site chrome (buttons, placeholders) lives under this path.
const SITE_ASSETS: &str = "sina.com.cn/images";

const TIME_RULES: &[TextRule] = &[
    TextRule::Css("span.time"),
    TextRule::ClassContains(&["time", "date"]),
];
const CARD_TIME_RULES: &[TextRule] = &[
    TextRule::Css("time"),
    TextRule::ClassContains(&["time", "date"]),
];

/// Clicks the first load-more control present. Controls outside the
/// viewport get a synthetic click event instead of a native click.
const CLICK_MORE: &str = r#"
(function() {
    const buttons = [
        document.querySelector('.cardlist-a__more-c'),
        document.querySelector('[node-type="cardlist-reload-bottom"]'),
        document.querySelector('div[data-sudaclick*="feed_refresh"]'),
        document.querySelector('.load-more'),
        document.querySelector('.more-btn'),
        document.querySelector('.ty-card-ft-more')
    ].filter(btn => btn !== null);

    for (const btn of buttons) {
        try {
            btn.scrollIntoView({block: 'center'});
            const rect = btn.getBoundingClientRect();
            const visible = rect.top >= 0 && rect.left >= 0 &&
                rect.bottom <= (window.innerHeight || document.documentElement.clientHeight) &&
                rect.right <= (window.innerWidth || document.documentElement.clientWidth);
            if (visible) {
                btn.click();
            } else {
                btn.dispatchEvent(new MouseEvent('click', {bubbles: true, cancelable: true, view: window, buttons: 1}));
            }
            return true;
        } catch (e) {
            continue;
        }
    }
    return false;
})()
"#;

static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static HEADINGS: Lazy<Vec<Selector>> = Lazy::new(|| {
    HEADING_TAGS
        .iter()
        .map(|tag| Selector::parse(tag).unwrap())
        .collect()
});

fn title_candidate(text: String) -> Option<String> {
    (char_len(&text) > MIN_TITLE_CHARS).then_some(text)
}

/// Extract article candidates from a rendered feed page.
///
/// Cards without a link, with a link off the Sina domains, or without a
/// usable headline are dropped.
pub fn parse_listing(html: &str, base: &Url) -> Vec<CandidateItem> {
    let doc = Html::parse_document(html);
    let mut cards = select_first_matching(&doc, CARD_SELECTORS);
    if cards.is_empty() {
        cards = elements_with_class(doc.root_element(), Some("div"), &["card", "news", "item"]);
        debug!(count = cards.len(), "Falling back to class-fragment cards");
    }

    let mut items = Vec::new();
    for card in cards {
        let Some(link) = card.select(&ANCHOR).next() else {
            continue;
        };
        let Some(url) = link.value().attr("href").and_then(|href| resolve(base, href)) else {
            continue;
        };
        if !SINA_DOMAINS.iter().any(|d| url.contains(d)) {
            continue;
        }

        let title = HEADINGS
            .iter()
            .filter_map(|sel| card.select(sel).next())
            .map(text_of)
            .find_map(title_candidate)
            .or_else(|| title_candidate(text_of(link)));
        let Some(title) = title else {
            continue;
        };

        let mut item = CandidateItem::new(url, title);
        if let Some(ts) = first_text_in(card, CARD_TIME_RULES) {
            item = item.with_timestamp(ts);
        }
        items.push(item);
    }
    items
}

/// The rendered Sina feed as a discovery source.
pub struct SinaFeed<'a> {
    session: &'a BrowserSession,
    base: Url,
    scroll_passes: u32,
    scroll_pause: Duration,
}

impl<'a> SinaFeed<'a> {
    pub fn new(session: &'a BrowserSession, base: Url, config: &ScraperConfig) -> Self {
        Self {
            session,
            base,
            scroll_passes: config.browser.scroll_passes,
            scroll_pause: Duration::from_millis(config.browser.scroll_pause_ms),
        }
    }
}

impl PageSource for SinaFeed<'_> {
    async fn snapshot(&mut self) -> Result<Vec<CandidateItem>, ScrapeError> {
        self.session
            .scroll_passes(self.scroll_passes.max(1), self.scroll_pause)
            .await?;
        let html = self.session.html().await?;
        Ok(parse_listing(&html, &self.base))
    }

    async fn trigger_more(&mut self) -> Result<(), ScrapeError> {
        if self.session.eval_bool(CLICK_MORE).await? {
            debug!("Clicked load-more control");
            Ok(())
        } else {
            Err(ScrapeError::Trigger("no load-more control on page".to_string()))
        }
    }
}

/// Drive the homepage feed until enough candidates are visible.
#[instrument(level = "info", skip_all, fields(url = %config.listing_url))]
pub async fn discover(config: &ScraperConfig) -> Listing {
    let base = match Url::parse(&config.listing_url) {
        Ok(base) => base,
        Err(e) => {
            error!(error = %e, "Invalid listing URL");
            return Listing::empty("failed");
        }
    };
    let session = match open_listing(config).await {
        Ok(session) => session,
        Err(e) => {
            error!(kind = e.kind(), error = %e, "Could not open Sina feed");
            return Listing::empty("failed");
        }
    };

    let mut feed = SinaFeed::new(&session, base, config);
    let found = run_discovery(&mut feed, &config.limits()).await;
    info!(
        count = found.items.len(),
        clicks = found.attempts_made,
        triggers = found.triggers,
        state = %found.state,
        "Sina feed discovery finished"
    );
    session.close().await;
    found.into()
}

/// Extract the text payload of a Sina article page.
pub fn parse_article(html: &str, candidate: &CandidateItem) -> Result<ArticleText, ScrapeError> {
    let doc = Html::parse_document(html);

    let title = first_text(&doc, &[TextRule::Css("h1")]).unwrap_or_else(|| candidate.title.clone());
    let published = first_text(&doc, TIME_RULES)
        .or_else(|| candidate.timestamp.clone())
        .unwrap_or_default();
    let source = first_text(&doc, &[TextRule::ClassContains(&["source", "来源"])])
        .unwrap_or_else(|| DEFAULT_SOURCE.to_string());

    let mut rules: Vec<BodyRule> = CONTAINERS
        .iter()
        .map(|css| BodyRule::ContainerParagraphs(css))
        .collect();
    rules.push(BodyRule::LongParagraphs { min_chars: 20 });
    let content = first_body(&doc, &rules)
        .ok_or_else(|| ScrapeError::Parse("no article body found".to_string()))?;

    Ok(ArticleText {
        title,
        published,
        source: Some(source),
        url: candidate.url.clone(),
        content,
        layout: DocumentLayout::SINA,
    })
}

fn keep_image(url: &str) -> bool {
    let lower = url.to_lowercase();
    !IMAGE_SKIP_KEYWORDS.iter().any(|k| lower.contains(k)) && !lower.contains(SITE_ASSETS)
}

/// Content images of a Sina article, in page order, without duplicates.
pub fn article_images(html: &str, candidate: &CandidateItem) -> Vec<ImageRef> {
    let base = Url::parse(&candidate.url).or_else(|_| Url::parse(SINA_HOME)).ok();
    let Some(base) = base else {
        return Vec::new();
    };
    let doc = Html::parse_document(html);

    select_each(&doc, IMAGE_SELECTORS)
        .into_iter()
        .filter_map(|img| {
            let src = first_attr(img, IMAGE_ATTRS)?;
            let url = resolve(&base, &src)?;
            keep_image(&url).then(|| ImageRef {
                url,
                description: img.value().attr("alt").unwrap_or_default().trim().to_string(),
            })
        })
        .unique_by(|image| image.url.clone())
        .collect()
}

//! Data models shared across discovery, extraction and output.
//!
//! - [`CandidateItem`]: a discovered article, before its content is fetched
//! - [`ArticleText`]: the extracted text payload of one article
//! - [`ImageRef`]: an image URL found inside an article
//! - [`SavedItem`]: one file written to the output directory
//! - [`RunSummary`]: totals reported at the end of a run

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// A discovered article. Identity is the URL alone.
///
/// Two candidates with the same `url` are the same item regardless of
/// title or timestamp; the discovery loop keeps whichever it saw first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateItem {
    /// Absolute article URL, the unique key.
    pub url: String,
    /// Headline as shown on the listing page.
    pub title: String,
    /// Listing timestamp, verbatim, when the page shows one.
    pub timestamp: Option<String>,
}

impl CandidateItem {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        let ts = timestamp.into();
        self.timestamp = if ts.trim().is_empty() { None } else { Some(ts) };
        self
    }
}

/// Header labels and spacing of a saved text document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentLayout {
    pub time_label: &'static str,
    /// Leave an empty line between the `=` rule and the body.
    pub blank_after_rule: bool,
}

impl DocumentLayout {
    pub const SINA: DocumentLayout = DocumentLayout {
        time_label: "发布时间",
        blank_after_rule: true,
    };

    pub const IFENG: DocumentLayout = DocumentLayout {
        time_label: "时间",
        blank_after_rule: false,
    };
}

/// Text extracted from an article page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleText {
    pub title: String,
    pub published: String,
    /// Outlet credited on the page; `None` for sites that do not show one.
    pub source: Option<String>,
    pub url: String,
    pub content: String,
    pub layout: DocumentLayout,
}

impl ArticleText {
    /// Render the article as the on-disk text document.
    pub fn to_document(&self) -> String {
        let mut doc = String::new();
        doc.push_str(&format!("标题: {}\n", self.title));
        doc.push_str(&format!("{}: {}\n", self.layout.time_label, self.published));
        if let Some(source) = &self.source {
            doc.push_str(&format!("来源: {}\n", source));
        }
        doc.push_str(&format!("原文链接: {}\n", self.url));
        doc.push_str(&"=".repeat(50));
        doc.push('\n');
        if self.layout.blank_after_rule {
            doc.push('\n');
        }
        doc.push_str(&self.content);
        doc
    }
}

/// An image found inside an article page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub url: String,
    pub description: String,
}

/// One file written by a run, in save order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedItem {
    /// Sequence number used in the file name, starting at 1.
    pub number: usize,
    /// Absolute path of the written file.
    pub path: String,
    /// Article (for text) or image (for images) URL the payload came from.
    pub source_url: String,
    pub title: String,
    pub published: Option<String>,
    /// Caption of an image, when the page provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub bytes: usize,
    pub saved_at: DateTime<Local>,
}

/// Totals reported at the end of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub scraper: String,
    /// Terminal discovery state, or `"static"` for single-fetch listings.
    pub discovery: String,
    pub candidates: usize,
    /// Articles actually visited after dedup.
    pub processed: usize,
    pub saved: usize,
    /// Per-item failures: fetches, extractions, downloads, writes.
    pub failed: usize,
    pub elapsed_secs: f64,
}

impl RunSummary {
    pub fn succeeded(&self) -> bool {
        self.saved > 0
    }
}

//! Error taxonomy shared by every scraper stage.
//!
//! Each per-item operation returns `Result<_, ScrapeError>` and the caller
//! decides whether the failure skips the item or feeds the discovery loop's
//! failure counter. Nothing here is fatal on its own.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Network error, timeout, or non-success status.
    #[error("fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// The expected structure was absent from a page.
    #[error("parse failed: {0}")]
    Parse(String),

    /// The pagination control was missing or could not be activated.
    #[error("pagination trigger failed: {0}")]
    Trigger(String),

    /// Saving an output file failed.
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The rendered-page session could not be launched or driven.
    #[error("browser session error: {0}")]
    Browser(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("table export failed: {0}")]
    Table(#[from] rust_xlsxwriter::XlsxError),
}

impl ScrapeError {
    /// Short label used as a structured logging field.
    pub fn kind(&self) -> &'static str {
        match self {
            ScrapeError::Fetch { .. } => "fetch",
            ScrapeError::Parse(_) => "parse",
            ScrapeError::Trigger(_) => "trigger",
            ScrapeError::Write { .. } => "write",
            ScrapeError::Browser(_) => "browser",
            ScrapeError::Config(_) => "config",
            ScrapeError::Table(_) => "table",
        }
    }

    pub(crate) fn fetch(url: &str, reason: impl std::fmt::Display) -> Self {
        ScrapeError::Fetch {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn browser(e: impl std::fmt::Display) -> Self {
        ScrapeError::Browser(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_url_and_reason() {
        let e = ScrapeError::fetch("https://example.com/a", "status 404");
        assert_eq!(
            e.to_string(),
            "fetch failed for https://example.com/a: status 404"
        );
        assert_eq!(e.kind(), "fetch");
    }

    #[test]
    fn test_write_error_shows_path() {
        let e = ScrapeError::Write {
            path: PathBuf::from("/tmp/out/001.txt"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(e.to_string().contains("/tmp/out/001.txt"));
        assert_eq!(e.kind(), "write");
    }
}

//! Numbered-file sink for article text and images.
//!
//! Files are named by a zero-padded counter starting at 1 (`001.txt`,
//! `002.jpg`, ...), optionally with the save time appended
//! (`001_103015.txt`). The counter only advances after a successful write,
//! so a failed save never leaves a gap.

use crate::error::ScrapeError;
use chrono::Local;
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, instrument};
use url::Url;

/// Used when a URL carries no usable extension.
pub const FALLBACK_EXTENSION: &str = ".jpg";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Naming {
    /// `NNN.<ext>`
    Sequential,
    /// `NNN_HHMMSS.<ext>`
    SequentialWithTime,
}

#[derive(Debug)]
pub struct FileSink {
    dir: PathBuf,
    next: usize,
    naming: Naming,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>, naming: Naming) -> Self {
        Self {
            dir: dir.into(),
            next: 1,
            naming,
        }
    }

    /// Number of files written so far.
    pub fn saved(&self) -> usize {
        self.next - 1
    }

    /// Number the next successful write will use.
    pub fn next_number(&self) -> usize {
        self.next
    }

    fn file_name(&self, ext: &str) -> String {
        let ext = if ext.starts_with('.') {
            ext.to_string()
        } else {
            format!(".{ext}")
        };
        match self.naming {
            Naming::Sequential => format!("{:03}{}", self.next, ext),
            Naming::SequentialWithTime => {
                format!("{:03}_{}{}", self.next, Local::now().format("%H%M%S"), ext)
            }
        }
    }

    /// Write `contents` as the next numbered file and return its absolute path.
    #[instrument(level = "debug", skip(self, contents), fields(bytes = contents.len()))]
    pub async fn write(&mut self, contents: &[u8], ext: &str) -> Result<PathBuf, ScrapeError> {
        let path = self.dir.join(self.file_name(ext));
        fs::write(&path, contents)
            .await
            .map_err(|source| ScrapeError::Write {
                path: path.clone(),
                source,
            })?;
        let absolute = std::path::absolute(&path).map_err(|source| ScrapeError::Write {
            path: path.clone(),
            source,
        })?;
        self.next += 1;
        debug!(path = %absolute.display(), "Saved file");
        Ok(absolute)
    }
}

/// Extension (with leading dot) of the last path segment of `url`.
///
/// Falls back to [`FALLBACK_EXTENSION`] when the segment has none or the
/// candidate is longer than five characters including the dot.
pub fn extension_from_url(url: &str) -> String {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_string(),
    };
    let last = path.rsplit('/').next().unwrap_or_default();
    match last.rfind('.') {
        Some(idx) if idx > 0 => {
            let ext = &last[idx..];
            if ext.len() > 1 && ext.len() <= 5 {
                ext.to_string()
            } else {
                FALLBACK_EXTENSION.to_string()
            }
        }
        _ => FALLBACK_EXTENSION.to_string(),
    }
}

//! JSON manifest of a run.
//!
//! The manifest carries the run summary and the full record of every saved
//! file (number, source URL, title, publish time, size), which the path
//! table deliberately omits.
//!
//! ```text
//! {
//!   "summary": { "scraper": "sina-text", "saved": 3, ... },
//!   "items": [ { "number": 1, "path": "/abs/test/001_103015.txt", ... } ]
//! }
//! ```

use crate::models::{RunSummary, SavedItem};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{error, info, instrument};

#[derive(Debug, Serialize, Deserialize)]
pub struct Manifest {
    pub summary: RunSummary,
    pub items: Vec<SavedItem>,
}

/// Write `manifest` as pretty JSON, creating the parent directory.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn write_manifest(manifest: &Manifest, path: &Path) -> Result<(), Box<dyn Error>> {
    let json = serde_json::to_string_pretty(manifest)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = fs::create_dir_all(parent).await {
            error!(dir = %parent.display(), error = %e, "Failed to create manifest dir");
            return Err(e.into());
        }
    }

    fs::write(path, json).await?;
    info!(items = manifest.items.len(), "Wrote JSON manifest");
    Ok(())
}

//! Output sinks for a scraper run.
//!
//! # Submodules
//!
//! - [`files`]: numbered text and image files in the output directory
//! - [`table`]: single-column spreadsheet of absolute paths, in save order
//! - [`json`]: optional manifest with the run summary and per-file metadata
//!
//! # Output Structure
//!
//! ```text
//! test/                 # --output-dir
//! ├── 001.jpg           # or 001_103015.txt for sina-text
//! ├── 002.jpg
//! └── 003.jpg
//! test.xlsx             # --table
//! run.json              # --manifest (optional)
//! ```

pub mod files;
pub mod json;
pub mod table;

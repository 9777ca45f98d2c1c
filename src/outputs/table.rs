//! Single-column path table.
//!
//! After a run, the absolute path of every saved file is written to an xlsx
//! workbook: one sheet, one header cell `absolute_path`, then one row per
//! file in save order.

use crate::error::ScrapeError;
use crate::models::SavedItem;
use rust_xlsxwriter::Workbook;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

pub const PATH_COLUMN: &str = "absolute_path";

const PATH_COLUMN_WIDTH: f64 = 80.0;

/// Write the path table. Returns `Ok(None)` without touching the
/// filesystem when nothing was saved.
#[instrument(level = "info", skip(items), fields(rows = items.len()))]
pub fn write_path_table(path: &Path, items: &[SavedItem]) -> Result<Option<PathBuf>, ScrapeError> {
    if items.is_empty() {
        warn!("No saved files; skipping path table");
        return Ok(None);
    }

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_column_width(0, PATH_COLUMN_WIDTH)?;
    sheet.write_string(0, 0, PATH_COLUMN)?;
    for (row, item) in (1u32..).zip(items) {
        sheet.write_string(row, 0, item.path.as_str())?;
    }
    workbook.save(path)?;

    let absolute = std::path::absolute(path).map_err(|source| ScrapeError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %absolute.display(), "Wrote path table");
    Ok(Some(absolute))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outputs::files::{FileSink, Naming};
    use calamine::{Reader, Xlsx, open_workbook};
    use chrono::Local;

    fn saved(number: usize, path: &str) -> SavedItem {
        SavedItem {
            number,
            path: path.to_string(),
            source_url: format!("https://mil.example.com/{number}"),
            title: format!("t{number}"),
            published: None,
            description: None,
            bytes: 10,
            saved_at: Local::now(),
        }
    }

    fn read_column(table: &Path) -> Vec<String> {
        let mut workbook: Xlsx<_> = open_workbook(table).unwrap();
        let range = workbook.worksheet_range("Sheet1").unwrap();
        range.rows().map(|row| row[0].to_string()).collect()
    }

    #[test]
    fn test_rows_in_save_order() {
        let dir = tempfile::tempdir().unwrap();
        let table = dir.path().join("paths.xlsx");
        let items = vec![
            saved(1, "/out/001.txt"),
            saved(2, "/out/002.txt"),
            saved(3, "/out/003.txt"),
        ];

        let written = write_path_table(&table, &items).unwrap().unwrap();
        assert!(written.is_absolute());

        let rows = read_column(&table);
        assert_eq!(
            rows,
            vec![PATH_COLUMN, "/out/001.txt", "/out/002.txt", "/out/003.txt"]
        );
    }

    #[test]
    fn test_empty_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let table = dir.path().join("paths.xlsx");

        assert!(write_path_table(&table, &[]).unwrap().is_none());
        assert!(!table.exists());
    }

    #[tokio::test]
    async fn test_table_lists_files_written_by_sink() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("test");
        std::fs::create_dir(&out).unwrap();
        let mut sink = FileSink::new(&out, Naming::Sequential);

        let mut items = Vec::new();
        for body in ["一", "二", "三"] {
            let number = sink.next_number();
            let path = sink.write(body.as_bytes(), ".txt").await.unwrap();
            items.push(saved(number, &path.to_string_lossy()));
        }

        let table = dir.path().join("test.xlsx");
        write_path_table(&table, &items).unwrap().unwrap();

        let rows = read_column(&table);
        assert_eq!(rows[0], PATH_COLUMN);
        assert_eq!(rows.len(), 4);
        for (row, name) in rows[1..].iter().zip(["001.txt", "002.txt", "003.txt"]) {
            let path = Path::new(row);
            assert!(path.is_absolute());
            assert_eq!(path, std::path::absolute(out.join(name)).unwrap());
            assert!(path.exists());
        }
    }
}

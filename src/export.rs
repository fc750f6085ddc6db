//! CSV export of result sets.
//!
//! Files are UTF-8 with a byte-order mark so spreadsheet tools pick the right
//! encoding. Cells are rendered with the same text the console grid shows.

use crate::error::{DbError, DbResult};
use crate::models::{ResultSet, cell_text};
use chrono::{DateTime, Local};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// `<title with spaces replaced>_<YYYYmmdd_HHMMSS>.csv`
pub fn export_file_name(title: &str, at: DateTime<Local>) -> String {
    format!(
        "{}_{}.csv",
        title.trim().replace(' ', "_"),
        at.format(TIMESTAMP_FORMAT)
    )
}

/// Write a BOM, the header row and one record per result row.
pub fn write_csv<W: Write>(mut out: W, result: &ResultSet) -> DbResult<()> {
    out.write_all(UTF8_BOM)?;
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(&result.columns)?;
    for row in &result.rows {
        writer.write_record(row.iter().map(cell_text))?;
    }
    writer.flush()?;
    Ok(())
}

/// Export into `dir`, named after `title` and the current local time.
pub fn export_csv(dir: &Path, title: &str, result: &ResultSet) -> DbResult<PathBuf> {
    export_csv_at(dir, title, result, Local::now())
}

pub fn export_csv_at(
    dir: &Path,
    title: &str,
    result: &ResultSet,
    at: DateTime<Local>,
) -> DbResult<PathBuf> {
    if !dir.is_dir() {
        return Err(DbError::export(format!(
            "Export directory '{}' does not exist",
            dir.display()
        )));
    }
    let path = dir.join(export_file_name(title, at));
    let file = File::create(&path)?;
    write_csv(file, result)?;

    info!(
        path = %path.display(),
        rows = result.row_count(),
        columns = result.columns.len(),
        "Exported result set"
    );
    Ok(path)
}

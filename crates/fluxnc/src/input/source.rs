//! Parsed input table and provenance about where it came from.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FluxError, Result};

/// Metadata about the source spreadsheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// File name without path.
    pub file: String,
    /// Full path to the file.
    pub path: PathBuf,
    /// SHA-256 hash of the file contents.
    pub hash: String,
    /// File size in bytes.
    pub size_bytes: u64,
    /// Number of data rows (excluding header).
    pub row_count: usize,
    /// Number of columns.
    pub column_count: usize,
    /// When the file was read.
    pub read_at: DateTime<Utc>,
}

impl SourceMetadata {
    /// Create metadata for a file that has been read.
    pub fn new(
        path: PathBuf,
        hash: String,
        size_bytes: u64,
        row_count: usize,
        column_count: usize,
    ) -> Self {
        let file = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            file,
            path,
            hash,
            size_bytes,
            row_count,
            column_count,
            read_at: Utc::now(),
        }
    }

    /// Metadata for a table that did not come from disk (tests, in-memory callers).
    pub fn in_memory(name: impl Into<String>, table: &DataTable) -> Self {
        let file: String = name.into();
        Self {
            path: PathBuf::from(&file),
            file,
            hash: String::new(),
            size_bytes: 0,
            row_count: table.row_count(),
            column_count: table.column_count(),
            read_at: Utc::now(),
        }
    }
}

/// Tabular data as read from a flux spreadsheet.
///
/// Cells are kept as text; typed access happens per column once the
/// resolver knows which columns it needs.
#[derive(Debug, Clone)]
pub struct DataTable {
    /// Column headers, in file order.
    pub headers: Vec<String>,
    /// Row data as strings (row-major order).
    pub rows: Vec<Vec<String>>,
}

impl DataTable {
    /// Create a new data table.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    /// Get the number of columns.
    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    /// Get the number of rows (excluding header).
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Position of the first column with this exact name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// How many header cells carry this exact name.
    pub fn occurrences(&self, name: &str) -> usize {
        self.headers.iter().filter(|h| *h == name).count()
    }

    /// Get all values for a column by index.
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &str> {
        self.rows
            .iter()
            .map(move |row| row.get(index).map(|s| s.as_str()).unwrap_or(""))
    }

    /// Get a specific cell value.
    pub fn get(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row).and_then(|r| r.get(col).map(|s| s.as_str()))
    }

    /// Read a column as floats. Missing cells and the sentinel become `NaN`.
    pub fn numeric_column(&self, index: usize, missing_value: f64) -> Result<Vec<f64>> {
        self.column_values(index)
            .enumerate()
            .map(|(row, raw)| {
                parse_numeric(raw, missing_value).ok_or_else(|| FluxError::Parse {
                    row: row + 1,
                    column: index,
                    message: format!(
                        "'{}' in column '{}' is not numeric",
                        raw.trim(),
                        self.headers.get(index).map(|s| s.as_str()).unwrap_or("?")
                    ),
                })
            })
            .collect()
    }

    /// Read a column of integer flags. Missing cells become `None`.
    pub fn flag_column(&self, index: usize, missing_value: f64) -> Result<Vec<Option<i64>>> {
        let values = self.numeric_column(index, missing_value)?;
        Ok(values
            .into_iter()
            .map(|v| if v.is_nan() { None } else { Some(v.round() as i64) })
            .collect())
    }

    /// Check if a value represents a missing/null value.
    pub fn is_null_value(value: &str) -> bool {
        let trimmed = value.trim();
        trimmed.is_empty()
            || trimmed.eq_ignore_ascii_case("na")
            || trimmed.eq_ignore_ascii_case("nan")
            || trimmed.eq_ignore_ascii_case("null")
    }
}

/// Parse a numeric cell. `Some(NaN)` for missing, `None` when unparseable.
fn parse_numeric(raw: &str, missing_value: f64) -> Option<f64> {
    if DataTable::is_null_value(raw) {
        return Some(f64::NAN);
    }
    let value: f64 = raw.trim().parse().ok()?;
    if value == missing_value || !value.is_finite() {
        Some(f64::NAN)
    } else {
        Some(value)
    }
}

//! CSV reader for flux spreadsheets.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::debug;

use super::source::{DataTable, SourceMetadata};
use crate::error::{FluxError, Result};

/// Parser configuration.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Field delimiter.
    pub delimiter: u8,
    /// Lines starting with this byte are skipped.
    pub comment: Option<u8>,
    /// Maximum rows to read (None = all).
    pub max_rows: Option<usize>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            delimiter: b',',
            comment: Some(b'#'),
            max_rows: None,
        }
    }
}

/// Reads delimited flux files into a [`DataTable`].
#[derive(Debug, Clone, Default)]
pub struct Parser {
    config: ParserConfig,
}

impl Parser {
    /// Create a new parser with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a parser with custom configuration.
    pub fn with_config(config: ParserConfig) -> Self {
        Self { config }
    }

    /// Parse a file and return the data table and metadata.
    pub fn parse_file(&self, path: impl AsRef<Path>) -> Result<(DataTable, SourceMetadata)> {
        let path = path.as_ref();
        let io_err = |source| FluxError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut file = File::open(path).map_err(io_err)?;
        let size_bytes = file.metadata().map_err(io_err)?.len();

        let mut contents = Vec::new();
        file.read_to_end(&mut contents).map_err(io_err)?;

        let mut hasher = Sha256::new();
        hasher.update(&contents);
        let hash = format!("sha256:{:x}", hasher.finalize());

        let table = self.parse_bytes(&contents)?;
        debug!(
            file = %path.display(),
            rows = table.row_count(),
            columns = table.column_count(),
            "read input table"
        );

        let source = SourceMetadata::new(
            path.to_path_buf(),
            hash,
            size_bytes,
            table.row_count(),
            table.column_count(),
        );

        Ok((table, source))
    }

    /// Parse bytes directly.
    pub fn parse_bytes(&self, bytes: &[u8]) -> Result<DataTable> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.config.delimiter)
            .comment(self.config.comment)
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(bytes);

        let headers: Vec<String> = reader.headers()?.iter().map(|s| s.to_string()).collect();
        if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
            return Err(FluxError::EmptyData("No columns found".to_string()));
        }

        let expected_cols = headers.len();
        let mut rows = Vec::new();

        for (row_idx, result) in reader.records().enumerate() {
            if let Some(max) = self.config.max_rows {
                if row_idx >= max {
                    break;
                }
            }

            let record = result?;
            if record.len() != expected_cols {
                return Err(FluxError::Parse {
                    row: row_idx + 1,
                    column: record.len(),
                    message: format!("expected {} fields, found {}", expected_cols, record.len()),
                });
            }
            rows.push(record.iter().map(|s| s.to_string()).collect());
        }

        if rows.is_empty() {
            return Err(FluxError::EmptyData("No data rows found".to_string()));
        }

        Ok(DataTable::new(headers, rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_csv() {
        let parser = Parser::new();
        let data = b"TIMESTAMP_START,TIMESTAMP_END,TA_F\n200101010000,200101010030,1.5\n200101010030,200101010100,-9999";
        let table = parser.parse_bytes(data).unwrap();

        assert_eq!(table.headers, vec!["TIMESTAMP_START", "TIMESTAMP_END", "TA_F"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.get(1, 2), Some("-9999"));
    }

    #[test]
    fn test_comment_lines_skipped() {
        let parser = Parser::new();
        let data = b"# exported by tower logger\nA,B\n1,2\n";
        let table = parser.parse_bytes(data).unwrap();
        assert_eq!(table.headers, vec!["A", "B"]);
        assert_eq!(table.row_count(), 1);
    }

    #[test]
    fn test_ragged_row_rejected() {
        let parser = Parser::new();
        let err = parser.parse_bytes(b"A,B\n1,2\n3\n").unwrap_err();
        assert!(matches!(err, FluxError::Parse { row: 2, .. }));
    }

    #[test]
    fn test_header_only_is_empty() {
        let parser = Parser::new();
        let err = parser.parse_bytes(b"A,B\n").unwrap_err();
        assert!(matches!(err, FluxError::EmptyData(_)));
    }

    #[test]
    fn test_semicolon_delimiter() {
        let parser = Parser::with_config(ParserConfig {
            delimiter: b';',
            ..ParserConfig::default()
        });
        let table = parser.parse_bytes(b"A;B\n1;2\n").unwrap();
        assert_eq!(table.get(0, 1), Some("2"));
    }
}

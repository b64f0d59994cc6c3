//! Error types for the fluxnc conversion engine.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for conversion operations.
///
/// Every variant aborts the conversion of the current file only. Recoverable
/// per-variable problems are never raised; they are recorded in the
/// warning trail instead.
#[derive(Debug, Error)]
pub enum FluxError {
    /// Input columns don't match what the catalog expects.
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Time step or record span out of bounds.
    #[error("Timing error: {0}")]
    Timing(String),

    /// An essential variable (or the preferred evaluation set) failed QC.
    #[error("Threshold failure for '{variable}': {reason}")]
    ThresholdFailure { variable: String, reason: String },

    /// The output writer failed.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Error reading or accessing a file.
    #[error("IO error for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error parsing a cell of the input table.
    #[error("Parse error at row {row}, column {column}: {message}")]
    Parse {
        row: usize,
        column: usize,
        message: String,
    },

    /// Error from the CSV library.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Empty file or no data to convert.
    #[error("Empty data: {0}")]
    EmptyData(String),

    /// Malformed variable catalog.
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FluxError {
    /// Build a threshold failure for a variable.
    pub fn threshold(variable: impl Into<String>, reason: impl Into<String>) -> Self {
        FluxError::ThresholdFailure {
            variable: variable.into(),
            reason: reason.into(),
        }
    }

    /// Short machine-friendly name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            FluxError::SchemaMismatch(_) => "schema_mismatch",
            FluxError::Timing(_) => "timing",
            FluxError::ThresholdFailure { .. } => "threshold_failure",
            FluxError::Encoding(_) => "encoding",
            FluxError::Io { .. } => "io",
            FluxError::Parse { .. } => "parse",
            FluxError::Csv(_) => "csv",
            FluxError::EmptyData(_) => "empty_data",
            FluxError::Catalog(_) => "catalog",
            FluxError::Config(_) => "config",
            FluxError::Json(_) => "json",
        }
    }
}

/// Result type alias for conversion operations.
pub type Result<T> = std::result::Result<T, FluxError>;

//! JSON rendering of a converted dataset.

use std::io::{BufWriter, Write};
use std::path::Path;

use super::{FileEmitter, write_atomic};
use crate::error::{FluxError, Result};
use crate::output::ConvertedDataset;

/// Writes the schema and arrays as a single JSON document.
#[derive(Debug, Clone, Default)]
pub struct JsonEmitter {
    pretty: bool,
}

impl JsonEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indent the output.
    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

impl FileEmitter for JsonEmitter {
    fn extension(&self) -> &'static str {
        "json"
    }

    fn emit(&self, dataset: &ConvertedDataset, path: &Path) -> Result<()> {
        dataset.validate()?;
        write_atomic(path, self.extension(), |staged| {
            let mut writer = BufWriter::new(staged.as_file());
            let written = if self.pretty {
                serde_json::to_writer_pretty(&mut writer, dataset)
            } else {
                serde_json::to_writer(&mut writer, dataset)
            };
            written.map_err(|e| FluxError::Encoding(format!("JSON encoding failed: {}", e)))?;
            writer
                .flush()
                .map_err(|e| FluxError::Encoding(format!("JSON write failed: {}", e)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{Dimension, OutputSchema, SchemaVariable, ValueKind, VariableData};
    use indexmap::IndexMap;
    use tempfile::TempDir;

    fn dataset() -> ConvertedDataset {
        let schema = OutputSchema {
            dimensions: vec![Dimension::unlimited("time")],
            variables: vec![SchemaVariable::new("time", ValueKind::Float64, &["time"]).with_unit("seconds since 2001-01-01 00:00:00")],
            global_attributes: IndexMap::from([("Site_code".to_string(), "XX-Tst".to_string())]),
        };
        let data = IndexMap::from([("time".to_string(), VariableData::Float64(vec![0.0, 1800.0]))]);
        ConvertedDataset::new(schema, data).unwrap()
    }

    #[test]
    fn test_writes_and_reads_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("site.json");
        JsonEmitter::new().pretty(true).emit(&dataset(), &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let back: ConvertedDataset = serde_json::from_str(&text).unwrap();
        assert_eq!(back, dataset());

        // staging file is gone
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_invalid_dataset_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        let mut ds = dataset();
        ds.data.insert("time".to_string(), VariableData::Int32(vec![0, 1]));

        let err = JsonEmitter::new().emit(&ds, &path).unwrap_err();
        assert!(matches!(err, FluxError::Encoding(_)));
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}

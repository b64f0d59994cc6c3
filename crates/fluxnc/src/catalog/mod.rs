//! Variable catalog: the metadata table that drives conversion.
//!
//! Each row maps a source spreadsheet column to an output variable, with
//! its units, physical range and role. The catalog is loaded once and is
//! read-only afterwards; every later stage looks entries up explicitly.

mod spec;
mod units;

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::{FluxError, Result};

pub use spec::{Category, SourceType, VariableSpec};
pub use units::{
    KELVIN_OFFSET, STANDARD_PRESSURE_PA, UnitRule, specific_humidity, to_celsius, to_pascal,
};

/// Catalog for FLUXNET2015 FULLSET half-hourly/hourly files.
const FLUXNET2015_CATALOG: &str = include_str!("../../data/fluxnet2015_variables.csv");

/// Raw CSV row, before validation.
#[derive(Debug, Deserialize)]
struct CatalogRow {
    source_name: String,
    source_type: String,
    output_name: String,
    #[serde(default)]
    standard_name: String,
    long_name: String,
    category: String,
    unit_source: String,
    unit_target: String,
    valid_min: f64,
    valid_max: f64,
    essential: String,
    preferred: String,
    reanalysis_name: Option<String>,
}

/// Ordered, immutable collection of [`VariableSpec`].
#[derive(Debug, Clone, PartialEq)]
pub struct VariableCatalog {
    entries: Vec<VariableSpec>,
}

impl VariableCatalog {
    /// Build a catalog from already-validated entries.
    pub fn new(entries: Vec<VariableSpec>) -> Result<Self> {
        let catalog = Self { entries };
        catalog.check()?;
        Ok(catalog)
    }

    /// The built-in FLUXNET2015 catalog.
    pub fn fluxnet2015() -> Self {
        Self::from_csv_str(FLUXNET2015_CATALOG).expect("built-in catalog is valid")
    }

    /// Load a catalog CSV from disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut contents = String::new();
        File::open(path)
            .and_then(|mut f| f.read_to_string(&mut contents))
            .map_err(|e| FluxError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;
        let catalog = Self::from_csv_str(&contents)?;
        debug!(path = %path.display(), entries = catalog.len(), "loaded variable catalog");
        Ok(catalog)
    }

    /// Parse a catalog from CSV text.
    pub fn from_csv_str(text: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .comment(Some(b'#'))
            .from_reader(text.as_bytes());

        let mut entries = Vec::new();
        for (idx, row) in reader.deserialize::<CatalogRow>().enumerate() {
            let row = row?;
            entries.push(row_to_spec(row, idx + 1)?);
        }

        if entries.is_empty() {
            return Err(FluxError::Catalog("catalog has no entries".to_string()));
        }

        Self::new(entries)
    }

    fn check(&self) -> Result<()> {
        let mut outputs = HashSet::new();
        for spec in &self.entries {
            if !outputs.insert(spec.output_name.as_str()) {
                return Err(FluxError::Catalog(format!(
                    "output name '{}' appears more than once",
                    spec.output_name
                )));
            }
        }
        Ok(())
    }

    /// Entries in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = &VariableSpec> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[VariableSpec] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry by output variable name.
    pub fn by_output(&self, output_name: &str) -> Option<&VariableSpec> {
        self.entries.iter().find(|s| s.output_name == output_name)
    }

    /// All entries reading the given source column, in catalog order.
    pub fn by_source<'a>(&'a self, source_name: &'a str) -> impl Iterator<Item = &'a VariableSpec> {
        self.entries.iter().filter(move |s| s.source_name == source_name)
    }

    /// Essential entries, in catalog order.
    pub fn essentials(&self) -> impl Iterator<Item = &VariableSpec> {
        self.entries.iter().filter(|s| s.essential)
    }

    /// Whether any entry reads this column, directly or as its reanalysis counterpart.
    pub fn knows_column(&self, name: &str) -> bool {
        self.entries.iter().any(|s| {
            s.source_name == name || s.reanalysis_name.as_deref() == Some(name)
        })
    }
}

fn row_to_spec(row: CatalogRow, line: usize) -> Result<VariableSpec> {
    let bad = |what: &str, value: &str| {
        FluxError::Catalog(format!("row {}: invalid {} '{}'", line, what, value))
    };

    if row.source_name.is_empty() {
        return Err(bad("source_name", ""));
    }
    if row.output_name.is_empty() {
        return Err(bad("output_name", ""));
    }
    if !(row.valid_min <= row.valid_max) {
        return Err(FluxError::Catalog(format!(
            "row {}: valid_min {} exceeds valid_max {} for '{}'",
            line, row.valid_min, row.valid_max, row.output_name
        )));
    }

    let source_type = SourceType::parse(&row.source_type)
        .ok_or_else(|| bad("source_type", &row.source_type))?;
    let category =
        Category::parse(&row.category).ok_or_else(|| bad("category", &row.category))?;
    let essential = parse_bool(&row.essential).ok_or_else(|| bad("essential", &row.essential))?;
    let preferred = parse_bool(&row.preferred).ok_or_else(|| bad("preferred", &row.preferred))?;
    let unit_rule = UnitRule::resolve(&row.unit_source, &row.unit_target)
        .map_err(|e| FluxError::Catalog(format!("row {} ('{}'): {}", line, row.output_name, e)))?;

    Ok(VariableSpec {
        source_name: row.source_name,
        source_type,
        output_name: row.output_name,
        standard_name: row.standard_name,
        long_name: row.long_name,
        category,
        unit_source: row.unit_source,
        unit_target: row.unit_target,
        valid_min: row.valid_min,
        valid_max: row.valid_max,
        essential,
        preferred,
        reanalysis_name: row.reanalysis_name.filter(|s| !s.is_empty()),
        unit_rule,
    })
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "t" | "y" => Some(true),
        "false" | "no" | "0" | "f" | "n" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "source_name,source_type,output_name,standard_name,long_name,category,unit_source,unit_target,valid_min,valid_max,essential,preferred,reanalysis_name\n";

    #[test]
    fn test_builtin_catalog_loads() {
        let catalog = VariableCatalog::fluxnet2015();
        assert!(catalog.len() > 10);

        let tair = catalog.by_output("Tair").unwrap();
        assert_eq!(tair.source_name, "TA_F");
        assert!(tair.essential);
        assert_eq!(tair.reanalysis_name.as_deref(), Some("TA_ERA"));
        assert_eq!(
            tair.unit_rule,
            UnitRule::Offset {
                offset: KELVIN_OFFSET
            }
        );
    }

    #[test]
    fn test_builtin_humidity_shares_source() {
        let catalog = VariableCatalog::fluxnet2015();
        let outputs: Vec<&str> = catalog.by_source("RH").map(|s| s.output_name.as_str()).collect();
        assert_eq!(outputs, vec!["RH", "Qair"]);
    }

    #[test]
    fn test_catalog_order_preserved() {
        let text = format!(
            "{}B,numeric,b_out,,B,evaluation,W/m2,W/m2,0,1,no,no,\nA,numeric,a_out,,A,met,K,degC,-50,50,yes,no,\n",
            HEADER
        );
        let catalog = VariableCatalog::from_csv_str(&text).unwrap();
        let names: Vec<&str> = catalog.iter().map(|s| s.output_name.as_str()).collect();
        assert_eq!(names, vec!["b_out", "a_out"]);
        assert_eq!(catalog.essentials().count(), 1);
        assert!(catalog.by_output("b_out").unwrap().reanalysis_name.is_none());
    }

    #[test]
    fn test_duplicate_output_rejected() {
        let text = format!(
            "{}A,numeric,x,,A,met,K,K,0,1,no,no,\nB,numeric,x,,B,met,K,K,0,1,no,no,\n",
            HEADER
        );
        let err = VariableCatalog::from_csv_str(&text).unwrap_err();
        assert!(matches!(err, FluxError::Catalog(_)));
    }

    #[test]
    fn test_inverted_range_rejected() {
        let text = format!("{}A,numeric,x,,A,met,K,K,10,1,no,no,\n", HEADER);
        assert!(VariableCatalog::from_csv_str(&text).is_err());
    }

    #[test]
    fn test_unknown_units_rejected() {
        let text = format!("{}A,numeric,x,,A,met,W/m2,K,0,1,no,no,\n", HEADER);
        let err = VariableCatalog::from_csv_str(&text).unwrap_err();
        assert!(err.to_string().contains("no conversion"));
    }

    #[test]
    fn test_bad_boolean_rejected() {
        let text = format!("{}A,numeric,x,,A,met,K,K,0,1,maybe,no,\n", HEADER);
        assert!(VariableCatalog::from_csv_str(&text).is_err());
    }

    #[test]
    fn test_knows_reanalysis_column() {
        let catalog = VariableCatalog::fluxnet2015();
        assert!(catalog.knows_column("TA_ERA"));
        assert!(catalog.knows_column("TA_F"));
        assert!(!catalog.knows_column("TIMESTAMP_START"));
    }
}

//! A single catalog entry.

use serde::{Deserialize, Serialize};

use super::units::UnitRule;

/// Role of a variable in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Forcing for land-surface models.
    Meteorological,
    /// Flux used to evaluate model output.
    Evaluation,
}

impl Category {
    /// Parse the catalog spelling (`met`/`meteorological`, `eval`/`evaluation`).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "met" | "meteorological" => Some(Category::Meteorological),
            "eval" | "evaluation" => Some(Category::Evaluation),
            _ => None,
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Category::Meteorological => "meteorological",
            Category::Evaluation => "evaluation",
        }
    }
}

/// Declared cell type of a source column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Any finite decimal number.
    Numeric,
    /// Whole numbers only.
    Integer,
}

impl SourceType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "numeric" | "float" | "double" | "real" => Some(SourceType::Numeric),
            "integer" | "int" => Some(SourceType::Integer),
            _ => None,
        }
    }
}

/// One row of the variable catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSpec {
    /// Column name in the source spreadsheet.
    pub source_name: String,
    /// Declared type of the source column.
    pub source_type: SourceType,
    /// Variable name in the output file.
    pub output_name: String,
    /// CF standard name (may be empty).
    pub standard_name: String,
    /// Descriptive name.
    pub long_name: String,
    pub category: Category,
    pub unit_source: String,
    pub unit_target: String,
    /// Lower physical bound, in target units.
    pub valid_min: f64,
    /// Upper physical bound, in target units.
    pub valid_max: f64,
    /// Conversion aborts when this variable is absent or fails QC.
    pub essential: bool,
    /// Preferred evaluation flux.
    pub preferred: bool,
    /// Column holding the reanalysis counterpart, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reanalysis_name: Option<String>,
    /// Conversion derived from the unit pair at load time.
    pub unit_rule: UnitRule,
}

impl VariableSpec {
    /// Whether a converted value lies within the physical range.
    pub fn in_range(&self, value: f64) -> bool {
        value >= self.valid_min && value <= self.valid_max
    }

    pub fn is_meteorological(&self) -> bool {
        self.category == Category::Meteorological
    }
}

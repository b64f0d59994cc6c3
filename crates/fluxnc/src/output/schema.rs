//! Normalized description of an output file, independent of its encoding.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{FluxError, Result};

/// A named axis. `len` is `None` for the unlimited (record) dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub len: Option<usize>,
}

impl Dimension {
    pub fn fixed(name: impl Into<String>, len: usize) -> Self {
        Self {
            name: name.into(),
            len: Some(len),
        }
    }

    pub fn unlimited(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            len: None,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.len.is_none()
    }
}

/// Variable attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Number(f64),
    Text(String),
}

impl AttributeValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(n) => Some(*n),
            AttributeValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            AttributeValue::Number(_) => None,
        }
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Number(value)
    }
}

impl From<usize> for AttributeValue {
    fn from(value: usize) -> Self {
        AttributeValue::Number(value as f64)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

/// Element type of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Float64,
    Int32,
    Text,
}

/// One output variable: its name, unit, element type, dimensions and attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaVariable {
    pub name: String,
    /// Empty for unitless variables.
    pub unit: String,
    pub kind: ValueKind,
    /// Dimension names, slowest-varying first.
    pub shape: Vec<String>,
    pub attributes: IndexMap<String, AttributeValue>,
}

impl SchemaVariable {
    pub fn new(name: impl Into<String>, kind: ValueKind, shape: &[&str]) -> Self {
        Self {
            name: name.into(),
            unit: String::new(),
            kind,
            shape: shape.iter().map(|s| s.to_string()).collect(),
            attributes: IndexMap::new(),
        }
    }

    /// Set the unit and its `units` attribute.
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self.attributes
            .insert("units".to_string(), AttributeValue::Text(self.unit.clone()));
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.insert(name.into(), value.into());
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }
}

/// Dimensions, variables and global attributes of one output file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OutputSchema {
    pub dimensions: Vec<Dimension>,
    pub variables: Vec<SchemaVariable>,
    pub global_attributes: IndexMap<String, String>,
}

impl OutputSchema {
    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.name == name)
    }

    pub fn variable(&self, name: &str) -> Option<&SchemaVariable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(|v| v.name.as_str())
    }

    /// The record dimension, if any.
    pub fn unlimited_dimension(&self) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.is_unlimited())
    }
}

/// Values of one variable, flattened in shape order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "lowercase")]
pub enum VariableData {
    Float64(Vec<f64>),
    Int32(Vec<i32>),
    /// Scalar string.
    Text(String),
}

impl VariableData {
    pub fn kind(&self) -> ValueKind {
        match self {
            VariableData::Float64(_) => ValueKind::Float64,
            VariableData::Int32(_) => ValueKind::Int32,
            VariableData::Text(_) => ValueKind::Text,
        }
    }

    /// Element count; a text scalar counts as one.
    pub fn len(&self) -> usize {
        match self {
            VariableData::Float64(v) => v.len(),
            VariableData::Int32(v) => v.len(),
            VariableData::Text(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_f64(&self) -> Option<&[f64]> {
        match self {
            VariableData::Float64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<&[i32]> {
        match self {
            VariableData::Int32(v) => Some(v),
            _ => None,
        }
    }
}

/// A complete, encoder-ready output: schema plus data for every variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvertedDataset {
    pub schema: OutputSchema,
    pub data: IndexMap<String, VariableData>,
}

impl ConvertedDataset {
    pub fn new(schema: OutputSchema, data: IndexMap<String, VariableData>) -> Result<Self> {
        let dataset = Self { schema, data };
        dataset.validate()?;
        Ok(dataset)
    }

    pub fn values(&self, name: &str) -> Option<&VariableData> {
        self.data.get(name)
    }

    /// Length of the record dimension, taken from its coordinate variable.
    pub fn record_len(&self) -> usize {
        self.schema
            .unlimited_dimension()
            .and_then(|d| self.data.get(&d.name))
            .map_or(0, VariableData::len)
    }

    /// Check that every variable has data of the declared kind and of the
    /// length its shape implies.
    pub fn validate(&self) -> Result<()> {
        let record_len = self.record_len();

        for variable in &self.schema.variables {
            let data = self.data.get(&variable.name).ok_or_else(|| {
                FluxError::Encoding(format!("variable '{}' has no data", variable.name))
            })?;
            if data.kind() != variable.kind {
                return Err(FluxError::Encoding(format!(
                    "variable '{}' declared {:?} but holds {:?}",
                    variable.name,
                    variable.kind,
                    data.kind()
                )));
            }

            let mut expected = 1usize;
            for dim_name in &variable.shape {
                let dim = self.schema.dimension(dim_name).ok_or_else(|| {
                    FluxError::Encoding(format!(
                        "variable '{}' uses undeclared dimension '{}'",
                        variable.name, dim_name
                    ))
                })?;
                expected *= dim.len.unwrap_or(record_len);
            }
            if data.len() != expected {
                return Err(FluxError::Encoding(format!(
                    "variable '{}' has {} values, shape {:?} needs {}",
                    variable.name,
                    data.len(),
                    variable.shape,
                    expected
                )));
            }
        }

        if let Some(extra) = self.data.keys().find(|k| self.schema.variable(k).is_none()) {
            return Err(FluxError::Encoding(format!(
                "data for '{}' has no schema entry",
                extra
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> OutputSchema {
        OutputSchema {
            dimensions: vec![
                Dimension::fixed("x", 1),
                Dimension::fixed("y", 1),
                Dimension::unlimited("time"),
            ],
            variables: vec![
                SchemaVariable::new("time", ValueKind::Float64, &["time"]).with_unit("seconds since 2001-01-01 00:00:00"),
                SchemaVariable::new("Qh", ValueKind::Float64, &["time", "y", "x"]).with_unit("W/m2"),
                SchemaVariable::new("IGBP_veg_short", ValueKind::Text, &["y", "x"]),
            ],
            global_attributes: IndexMap::new(),
        }
    }

    fn data(qh_len: usize) -> IndexMap<String, VariableData> {
        let mut data = IndexMap::new();
        data.insert("time".to_string(), VariableData::Float64(vec![0.0, 1800.0, 3600.0]));
        data.insert("Qh".to_string(), VariableData::Float64(vec![1.0; qh_len]));
        data.insert("IGBP_veg_short".to_string(), VariableData::Text("ENF".into()));
        data
    }

    #[test]
    fn test_valid_dataset() {
        let ds = ConvertedDataset::new(schema(), data(3)).unwrap();
        assert_eq!(ds.record_len(), 3);
        assert_eq!(
            ds.schema.variable("Qh").unwrap().attribute("units"),
            Some(&AttributeValue::Text("W/m2".into()))
        );
    }

    #[test]
    fn test_shape_mismatch_is_encoding_error() {
        let err = ConvertedDataset::new(schema(), data(2)).unwrap_err();
        assert!(matches!(err, FluxError::Encoding(ref m) if m.contains("Qh")));
    }

    #[test]
    fn test_kind_mismatch_and_missing_data() {
        let mut d = data(3);
        d.insert("Qh".to_string(), VariableData::Int32(vec![1, 2, 3]));
        assert!(ConvertedDataset::new(schema(), d).is_err());

        let mut d = data(3);
        d.shift_remove("IGBP_veg_short");
        assert!(ConvertedDataset::new(schema(), d).is_err());
    }

    #[test]
    fn test_attribute_values_serialise_untagged() {
        let json = serde_json::to_string(&AttributeValue::from(20.0)).unwrap();
        assert_eq!(json, "20.0");
        let json = serde_json::to_string(&AttributeValue::from("K")).unwrap();
        assert_eq!(json, "\"K\"");
    }
}

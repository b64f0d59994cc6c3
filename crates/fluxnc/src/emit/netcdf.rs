//! NetCDF encoding via the `netcdf` crate (needs the system libnetcdf).

use std::path::Path;

use ::netcdf::{FileMut, VariableMut};

use super::{FileEmitter, write_atomic};
use crate::error::{FluxError, Result};
use crate::output::{AttributeValue, ConvertedDataset, SchemaVariable, VariableData};

/// Writes dimensions, variables and attributes as a NetCDF-4 file.
#[derive(Debug, Clone, Default)]
pub struct NetcdfEmitter;

impl NetcdfEmitter {
    pub fn new() -> Self {
        Self
    }
}

fn encoding(context: impl std::fmt::Display) -> impl FnOnce(::netcdf::Error) -> FluxError {
    move |e| FluxError::Encoding(format!("{}: {}", context, e))
}

// Extents are given per rank: the record dimension spans `len`, every
// other dimension has length 1.
macro_rules! put_series {
    ($var:expr, $values:expr, $dims:expr) => {{
        let n = $values.len();
        match $dims.len() {
            1 => $var.put_values($values, 0..n),
            2 => $var.put_values($values, (0..1, 0..1)),
            3 => $var.put_values($values, (0..n, 0..1, 0..1)),
            4 => $var.put_values($values, (0..n, 0..1, 0..1, 0..1)),
            rank => {
                return Err(FluxError::Encoding(format!(
                    "unsupported rank {} for '{}'",
                    rank,
                    $var.name()
                )));
            }
        }
    }};
}

fn put_attributes(var: &mut VariableMut<'_>, variable: &SchemaVariable) -> Result<()> {
    for (name, value) in &variable.attributes {
        let context = format!("attribute '{}' of '{}'", name, variable.name);
        match value {
            AttributeValue::Number(n) => var.put_attribute(name, *n).map_err(encoding(context))?,
            AttributeValue::Text(s) => var.put_attribute(name, s.as_str()).map_err(encoding(context))?,
        };
    }
    Ok(())
}

fn write_variable(file: &mut FileMut, variable: &SchemaVariable, data: &VariableData) -> Result<()> {
    let dims: Vec<&str> = variable.shape.iter().map(String::as_str).collect();
    let context = format!("variable '{}'", variable.name);

    match data {
        VariableData::Float64(values) => {
            let mut var = file
                .add_variable::<f64>(&variable.name, &dims)
                .map_err(encoding(&context))?;
            put_attributes(&mut var, variable)?;
            let written = put_series!(var, values.as_slice(), dims);
            written.map_err(encoding(&context))?;
        }
        VariableData::Int32(values) => {
            let mut var = file
                .add_variable::<i32>(&variable.name, &dims)
                .map_err(encoding(&context))?;
            put_attributes(&mut var, variable)?;
            let written = put_series!(var, values.as_slice(), dims);
            written.map_err(encoding(&context))?;
        }
        VariableData::Text(value) => {
            let mut var = file
                .add_string_variable(&variable.name, &dims)
                .map_err(encoding(&context))?;
            put_attributes(&mut var, variable)?;
            var.put_string(value, (0, 0)).map_err(encoding(&context))?;
        }
    }
    Ok(())
}

impl FileEmitter for NetcdfEmitter {
    fn extension(&self) -> &'static str {
        "nc"
    }

    fn emit(&self, dataset: &ConvertedDataset, path: &Path) -> Result<()> {
        dataset.validate()?;
        write_atomic(path, self.extension(), |staged| {
            let mut file = ::netcdf::create(staged.path()).map_err(encoding("create"))?;

            for dim in &dataset.schema.dimensions {
                let added = match dim.len {
                    Some(len) => file.add_dimension(&dim.name, len),
                    None => file.add_unlimited_dimension(&dim.name),
                };
                added.map_err(encoding(format!("dimension '{}'", dim.name)))?;
            }

            for variable in &dataset.schema.variables {
                let data = dataset.values(&variable.name).ok_or_else(|| {
                    FluxError::Encoding(format!("variable '{}' has no data", variable.name))
                })?;
                write_variable(&mut file, variable, data)?;
            }

            for (name, value) in &dataset.schema.global_attributes {
                file.add_attribute(name, value.as_str())
                    .map_err(encoding(format!("global attribute '{}'", name)))?;
            }
            // `file` is closed on return, before the rename
            Ok(())
        })
    }
}

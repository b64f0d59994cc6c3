//! Matching catalog entries against the columns of one input file.

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use crate::catalog::{SourceType, VariableCatalog, VariableSpec};
use crate::error::{FluxError, Result};
use crate::input::DataTable;
use crate::timegrid::TimeColumns;

/// Settings the resolver needs from the run configuration.
#[derive(Debug, Clone)]
pub struct ResolverConfig<'a> {
    pub time_columns: &'a TimeColumns,
    /// Suffix naming a column's per-sample QC flags (`TA_F` → `TA_F_QC`).
    pub qc_suffix: &'a str,
    /// Sentinel for missing cells.
    pub missing_value: f64,
}

/// A catalog entry bound to its data in the current file.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedColumn {
    pub spec: VariableSpec,
    /// Position of the source column in the file header.
    pub column_index: usize,
    /// Index (within the resolved list) of the column this one copies.
    pub duplicate_of: Option<usize>,
    /// Sample values; `NaN` where missing.
    #[serde(skip)]
    pub values: Vec<f64>,
    /// Per-sample QC flags, when the file carries a flag column.
    #[serde(skip)]
    pub qc_flags: Option<Vec<Option<i64>>>,
    /// Reanalysis counterpart values, when present in the file.
    #[serde(skip)]
    pub reanalysis: Option<Vec<f64>>,
    /// Samples replaced from the reanalysis counterpart.
    #[serde(skip)]
    pub reanalysis_filled: Option<Vec<bool>>,
}

impl ResolvedColumn {
    pub fn output_name(&self) -> &str {
        &self.spec.output_name
    }

    pub fn is_duplicate(&self) -> bool {
        self.duplicate_of.is_some()
    }

    /// Fill missing samples from the reanalysis counterpart.
    ///
    /// Returns the number of samples filled. Columns without a counterpart
    /// are left untouched.
    pub fn apply_reanalysis_fill(&mut self) -> usize {
        let Some(reanalysis) = self.reanalysis.as_ref() else {
            return 0;
        };

        let mut mask = vec![false; self.values.len()];
        let mut filled = 0;
        for ((value, &candidate), flag) in
            self.values.iter_mut().zip(reanalysis.iter()).zip(mask.iter_mut())
        {
            if value.is_nan() && !candidate.is_nan() {
                *value = candidate;
                *flag = true;
                filled += 1;
            }
        }

        if filled > 0 {
            self.reanalysis_filled = Some(mask);
        }
        filled
    }

    /// Whether sample `i` was filled from reanalysis.
    pub fn is_reanalysis_filled(&self, i: usize) -> bool {
        self.reanalysis_filled
            .as_ref()
            .and_then(|mask| mask.get(i).copied())
            .unwrap_or(false)
    }

    /// Mark samples missing wherever `input` is missing.
    ///
    /// Returns the number of present samples that became missing.
    pub fn mask_missing_inputs(&mut self, input: &[f64]) -> usize {
        let mut masked = 0;
        for (value, companion) in self.values.iter_mut().zip(input) {
            if !value.is_nan() && companion.is_nan() {
                *value = f64::NAN;
                masked += 1;
            }
        }
        masked
    }
}

/// Blank samples of derived variables whose inputs are missing.
///
/// Specific humidity can't be computed without air temperature; missing
/// pressure falls back to the standard atmosphere and never blanks a
/// sample. Run after reanalysis filling so filled temperatures count.
/// Returns the variables that lost samples, with the count.
pub fn mask_derived_gaps(columns: &mut [ResolvedColumn]) -> Vec<(String, usize)> {
    let Some(air_temp) = columns
        .iter()
        .find(|c| c.spec.standard_name == "air_temperature")
        .map(|c| c.values.clone())
    else {
        return Vec::new();
    };

    columns
        .iter_mut()
        .filter(|c| c.spec.unit_rule.needs_companions())
        .filter_map(|c| {
            let masked = c.mask_missing_inputs(&air_temp);
            (masked > 0).then(|| (c.output_name().to_string(), masked))
        })
        .collect()
}

/// Result of resolving one file against the catalog.
#[derive(Debug, Clone)]
pub struct ResolvedTable {
    /// Header position of the start timestamp column.
    pub time_start: usize,
    /// Header position of the end timestamp column.
    pub time_end: usize,
    /// Data columns in catalog order.
    pub columns: Vec<ResolvedColumn>,
    /// Header columns nobody asked for.
    pub ignored: Vec<String>,
}

impl ResolvedTable {
    pub fn column(&self, output_name: &str) -> Option<&ResolvedColumn> {
        self.columns.iter().find(|c| c.spec.output_name == output_name)
    }
}

/// Binds catalog entries to the columns present in a file.
pub struct ColumnResolver<'a> {
    catalog: &'a VariableCatalog,
    config: ResolverConfig<'a>,
}

impl<'a> ColumnResolver<'a> {
    pub fn new(catalog: &'a VariableCatalog, config: ResolverConfig<'a>) -> Self {
        Self { catalog, config }
    }

    /// Resolve the catalog against a parsed table.
    ///
    /// Output is in catalog order. Fails with [`FluxError::SchemaMismatch`]
    /// when a time column or an essential variable is absent, when a
    /// catalog column is repeated in the header, or when a column's cells
    /// don't match its declared type.
    pub fn resolve(&self, table: &DataTable) -> Result<ResolvedTable> {
        let time_start = self.time_column(table, &self.config.time_columns.start)?;
        let time_end = self.time_column(table, &self.config.time_columns.end)?;

        let missing: Vec<String> = self
            .catalog
            .essentials()
            .filter(|spec| table.column_index(&spec.source_name).is_none())
            .map(|spec| format!("{} (column '{}')", spec.output_name, spec.source_name))
            .collect();
        if !missing.is_empty() {
            return Err(FluxError::SchemaMismatch(format!(
                "essential variable(s) missing: {}",
                missing.join(", ")
            )));
        }

        let mut columns: Vec<ResolvedColumn> = Vec::new();
        let mut primaries: HashMap<&str, usize> = HashMap::new();

        for spec in self.catalog.iter() {
            let Some(column_index) = table.column_index(&spec.source_name) else {
                debug!(variable = %spec.output_name, source = %spec.source_name, "not in file");
                continue;
            };

            if let Some(&primary) = primaries.get(spec.source_name.as_str()) {
                let source = &columns[primary];
                debug!(
                    variable = %spec.output_name,
                    duplicate_of = %source.spec.output_name,
                    "duplicating source column"
                );
                let duplicate = ResolvedColumn {
                    spec: spec.clone(),
                    column_index,
                    duplicate_of: Some(primary),
                    values: source.values.clone(),
                    qc_flags: source.qc_flags.clone(),
                    reanalysis: self.reanalysis_values(table, spec)?,
                    reanalysis_filled: None,
                };
                columns.push(duplicate);
                continue;
            }

            let values = self.read_values(table, spec, column_index)?;
            let qc_flags = self.read_flags(table, spec)?;
            let reanalysis = self.reanalysis_values(table, spec)?;

            primaries.insert(spec.source_name.as_str(), columns.len());
            columns.push(ResolvedColumn {
                spec: spec.clone(),
                column_index,
                duplicate_of: None,
                values,
                qc_flags,
                reanalysis,
                reanalysis_filled: None,
            });
        }

        // Residual data columns in the header, counted with repeats, plus
        // duplicates must give exactly the resolved count.
        let residual: usize = primaries.keys().map(|name| table.occurrences(name)).sum();
        let duplicates = columns.iter().filter(|c| c.is_duplicate()).count();
        if residual + duplicates != columns.len() {
            let repeated: Vec<String> = primaries
                .keys()
                .filter(|name| table.occurrences(name) > 1)
                .map(|name| format!("'{}' x{}", name, table.occurrences(name)))
                .collect();
            return Err(FluxError::SchemaMismatch(format!(
                "expected {} data columns after duplication, file has {} ({})",
                columns.len(),
                residual + duplicates,
                repeated.join(", ")
            )));
        }

        let ignored: Vec<String> = table
            .headers
            .iter()
            .filter(|h| !self.is_recognised(h))
            .cloned()
            .collect();
        if !ignored.is_empty() {
            debug!(count = ignored.len(), columns = ?ignored, "ignoring unknown columns");
        }

        Ok(ResolvedTable {
            time_start,
            time_end,
            columns,
            ignored,
        })
    }

    fn time_column(&self, table: &DataTable, name: &str) -> Result<usize> {
        match table.occurrences(name) {
            1 => table
                .column_index(name)
                .ok_or_else(|| FluxError::SchemaMismatch(format!("time column '{}' not found", name))),
            0 => Err(FluxError::SchemaMismatch(format!(
                "time column '{}' not found",
                name
            ))),
            n => Err(FluxError::SchemaMismatch(format!(
                "time column '{}' appears {} times",
                name, n
            ))),
        }
    }

    fn read_values(
        &self,
        table: &DataTable,
        spec: &VariableSpec,
        index: usize,
    ) -> Result<Vec<f64>> {
        let values = table
            .numeric_column(index, self.config.missing_value)
            .map_err(|e| declared_type_error(spec, e))?;

        if spec.source_type == SourceType::Integer {
            if let Some(row) = values.iter().position(|v| !v.is_nan() && v.fract() != 0.0) {
                return Err(FluxError::SchemaMismatch(format!(
                    "column '{}' is declared integer but row {} holds {}",
                    spec.source_name,
                    row + 1,
                    values[row]
                )));
            }
        }
        Ok(values)
    }

    fn read_flags(&self, table: &DataTable, spec: &VariableSpec) -> Result<Option<Vec<Option<i64>>>> {
        let name = self.qc_name(&spec.source_name);
        match table.column_index(&name) {
            Some(index) => table
                .flag_column(index, self.config.missing_value)
                .map(Some)
                .map_err(|e| declared_type_error(spec, e)),
            None => Ok(None),
        }
    }

    fn reanalysis_values(&self, table: &DataTable, spec: &VariableSpec) -> Result<Option<Vec<f64>>> {
        let Some(name) = spec.reanalysis_name.as_deref() else {
            return Ok(None);
        };
        match table.column_index(name) {
            Some(index) => table
                .numeric_column(index, self.config.missing_value)
                .map(Some)
                .map_err(|e| declared_type_error(spec, e)),
            None => Ok(None),
        }
    }

    fn qc_name(&self, source_name: &str) -> String {
        format!("{}{}", source_name, self.config.qc_suffix)
    }

    fn is_recognised(&self, header: &str) -> bool {
        if self.config.time_columns.contains(header) || self.catalog.knows_column(header) {
            return true;
        }
        header
            .strip_suffix(self.config.qc_suffix)
            .is_some_and(|source| self.catalog.by_source(source).next().is_some())
    }
}

fn declared_type_error(spec: &VariableSpec, err: FluxError) -> FluxError {
    match err {
        FluxError::Parse { row, message, .. } => FluxError::SchemaMismatch(format!(
            "variable '{}' expects {:?} data: {} (row {})",
            spec.output_name, spec.source_type, message, row
        )),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = "source_name,source_type,output_name,standard_name,long_name,category,unit_source,unit_target,valid_min,valid_max,essential,preferred,reanalysis_name
TA_F,numeric,Tair,air_temperature,Air temperature,met,degC,K,200,333,true,false,TA_ERA
RH,numeric,RH,relative_humidity,Relative humidity,met,%,%,0,100,false,false,
RH,numeric,Qair,specific_humidity,Specific humidity,met,%,kg/kg,0,0.1,false,false,
NEE,integer,NEE,,Net ecosystem exchange,eval,umol/m2/s,umol/m2/s,-100,100,false,true,
";

    fn table(headers: &[&str], rows: &[&[&str]]) -> DataTable {
        DataTable::new(
            headers.iter().map(|s| s.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        )
    }

    fn resolve(t: &DataTable) -> Result<ResolvedTable> {
        let catalog = VariableCatalog::from_csv_str(CATALOG).unwrap();
        let time = TimeColumns::default();
        let resolver = ColumnResolver::new(
            &catalog,
            ResolverConfig {
                time_columns: &time,
                qc_suffix: "_QC",
                missing_value: -9999.0,
            },
        );
        resolver.resolve(t)
    }

    #[test]
    fn test_catalog_order_and_duplicates() {
        let t = table(
            &["TIMESTAMP_START", "RH", "TIMESTAMP_END", "TA_F", "TA_F_QC", "EXTRA"],
            &[&["200101010000", "55", "200101010030", "1.5", "0", "x"]],
        );
        let resolved = resolve(&t).unwrap();

        let names: Vec<&str> = resolved.columns.iter().map(|c| c.output_name()).collect();
        assert_eq!(names, vec!["Tair", "RH", "Qair"]);
        assert_eq!(resolved.time_start, 0);
        assert_eq!(resolved.time_end, 2);

        let qair = resolved.column("Qair").unwrap();
        assert_eq!(qair.duplicate_of, Some(1));
        assert_eq!(qair.column_index, 1);
        assert_eq!(qair.values, vec![55.0]);
        assert!(resolved.column("RH").unwrap().duplicate_of.is_none());

        assert_eq!(resolved.column("Tair").unwrap().qc_flags, Some(vec![Some(0)]));
        assert_eq!(resolved.ignored, vec!["EXTRA".to_string()]);
    }

    #[test]
    fn test_duplicates_own_their_values() {
        let t = table(
            &["TIMESTAMP_START", "TIMESTAMP_END", "TA_F", "RH"],
            &[&["200101010000", "200101010030", "1", "-9999"]],
        );
        let mut resolved = resolve(&t).unwrap();
        resolved.columns[1].values[0] = 42.0;
        assert!(resolved.columns[2].values[0].is_nan());
    }

    #[test]
    fn test_humidity_gaps_follow_air_temperature() {
        let t = table(
            &["TIMESTAMP_START", "TIMESTAMP_END", "TA_F", "RH"],
            &[
                &["200101010000", "200101010030", "-9999", "50"],
                &["200101010030", "200101010100", "12", "50"],
            ],
        );
        let mut resolved = resolve(&t).unwrap();

        let masked = mask_derived_gaps(&mut resolved.columns);
        assert_eq!(masked, vec![("Qair".to_string(), 1)]);

        let qair = resolved.column("Qair").unwrap();
        assert!(qair.values[0].is_nan());
        assert_eq!(qair.values[1], 50.0);
        // relative humidity itself is untouched
        assert_eq!(resolved.column("RH").unwrap().values, vec![50.0, 50.0]);
    }

    #[test]
    fn test_missing_essential_is_schema_mismatch() {
        let t = table(
            &["TIMESTAMP_START", "TIMESTAMP_END", "RH"],
            &[&["200101010000", "200101010030", "50"]],
        );
        let err = resolve(&t).unwrap_err();
        assert!(matches!(err, FluxError::SchemaMismatch(ref m) if m.contains("Tair")));
    }

    #[test]
    fn test_missing_time_column() {
        let t = table(&["TIMESTAMP_START", "TA_F"], &[&["200101010000", "1"]]);
        let err = resolve(&t).unwrap_err();
        assert!(err.to_string().contains("TIMESTAMP_END"));
    }

    #[test]
    fn test_repeated_header_is_schema_mismatch() {
        let t = table(
            &["TIMESTAMP_START", "TIMESTAMP_END", "TA_F", "TA_F"],
            &[&["200101010000", "200101010030", "1", "2"]],
        );
        let err = resolve(&t).unwrap_err();
        assert!(matches!(err, FluxError::SchemaMismatch(ref m) if m.contains("'TA_F' x2")));
    }

    #[test]
    fn test_declared_type_checked() {
        let t = table(
            &["TIMESTAMP_START", "TIMESTAMP_END", "TA_F", "NEE"],
            &[&["200101010000", "200101010030", "1", "2.5"]],
        );
        let err = resolve(&t).unwrap_err();
        assert!(matches!(err, FluxError::SchemaMismatch(ref m) if m.contains("integer")));

        let t = table(
            &["TIMESTAMP_START", "TIMESTAMP_END", "TA_F"],
            &[&["200101010000", "200101010030", "warm"]],
        );
        assert!(matches!(resolve(&t), Err(FluxError::SchemaMismatch(_))));
    }

    #[test]
    fn test_reanalysis_fill() {
        let t = table(
            &["TIMESTAMP_START", "TIMESTAMP_END", "TA_F", "TA_ERA"],
            &[
                &["200101010000", "200101010030", "-9999", "3.5"],
                &["200101010030", "200101010100", "2.0", "9.9"],
                &["200101010100", "200101010130", "-9999", "-9999"],
            ],
        );
        let mut resolved = resolve(&t).unwrap();
        let tair = &mut resolved.columns[0];
        assert_eq!(tair.apply_reanalysis_fill(), 1);
        assert_eq!(tair.values[0], 3.5);
        assert_eq!(tair.values[1], 2.0);
        assert!(tair.values[2].is_nan());
        assert!(tair.is_reanalysis_filled(0));
        assert!(!tair.is_reanalysis_filled(1));
        assert!(resolved.ignored.is_empty());
    }
}

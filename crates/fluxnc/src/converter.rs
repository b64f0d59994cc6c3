//! Main Converter struct and public API.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::catalog::VariableCatalog;
use crate::emit::FileEmitter;
use crate::error::{FluxError, Result};
use crate::input::{DataTable, Parser, ParserConfig, SourceMetadata};
use crate::output::{ConvertedDataset, SchemaBuilder};
use crate::quality::{
    Disposition, Evidence, Observation, ObservationType, QualityAssessor, QualityReport, Severity,
    ThresholdConfig,
};
use crate::resolve::{ColumnResolver, ResolvedColumn, ResolverConfig, mask_derived_gaps};
use crate::site::SiteMetadata;
use crate::timegrid::{TimeColumns, TimeGrid, read_timestamps};

/// Run-time settings for a conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// CSV reader settings.
    #[serde(skip)]
    pub parser: ParserConfig,
    pub thresholds: ThresholdConfig,
    /// Keep evaluation variables that fail QC, flagged.
    pub include_all_eval: bool,
    /// Fill missing samples from reanalysis companion columns.
    pub reanalysis_gapfill: bool,
    /// Sentinel marking missing cells in the input.
    pub missing_value: f64,
    pub time_columns: TimeColumns,
    /// Suffix of per-sample QC flag columns.
    pub qc_suffix: String,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            parser: ParserConfig::default(),
            thresholds: ThresholdConfig::default(),
            include_all_eval: false,
            reanalysis_gapfill: false,
            missing_value: -9999.0,
            time_columns: TimeColumns::default(),
            qc_suffix: "_QC".to_string(),
        }
    }
}

impl ConverterConfig {
    pub fn validate(&self) -> Result<()> {
        self.thresholds.validate()?;
        if self.qc_suffix.is_empty() {
            return Err(FluxError::Config("qc_suffix must not be empty".to_string()));
        }
        if !self.missing_value.is_finite() {
            return Err(FluxError::Config(format!(
                "missing_value must be finite, got {}",
                self.missing_value
            )));
        }
        if self.time_columns.start == self.time_columns.end {
            return Err(FluxError::Config(format!(
                "start and end time columns are both '{}'",
                self.time_columns.start
            )));
        }
        Ok(())
    }
}

/// Everything produced by converting one table, before it is written.
#[derive(Debug, Clone)]
pub struct Conversion {
    pub source: SourceMetadata,
    pub grid: TimeGrid,
    pub dataset: ConvertedDataset,
    /// QC report of every resolved variable, emitted or not.
    pub reports: Vec<QualityReport>,
    /// Outcome per resolved variable, in catalog order.
    pub dispositions: IndexMap<String, Disposition>,
    /// Warning trail.
    pub observations: Vec<Observation>,
    /// Header columns the catalog doesn't describe.
    pub ignored_columns: Vec<String>,
}

/// QC outcome of a table without building any output.
#[derive(Debug, Clone, Serialize)]
pub struct QualityCheck {
    pub source: SourceMetadata,
    pub step_seconds: u32,
    pub step_count: usize,
    pub whole_years: Vec<i32>,
    pub reports: Vec<QualityReport>,
    /// Outcome per variable; empty when the file would be rejected.
    pub dispositions: IndexMap<String, Disposition>,
    /// Why conversion would abort, if it would.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    pub observations: Vec<Observation>,
}

/// Summary of a completed file conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionSummary {
    pub input_file: PathBuf,
    pub output_file: PathBuf,
    pub input_hash: String,
    pub site_code: String,
    pub step_seconds: u32,
    pub step_count: usize,
    pub whole_years: Vec<i32>,
    pub retained: Vec<String>,
    pub flagged: Vec<String>,
    pub dropped: Vec<String>,
    /// Outcome per resolved variable, with reasons.
    pub dispositions: IndexMap<String, Disposition>,
    pub warnings: usize,
    pub observations_by_type: HashMap<String, usize>,
    pub reports: Vec<QualityReport>,
}

impl ConversionSummary {
    fn new(conversion: &Conversion, site: &SiteMetadata, input: &Path, output: &Path) -> Self {
        let mut retained = Vec::new();
        let mut flagged = Vec::new();
        let mut dropped = Vec::new();
        for (name, disposition) in &conversion.dispositions {
            match disposition {
                Disposition::Retain => retained.push(name.clone()),
                Disposition::Flagged(_) => flagged.push(name.clone()),
                Disposition::Dropped(_) => dropped.push(name.clone()),
            }
        }

        let mut observations_by_type: HashMap<String, usize> = HashMap::new();
        for obs in &conversion.observations {
            *observations_by_type
                .entry(format!("{:?}", obs.observation_type).to_lowercase())
                .or_insert(0) += 1;
        }

        Self {
            input_file: input.to_path_buf(),
            output_file: output.to_path_buf(),
            input_hash: conversion.source.hash.clone(),
            site_code: site.site_code.clone(),
            step_seconds: conversion.grid.step_seconds,
            step_count: conversion.grid.step_count,
            whole_years: conversion.grid.whole_years.iter().copied().collect(),
            retained,
            flagged,
            dropped,
            dispositions: conversion.dispositions.clone(),
            warnings: conversion
                .observations
                .iter()
                .filter(|o| o.severity == Severity::Warning)
                .count(),
            observations_by_type,
            reports: conversion.reports.clone(),
        }
    }
}

/// Resolved columns on their time grid, ready for assessment.
struct Prepared {
    columns: Vec<ResolvedColumn>,
    grid: TimeGrid,
    ignored: Vec<String>,
    observations: Vec<Observation>,
}

/// The conversion engine.
///
/// Holds only immutable state and can be shared across threads.
pub struct Converter {
    catalog: Arc<VariableCatalog>,
    config: ConverterConfig,
    parser: Parser,
}

impl Converter {
    /// Create a converter for a catalog with default settings.
    pub fn new(catalog: impl Into<Arc<VariableCatalog>>) -> Self {
        Self {
            catalog: catalog.into(),
            config: ConverterConfig::default(),
            parser: Parser::new(),
        }
    }

    /// Replace the run-time settings.
    pub fn with_config(mut self, config: ConverterConfig) -> Self {
        self.parser = Parser::with_config(config.parser.clone());
        self.config = config;
        self
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    pub fn catalog(&self) -> &VariableCatalog {
        &self.catalog
    }

    /// Read an input spreadsheet.
    pub fn parse(&self, path: impl AsRef<Path>) -> Result<(DataTable, SourceMetadata)> {
        self.parser.parse_file(path)
    }

    /// Convert a parsed table. Performs no I/O.
    pub fn convert_table(
        &self,
        table: &DataTable,
        source: &SourceMetadata,
        site: &SiteMetadata,
    ) -> Result<Conversion> {
        site.validate()?;
        let Prepared {
            columns,
            grid,
            ignored,
            mut observations,
        } = self.prepare(table, source)?;

        let assessment = QualityAssessor::new(&self.config.thresholds)
            .include_all_eval(self.config.include_all_eval)
            .assess(&columns, &grid)?;
        observations.extend(assessment.observations.iter().cloned());

        let built = SchemaBuilder::new(&grid, site, source, &self.config.thresholds)
            .reanalysis_gapfill(self.config.reanalysis_gapfill)
            .build(&columns, &assessment)?;
        observations.extend(built.observations);

        let dispositions: IndexMap<String, Disposition> = columns
            .iter()
            .zip(&assessment.columns)
            .map(|(c, a)| (c.output_name().to_string(), a.disposition.clone()))
            .collect();

        info!(
            file = %source.file,
            variables = built.dataset.schema.variables.len(),
            warnings = observations.len(),
            "conversion assembled"
        );

        Ok(Conversion {
            source: source.clone(),
            grid,
            dataset: built.dataset,
            reports: assessment.reports().cloned().collect(),
            dispositions,
            observations,
            ignored_columns: ignored,
        })
    }

    /// Convert a file and write the result with `emitter`.
    ///
    /// Nothing is written unless the whole conversion succeeds.
    pub fn convert_file(
        &self,
        input: impl AsRef<Path>,
        site: &SiteMetadata,
        emitter: &dyn FileEmitter,
        output: impl AsRef<Path>,
    ) -> Result<ConversionSummary> {
        let input = input.as_ref();
        let output = output.as_ref();

        let (table, source) = self.parse(input)?;
        let conversion = self.convert_table(&table, &source, site)?;
        emitter.emit(&conversion.dataset, output)?;

        Ok(ConversionSummary::new(&conversion, site, input, output))
    }

    /// Run resolution, timing and QC without building output.
    ///
    /// Structural and timing problems are still errors; threshold aborts
    /// are reported in [`QualityCheck::failure`].
    pub fn check_table(&self, table: &DataTable, source: &SourceMetadata) -> Result<QualityCheck> {
        let Prepared {
            columns,
            grid,
            mut observations,
            ..
        } = self.prepare(table, source)?;

        let assessor = QualityAssessor::new(&self.config.thresholds)
            .include_all_eval(self.config.include_all_eval);
        let reports: Vec<QualityReport> = columns.iter().map(|c| assessor.report(c, &grid).0).collect();

        let (dispositions, failure) = match assessor.assess(&columns, &grid) {
            Ok(assessment) => {
                observations.extend(assessment.observations.iter().cloned());
                let dispositions = columns
                    .iter()
                    .zip(&assessment.columns)
                    .map(|(c, a)| (c.output_name().to_string(), a.disposition.clone()))
                    .collect();
                (dispositions, None)
            }
            Err(e @ FluxError::ThresholdFailure { .. }) => (IndexMap::new(), Some(e.to_string())),
            Err(e) => return Err(e),
        };

        Ok(QualityCheck {
            source: source.clone(),
            step_seconds: grid.step_seconds,
            step_count: grid.step_count,
            whole_years: grid.whole_years.iter().copied().collect(),
            reports,
            dispositions,
            failure,
            observations,
        })
    }

    pub fn check_file(&self, input: impl AsRef<Path>) -> Result<QualityCheck> {
        let (table, source) = self.parse(input)?;
        self.check_table(&table, &source)
    }

    fn prepare(&self, table: &DataTable, source: &SourceMetadata) -> Result<Prepared> {
        self.config.validate()?;
        if table.row_count() == 0 {
            return Err(FluxError::EmptyData(format!("'{}' has no data rows", source.file)));
        }

        let resolver = ColumnResolver::new(
            &self.catalog,
            ResolverConfig {
                time_columns: &self.config.time_columns,
                qc_suffix: &self.config.qc_suffix,
                missing_value: self.config.missing_value,
            },
        );
        let resolved = resolver.resolve(table)?;

        let starts = read_timestamps(table, resolved.time_start)?;
        let ends = read_timestamps(table, resolved.time_end)?;
        let grid = TimeGrid::derive(&starts, &ends)?;
        info!(
            file = %source.file,
            step_seconds = grid.step_seconds,
            steps = grid.step_count,
            whole_years = grid.whole_years.len(),
            "time grid derived"
        );

        let mut observations: Vec<Observation> = resolved
            .ignored
            .iter()
            .map(|name| {
                Observation::new(
                    ObservationType::IgnoredColumn,
                    Severity::Info,
                    name,
                    "column not described by the catalog",
                )
                .with_detector("column_resolver")
            })
            .collect();

        let mut columns = resolved.columns;
        if self.config.reanalysis_gapfill {
            for column in &mut columns {
                let filled = column.apply_reanalysis_fill();
                if filled == 0 {
                    continue;
                }
                let pct = filled as f64 * 100.0 / grid.step_count as f64;
                observations.push(
                    Observation::new(
                        ObservationType::ReanalysisFilled,
                        Severity::Info,
                        column.output_name(),
                        format!("{} missing samples filled from reanalysis", filled),
                    )
                    .with_evidence(Evidence::new().with_occurrences(filled).with_percentage(pct))
                    .with_detector("reanalysis_gapfill"),
                );
            }
        } else if columns.iter().any(|c| c.reanalysis.is_some()) {
            warn!(file = %source.file, "reanalysis columns present but gap-filling is disabled");
        }

        for (variable, masked) in mask_derived_gaps(&mut columns) {
            let pct = masked as f64 * 100.0 / grid.step_count as f64;
            observations.push(
                Observation::new(
                    ObservationType::MissingInput,
                    Severity::Warning,
                    variable,
                    format!("{} samples missing where air temperature is missing", masked),
                )
                .with_evidence(Evidence::new().with_occurrences(masked).with_percentage(pct))
                .with_detector("column_resolver"),
            );
        }

        for obs in &observations {
            obs.log();
        }

        Ok(Prepared {
            columns,
            grid,
            ignored: resolved.ignored,
            observations,
        })
    }
}

/// Default output path: the input path with the emitter's extension.
pub fn default_output_path(input: &Path, emitter: &dyn FileEmitter) -> PathBuf {
    input.with_extension(emitter.extension())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::JsonEmitter;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const CATALOG: &str = "source_name,source_type,output_name,standard_name,long_name,category,unit_source,unit_target,valid_min,valid_max,essential,preferred,reanalysis_name
TA,numeric,Tair,air_temperature,Air temperature,met,degC,K,200,333,true,false,TA_ERA
H,numeric,Qh,surface_upward_sensible_heat_flux,Sensible heat flux,eval,W/m2,W/m2,-500,1000,false,true,
";

    fn csv(rows: usize, tair: impl Fn(usize) -> &'static str) -> String {
        let mut out = String::from("TIMESTAMP_START,TIMESTAMP_END,TA,TA_ERA,H,NOTE\n");
        let start = chrono::NaiveDate::from_ymd_opt(2001, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        for i in 0..rows {
            let s = start + chrono::Duration::minutes(30 * i as i64);
            let e = s + chrono::Duration::minutes(30);
            out.push_str(&format!(
                "{},{},{},1.0,50,x\n",
                s.format("%Y%m%d%H%M"),
                e.format("%Y%m%d%H%M"),
                tair(i)
            ));
        }
        out
    }

    fn converter(config: ConverterConfig) -> Converter {
        Converter::new(VariableCatalog::from_csv_str(CATALOG).unwrap()).with_config(config)
    }

    fn one_day_config() -> ConverterConfig {
        ConverterConfig {
            thresholds: ThresholdConfig::new(20.0).with_min_whole_years(0),
            ..ConverterConfig::default()
        }
    }

    fn site() -> SiteMetadata {
        SiteMetadata::new("XX-Tst", "Test", 45.0, 7.0)
    }

    #[test]
    fn test_convert_table() {
        let text = csv(48, |_| "10.0");
        let table = Parser::new().parse_bytes(text.as_bytes()).unwrap();
        let source = SourceMetadata::in_memory("x.csv", &table);

        let conversion = converter(one_day_config()).convert_table(&table, &source, &site()).unwrap();
        assert_eq!(conversion.grid.step_seconds, 1800);
        assert_eq!(conversion.ignored_columns, vec!["NOTE".to_string()]);
        assert_eq!(conversion.dispositions["Tair"], Disposition::Retain);
        let tair = conversion.dataset.values("Tair").unwrap().as_f64().unwrap();
        assert!((tair[0] - 283.15).abs() < 1e-9);
    }

    #[test]
    fn test_reanalysis_gapfill_toggle() {
        let text = csv(48, |i| if i < 9 { "-9999" } else { "10.0" });
        let table = Parser::new().parse_bytes(text.as_bytes()).unwrap();
        let source = SourceMetadata::in_memory("x.csv", &table);

        let off = converter(one_day_config()).convert_table(&table, &source, &site()).unwrap();
        assert!(off.dataset.schema.variable("Tair_qc").is_none());
        assert!((off.reports[0].missing_pct - 18.75).abs() < 1e-9);

        let config = ConverterConfig {
            reanalysis_gapfill: true,
            ..one_day_config()
        };
        let on = converter(config).convert_table(&table, &source, &site()).unwrap();
        assert_eq!(on.reports[0].missing_pct, 0.0);
        assert!(on.dataset.schema.variable("Tair_qc").is_some());
        assert_eq!(on.dataset.schema.global_attributes["Reanalysis_gapfilling"], "enabled");
        assert!(on
            .observations
            .iter()
            .any(|o| o.observation_type == ObservationType::ReanalysisFilled));
    }

    #[test]
    fn test_check_reports_threshold_abort() {
        let text = csv(48, |i| if i < 30 { "-9999" } else { "10.0" });
        let table = Parser::new().parse_bytes(text.as_bytes()).unwrap();
        let source = SourceMetadata::in_memory("x.csv", &table);
        let conv = converter(one_day_config());

        let check = conv.check_table(&table, &source).unwrap();
        assert!(check.failure.as_deref().is_some_and(|f| f.contains("Tair")));
        assert!(check.dispositions.is_empty());
        assert_eq!(check.reports.len(), 2);

        let err = conv.convert_table(&table, &source, &site()).unwrap_err();
        assert!(matches!(err, FluxError::ThresholdFailure { .. }));
    }

    #[test]
    fn test_convert_file_summary() {
        let mut input = NamedTempFile::new().unwrap();
        input.write_all(csv(48, |_| "10.0").as_bytes()).unwrap();
        let dir = tempfile::TempDir::new().unwrap();
        let output = dir.path().join("out.json");

        let summary = converter(one_day_config())
            .convert_file(input.path(), &site(), &JsonEmitter::new(), &output)
            .unwrap();
        assert!(output.exists());
        assert_eq!(summary.retained, vec!["Tair".to_string(), "Qh".to_string()]);
        assert!(summary.input_hash.starts_with("sha256:"));
        assert_eq!(summary.observations_by_type.get("ignoredcolumn"), Some(&1));
    }

    #[test]
    fn test_empty_table() {
        let table = DataTable::new(
            vec!["TIMESTAMP_START".into(), "TIMESTAMP_END".into(), "TA".into()],
            Vec::new(),
        );
        let source = SourceMetadata::in_memory("empty.csv", &table);
        let err = converter(one_day_config()).convert_table(&table, &source, &site()).unwrap_err();
        assert!(matches!(err, FluxError::EmptyData(_)));
    }

    #[test]
    fn test_converter_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Converter>();
    }

    #[test]
    fn test_default_output_path() {
        let p = default_output_path(Path::new("/data/site.csv"), &JsonEmitter::new());
        assert_eq!(p, PathBuf::from("/data/site.json"));
    }
}

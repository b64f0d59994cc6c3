//! Assembly of the output schema and data arrays.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tracing::debug;

use super::schema::{
    ConvertedDataset, Dimension, OutputSchema, SchemaVariable, ValueKind, VariableData,
};
use crate::catalog::{STANDARD_PRESSURE_PA, specific_humidity, to_celsius, to_pascal};
use crate::error::{FluxError, Result};
use crate::input::SourceMetadata;
use crate::quality::{
    Assessment, ColumnAssessment, Disposition, Evidence, Observation, ObservationType, QcTier,
    Severity, ThresholdConfig,
};
use crate::resolve::ResolvedColumn;
use crate::site::SiteMetadata;
use crate::timegrid::TimeGrid;

/// Written in place of missing samples.
pub const FILL_VALUE: f64 = -9999.0;

const QC_FILL_VALUE: i32 = -9999;

/// Metadata convention the attributes follow.
pub const CONVENTIONS: &str = "CF-1.6";

const MET_SHAPE: &[&str] = &["time", "z", "y", "x"];
const EVAL_SHAPE: &[&str] = &["time", "y", "x"];
const SCALAR_SHAPE: &[&str] = &["y", "x"];

/// Row indices quoted in out-of-range observations.
const SAMPLE_ROWS: usize = 5;

/// Provenance stamped on the output.
#[derive(Debug, Clone, PartialEq)]
pub struct RunInfo {
    pub production_time: DateTime<Utc>,
    pub production_source: String,
}

impl RunInfo {
    pub fn now() -> Self {
        Self {
            production_time: Utc::now(),
            production_source: format!("fluxnc {}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Schema plus the warnings raised while assembling it.
#[derive(Debug, Clone)]
pub struct BuiltOutput {
    pub dataset: ConvertedDataset,
    pub observations: Vec<Observation>,
}

/// Air temperature (degC) and pressure (Pa) series used by humidity conversion.
struct Companions {
    air_temp_c: Option<Vec<f64>>,
    pressure_pa: Option<Vec<f64>>,
}

impl Companions {
    fn find(columns: &[ResolvedColumn]) -> Self {
        let series = |standard_name: &str, convert: fn(f64, &str) -> f64| {
            columns
                .iter()
                .find(|c| c.spec.standard_name == standard_name)
                .map(|c| {
                    c.values
                        .iter()
                        .map(|v| convert(*v, &c.spec.unit_source))
                        .collect::<Vec<f64>>()
                })
        };
        Self {
            air_temp_c: series("air_temperature", to_celsius),
            pressure_pa: series("surface_air_pressure", to_pascal),
        }
    }

    fn pressure_at(&self, i: usize) -> f64 {
        self.pressure_pa
            .as_ref()
            .and_then(|p| p.get(i).copied())
            .filter(|p| !p.is_nan())
            .unwrap_or(STANDARD_PRESSURE_PA)
    }
}

/// Builds the [`ConvertedDataset`] for one file from its resolved columns
/// and their assessment.
pub struct SchemaBuilder<'a> {
    grid: &'a TimeGrid,
    site: &'a SiteMetadata,
    source: &'a SourceMetadata,
    thresholds: &'a ThresholdConfig,
    reanalysis_gapfill: bool,
    run: RunInfo,
}

impl<'a> SchemaBuilder<'a> {
    pub fn new(
        grid: &'a TimeGrid,
        site: &'a SiteMetadata,
        source: &'a SourceMetadata,
        thresholds: &'a ThresholdConfig,
    ) -> Self {
        Self {
            grid,
            site,
            source,
            thresholds,
            reanalysis_gapfill: false,
            run: RunInfo::now(),
        }
    }

    pub fn reanalysis_gapfill(mut self, enabled: bool) -> Self {
        self.reanalysis_gapfill = enabled;
        self
    }

    pub fn with_run_info(mut self, run: RunInfo) -> Self {
        self.run = run;
        self
    }

    /// Convert units and assemble the schema and arrays.
    ///
    /// Only variables the assessment retained or flagged are emitted.
    pub fn build(&self, columns: &[ResolvedColumn], assessment: &Assessment) -> Result<BuiltOutput> {
        if columns.len() != assessment.columns.len() {
            return Err(FluxError::Encoding(format!(
                "{} resolved columns but {} assessments",
                columns.len(),
                assessment.columns.len()
            )));
        }

        let companions = Companions::find(columns);
        let mut observations = Vec::new();
        let mut variables = vec![self.time_variable()];
        let mut data = IndexMap::new();
        data.insert("time".to_string(), VariableData::Float64(self.grid.time_values()));

        for (column, assessed) in columns.iter().zip(&assessment.columns) {
            if !assessed.disposition.is_emitted() {
                continue;
            }

            let values = self.convert(column, &companions)?;
            let out_of_range: Vec<usize> = values
                .iter()
                .enumerate()
                .filter(|(_, v)| !v.is_nan() && !column.spec.in_range(**v))
                .map(|(i, _)| i)
                .collect();

            if !out_of_range.is_empty() {
                let obs = Observation::new(
                    ObservationType::OutOfRange,
                    Severity::Warning,
                    column.output_name(),
                    format!(
                        "{} samples outside [{}, {}]",
                        out_of_range.len(),
                        column.spec.valid_min,
                        column.spec.valid_max
                    ),
                )
                .with_evidence(
                    Evidence::new()
                        .with_occurrences(out_of_range.len())
                        .with_sample_rows(out_of_range.iter().take(SAMPLE_ROWS).copied().collect()),
                )
                .with_detector("schema_builder");
                obs.log();
                observations.push(obs);
            }

            let variable = self.data_variable(column, assessed, out_of_range.len());
            debug!(variable = %variable.name, unit = %variable.unit, "adding variable");
            variables.push(variable);
            data.insert(
                column.output_name().to_string(),
                VariableData::Float64(values.iter().map(|v| if v.is_nan() { FILL_VALUE } else { *v }).collect()),
            );

            if column.qc_flags.is_some() || column.reanalysis_filled.is_some() {
                let name = format!("{}_qc", column.output_name());
                variables.push(self.qc_variable(column, &name));
                data.insert(
                    name,
                    VariableData::Int32(
                        assessed
                            .classes
                            .iter()
                            .map(|c| c.code().unwrap_or(QC_FILL_VALUE))
                            .collect(),
                    ),
                );
            }
        }

        self.add_site_variables(&mut variables, &mut data);

        let schema = OutputSchema {
            dimensions: vec![
                Dimension::fixed("x", 1),
                Dimension::fixed("y", 1),
                Dimension::fixed("z", 1),
                Dimension::unlimited("time"),
            ],
            variables,
            global_attributes: self.global_attributes(),
        };

        Ok(BuiltOutput {
            dataset: ConvertedDataset::new(schema, data)?,
            observations,
        })
    }

    fn convert(&self, column: &ResolvedColumn, companions: &Companions) -> Result<Vec<f64>> {
        let rule = column.spec.unit_rule;
        if !rule.needs_companions() {
            let step = self.grid.step_seconds;
            return Ok(column.values.iter().map(|v| rule.apply(*v, step)).collect());
        }

        let air_temp = companions.air_temp_c.as_ref().ok_or_else(|| {
            FluxError::SchemaMismatch(format!(
                "'{}' needs an air_temperature variable for humidity conversion",
                column.output_name()
            ))
        })?;
        Ok(column
            .values
            .iter()
            .zip(air_temp)
            .enumerate()
            .map(|(i, (rh, t))| specific_humidity(*rh, *t, companions.pressure_at(i)))
            .collect())
    }

    fn time_variable(&self) -> SchemaVariable {
        SchemaVariable::new("time", ValueKind::Float64, &["time"])
            .with_unit(self.grid.time_units())
            .with_attribute("long_name", "Time")
            .with_attribute("standard_name", "time")
            .with_attribute("calendar", "standard")
    }

    fn data_variable(&self, column: &ResolvedColumn, assessed: &ColumnAssessment, out_of_range: usize) -> SchemaVariable {
        let spec = &column.spec;
        let report = &assessed.report;
        let shape = if spec.is_meteorological() { MET_SHAPE } else { EVAL_SHAPE };

        let mut var = SchemaVariable::new(&spec.output_name, ValueKind::Float64, shape)
            .with_unit(spec.unit_rule.output_unit(&spec.unit_target, self.grid.step_seconds))
            .with_attribute("long_name", spec.long_name.as_str());
        if !spec.standard_name.is_empty() {
            var.set_attribute("standard_name", spec.standard_name.as_str());
        }
        var.set_attribute("Fluxnet_name", spec.source_name.as_str());
        var.set_attribute("Fluxnet_unit", spec.unit_source.as_str());
        var.set_attribute("valid_min", spec.valid_min);
        var.set_attribute("valid_max", spec.valid_max);
        var.set_attribute("missing_value", FILL_VALUE);
        var.set_attribute("_FillValue", FILL_VALUE);
        var.set_attribute("Missing_%", report.total_missing_pct);
        var.set_attribute("Gapfilled_%", report.total_gapfilled_pct);
        for (tier, pct) in &report.gapfill_pct_by_tier {
            var.set_attribute(format!("Gapfilled_{}_%", tier.key()), *pct);
        }
        var.set_attribute("Whole_years_passing", report.passing_years);

        if let Some(name) = &spec.reanalysis_name {
            var.set_attribute("Reanalysis_name", name.as_str());
        }
        if out_of_range > 0 {
            var.set_attribute("Out_of_range_count", out_of_range);
        }
        if let Disposition::Flagged(reason) = &assessed.disposition {
            var.set_attribute("excluded_by_policy", reason.as_str());
        }
        var
    }

    fn qc_variable(&self, column: &ResolvedColumn, name: &str) -> SchemaVariable {
        let spec = &column.spec;
        let shape = if spec.is_meteorological() { MET_SHAPE } else { EVAL_SHAPE };
        SchemaVariable::new(name, ValueKind::Int32, shape)
            .with_unit("-")
            .with_attribute("long_name", format!("{} quality flag", spec.long_name))
            .with_attribute("missing_value", f64::from(QC_FILL_VALUE))
            .with_attribute("_FillValue", f64::from(QC_FILL_VALUE))
            .with_attribute("flag_values", QcTier::ALL.map(|t| t.code().to_string()).join(" "))
            .with_attribute("flag_meanings", QcTier::describe_all())
    }

    fn add_site_variables(&self, variables: &mut Vec<SchemaVariable>, data: &mut IndexMap<String, VariableData>) {
        let site = self.site;
        let mut number = |name: &str, long_name: &str, unit: &str, value: f64| {
            let mut var = SchemaVariable::new(name, ValueKind::Float64, SCALAR_SHAPE)
                .with_unit(unit)
                .with_attribute("long_name", long_name);
            if name == "latitude" || name == "longitude" {
                var.set_attribute("standard_name", name);
            }
            variables.push(var);
            data.insert(name.to_string(), VariableData::Float64(vec![value]));
        };

        number("latitude", "Latitude", "degrees_north", site.latitude);
        number("longitude", "Longitude", "degrees_east", site.longitude);
        if let Some(v) = site.elevation {
            number("elevation", "Site elevation above sea level", "m", v);
        }
        if let Some(v) = site.tower_height {
            number("reference_height", "Measurement height on flux tower", "m", v);
        }
        if let Some(v) = site.canopy_height {
            number("canopy_height", "Canopy height", "m", v);
        }

        let mut text = |name: &str, long_name: &str, value: &str| {
            variables.push(
                SchemaVariable::new(name, ValueKind::Text, SCALAR_SHAPE).with_attribute("long_name", long_name),
            );
            data.insert(name.to_string(), VariableData::Text(value.to_string()));
        };
        if let Some(v) = &site.short_veg_type {
            text("IGBP_veg_short", "IGBP vegetation type (short)", v);
        }
        if let Some(v) = &site.long_veg_type {
            text("IGBP_veg_long", "IGBP vegetation type (long)", v);
        }

        if let Some(v) = site.mean_annual_precip {
            let var = SchemaVariable::new("avg_annual_precip", ValueKind::Float64, SCALAR_SHAPE)
                .with_unit("mm/year")
                .with_attribute("long_name", "Average annual precipitation");
            variables.push(var);
            data.insert("avg_annual_precip".to_string(), VariableData::Float64(vec![v]));
        }
    }

    fn global_attributes(&self) -> IndexMap<String, String> {
        let mut attrs = IndexMap::new();
        let mut put = |key: &str, value: String| {
            attrs.insert(key.to_string(), value);
        };

        put("Conventions", CONVENTIONS.to_string());
        put(
            "Production_time",
            self.run.production_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        );
        put("Production_source", self.run.production_source.clone());
        put("Site_code", self.site.site_code.clone());
        put("Site_name", self.site.long_sitename.clone());
        put("Fluxnet_dataset_version", self.site.dataset_version.clone());
        put("Input_file", self.source.file.clone());
        put("Input_file_hash", self.source.hash.clone());
        put("QC_thresholds", self.thresholds.describe());
        put("QC_flag_descriptions", QcTier::describe_all());
        put(
            "Reanalysis_gapfilling",
            if self.reanalysis_gapfill { "enabled" } else { "disabled" }.to_string(),
        );
        if let Some(tier) = &self.site.tier {
            put("Site_tier", tier.clone());
        }
        attrs
    }
}

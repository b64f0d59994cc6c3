//! CLI command implementations.

pub mod catalog;
pub mod check;
pub mod convert;

use std::path::Path;

use fluxnc::{Converter, ConverterConfig, Disposition, QualityReport, ThresholdConfig, VariableCatalog};
use colored::Colorize;

use crate::cli::QcArgs;

/// Built-in catalog unless a path is given.
pub fn load_catalog(path: Option<&Path>) -> fluxnc::Result<VariableCatalog> {
    match path {
        Some(p) => VariableCatalog::from_path(p),
        None => Ok(VariableCatalog::fluxnet2015()),
    }
}

/// Converter configured from the shared QC options.
pub fn build_converter(qc: &QcArgs) -> fluxnc::Result<Converter> {
    let mut thresholds = ThresholdConfig::new(qc.missing).with_min_whole_years(qc.min_years);
    thresholds.gapfill_all_max = qc.gapfill_all;
    thresholds.gapfill_good_max = qc.gapfill_good;
    thresholds.gapfill_med_max = qc.gapfill_med;
    thresholds.gapfill_poor_max = qc.gapfill_poor;

    let config = ConverterConfig {
        thresholds,
        include_all_eval: qc.include_all_eval,
        reanalysis_gapfill: qc.reanalysis_gapfill,
        ..ConverterConfig::default()
    };
    config.validate()?;

    let catalog = load_catalog(qc.catalog.as_deref())?;
    Ok(Converter::new(catalog).with_config(config))
}

/// One table row per variable report.
pub fn print_reports(reports: &[QualityReport], dispositions: &indexmap::IndexMap<String, Disposition>) {
    println!(
        "  {:12} {:>9} {:>11} {:>7}  {}",
        "variable".bold(),
        "missing%".bold(),
        "gapfilled%".bold(),
        "years".bold(),
        "status".bold()
    );
    for report in reports {
        let status = match dispositions.get(&report.variable) {
            Some(Disposition::Retain) => "kept".green(),
            Some(Disposition::Flagged(_)) => "flagged".yellow(),
            Some(Disposition::Dropped(_)) => "dropped".red(),
            None if report.passes_thresholds => "pass".green(),
            None => "fail".red(),
        };
        println!(
            "  {:12} {:>9.2} {:>11.2} {:>3}/{:<3}  {}",
            report.variable,
            report.total_missing_pct,
            report.total_gapfilled_pct,
            report.passing_years,
            report.evaluated_years,
            status
        );
        if let Some(reason) = &report.reason {
            println!("  {:12} {}", "", reason.dimmed());
        }
    }
}

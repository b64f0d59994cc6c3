//! Convert command - convert a flux file and write the output.

use std::path::PathBuf;

use colored::Colorize;
use fluxnc::{SiteMetadata, default_output_path, emitter_for};

use super::{build_converter, print_reports};
use crate::cli::{OutputFormat, QcArgs};

pub fn run(
    file: PathBuf,
    site: PathBuf,
    output: Option<PathBuf>,
    format: OutputFormat,
    qc: QcArgs,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if !file.exists() {
        return Err(format!("File not found: {}", file.display()).into());
    }

    let site = SiteMetadata::from_path(&site)?;
    let converter = build_converter(&qc)?;
    let emitter = emitter_for(&format.to_string())?;
    let output_path = output.unwrap_or_else(|| default_output_path(&file, emitter.as_ref()));
    tracing::debug!(output = %output_path.display(), %format, "output resolved");

    println!(
        "{} {} ({})",
        "Converting".cyan().bold(),
        file.display().to_string().white(),
        site.site_code
    );

    let summary = converter.convert_file(&file, &site, emitter.as_ref(), &output_path)?;

    println!(
        "Time step {} s, {} steps, whole years: {}",
        summary.step_seconds,
        summary.step_count,
        if summary.whole_years.is_empty() {
            "none".to_string()
        } else {
            summary
                .whole_years
                .iter()
                .map(|y| y.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        }
    );
    println!(
        "Variables: {} kept, {} flagged, {} dropped; {} warnings",
        summary.retained.len().to_string().green().bold(),
        summary.flagged.len().to_string().yellow(),
        summary.dropped.len().to_string().red(),
        summary.warnings.to_string().yellow()
    );

    if verbose {
        println!();
        print_reports(&summary.reports, &summary.dispositions);
    }

    println!();
    println!(
        "{} {}",
        "Saved to".green().bold(),
        summary.output_file.display().to_string().white()
    );

    Ok(())
}

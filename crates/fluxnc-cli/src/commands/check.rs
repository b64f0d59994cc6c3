//! Check command - report QC statistics without writing output.

use std::path::PathBuf;

use colored::Colorize;
use fluxnc::Severity;

use super::{build_converter, print_reports};
use crate::cli::QcArgs;

pub fn run(
    file: PathBuf,
    json_output: bool,
    qc: QcArgs,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if !file.exists() {
        return Err(format!("File not found: {}", file.display()).into());
    }

    let converter = build_converter(&qc)?;
    let check = converter.check_file(&file)?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&check)?);
        return Ok(());
    }

    println!(
        "{} {}",
        "QC report for".cyan().bold(),
        check.source.file.white()
    );
    println!(
        "Time step {} s, {} steps, {} whole years",
        check.step_seconds,
        check.step_count,
        check.whole_years.len()
    );
    println!("Thresholds: {}", converter.config().thresholds.describe());
    println!();

    print_reports(&check.reports, &check.dispositions);

    if verbose {
        let notes: Vec<_> = check
            .observations
            .iter()
            .filter(|o| o.severity == Severity::Info)
            .collect();
        if !notes.is_empty() {
            println!();
            for obs in notes {
                println!("  {} {}: {}", "info".blue(), obs.variable, obs.description);
            }
        }
    }

    println!();
    match &check.failure {
        Some(failure) => println!("{} {}", "Would abort:".red().bold(), failure),
        None => println!("{}", "File would convert.".green()),
    }

    Ok(())
}

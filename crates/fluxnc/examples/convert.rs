//! Example: Convert a FLUXNET2015 file to JSON with the built-in catalog.
//!
//! Usage:
//!   cargo run --example convert -- <flux_csv> <site_json> [output]
//!
//! Example:
//!   cargo run --example convert -- FLX_IT-Tor_FULLSET_HH.csv IT-Tor.json

use std::env;
use std::path::{Path, PathBuf};

use fluxnc::{Converter, JsonEmitter, SiteMetadata, VariableCatalog, default_output_path};

fn main() -> fluxnc::Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 3 {
        eprintln!("Usage: cargo run --example convert -- <flux_csv> <site_json> [output]");
        eprintln!("\nExample:");
        eprintln!("  cargo run --example convert -- FLX_IT-Tor_FULLSET_HH.csv IT-Tor.json");
        std::process::exit(1);
    }

    let input = Path::new(&args[1]);
    if !input.exists() {
        eprintln!("Error: File not found: {}", input.display());
        std::process::exit(1);
    }

    let site = SiteMetadata::from_path(&args[2])?;
    let emitter = JsonEmitter::new().pretty(true);
    let output = args
        .get(3)
        .map(PathBuf::from)
        .unwrap_or_else(|| default_output_path(input, &emitter));

    let separator = "=".repeat(80);
    println!("{}", separator);
    println!("fluxnc conversion: {} ({})", input.display(), site.site_code);
    println!("{}", separator);
    println!();

    let converter = Converter::new(VariableCatalog::fluxnet2015());
    let summary = converter.convert_file(input, &site, &emitter, &output)?;

    println!("## Time axis");
    println!("  Step: {} s", summary.step_seconds);
    println!("  Steps: {}", summary.step_count);
    println!("  Whole years: {:?}", summary.whole_years);
    println!();

    println!("## Variables");
    for report in &summary.reports {
        let status = match summary.dispositions.get(&report.variable) {
            Some(d) if d.is_emitted() => "kept",
            _ => "dropped",
        };
        println!(
            "  {:10} missing={:6.2}% gapfilled={:6.2}% years={}/{}  {}",
            report.variable,
            report.total_missing_pct,
            report.total_gapfilled_pct,
            report.passing_years,
            report.evaluated_years,
            status
        );
    }
    println!();

    println!("## Warnings: {}", summary.warnings);
    for (kind, count) in &summary.observations_by_type {
        println!("  {:20} {}", kind, count);
    }
    println!();

    println!("Wrote {}", summary.output_file.display());
    Ok(())
}

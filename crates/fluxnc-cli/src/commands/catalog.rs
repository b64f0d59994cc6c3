//! Catalog command - print the active variable catalog.

use std::path::PathBuf;

use colored::Colorize;

use super::load_catalog;

pub fn run(catalog: Option<PathBuf>, json_output: bool) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = load_catalog(catalog.as_deref())?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(catalog.entries())?);
        return Ok(());
    }

    println!(
        "{} ({} variables)",
        "Variable catalog".cyan().bold(),
        catalog.len()
    );
    println!();
    for spec in catalog.iter() {
        let mut flags = Vec::new();
        if spec.essential {
            flags.push("essential".red().to_string());
        }
        if spec.preferred {
            flags.push("preferred".green().to_string());
        }
        println!(
            "  {:18} -> {:10} {:13} {} -> {} {}",
            spec.source_name,
            spec.output_name.bold(),
            spec.category.label(),
            spec.unit_source,
            spec.unit_target,
            flags.join(" ")
        );
    }

    Ok(())
}

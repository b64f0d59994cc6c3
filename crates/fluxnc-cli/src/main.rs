//! fluxnc CLI - flux-tower spreadsheet conversion.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Convert {
            file,
            site,
            output,
            format,
            qc,
        } => commands::convert::run(file, site, output, format, qc, cli.verbose),

        Commands::Check { file, json, qc } => commands::check::run(file, json, qc, cli.verbose),

        Commands::Catalog { catalog, json } => commands::catalog::run(catalog, json),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

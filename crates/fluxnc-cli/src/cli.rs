//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// fluxnc: convert flux-tower spreadsheets into self-describing time-series files
#[derive(Parser)]
#[command(name = "fluxnc")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert a flux spreadsheet into an output file
    Convert {
        /// Path to the flux data file (CSV)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Site metadata (JSON)
        #[arg(short, long, value_name = "SITE_JSON")]
        site: PathBuf,

        /// Output path (default: <file> with the format's extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, default_value = "json")]
        format: OutputFormat,

        #[command(flatten)]
        qc: QcArgs,
    },

    /// Report QC statistics for a file without writing anything
    Check {
        /// Path to the flux data file (CSV)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        qc: QcArgs,
    },

    /// Print the active variable catalog
    Catalog {
        /// Variable catalog CSV (default: built-in FLUXNET2015 table)
        #[arg(long, value_name = "CSV")]
        catalog: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Catalog and QC options shared by `convert` and `check`.
#[derive(Args, Clone, Debug)]
pub struct QcArgs {
    /// Variable catalog CSV (default: built-in FLUXNET2015 table)
    #[arg(long, value_name = "CSV")]
    pub catalog: Option<PathBuf>,

    /// Maximum percentage of missing samples
    #[arg(long = "missing", value_name = "PCT", default_value = "20")]
    pub missing: f64,

    /// Maximum percentage of gap-filled samples, all tiers (overrides per-tier limits)
    #[arg(long, value_name = "PCT")]
    pub gapfill_all: Option<f64>,

    /// Maximum percentage of good-quality gap-fill
    #[arg(long, value_name = "PCT")]
    pub gapfill_good: Option<f64>,

    /// Maximum percentage of medium-quality gap-fill
    #[arg(long, value_name = "PCT")]
    pub gapfill_med: Option<f64>,

    /// Maximum percentage of poor-quality gap-fill
    #[arg(long, value_name = "PCT")]
    pub gapfill_poor: Option<f64>,

    /// Whole calendar years that must pass the thresholds
    #[arg(long, value_name = "N", default_value = "1")]
    pub min_years: u32,

    /// Keep evaluation variables that fail QC, flagged
    #[arg(long)]
    pub include_all_eval: bool,

    /// Fill missing samples from reanalysis columns
    #[arg(long)]
    pub reanalysis_gapfill: bool,
}

#[derive(Clone, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    NetCdf,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "netcdf" | "nc" => Ok(OutputFormat::NetCdf),
            _ => Err(format!("Unknown format: {}. Use json or netcdf.", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::NetCdf => write!(f, "netcdf"),
        }
    }
}

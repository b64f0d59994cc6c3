//! fluxnc: catalog-driven conversion of flux-tower spreadsheets.
//!
//! A flux-tower record (one row per half-hour or hour, one column per
//! measured quantity) is mapped onto a canonical variable set described by
//! a [`VariableCatalog`], checked for timing regularity, scored for
//! completeness and gap-filling against configurable thresholds, and
//! written as a self-describing time-series file.
//!
//! # Core Principles
//!
//! - **Catalog-driven**: the output variable set, units and attributes come
//!   from the catalog and the thresholds supplied at run time
//! - **All or nothing**: a file either converts completely or produces no output
//! - **Full provenance**: input hash, QC statistics and every recoverable
//!   problem are recorded in the output and the warning trail
//!
//! # Example
//!
//! ```no_run
//! use fluxnc::{Converter, JsonEmitter, SiteMetadata, VariableCatalog};
//!
//! let converter = Converter::new(VariableCatalog::fluxnet2015());
//! let site = SiteMetadata::from_path("BE-Bra.json").unwrap();
//! let summary = converter
//!     .convert_file("FLX_BE-Bra_FULLSET_HH.csv", &site, &JsonEmitter::new(), "BE-Bra.json.out")
//!     .unwrap();
//!
//! println!("Variables kept: {}", summary.retained.len());
//! println!("Warnings: {}", summary.warnings);
//! ```

pub mod catalog;
pub mod emit;
pub mod error;
pub mod input;
pub mod output;
pub mod quality;
pub mod resolve;
pub mod site;
pub mod timegrid;

mod converter;

pub use crate::converter::{
    Conversion, ConversionSummary, Converter, ConverterConfig, QualityCheck, default_output_path,
};
pub use catalog::{Category, UnitRule, VariableCatalog, VariableSpec};
pub use emit::{FileEmitter, JsonEmitter, emitter_for};
#[cfg(feature = "netcdf")]
pub use emit::NetcdfEmitter;
pub use error::{FluxError, Result};
pub use input::{DataTable, SourceMetadata};
pub use output::{ConvertedDataset, OutputSchema};
pub use quality::{Disposition, Observation, ObservationType, QcTier, QualityReport, Severity, ThresholdConfig};
pub use site::SiteMetadata;
pub use timegrid::TimeGrid;

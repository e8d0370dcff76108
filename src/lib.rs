//! Radar feature extraction and classifier diagnostics.
//!
//! This crate provides tools for:
//! - Discovering radar source directories and parsing their raw text records
//! - Scaling features across every source with one global fit
//! - Exporting per-source and merged CRLF CSV files
//! - Writing classifier diagnostics and beta-fit / KS-test charts
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use radar_extract::{processors::pipeline::run_pipeline, PipelineConfig};
//!
//! let summary = run_pipeline(Path::new("raw"), Path::new("features"), &PipelineConfig::default()).unwrap();
//! println!("{} records from {} sources", summary.records, summary.sources);
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;
pub mod visualization;

pub use config::{
    DiagnosticsConfig, ExportConfig, ExtractConfig, PipelineConfig, PlotConfig, ScalingConfig,
};
pub use core::records::{Record, SourceCollection, Value};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

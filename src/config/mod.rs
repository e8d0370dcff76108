//! Configuration types for the extraction pipeline.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What to do with a data line that is blank or holds non-numeric tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MalformedPolicy {
    /// Keep the line; non-numeric tokens become text values
    #[default]
    Keep,
    /// Drop the line and log a warning
    Skip,
    /// Fail the parse
    Abort,
}

/// What to do when one source directory fails to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SourceErrorPolicy {
    /// Any failure ends the run
    #[default]
    Abort,
    /// Log the failing source and continue with the rest
    Skip,
}

/// Feature scaling formula applied across all sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ScalingMethod {
    /// (v - min) / (max - min)
    #[default]
    MinMax,
    /// (v - mean) / std
    ZScore,
    /// Leave values untouched
    None,
}

/// Configuration for source discovery and record parsing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Substring that marks a directory as a data directory
    #[serde(default = "default_marker")]
    pub marker: String,

    /// Match the marker against the path from the input root down; when off,
    /// only the directory's own name is checked
    #[serde(default = "default_match_full_path")]
    pub match_full_path: bool,

    /// Extension of the files to parse
    #[serde(default = "default_file_extension")]
    pub file_extension: String,

    /// Number of header lines discarded at the top of every file
    #[serde(default = "default_header_lines")]
    pub header_lines: usize,

    /// Token delimiter inside a line (whitespace when unset)
    #[serde(default)]
    pub delimiter: Option<char>,

    #[serde(default)]
    pub malformed: MalformedPolicy,

    #[serde(default)]
    pub on_source_error: SourceErrorPolicy,
}

fn default_marker() -> String {
    "data".to_string()
}

fn default_match_full_path() -> bool {
    true
}

fn default_file_extension() -> String {
    "txt".to_string()
}

fn default_header_lines() -> usize {
    3
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            marker: default_marker(),
            match_full_path: default_match_full_path(),
            file_extension: default_file_extension(),
            header_lines: default_header_lines(),
            delimiter: None,
            malformed: MalformedPolicy::default(),
            on_source_error: SourceErrorPolicy::default(),
        }
    }
}

/// Configuration for the cross-source feature scaling pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScalingConfig {
    #[serde(default)]
    pub method: ScalingMethod,

    /// Column indices to scale; empty means every numeric column
    #[serde(default)]
    pub columns: Vec<usize>,
}

/// Configuration for the CSV exporter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// File name of the merged export inside the output directory
    #[serde(default = "default_merged_file_name")]
    pub merged_file_name: String,
}

fn default_merged_file_name() -> String {
    "merge.csv".to_string()
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            merged_file_name: default_merged_file_name(),
        }
    }
}

/// Configuration for classification diagnostics exports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Root of the per-run log tree
    #[serde(default = "default_log_root")]
    pub log_root: PathBuf,

    /// chrono format used when a run timestamp has to be generated
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
}

fn default_log_root() -> PathBuf {
    PathBuf::from("log")
}

fn default_timestamp_format() -> String {
    "%Y%m%d%H%M%S".to_string()
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            log_root: default_log_root(),
            timestamp_format: default_timestamp_format(),
        }
    }
}

/// Configuration for diagnostic plots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlotConfig {
    /// Directory under which the per-kind subdirectories are created
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,

    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    /// Number of histogram bin edges for PDF plots
    #[serde(default = "default_pdf_bins")]
    pub pdf_bins: usize,

    /// Number of sample points for beta curves
    #[serde(default = "default_beta_bins")]
    pub beta_bins: usize,

    /// Size of the rest-distance groups in one-against-rest plots
    #[serde(default = "default_oar_chunk")]
    pub oar_chunk: usize,

    /// Draw titles, axis labels and legends (needs system fonts)
    #[serde(default = "default_annotate")]
    pub annotate: bool,
}

fn default_output_root() -> PathBuf {
    PathBuf::from("plots")
}

fn default_width() -> u32 {
    800
}

fn default_height() -> u32 {
    600
}

fn default_pdf_bins() -> usize {
    20
}

fn default_beta_bins() -> usize {
    100
}

fn default_oar_chunk() -> usize {
    50
}

fn default_annotate() -> bool {
    true
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            output_root: default_output_root(),
            width: default_width(),
            height: default_height(),
            pdf_bins: default_pdf_bins(),
            beta_bins: default_beta_bins(),
            oar_chunk: default_oar_chunk(),
            annotate: default_annotate(),
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub extract: ExtractConfig,

    #[serde(default)]
    pub scaling: ScalingConfig,

    #[serde(default)]
    pub export: ExportConfig,

    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,

    #[serde(default)]
    pub plots: PlotConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

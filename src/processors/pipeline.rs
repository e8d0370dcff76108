//! End-to-end extraction: discover, parse, scale, export.

use std::path::Path;

use anyhow::{Context, Result};
use log::info;

use crate::config::PipelineConfig;
use crate::core::scaling::{scale_features, scaler_for, ColumnFit};
use crate::core::writers::{export_collections, ExportSummary};

use super::extraction::extract_sources;

/// Outcome of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineSummary {
    pub sources: usize,
    pub records: usize,
    /// Statistics used for each scaled column (empty when scaling is disabled)
    pub fits: Vec<ColumnFit>,
    pub export: ExportSummary,
}

/// Run the full extraction pipeline.
///
/// Every source is loaded and closed before the scaling pass, so the scaling
/// statistics always cover all sources.
pub fn run_pipeline(
    input_root: &Path,
    output_dir: &Path,
    config: &PipelineConfig,
) -> Result<PipelineSummary> {
    let mut collections = extract_sources(input_root, &config.extract)
        .with_context(|| format!("Failed to extract sources from {}", input_root.display()))?;

    let records: usize = collections.iter().map(|c| c.len()).sum();
    info!("Loaded {} sources, {} records", collections.len(), records);

    let fits = match scaler_for(config.scaling.method) {
        Some(scaler) => scale_features(&mut collections, &config.scaling.columns, scaler.as_ref())
            .context("Feature scaling failed")?,
        None => {
            info!("Feature scaling disabled");
            Vec::new()
        }
    };

    let export = export_collections(output_dir, &collections, &config.export.merged_file_name)
        .with_context(|| format!("Failed to export to {}", output_dir.display()))?;

    Ok(PipelineSummary {
        sources: collections.len(),
        records,
        fits,
        export,
    })
}

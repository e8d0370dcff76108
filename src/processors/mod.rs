//! Data processing modules.

pub mod diagnostics;
pub mod extraction;
pub mod pipeline;

// Re-export key types for convenience
pub use diagnostics::{ClassificationResult, DiagnosticsError, DiagnosticsExporter};
pub use extraction::{discover_sources, extract_sources, ExtractionError, SourceDir};
pub use pipeline::{run_pipeline, PipelineSummary};

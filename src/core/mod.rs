//! Core data types, statistics and I/O operations.

pub mod records;
pub mod scaling;
pub mod stats;
pub mod writers;

pub use records::{Record, RecordError, RecordParser, SourceCollection, Value};
pub use scaling::{scale_features, ColumnFit, ColumnStats, Scaler, ScalingError};
pub use stats::{fit_beta, BetaFit, BetaParams, KsResult, StatsError};
pub use writers::{export_collections, ExportSummary, WriteError};

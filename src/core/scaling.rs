//! Feature scaling across source collections.
//!
//! Statistics are always computed over the union of every collection, so the
//! pass must only run once all collections are closed.

use log::{debug, warn};
use thiserror::Error;

use crate::config::ScalingMethod;
use super::records::{SourceCollection, Value};

/// Errors that can occur during feature scaling.
#[derive(Error, Debug)]
pub enum ScalingError {
    #[error("source collection '{0}' is still accumulating records")]
    NotClosed(String),

    #[error("column {0} has no numeric values in any source")]
    EmptyColumn(usize),
}

/// Result type for scaling operations.
pub type Result<T> = std::result::Result<T, ScalingError>;

/// Summary statistics of one column over all sources.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Population standard deviation
    pub std_dev: f64,
}

impl ColumnStats {
    /// Returns `None` for an empty slice.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let n = values.len() as f64;
        let mut min = f64::MAX;
        let mut max = f64::MIN;
        let mut sum = 0.0;
        for &v in values {
            min = min.min(v);
            max = max.max(v);
            sum += v;
        }
        let mean = sum / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

        Some(Self {
            count: values.len(),
            min,
            max,
            mean,
            std_dev: var.sqrt(),
        })
    }
}

/// Fitted statistics for one scaled column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnFit {
    pub column: usize,
    pub stats: ColumnStats,
}

/// A scaling formula driven by column statistics.
pub trait Scaler {
    fn name(&self) -> &'static str;

    fn apply(&self, stats: &ColumnStats, value: f64) -> f64;
}

/// Rescales into [0, 1]. A constant column maps to 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinMaxScaler;

impl Scaler for MinMaxScaler {
    fn name(&self) -> &'static str {
        "min-max"
    }

    fn apply(&self, stats: &ColumnStats, value: f64) -> f64 {
        let range = stats.max - stats.min;
        if range.abs() < f64::EPSILON {
            0.0
        } else {
            (value - stats.min) / range
        }
    }
}

/// Standardizes to zero mean and unit variance. A constant column maps to 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardScaler;

impl Scaler for StandardScaler {
    fn name(&self) -> &'static str {
        "z-score"
    }

    fn apply(&self, stats: &ColumnStats, value: f64) -> f64 {
        if stats.std_dev.abs() < f64::EPSILON {
            0.0
        } else {
            (value - stats.mean) / stats.std_dev
        }
    }
}

/// Strategy for a configured method, `None` when scaling is disabled.
pub fn scaler_for(method: ScalingMethod) -> Option<Box<dyn Scaler>> {
    match method {
        ScalingMethod::MinMax => Some(Box::new(MinMaxScaler)),
        ScalingMethod::ZScore => Some(Box::new(StandardScaler)),
        ScalingMethod::None => None,
    }
}

/// Indices of every column holding at least one numeric value, ascending.
pub fn numeric_columns(collections: &[SourceCollection]) -> Vec<usize> {
    let width = collections.iter().map(|c| c.width()).max().unwrap_or(0);
    (0..width)
        .filter(|&col| {
            collections.iter().any(|c| {
                c.records()
                    .iter()
                    .any(|r| r.get(col).is_some_and(Value::is_number))
            })
        })
        .collect()
}

/// Numeric values of one column across all collections, in processing order.
pub fn column_values(collections: &[SourceCollection], column: usize) -> Vec<f64> {
    collections
        .iter()
        .flat_map(|c| c.records().iter())
        .filter_map(|r| r.get(column).and_then(Value::as_f64))
        .collect()
}

/// Scale `columns` of every record in every collection with statistics taken
/// over all collections jointly.
///
/// An empty `columns` slice selects every numeric column. Text cells and
/// records too short to hold a column are left untouched.
///
/// # Errors
///
/// Returns [`ScalingError::NotClosed`] if any collection is still open and
/// [`ScalingError::EmptyColumn`] if a selected column has no numeric values.
pub fn scale_features(
    collections: &mut [SourceCollection],
    columns: &[usize],
    scaler: &dyn Scaler,
) -> Result<Vec<ColumnFit>> {
    if let Some(open) = collections.iter().find(|c| !c.is_closed()) {
        return Err(ScalingError::NotClosed(open.name().to_string()));
    }

    let columns = if columns.is_empty() {
        numeric_columns(collections)
    } else {
        columns.to_vec()
    };

    if columns.is_empty() {
        warn!("No numeric columns to scale");
        return Ok(Vec::new());
    }

    let mut fits = Vec::with_capacity(columns.len());

    for column in columns {
        let values = column_values(collections, column);
        let stats = ColumnStats::from_values(&values).ok_or(ScalingError::EmptyColumn(column))?;

        for collection in collections.iter_mut() {
            for record in collection.records_mut() {
                if let Some(Value::Number(v)) = record.get_mut(column) {
                    *v = scaler.apply(&stats, *v);
                }
            }
        }

        debug!(
            "{} scaled column {} over {} values (min {}, max {})",
            scaler.name(),
            column,
            stats.count,
            stats.min,
            stats.max
        );
        fits.push(ColumnFit { column, stats });
    }

    Ok(fits)
}

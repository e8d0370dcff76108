//! Classification diagnostics export.
//!
//! Writes the per-fold centroid maps, classification boards and APRF rows of
//! a classifier run under `<log_root>/<source_tag>/<timestamp>/`. Every file
//! name carries the run timestamp and a two-digit fold counter, so folds of one
//! run never overwrite each other.

use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::records::format_number;
use crate::core::writers::{ensure_dir, is_plain_component, write_rows, WriteError};

/// Category directory of centroid-map exports.
pub const CENTROID_MAP: &str = "ctrdmap";
/// Category directory of classification-board exports.
pub const CLASSIFICATION_BOARD: &str = "clfboard";
/// Category directory of APRF exports.
pub const APRF: &str = "aprf";

/// Header of the APRF table.
pub const APRF_HEADER: [&str; 4] = ["acc", "pre", "rec", "f1m"];

/// Errors that can occur during diagnostics export.
#[derive(Debug, Error)]
pub enum DiagnosticsError {
    #[error("Failed to read classification result {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse classification result {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid {what} {value:?} for a log path component")]
    InvalidPathComponent { what: &'static str, value: String },

    #[error("{category} fold {fold} has {rows} rows for {classes} classes")]
    ShapeMismatch {
        category: &'static str,
        fold: usize,
        rows: usize,
        classes: usize,
    },

    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Result type for diagnostics operations.
pub type Result<T> = std::result::Result<T, DiagnosticsError>;

/// One 2D table per fold, one row per class.
pub type Table = Vec<Vec<f64>>;

/// Accuracy, precision, recall and F1-measure of one fold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AprfRow {
    #[serde(alias = "acc")]
    pub accuracy: f64,
    #[serde(alias = "pre")]
    pub precision: f64,
    #[serde(alias = "rec")]
    pub recall: f64,
    #[serde(alias = "f1m")]
    pub f1: f64,
}

impl AprfRow {
    fn cells(&self) -> [String; 4] {
        [
            format_number(self.accuracy),
            format_number(self.precision),
            format_number(self.recall),
            format_number(self.f1),
        ]
    }
}

/// Output of a classifier run, treated as read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Run timestamp, also used in every file name
    #[serde(default)]
    pub timestamp: String,

    /// Tag of the source directory the classifier was trained on
    pub source_tag: String,

    pub class_names: Vec<String>,

    #[serde(default)]
    pub centroid_maps: Vec<Table>,

    #[serde(default)]
    pub classification_boards: Vec<Table>,

    #[serde(default)]
    pub aprf: Vec<AprfRow>,
}

impl ClassificationResult {
    /// Load from a JSON file (`.json`) or YAML file (anything else).
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| DiagnosticsError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;

        let is_json = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let parsed: std::result::Result<Self, String> = if is_json {
            serde_json::from_str(&content).map_err(|e| e.to_string())
        } else {
            serde_yaml::from_str(&content).map_err(|e| e.to_string())
        };

        parsed.map_err(|message| DiagnosticsError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }
}

/// Current local time in the given chrono format.
pub fn generate_timestamp(format: &str) -> String {
    chrono::Local::now().format(format).to_string()
}

fn validate_component(what: &'static str, value: &str) -> Result<()> {
    if !is_plain_component(value) {
        return Err(DiagnosticsError::InvalidPathComponent {
            what,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Paths of every file written by [`DiagnosticsExporter::export_all`].
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticsSummary {
    pub centroid_maps: Vec<PathBuf>,
    pub classification_boards: Vec<PathBuf>,
    pub aprf: PathBuf,
}

/// Writes the artifacts of one classifier run.
pub struct DiagnosticsExporter<'a> {
    result: &'a ClassificationResult,
    log_dir: PathBuf,
}

impl<'a> DiagnosticsExporter<'a> {
    /// # Errors
    ///
    /// Returns [`DiagnosticsError::InvalidPathComponent`] when the timestamp or
    /// source tag is empty or contains a path separator.
    pub fn new(log_root: &Path, result: &'a ClassificationResult) -> Result<Self> {
        validate_component("source tag", &result.source_tag)?;
        validate_component("timestamp", &result.timestamp)?;

        let log_dir = log_root.join(&result.source_tag).join(&result.timestamp);
        Ok(Self { result, log_dir })
    }

    /// `<log_root>/<source_tag>/<timestamp>`
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Path of the `fold`-th file of `category`, creating the category
    /// directory if needed.
    pub fn fold_file_name(&self, category: &str, ext: &str, fold: usize) -> Result<PathBuf> {
        let dir = self.log_dir.join(category);
        ensure_dir(&dir)?;
        Ok(dir.join(format!("{}#{:02}.{}", self.result.timestamp, fold, ext)))
    }

    fn class_header(&self) -> Vec<String> {
        std::iter::once(String::new())
            .chain(self.result.class_names.iter().cloned())
            .collect()
    }

    fn export_class_tables(&self, category: &'static str, tables: &[Table]) -> Result<Vec<PathBuf>> {
        let names = &self.result.class_names;
        let mut paths = Vec::with_capacity(tables.len());

        for (fold, table) in tables.iter().enumerate() {
            if table.len() != names.len() {
                return Err(DiagnosticsError::ShapeMismatch {
                    category,
                    fold,
                    rows: table.len(),
                    classes: names.len(),
                });
            }

            let path = self.fold_file_name(category, "csv", fold)?;
            let body = table.iter().zip(names).map(|(row, name)| {
                std::iter::once(name.clone())
                    .chain(row.iter().map(|&v| format_number(v)))
                    .collect::<Vec<_>>()
            });
            write_rows(&path, std::iter::once(self.class_header()).chain(body))?;
            paths.push(path);
        }

        info!("export {} complete ({} folds)", category, paths.len());
        Ok(paths)
    }

    /// One file per fold: class-name header, one class-prefixed row per class.
    pub fn export_centroid_map(&self) -> Result<Vec<PathBuf>> {
        self.export_class_tables(CENTROID_MAP, &self.result.centroid_maps)
    }

    /// One file per fold, same layout as the centroid map.
    pub fn export_classification_board(&self) -> Result<Vec<PathBuf>> {
        self.export_class_tables(CLASSIFICATION_BOARD, &self.result.classification_boards)
    }

    /// A single file (fold counter 0) with one APRF row per fold.
    pub fn export_aprf(&self) -> Result<PathBuf> {
        let path = self.fold_file_name(APRF, "csv", 0)?;
        let header = APRF_HEADER.iter().map(|h| h.to_string()).collect::<Vec<_>>();
        let rows = self.result.aprf.iter().map(|r| r.cells().to_vec());
        write_rows(&path, std::iter::once(header).chain(rows))?;
        info!("export {} complete ({} folds)", APRF, self.result.aprf.len());
        Ok(path)
    }

    /// Export centroid maps, classification boards and the APRF table.
    ///
    /// The APRF file is written even without folds, holding only its header.
    pub fn export_all(&self) -> Result<DiagnosticsSummary> {
        Ok(DiagnosticsSummary {
            centroid_maps: self.export_centroid_map()?,
            classification_boards: self.export_classification_board()?,
            aprf: self.export_aprf()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::tempdir;

    fn sample_result(folds: usize) -> ClassificationResult {
        let table = vec![vec![0.5, 1.0], vec![2.0, 0.25]];
        ClassificationResult {
            timestamp: "20240701120000".to_string(),
            source_tag: "data_7980".to_string(),
            class_names: vec!["car".to_string(), "person".to_string()],
            centroid_maps: vec![table.clone(); folds],
            classification_boards: vec![table; folds],
            aprf: (0..folds)
                .map(|_| AprfRow {
                    accuracy: 0.9,
                    precision: 0.8,
                    recall: 0.75,
                    f1: 1.0,
                })
                .collect(),
        }
    }

    #[test]
    fn test_log_dir_is_structured() {
        let root = tempdir().unwrap();
        let result = sample_result(1);
        let exporter = DiagnosticsExporter::new(root.path(), &result).unwrap();
        assert_eq!(
            exporter.log_dir(),
            root.path().join("data_7980").join("20240701120000")
        );
    }

    #[test]
    fn test_fold_file_names_are_unique_and_padded() {
        let root = tempdir().unwrap();
        let result = sample_result(12);
        let exporter = DiagnosticsExporter::new(root.path(), &result).unwrap();

        let paths = exporter.export_centroid_map().unwrap();
        assert_eq!(paths.len(), 12);

        let unique: HashSet<_> = paths.iter().collect();
        assert_eq!(unique.len(), 12);

        let first = paths[0].file_name().unwrap().to_string_lossy().to_string();
        let last = paths[11].file_name().unwrap().to_string_lossy().to_string();
        assert_eq!(first, "20240701120000#00.csv");
        assert_eq!(last, "20240701120000#11.csv");
        assert!(paths.iter().all(|p| p.exists()));
    }

    #[test]
    fn test_centroid_map_layout() {
        let root = tempdir().unwrap();
        let result = sample_result(1);
        let exporter = DiagnosticsExporter::new(root.path(), &result).unwrap();

        let paths = exporter.export_centroid_map().unwrap();
        assert_eq!(
            paths[0],
            exporter.log_dir().join("ctrdmap").join("20240701120000#00.csv")
        );

        let content = fs::read_to_string(&paths[0]).unwrap();
        assert_eq!(content, ",car,person\r\ncar,0.5,1.0\r\nperson,2.0,0.25\r\n");
    }

    #[test]
    fn test_classification_board_category() {
        let root = tempdir().unwrap();
        let result = sample_result(2);
        let exporter = DiagnosticsExporter::new(root.path(), &result).unwrap();

        let paths = exporter.export_classification_board().unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths[1].starts_with(exporter.log_dir().join("clfboard")));
    }

    #[test]
    fn test_aprf_single_file() {
        let root = tempdir().unwrap();
        let result = sample_result(3);
        let exporter = DiagnosticsExporter::new(root.path(), &result).unwrap();

        let path = exporter.export_aprf().unwrap();
        assert!(path.ends_with("aprf/20240701120000#00.csv"));

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.split_terminator("\r\n").collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "acc,pre,rec,f1m");
        assert_eq!(lines[1], "0.9,0.8,0.75,1.0");
    }

    #[test]
    fn test_shape_mismatch() {
        let root = tempdir().unwrap();
        let mut result = sample_result(1);
        result.centroid_maps[0].pop();
        let exporter = DiagnosticsExporter::new(root.path(), &result).unwrap();

        match exporter.export_centroid_map() {
            Err(DiagnosticsError::ShapeMismatch { rows, classes, .. }) => {
                assert_eq!(rows, 1);
                assert_eq!(classes, 2);
            }
            other => panic!("Expected ShapeMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_source_tag() {
        let root = tempdir().unwrap();
        let mut result = sample_result(1);
        result.source_tag = "../escape".to_string();
        assert!(matches!(
            DiagnosticsExporter::new(root.path(), &result),
            Err(DiagnosticsError::InvalidPathComponent { .. })
        ));

        result.source_tag = "ok".to_string();
        result.timestamp.clear();
        assert!(DiagnosticsExporter::new(root.path(), &result).is_err());
    }

    #[test]
    fn test_export_all() {
        let root = tempdir().unwrap();
        let result = sample_result(2);
        let exporter = DiagnosticsExporter::new(root.path(), &result).unwrap();

        let summary = exporter.export_all().unwrap();
        assert_eq!(summary.centroid_maps.len(), 2);
        assert_eq!(summary.classification_boards.len(), 2);
        assert!(summary.aprf.exists());
    }

    #[test]
    fn test_export_all_without_folds_writes_aprf_header() {
        let root = tempdir().unwrap();
        let result = sample_result(0);
        let exporter = DiagnosticsExporter::new(root.path(), &result).unwrap();

        let summary = exporter.export_all().unwrap();

        assert!(summary.centroid_maps.is_empty());
        assert_eq!(fs::read_to_string(&summary.aprf).unwrap(), "acc,pre,rec,f1m\r\n");
    }

    #[test]
    fn test_load_yaml_and_json() {
        let dir = tempdir().unwrap();

        let yaml_path = dir.path().join("result.yaml");
        fs::write(
            &yaml_path,
            "timestamp: '20240701'\nsource_tag: data_a\nclass_names: [a, b]\ncentroid_maps:\n  - [[1.0, 2.0], [3.0, 4.0]]\naprf:\n  - {acc: 0.5, pre: 0.5, rec: 0.5, f1m: 0.5}\n",
        )
        .unwrap();
        let from_yaml = ClassificationResult::from_path(&yaml_path).unwrap();
        assert_eq!(from_yaml.class_names, vec!["a", "b"]);
        assert_eq!(from_yaml.centroid_maps.len(), 1);
        assert_eq!(from_yaml.aprf[0].f1, 0.5);
        assert!(from_yaml.classification_boards.is_empty());

        let json_path = dir.path().join("result.json");
        fs::write(&json_path, serde_json::to_string(&from_yaml).unwrap()).unwrap();
        let from_json = ClassificationResult::from_path(&json_path).unwrap();
        assert_eq!(from_json, from_yaml);
    }
}

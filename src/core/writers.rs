//! Delimited-text writers.
//!
//! This module provides:
//! - the per-source and merged CSV export of parsed collections
//! - a generic row writer shared with the diagnostics exports
//!
//! Every file is comma-separated with CRLF row terminators.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::info;
use thiserror::Error;

use super::records::{Record, SourceCollection};

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create a directory.
    #[error("failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to flush data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },

    /// A source file would be the merged file.
    #[error("source '{name}' collides with merged file '{path}'")]
    NameCollision { name: String, path: String },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates a directory and its parents. No-op if it already exists.
pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| WriteError::CreateDirectory {
        path: path.display().to_string(),
        source: e,
    })
}

/// Whether `value` can be used as a single file or directory name.
pub fn is_plain_component(value: &str) -> bool {
    !(value.is_empty()
        || value == "."
        || value == ".."
        || value.contains('/')
        || value.contains('\\'))
}

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            ensure_dir(parent)?;
        }
    }
    Ok(())
}

/// CRLF-terminated, comma-separated row writer over a buffered file.
///
/// Rows may have different lengths. A row without cells is written as an
/// empty line.
pub struct RowWriter {
    path: PathBuf,
    out: BufWriter<File>,
    format: csv::WriterBuilder,
}

impl RowWriter {
    /// Create (or truncate) `path`, creating parent directories as needed.
    pub fn create(path: &Path) -> Result<Self> {
        ensure_parent_dirs(path)?;
        let file = File::create(path).map_err(|e| WriteError::CreateFile {
            path: path.display().to_string(),
            source: e,
        })?;

        let mut format = csv::WriterBuilder::new();
        format.terminator(csv::Terminator::CRLF).flexible(true);

        Ok(Self {
            path: path.to_path_buf(),
            out: BufWriter::new(file),
            format,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> WriteError {
        WriteError::WriteFile {
            path: self.path.display().to_string(),
            source,
        }
    }

    pub fn write_row<I, T>(&mut self, row: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let cells: Vec<T> = row.into_iter().collect();
        if cells.is_empty() {
            // csv renders a zero-field record as `""`
            return self.out.write_all(b"\r\n").map_err(|e| self.io_error(e));
        }

        let mut csv = self.format.from_writer(&mut self.out);
        let written = csv.write_record(&cells).map_err(|e| WriteError::CsvError {
            path: self.path.display().to_string(),
            source: e,
        });
        let flushed = csv.flush();
        drop(csv);
        written?;
        flushed.map_err(|e| self.io_error(e))
    }

    /// Flush everything to disk.
    pub fn finish(mut self) -> Result<()> {
        self.out.flush().map_err(|e| self.io_error(e))
    }
}

/// Write rows of string-like cells to `path`.
///
/// Parent directories are created if needed. Returns the number of rows written.
pub fn write_rows<R, I, T>(path: &Path, rows: R) -> Result<usize>
where
    R: IntoIterator<Item = I>,
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut writer = RowWriter::create(path)?;
    let mut count = 0;
    for row in rows {
        writer.write_row(row)?;
        count += 1;
    }
    writer.finish()?;
    Ok(count)
}

fn write_record(writer: &mut RowWriter, record: &Record) -> Result<()> {
    writer.write_row(record.iter().map(|v| v.to_string()))
}

/// One exported source file.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceExport {
    pub name: String,
    pub path: PathBuf,
    pub rows: usize,
}

/// Result of exporting all collections.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSummary {
    pub sources: Vec<SourceExport>,
    pub merged_path: PathBuf,
    pub merged_rows: usize,
}

/// Write every collection to `<output_dir>/<name>.csv` and all rows, in
/// collection order, to `<output_dir>/<merged_file_name>`.
///
/// One collection is written at a time. On failure the files written so far
/// are left in place.
///
/// # Errors
///
/// Returns an error if the directory or any file cannot be created or written,
/// or [`WriteError::NameCollision`] if a source would overwrite the merged file.
pub fn export_collections(
    output_dir: &Path,
    collections: &[SourceCollection],
    merged_file_name: &str,
) -> Result<ExportSummary> {
    ensure_dir(output_dir)?;

    let merged_path = output_dir.join(merged_file_name);
    if let Some(c) = collections
        .iter()
        .find(|c| output_dir.join(format!("{}.csv", c.name())) == merged_path)
    {
        return Err(WriteError::NameCollision {
            name: c.name().to_string(),
            path: merged_path.display().to_string(),
        });
    }

    let mut merged = RowWriter::create(&merged_path)?;
    let mut merged_rows = 0;
    let mut sources = Vec::with_capacity(collections.len());

    for collection in collections {
        let path = output_dir.join(format!("{}.csv", collection.name()));
        let mut writer = RowWriter::create(&path)?;

        for record in collection.records() {
            write_record(&mut writer, record)?;
            write_record(&mut merged, record)?;
        }
        writer.finish()?;

        merged_rows += collection.len();
        info!("file write: {} ({} rows)", path.display(), collection.len());
        sources.push(SourceExport {
            name: collection.name().to_string(),
            path,
            rows: collection.len(),
        });
    }

    merged.finish()?;

    Ok(ExportSummary {
        sources,
        merged_path,
        merged_rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::records::Value;
    use std::fs;
    use tempfile::tempdir;

    fn collection(name: &str, rows: Vec<Vec<Value>>) -> SourceCollection {
        let mut c = SourceCollection::new(name);
        c.append(Path::new("mem.txt"), rows).unwrap();
        c.close();
        c
    }

    fn n(v: f64) -> Value {
        Value::Number(v)
    }

    #[test]
    fn test_export_single_source() {
        let dir = tempdir().unwrap();
        let sources = vec![collection("srcA", vec![vec![n(1.0)], vec![n(2.0)]])];

        let summary = export_collections(dir.path(), &sources, "merge.csv").unwrap();

        let per_source = fs::read_to_string(dir.path().join("srcA.csv")).unwrap();
        let merged = fs::read_to_string(dir.path().join("merge.csv")).unwrap();
        assert_eq!(per_source, "1.0\r\n2.0\r\n");
        assert_eq!(merged, "1.0\r\n2.0\r\n");
        assert_eq!(summary.merged_rows, 2);
        assert_eq!(summary.sources[0].rows, 2);
    }

    #[test]
    fn test_row_has_no_trailing_comma() {
        let dir = tempdir().unwrap();
        let sources = vec![collection(
            "a",
            vec![vec![n(1.0), n(2.5), Value::Text("x".into())]],
        )];

        export_collections(dir.path(), &sources, "merge.csv").unwrap();

        let content = fs::read_to_string(dir.path().join("a.csv")).unwrap();
        assert_eq!(content, "1.0,2.5,x\r\n");
    }

    #[test]
    fn test_merged_is_concatenation_in_order() {
        let dir = tempdir().unwrap();
        let sources = vec![
            collection("b", vec![vec![n(1.0)], vec![n(2.0)], vec![n(3.0)]]),
            collection("a", vec![vec![n(4.0), n(5.0)]]),
        ];

        let summary = export_collections(dir.path(), &sources, "merge.csv").unwrap();
        assert_eq!(summary.merged_rows, 4);
        assert_eq!(summary.sources.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(), vec!["b", "a"]);

        let merged = fs::read_to_string(&summary.merged_path).unwrap();
        assert_eq!(merged, "1.0\r\n2.0\r\n3.0\r\n4.0,5.0\r\n");
    }

    #[test]
    fn test_export_is_byte_identical_across_runs() {
        let sources = vec![
            collection("a", vec![vec![n(0.125), n(3.0)]]),
            collection("b", vec![vec![n(-1.5)]]),
        ];

        let first = tempdir().unwrap();
        let second = tempdir().unwrap();
        export_collections(first.path(), &sources, "merge.csv").unwrap();
        export_collections(second.path(), &sources, "merge.csv").unwrap();

        for name in ["a.csv", "b.csv", "merge.csv"] {
            let x = fs::read(first.path().join(name)).unwrap();
            let y = fs::read(second.path().join(name)).unwrap();
            assert_eq!(x, y, "{} differs", name);
        }
    }

    #[test]
    fn test_empty_record_is_empty_line() {
        let dir = tempdir().unwrap();
        let sources = vec![collection("a", vec![vec![n(1.0)], vec![], vec![n(2.0)]])];

        let summary = export_collections(dir.path(), &sources, "merge.csv").unwrap();

        assert_eq!(summary.merged_rows, 3);
        let content = fs::read_to_string(dir.path().join("a.csv")).unwrap();
        assert_eq!(content, "1.0\r\n\r\n2.0\r\n");
    }

    #[test]
    fn test_source_named_like_merged_file_is_rejected() {
        let dir = tempdir().unwrap();
        let sources = vec![
            collection("a", vec![vec![n(1.0)]]),
            collection("merge", vec![vec![n(2.0)]]),
        ];

        let result = export_collections(dir.path(), &sources, "merge.csv");

        assert!(matches!(result, Err(WriteError::NameCollision { ref name, .. }) if name == "merge"));
        assert!(!dir.path().join("a.csv").exists());
    }

    #[test]
    fn test_row_writer_mixes_empty_and_quoted_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.csv");

        let mut writer = RowWriter::create(&path).unwrap();
        writer.write_row(vec!["a,b", "c"]).unwrap();
        writer.write_row(Vec::<String>::new()).unwrap();
        writer.write_row(vec!["1.0"]).unwrap();
        writer.finish().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "\"a,b\",c\r\n\r\n1.0\r\n");
    }

    #[test]
    fn test_plain_component() {
        assert!(is_plain_component("car_01"));
        assert!(!is_plain_component(""));
        assert!(!is_plain_component(".."));
        assert!(!is_plain_component("../x"));
        assert!(!is_plain_component("a\\b"));
    }

    #[test]
    fn test_export_into_existing_directory() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("nested").join("out");
        fs::create_dir_all(&out).unwrap();

        let sources = vec![collection("a", vec![vec![n(1.0)]])];
        export_collections(&out, &sources, "merge.csv").unwrap();
        export_collections(&out, &sources, "merge.csv").unwrap();

        assert_eq!(fs::read_to_string(out.join("a.csv")).unwrap(), "1.0\r\n");
    }

    #[test]
    fn test_write_rows_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("x").join("y").join("t.csv");

        let rows = vec![vec!["", "a", "b"], vec!["a", "1", "2"]];
        let count = write_rows(&path, rows).unwrap();

        assert_eq!(count, 2);
        assert_eq!(fs::read_to_string(&path).unwrap(), ",a,b\r\na,1,2\r\n");
    }
}

//! Source discovery and loading.
//!
//! A source is a directory whose path below the input root carries the data
//! marker and that holds at least one file. Every data file directly inside it
//! is parsed into the same collection, named after the directory.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use thiserror::Error;
use walkdir::WalkDir;

use crate::config::{ExtractConfig, SourceErrorPolicy};
use crate::core::records::{RecordError, RecordParser, SourceCollection};

/// Errors that can occur while discovering or loading sources.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Input directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("Failed to walk input tree: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Failed to list directory {path}: {source}")]
    ListDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Source '{name}' found in both {first} and {second}")]
    DuplicateSource {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Failed to load source '{name}': {source}")]
    Source {
        name: String,
        #[source]
        source: RecordError,
    },
}

/// Result type for extraction operations.
pub type Result<T> = std::result::Result<T, ExtractionError>;

/// A qualifying source directory and its data files.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDir {
    pub name: String,
    pub path: PathBuf,
    /// Data files in file-name order
    pub files: Vec<PathBuf>,
}

fn leaf_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Whether the marker occurs in the directory's path starting at the input
/// root, or only in its leaf name when `match_full_path` is off.
pub fn matches_marker(dir: &Path, root: &Path, config: &ExtractConfig) -> bool {
    if config.match_full_path {
        let base = root.parent().unwrap_or_else(|| Path::new(""));
        dir.strip_prefix(base)
            .unwrap_or(dir)
            .to_string_lossy()
            .contains(&config.marker)
    } else {
        leaf_name(dir).contains(&config.marker)
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}

/// Find every qualifying source directory under `root`, in traversal order.
///
/// Directories are visited depth-first with entries sorted by name.
pub fn discover_sources(root: &Path, config: &ExtractConfig) -> Result<Vec<SourceDir>> {
    if !root.is_dir() {
        return Err(ExtractionError::DirectoryNotFound(root.to_path_buf()));
    }

    let mut sources = Vec::new();

    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_dir() || !matches_marker(entry.path(), root, config) {
            continue;
        }

        let mut files: Vec<PathBuf> = fs::read_dir(entry.path())
            .map_err(|e| ExtractionError::ListDirectory {
                path: entry.path().to_path_buf(),
                source: e,
            })?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();

        if files.is_empty() {
            continue;
        }

        files.retain(|p| has_extension(p, &config.file_extension));
        files.sort();

        sources.push(SourceDir {
            name: leaf_name(entry.path()),
            path: entry.path().to_path_buf(),
            files,
        });
    }

    Ok(sources)
}

/// Parse every file of one source into a closed collection.
pub fn load_source(dir: &SourceDir, parser: &RecordParser) -> Result<SourceCollection> {
    let mut collection = SourceCollection::new(dir.name.clone());

    for file in &dir.files {
        collection
            .load_file(parser, file)
            .map_err(|e| ExtractionError::Source {
                name: dir.name.clone(),
                source: e,
            })?;
    }

    collection.close();
    Ok(collection)
}

/// Load all discovered sources.
///
/// Under [`SourceErrorPolicy::Abort`] the first failure is returned. Under
/// [`SourceErrorPolicy::Skip`] a failing or duplicate source is logged and left
/// out.
pub fn load_sources(
    dirs: &[SourceDir],
    parser: &RecordParser,
    policy: SourceErrorPolicy,
) -> Result<Vec<SourceCollection>> {
    let mut seen: HashMap<&str, &Path> = HashMap::new();
    let mut collections = Vec::with_capacity(dirs.len());

    for dir in dirs {
        let loaded = match seen.get(dir.name.as_str()) {
            Some(first) => Err(ExtractionError::DuplicateSource {
                name: dir.name.clone(),
                first: first.to_path_buf(),
                second: dir.path.clone(),
            }),
            None => load_source(dir, parser),
        };

        match loaded {
            Ok(collection) => {
                info!("append {} ({} records)", collection.name(), collection.len());
                seen.insert(dir.name.as_str(), dir.path.as_path());
                collections.push(collection);
            }
            Err(e) => match policy {
                SourceErrorPolicy::Abort => return Err(e),
                SourceErrorPolicy::Skip => warn!("Skipping source: {}", e),
            },
        }
    }

    Ok(collections)
}

/// Discover and load every source under `root`.
pub fn extract_sources(root: &Path, config: &ExtractConfig) -> Result<Vec<SourceCollection>> {
    let dirs = discover_sources(root, config)?;
    let parser = RecordParser::from_config(config);
    load_sources(&dirs, &parser, config.on_source_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_raw(dir: &Path, name: &str, data: &[&str]) -> PathBuf {
        fs::create_dir_all(dir).unwrap();
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        writeln!(file, "# radar export").unwrap();
        writeln!(file, "# columns").unwrap();
        writeln!(file, "#").unwrap();
        for line in data {
            writeln!(file, "{}", line).unwrap();
        }
        path
    }

    #[test]
    fn test_discover_sources_by_leaf_marker() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write_raw(&root.join("car").join("data_car"), "b.txt", &["1"]);
        write_raw(&root.join("car").join("data_car"), "a.txt", &["1"]);
        write_raw(&root.join("person_data"), "a.txt", &["1"]);
        write_raw(&root.join("person_data").join("raw"), "a.txt", &["1"]);
        write_raw(&root.join("notes"), "a.txt", &["1"]);
        fs::create_dir_all(root.join("data_empty")).unwrap();

        let config = ExtractConfig {
            match_full_path: false,
            ..ExtractConfig::default()
        };
        let sources = discover_sources(root, &config).unwrap();

        let names: Vec<&str> = sources.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["data_car", "person_data"]);

        let files: Vec<String> = sources[0]
            .files
            .iter()
            .map(|p| leaf_name(p))
            .collect();
        assert_eq!(files, vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_only_data_files_are_parsed() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("data_a");
        write_raw(&dir, "a.txt", &["1"]);
        write_raw(&dir, "readme.md", &["x"]);

        let sources = discover_sources(temp.path(), &ExtractConfig::default()).unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].files.len(), 1);
    }

    #[test]
    fn test_full_path_marker() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("rawdata_7980");
        write_raw(&root.join("car"), "a.txt", &["1"]);
        write_raw(&root.join("person"), "a.txt", &["1", "2"]);

        // The root name carries the marker, so every class directory qualifies
        let mut config = ExtractConfig::default();
        let collections = extract_sources(&root, &config).unwrap();
        let names: Vec<&str> = collections.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["car", "person"]);
        assert_eq!(collections[1].len(), 2);

        config.match_full_path = false;
        assert!(discover_sources(&root, &config).unwrap().is_empty());
    }

    #[test]
    fn test_missing_root() {
        let result = discover_sources(Path::new("/nonexistent/root"), &ExtractConfig::default());
        assert!(matches!(result, Err(ExtractionError::DirectoryNotFound(_))));
    }

    #[test]
    fn test_record_counts_per_source() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        for src in ["data_a", "data_b", "data_c"] {
            for f in ["1.txt", "2.txt"] {
                write_raw(&root.join(src), f, &["1 2", "3 4", "5 6", "7 8"]);
            }
        }

        let collections = extract_sources(root, &ExtractConfig::default()).unwrap();

        assert_eq!(collections.len(), 3);
        for c in &collections {
            assert_eq!(c.len(), 2 * 4);
            assert!(c.is_closed());
        }
    }

    #[test]
    fn test_duplicate_source_names() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write_raw(&root.join("x").join("data"), "a.txt", &["1"]);
        write_raw(&root.join("y").join("data"), "a.txt", &["2"]);

        let mut config = ExtractConfig::default();
        let result = extract_sources(root, &config);
        assert!(matches!(result, Err(ExtractionError::DuplicateSource { .. })));

        config.on_source_error = SourceErrorPolicy::Skip;
        let collections = extract_sources(root, &config).unwrap();
        assert_eq!(collections.len(), 1);
    }

    #[test]
    fn test_failing_source_policy() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write_raw(&root.join("data_bad"), "a.txt", &["1", "oops"]);
        write_raw(&root.join("data_good"), "a.txt", &["1", "2"]);

        let mut config = ExtractConfig::default();
        config.malformed = crate::config::MalformedPolicy::Abort;

        let result = extract_sources(root, &config);
        match result {
            Err(ExtractionError::Source { name, .. }) => assert_eq!(name, "data_bad"),
            other => panic!("Expected Source error, got {:?}", other),
        }

        config.on_source_error = SourceErrorPolicy::Skip;
        let collections = extract_sources(root, &config).unwrap();
        assert_eq!(collections.len(), 1);
        assert_eq!(collections[0].name(), "data_good");
        assert_eq!(collections[0].len(), 2);
    }
}

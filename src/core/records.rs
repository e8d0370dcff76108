//! Record parsing for raw radar text files.
//!
//! A raw file starts with a fixed-size header that is discarded unconditionally.
//! Every following line is one record. Lines are split into tokens by a
//! [`LineTokenizer`] and each token is typed once, here, as a [`Value`].

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use thiserror::Error;

use crate::config::{ExtractConfig, MalformedPolicy};

/// Errors that can occur while reading records.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed record at {path}:{line}: {content:?}")]
    Malformed {
        path: PathBuf,
        line: usize,
        content: String,
    },

    #[error("source collection '{0}' is closed")]
    Closed(String),
}

/// Result type for record operations.
pub type Result<T> = std::result::Result<T, RecordError>;

/// A single scalar parsed from a data line.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
}

impl Value {
    /// Type a raw token. Only finite numbers count as numeric.
    pub fn parse(token: &str) -> Self {
        let token = token.trim();
        match token.parse::<f64>() {
            Ok(v) if v.is_finite() => Value::Number(v),
            _ => Value::Text(token.to_string()),
        }
    }

    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(*v),
            Value::Text(_) => None,
        }
    }

    #[inline]
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Number(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(v) => f.write_str(&format_number(*v)),
            Value::Text(s) => f.write_str(s),
        }
    }
}

/// Textual form of a number in exports.
///
/// Integral values keep one decimal place (`1.0`), everything else uses the
/// shortest representation that parses back to the same `f64`.
pub fn format_number(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e16 {
        format!("{:.1}", v)
    } else {
        format!("{}", v)
    }
}

/// One record: the ordered values of one data line.
pub type Record = Vec<Value>;

/// Splits a data line into raw tokens.
pub trait LineTokenizer {
    fn tokenize<'a>(&self, line: &'a str) -> Vec<&'a str>;
}

/// Splits on a single delimiter character, or on runs of whitespace.
#[derive(Debug, Clone, Default)]
pub struct DelimitedTokenizer {
    delimiter: Option<char>,
}

impl DelimitedTokenizer {
    pub fn new(delimiter: Option<char>) -> Self {
        Self { delimiter }
    }
}

impl LineTokenizer for DelimitedTokenizer {
    fn tokenize<'a>(&self, line: &'a str) -> Vec<&'a str> {
        if line.trim().is_empty() {
            return Vec::new();
        }
        match self.delimiter {
            Some(d) => line.split(d).map(str::trim).collect(),
            None => line.split_whitespace().collect(),
        }
    }
}

/// Reads raw text files into records.
pub struct RecordParser {
    header_lines: usize,
    policy: MalformedPolicy,
    tokenizer: Box<dyn LineTokenizer>,
}

impl RecordParser {
    /// Parser with the whitespace tokenizer.
    pub fn new(header_lines: usize, policy: MalformedPolicy) -> Self {
        Self {
            header_lines,
            policy,
            tokenizer: Box::new(DelimitedTokenizer::default()),
        }
    }

    pub fn from_config(config: &ExtractConfig) -> Self {
        Self::new(config.header_lines, config.malformed)
            .with_tokenizer(DelimitedTokenizer::new(config.delimiter))
    }

    /// Replace the tokenizing strategy.
    pub fn with_tokenizer<T: LineTokenizer + 'static>(mut self, tokenizer: T) -> Self {
        self.tokenizer = Box::new(tokenizer);
        self
    }

    /// Type every token of one line.
    pub fn parse_line(&self, line: &str) -> Record {
        self.tokenizer
            .tokenize(line)
            .into_iter()
            .map(Value::parse)
            .collect()
    }

    /// Read all records of a file, discarding the header.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::Io`] if the file cannot be opened or read, and
    /// [`RecordError::Malformed`] for a blank or non-numeric line under the
    /// `abort` policy.
    pub fn read_file<P: AsRef<Path>>(&self, path: P) -> Result<Vec<Record>> {
        let path = path.as_ref();
        let io_err = |source| RecordError::Io {
            path: path.to_path_buf(),
            source,
        };

        let file = File::open(path).map_err(io_err)?;
        let mut reader = BufReader::new(file);

        let mut records = Vec::new();
        let mut skipped = 0usize;
        let mut buf = Vec::new();

        for idx in 0.. {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).map_err(io_err)? == 0 {
                break;
            }
            if idx < self.header_lines {
                continue;
            }

            // Invalid UTF-8 becomes U+FFFD instead of failing the file
            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches('\n').trim_end_matches('\r').to_string();

            let record = self.parse_line(&line);
            let malformed = record.is_empty() || record.iter().any(|v| !v.is_number());

            if malformed {
                match self.policy {
                    MalformedPolicy::Keep => {}
                    MalformedPolicy::Skip => {
                        warn!("{}:{}: skipping malformed line {:?}", path.display(), idx + 1, line);
                        skipped += 1;
                        continue;
                    }
                    MalformedPolicy::Abort => {
                        return Err(RecordError::Malformed {
                            path: path.to_path_buf(),
                            line: idx + 1,
                            content: line,
                        });
                    }
                }
            }

            records.push(record);
        }

        debug!(
            "{}: {} records ({} skipped)",
            path.display(),
            records.len(),
            skipped
        );

        Ok(records)
    }
}

/// All records belonging to one source directory.
#[derive(Debug, Clone)]
pub struct SourceCollection {
    name: String,
    records: Vec<Record>,
    files: Vec<PathBuf>,
    closed: bool,
}

impl SourceCollection {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            records: Vec::new(),
            files: Vec::new(),
            closed: false,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Values may be rewritten in place; the record set itself is fixed.
    #[inline]
    pub fn records_mut(&mut self) -> &mut [Record] {
        &mut self.records
    }

    /// Files that contributed records, in append order.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of values in the widest record.
    pub fn width(&self) -> usize {
        self.records.iter().map(|r| r.len()).max().unwrap_or(0)
    }

    /// Add the records parsed from one file.
    pub fn append(&mut self, file: &Path, records: Vec<Record>) -> Result<()> {
        if self.closed {
            return Err(RecordError::Closed(self.name.clone()));
        }
        self.files.push(file.to_path_buf());
        self.records.extend(records);
        Ok(())
    }

    /// Parse `file` with `parser` and append its records.
    pub fn load_file(&mut self, parser: &RecordParser, file: &Path) -> Result<usize> {
        if self.closed {
            return Err(RecordError::Closed(self.name.clone()));
        }
        let records = parser.read_file(file)?;
        let count = records.len();
        self.append(file, records)?;
        Ok(count)
    }

    /// Mark the collection as complete. No further records can be appended.
    pub fn close(&mut self) {
        self.closed = true;
    }
}

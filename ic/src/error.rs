//! Corpus error types

use std::fmt;
use std::path::PathBuf;

use dictzip::DictZipError;
use thiserror::Error;

/// Errors that can occur while writing or reading an indexed corpus
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("Cannot open \"{}\": {reason}", .path.display())]
    Open { path: PathBuf, reason: String },

    #[error("Unknown entry: {0}")]
    UnknownEntry(String),

    #[error("Codec error: {0}")]
    Codec(#[from] DictZipError),

    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid entry name {0:?}: empty, or has tabs, line breaks or outer whitespace")]
    InvalidName(String),

    #[error("Entry {name} is truncated: expected {expected} bytes, got {actual}")]
    Truncated { name: String, expected: u64, actual: u64 },

    #[error("Entry {0} is not valid UTF-8")]
    InvalidUtf8(String),

    #[error("Corpus lock poisoned by a panicked thread")]
    Poisoned,
}

impl CorpusError {
    pub(crate) fn open(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        CorpusError::Open {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn malformed_line(
        path: impl Into<PathBuf>,
        line: usize,
        reason: impl fmt::Display,
    ) -> Self {
        Self::open(path, format!("Malformed line {} in index file: {}", line, reason))
    }

    /// Check if this error came from opening a corpus
    pub fn is_open_error(&self) -> bool {
        matches!(self, CorpusError::Open { .. })
    }

    /// Check if this error is a lookup of a name not in the index
    pub fn is_lookup_error(&self) -> bool {
        matches!(self, CorpusError::UnknownEntry(_))
    }

    /// Check if this error came from compression or corrupt data
    pub fn is_codec_error(&self) -> bool {
        matches!(self, CorpusError::Codec(_) | CorpusError::Truncated { .. })
    }
}

/// Aggregate of per-entry failures from a fail-safe bulk copy
#[derive(Debug, Default)]
pub struct BatchError {
    failures: Vec<(String, CorpusError)>,
}

impl BatchError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, error: CorpusError) {
        self.failures.push((name.into(), error));
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Failed entries with their errors, in the order they were copied
    pub fn failures(&self) -> &[(String, CorpusError)] {
        &self.failures
    }

    /// Names of the failed entries
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|(name, _)| name.as_str())
    }
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Errors in batch conversion:")?;
        for (name, error) in &self.failures {
            writeln!(f, "    {}: {}", name, error)?;
        }
        Ok(())
    }
}

impl std::error::Error for BatchError {}

/// Result type for corpus operations
pub type Result<T> = std::result::Result<T, CorpusError>;

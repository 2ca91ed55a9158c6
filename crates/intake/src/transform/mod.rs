//! Processing functions applied to each job's source bytes.
//!
//! The pipeline only depends on the [`Transform`] trait: bytes in, bytes
//! out, plus a [`TransformSummary`] that lands in the job report. Which
//! transform handles a file is decided by extension through
//! [`TransformRegistry`].

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod cleaner;

pub use cleaner::CsvCleaner;

/// Counts describing what a transform did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformSummary {
    pub input_rows: u64,
    pub output_rows: u64,
    pub dropped_rows: u64,
    pub columns: u64,
}

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("Empty input")]
    EmptyInput,

    #[error("Malformed input: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error during transform: {0}")]
    Io(#[from] std::io::Error),

    #[error("No transform registered for extension '{0}'")]
    Unsupported(String),
}

pub trait Transform: Send + Sync {
    /// Short identifier recorded in job reports.
    fn name(&self) -> &str;

    /// Extension (without the dot) of the produced output.
    fn output_extension(&self) -> &str;

    fn apply(
        &self,
        input: &mut dyn Read,
        output: &mut dyn Write,
    ) -> Result<TransformSummary, TransformError>;
}

/// Maps lowercase file extensions to transforms.
pub struct TransformRegistry {
    by_extension: BTreeMap<String, Box<dyn Transform>>,
}

impl std::fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.by_extension.iter().map(|(ext, t)| (ext, t.name())))
            .finish()
    }
}

impl TransformRegistry {
    pub fn empty() -> Self {
        Self {
            by_extension: BTreeMap::new(),
        }
    }

    /// `csv` → comma-separated cleaner, `tsv` → tab-separated cleaner.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register("csv", Box::new(CsvCleaner::new()));
        registry.register("tsv", Box::new(CsvCleaner::tab_separated()));
        registry
    }

    /// Registers `transform` for `extension`, replacing any previous entry.
    pub fn register(&mut self, extension: &str, transform: Box<dyn Transform>) {
        self.by_extension
            .insert(extension.trim_start_matches('.').to_ascii_lowercase(), transform);
    }

    pub fn for_extension(&self, extension: &str) -> Option<&dyn Transform> {
        self.by_extension
            .get(&extension.to_ascii_lowercase())
            .map(|t| t.as_ref())
    }

    pub fn for_path(&self, path: &Path) -> Option<&dyn Transform> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|ext| self.for_extension(ext))
    }

    pub fn supports(&self, path: &Path) -> bool {
        self.for_path(path).is_some()
    }

    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.by_extension.keys().map(String::as_str)
    }
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upper;

    impl Transform for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        fn output_extension(&self) -> &str {
            "txt"
        }

        fn apply(
            &self,
            input: &mut dyn Read,
            output: &mut dyn Write,
        ) -> Result<TransformSummary, TransformError> {
            let mut text = String::new();
            input.read_to_string(&mut text)?;
            output.write_all(text.to_uppercase().as_bytes())?;
            let lines = text.lines().count() as u64;
            Ok(TransformSummary {
                input_rows: lines,
                output_rows: lines,
                dropped_rows: 0,
                columns: 1,
            })
        }
    }

    #[test]
    fn test_default_extensions() {
        let registry = TransformRegistry::with_defaults();
        assert_eq!(registry.extensions().collect::<Vec<_>>(), vec!["csv", "tsv"]);
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = TransformRegistry::with_defaults();
        assert!(registry.supports(Path::new("data/REPORT.CSV")));
        assert!(registry.supports(Path::new("x.Tsv")));
        assert!(!registry.supports(Path::new("notes.txt")));
        assert!(!registry.supports(Path::new("no_extension")));
    }

    #[test]
    fn test_custom_transform_is_pluggable() {
        let mut registry = TransformRegistry::empty();
        registry.register(".TXT", Box::new(Upper));

        let transform = registry.for_path(Path::new("a.txt")).unwrap();
        let mut out = Vec::new();
        let summary = transform
            .apply(&mut &b"hello\nworld\n"[..], &mut out)
            .unwrap();

        assert_eq!(out, b"HELLO\nWORLD\n");
        assert_eq!(summary.input_rows, 2);
        assert_eq!(transform.name(), "upper");
    }
}

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};
use walkdir::WalkDir;

use crate::error::IntakeError;
use crate::transform::TransformRegistry;

/// A file in the inbox with an extension some transform accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub filename: String,
    pub path: PathBuf,
}

/// Lists the top level of the inbox.
pub struct InboxScanner {
    inbox: PathBuf,
    registry: Arc<TransformRegistry>,
}

impl InboxScanner {
    pub fn new<P: AsRef<Path>>(inbox: P, registry: Arc<TransformRegistry>) -> Self {
        Self {
            inbox: inbox.as_ref().to_path_buf(),
            registry,
        }
    }

    pub fn inbox(&self) -> &Path {
        &self.inbox
    }

    /// Candidates in lexicographic filename order.
    ///
    /// Dotfiles are skipped; producers and our own staging use them for
    /// in-progress writes.
    pub fn scan(&self) -> Result<Vec<Candidate>, IntakeError> {
        let mut candidates = Vec::new();

        for entry in WalkDir::new(&self.inbox)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(IntakeError::Scan {
                        path: self.inbox.clone(),
                        source: e,
                    })
                }
                Err(e) => {
                    warn!("Skipping unreadable inbox entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let Some(filename) = entry.file_name().to_str() else {
                warn!(
                    "Skipping file with non UTF-8 name: {}",
                    entry.path().display()
                );
                continue;
            };
            if filename.starts_with('.') {
                continue;
            }

            if self.registry.supports(entry.path()) {
                debug!("Found candidate: {}", filename);
                candidates.push(Candidate {
                    filename: filename.to_string(),
                    path: entry.path().to_path_buf(),
                });
            }
        }

        Ok(candidates)
    }
}

//! On-disk snapshot of [`SeenState`].

use std::path::{Path, PathBuf};

use log::{debug, warn};
use thiserror::Error;

use super::SeenState;

#[derive(Error, Debug)]
pub enum SeenStateError {
    #[error("Failed to write seen-state '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode seen-state: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Loads and saves the seen-state JSON file.
///
/// Saves go to a sibling temp file that is renamed over the target, so a
/// crash mid-save leaves either the old or the new snapshot.
#[derive(Debug, Clone)]
pub struct SeenStateStore {
    path: PathBuf,
}

impl SeenStateStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the snapshot. A missing file is an empty state; an unreadable
    /// or malformed one is logged and replaced by an empty state.
    pub fn load(&self) -> SeenState {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return SeenState::new(),
            Err(e) => {
                warn!(
                    "Could not read seen-state {}: {}; starting empty",
                    self.path.display(),
                    e
                );
                return SeenState::new();
            }
        };

        match serde_json::from_str::<SeenState>(&content) {
            Ok(state) => {
                debug!(
                    "Loaded seen-state with {} sizes, {} digests",
                    state.sizes.len(),
                    state.enqueued.len()
                );
                state
            }
            Err(e) => {
                warn!(
                    "Seen-state {} is malformed: {}; starting empty",
                    self.path.display(),
                    e
                );
                SeenState::new()
            }
        }
    }

    pub fn save(&self, state: &SeenState) -> Result<(), SeenStateError> {
        let json = serde_json::to_vec_pretty(state)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| SeenStateError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &json).map_err(|e| SeenStateError::Write {
            path: tmp.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|e| SeenStateError::Write {
            path: self.path.clone(),
            source: e,
        })?;
        Ok(())
    }
}

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::digest::DEFAULT_CHUNK_SIZE;
use crate::error::StorageError;
use crate::ledger::DEFAULT_MAX_ERROR_LEN;

pub const CONFIG_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default = "default_inbox")]
    pub inbox: PathBuf,
    #[serde(default = "default_outbox")]
    pub outbox: PathBuf,
    #[serde(default = "default_failed")]
    pub failed: PathBuf,
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    /// Defaults to `<state_dir>/intake.db`.
    #[serde(default)]
    pub database: Option<PathBuf>,
    /// Defaults to `<state_dir>/seen.json`.
    #[serde(default)]
    pub seen_state: Option<PathBuf>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_error_len")]
    pub max_error_len: usize,
    #[serde(default = "default_hash_chunk_size")]
    pub hash_chunk_size: usize,
}

fn default_inbox() -> PathBuf {
    PathBuf::from("inbox")
}

fn default_outbox() -> PathBuf {
    PathBuf::from("outbox")
}

fn default_failed() -> PathBuf {
    PathBuf::from("failed")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("state")
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_max_error_len() -> usize {
    DEFAULT_MAX_ERROR_LEN
}

fn default_hash_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl Config {
    /// Default layout rooted at `base`: `inbox/`, `outbox/`, `failed/`, `state/`.
    pub fn default_in<P: AsRef<Path>>(base: P) -> Self {
        let mut config = Self {
            version: CONFIG_VERSION.to_string(),
            inbox: default_inbox(),
            outbox: default_outbox(),
            failed: default_failed(),
            state_dir: default_state_dir(),
            database: None,
            seen_state: None,
            poll_interval_ms: default_poll_interval_ms(),
            max_error_len: default_max_error_len(),
            hash_chunk_size: default_hash_chunk_size(),
        };
        config.resolve_relative_to(base.as_ref());
        config
    }

    /// Rewrites relative paths as `base.join(path)`.
    pub fn resolve_relative_to(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.inbox);
        resolve(&mut self.outbox);
        resolve(&mut self.failed);
        resolve(&mut self.state_dir);
        if let Some(db) = self.database.as_mut() {
            resolve(db);
        }
        if let Some(seen) = self.seen_state.as_mut() {
            resolve(seen);
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| self.state_dir.join("intake.db"))
    }

    pub fn seen_state_path(&self) -> PathBuf {
        self.seen_state
            .clone()
            .unwrap_or_else(|| self.state_dir.join("seen.json"))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Creates the inbox, outbox, failed and state directories.
    pub fn ensure_directories(&self) -> Result<(), StorageError> {
        for dir in [&self.inbox, &self.outbox, &self.failed, &self.state_dir] {
            std::fs::create_dir_all(dir).map_err(|e| StorageError::CreateDirectory {
                path: dir.clone(),
                source: e,
            })?;
        }
        Ok(())
    }
}

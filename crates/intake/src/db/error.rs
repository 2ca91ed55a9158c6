//! Errors raised by the SQLite layer.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Creating the directory that holds the database file failed.
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    /// A stored value could not be decoded into its Rust type.
    #[error("Invalid value '{value}' in column '{column}'")]
    InvalidRow { column: &'static str, value: String },

    #[error("Database lock poisoned")]
    LockPoisoned,
}

use std::path::PathBuf;
use thiserror::Error;

use crate::digest::ContentDigest;

#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] crate::ledger::LedgerError),

    #[error("Seen-state error: {0}")]
    SeenState(#[from] crate::seen::SeenStateError),

    #[error("Transform error: {0}")]
    Transform(#[from] crate::transform::TransformError),

    #[error("Failed to scan inbox '{path}': {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Config does not match schema: {errors}")]
    SchemaValidation { errors: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move file from '{from}' to '{to}': {source}")]
    MoveFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Why a single job failed. The `Display` text is what the ledger stores.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("source file missing from inbox: {0}")]
    SourceMissing(PathBuf),

    #[error("content changed since enqueue (expected {expected}, found {actual})")]
    ContentChanged {
        expected: ContentDigest,
        actual: ContentDigest,
    },

    #[error("transform failed: {0}")]
    Transform(#[from] crate::transform::TransformError),

    #[error("{0}")]
    Storage(#[from] StorageError),

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode report: {0}")]
    Report(#[from] serde_json::Error),
}

impl JobError {
    /// Short machine-friendly label, used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::SourceMissing(_) => "missing",
            JobError::ContentChanged { .. } => "integrity",
            JobError::Transform(_) => "transform",
            JobError::Storage(_) | JobError::Io { .. } | JobError::Report(_) => "io",
        }
    }
}

pub type Result<T> = std::result::Result<T, IntakeError>;

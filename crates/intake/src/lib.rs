pub mod config;
pub mod db;
pub mod digest;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod seen;
pub mod storage;
pub mod transform;
pub mod worker;

pub use config::{load_config, Config};
pub use digest::ContentDigest;
pub use error::{ConfigError, IntakeError, JobError, Result, StorageError};
pub use ledger::{Job, JobId, JobStatus, Ledger, LedgerError};
pub use transform::{Transform, TransformRegistry, TransformSummary};
pub use worker::{Agent, JobOutcome, JobReport, Report, ScanSummary};

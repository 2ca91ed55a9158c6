use thiserror::Error;

use super::status::JobStatus;
use super::JobId;
use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Ledger storage error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Job #{0} not found")]
    NotFound(JobId),

    /// The requested status change is not in the transition table.
    #[error("Job #{id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    /// Another job is still running; at most one may be in flight.
    #[error("Job #{0} is still running")]
    JobInFlight(JobId),
}

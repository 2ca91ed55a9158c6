//! Job ledger: the durable record of every ingestion job.
//!
//! Each public operation runs in its own IMMEDIATE transaction, so a crash
//! between operations leaves the table in a resumable state. Rows are never
//! deleted.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, info, warn};
use serde::Serialize;

use crate::db::job_repo::{self, JobRow};
use crate::db::{Database, DatabaseError};
use crate::digest::ContentDigest;

pub mod error;
pub mod status;

pub use error::LedgerError;
pub use status::JobStatus;

pub type JobId = i64;

/// Default bound on persisted error text, in characters.
pub const DEFAULT_MAX_ERROR_LEN: usize = 1000;

/// Error text recorded on jobs that were running when the process died and
/// whose source file is gone.
pub const INTERRUPTED_ERROR: &str = "interrupted: process stopped while the job was running";

/// One unit of ingestion work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    pub id: JobId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub filename: String,
    pub content_digest: ContentDigest,
    pub status: JobStatus,
    pub error: Option<String>,
}

impl TryFrom<JobRow> for Job {
    type Error = DatabaseError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let content_digest =
            ContentDigest::from_hex(&row.content_digest).ok_or(DatabaseError::InvalidRow {
                column: "content_digest",
                value: row.content_digest.clone(),
            })?;
        let status = row
            .status
            .parse::<JobStatus>()
            .map_err(|_| DatabaseError::InvalidRow {
                column: "status",
                value: row.status.clone(),
            })?;

        Ok(Self {
            id: row.id,
            created_at: parse_timestamp("created_at", &row.created_at)?,
            updated_at: parse_timestamp("updated_at", &row.updated_at)?,
            filename: row.filename,
            content_digest,
            status,
            error: row.error,
        })
    }
}

/// Result of an enqueue attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    New(JobId),
    /// A job for this `(filename, digest)` pair already exists.
    Duplicate(JobId),
}

/// Per-status totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub queued: u64,
    pub running: u64,
    pub done: u64,
    pub failed: u64,
}

/// What startup recovery did with jobs left in `running`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recovery {
    pub requeued: Vec<JobId>,
    pub completed: Vec<JobId>,
    pub failed: Vec<JobId>,
}

impl Recovery {
    pub fn is_empty(&self) -> bool {
        self.requeued.is_empty() && self.completed.is_empty() && self.failed.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Ledger {
    db: Database,
    max_error_len: usize,
}

impl Ledger {
    pub fn new(db: Database, max_error_len: usize) -> Self {
        Self { db, max_error_len }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Records a new queued job unless this exact `(filename, digest)` pair
    /// has been seen before.
    pub fn enqueue(
        &self,
        filename: &str,
        digest: &ContentDigest,
    ) -> Result<Enqueued, LedgerError> {
        let now = now_string();
        self.db.with_tx(|tx| -> Result<Enqueued, LedgerError> {
            if let Some(id) = job_repo::insert_if_absent(tx, filename, digest.as_str(), &now)? {
                info!("Enqueued job #{} for {} ({})", id, filename, digest.short());
                return Ok(Enqueued::New(id));
            }

            let existing = job_repo::find_by_identity(tx, filename, digest.as_str())?.ok_or(
                DatabaseError::InvalidRow {
                    column: "filename",
                    value: filename.to_string(),
                },
            )?;
            debug!(
                "Job #{} already exists for {} ({})",
                existing.id,
                filename,
                digest.short()
            );
            Ok(Enqueued::Duplicate(existing.id))
        })
    }

    /// Claims the oldest queued job and marks it running.
    ///
    /// Refuses while another job is still running.
    pub fn dequeue_next(&self) -> Result<Option<Job>, LedgerError> {
        let now = now_string();
        self.db.with_tx(|tx| {
            if let Some(running) = job_repo::oldest_with_status(tx, JobStatus::Running.as_str())? {
                return Err(LedgerError::JobInFlight(running.id));
            }

            let Some(row) = job_repo::oldest_with_status(tx, JobStatus::Queued.as_str())? else {
                return Ok(None);
            };

            let changed = job_repo::update_status(
                tx,
                row.id,
                JobStatus::Queued.as_str(),
                JobStatus::Running.as_str(),
                None,
                &now,
            )?;
            if changed != 1 {
                return Ok(None);
            }

            let claimed = job_repo::find_by_id(tx, row.id)?.ok_or(LedgerError::NotFound(row.id))?;
            Ok(Some(Job::try_from(claimed)?))
        })
    }

    /// `running → done`; clears any error text.
    pub fn finalize_success(&self, id: JobId) -> Result<(), LedgerError> {
        self.transition(id, JobStatus::Done, None)
    }

    /// `running → failed`; stores the error text truncated to the configured bound.
    pub fn finalize_failure(&self, id: JobId, error: &str) -> Result<(), LedgerError> {
        let error = truncate_chars(error, self.max_error_len);
        self.transition(id, JobStatus::Failed, Some(&error))
    }

    /// Administrative `failed → queued`, e.g. after fixing a bad input.
    ///
    /// Library API only: the agent never calls this and the `intake` binary
    /// exposes no command for it. An operator tool embedding [`Ledger`]
    /// moves the source from the failed area back into the inbox and then
    /// calls this; the job runs again on the next cycle. The source must be
    /// byte-identical, since the worker re-checks the digest.
    pub fn requeue_failed(&self, id: JobId) -> Result<(), LedgerError> {
        let now = now_string();
        self.db.with_tx(|tx| {
            let current = current_status(tx, id)?;
            if current != JobStatus::Failed {
                return Err(LedgerError::InvalidTransition {
                    id,
                    from: current,
                    to: JobStatus::Queued,
                });
            }
            job_repo::update_status(
                tx,
                id,
                JobStatus::Failed.as_str(),
                JobStatus::Queued.as_str(),
                None,
                &now,
            )?;
            info!("Job #{} requeued", id);
            Ok(())
        })
    }

    /// Resolves jobs left `running` by a previous process.
    ///
    /// A job whose source is still in `inbox` goes back to `queued`; the
    /// worker overwrites any artifacts a half-finished run left behind. A job
    /// whose source is gone is marked done when `completed` confirms its
    /// artifacts are all in place (the crash hit between archiving and
    /// recording), and failed otherwise.
    pub fn recover_interrupted<F>(
        &self,
        inbox: &Path,
        mut completed: F,
    ) -> Result<Recovery, LedgerError>
    where
        F: FnMut(&Job) -> bool,
    {
        let now = now_string();
        let recovery = self.db.with_tx(|tx| {
            let mut recovery = Recovery::default();
            for row in job_repo::list_by_status(tx, JobStatus::Running.as_str())? {
                let job = Job::try_from(row)?;
                let (to, error) = if inbox.join(&job.filename).is_file() {
                    recovery.requeued.push(job.id);
                    (JobStatus::Queued, None)
                } else if completed(&job) {
                    recovery.completed.push(job.id);
                    (JobStatus::Done, None)
                } else {
                    recovery.failed.push(job.id);
                    (JobStatus::Failed, Some(INTERRUPTED_ERROR))
                };
                job_repo::update_status(
                    tx,
                    job.id,
                    JobStatus::Running.as_str(),
                    to.as_str(),
                    error,
                    &now,
                )?;
                warn!(
                    "Recovered interrupted job #{} ({}) -> {}",
                    job.id, job.filename, to
                );
            }
            Ok::<_, LedgerError>(recovery)
        })?;
        Ok(recovery)
    }

    pub fn find(&self, id: JobId) -> Result<Option<Job>, LedgerError> {
        let row = self.db.with_conn(|conn| job_repo::find_by_id(conn, id))?;
        Ok(row.map(Job::try_from).transpose()?)
    }

    pub fn list_by_status(&self, status: JobStatus) -> Result<Vec<Job>, LedgerError> {
        let rows = self
            .db
            .with_conn(|conn| job_repo::list_by_status(conn, status.as_str()))?;
        let jobs = rows
            .into_iter()
            .map(Job::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    pub fn counts(&self) -> Result<StatusCounts, LedgerError> {
        let raw = self.db.with_conn(job_repo::count_by_status)?;
        let mut counts = StatusCounts::default();
        for (status, n) in raw {
            match status.parse::<JobStatus>() {
                Ok(JobStatus::Queued) => counts.queued = n,
                Ok(JobStatus::Running) => counts.running = n,
                Ok(JobStatus::Done) => counts.done = n,
                Ok(JobStatus::Failed) => counts.failed = n,
                Err(_) => {
                    return Err(DatabaseError::InvalidRow {
                        column: "status",
                        value: status,
                    }
                    .into())
                }
            }
        }
        Ok(counts)
    }

    fn transition(&self, id: JobId, to: JobStatus, error: Option<&str>) -> Result<(), LedgerError> {
        let now = now_string();
        self.db.with_tx(|tx| {
            let from = current_status(tx, id)?;
            if !from.can_transition_to(to) {
                return Err(LedgerError::InvalidTransition { id, from, to });
            }
            job_repo::update_status(tx, id, from.as_str(), to.as_str(), error, &now)?;
            debug!("Job #{} {} -> {}", id, from, to);
            Ok(())
        })
    }
}

fn current_status(conn: &rusqlite::Connection, id: JobId) -> Result<JobStatus, LedgerError> {
    let row = job_repo::find_by_id(conn, id)?.ok_or(LedgerError::NotFound(id))?;
    let status = row
        .status
        .parse::<JobStatus>()
        .map_err(|_| DatabaseError::InvalidRow {
            column: "status",
            value: row.status.clone(),
        })?;
    Ok(status)
}

fn now_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(column: &'static str, value: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| DatabaseError::InvalidRow {
            column,
            value: value.to_string(),
        })
}

/// Cuts `text` to at most `max` characters without splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

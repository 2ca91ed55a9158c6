//! The serial worker: one dequeued job at a time, from source bytes to
//! artifacts and a final ledger status.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use log::{debug, error, info, warn};
use tracing::info_span;

use crate::digest::digest_file;
use crate::error::{JobError, Result};
use crate::ledger::{Job, Ledger, LedgerError};
use crate::storage::FileStorage;
use crate::transform::{TransformError, TransformRegistry};
use crate::worker::job::{Finalize, JobOutcome, JobReport, PendingFinalize, Report};

pub struct Worker {
    inbox: PathBuf,
    ledger: Ledger,
    storage: FileStorage,
    registry: Arc<TransformRegistry>,
    hash_chunk_size: usize,
    pending: Option<PendingFinalize>,
}

impl Worker {
    pub fn new<P: AsRef<Path>>(
        inbox: P,
        ledger: Ledger,
        storage: FileStorage,
        registry: Arc<TransformRegistry>,
        hash_chunk_size: usize,
    ) -> Self {
        Self {
            inbox: inbox.as_ref().to_path_buf(),
            ledger,
            storage,
            registry,
            hash_chunk_size,
            pending: None,
        }
    }

    /// True while an outcome is waiting to be written to the ledger.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// True when every artifact of `job` is in the outbox and the archived
    /// source still carries the job's digest.
    pub fn has_completed(&self, job: &Job) -> bool {
        let Some(transform) = self.registry.for_path(Path::new(&job.filename)) else {
            return false;
        };
        let paths = self
            .storage
            .artifact_paths(&job.filename, transform.output_extension());
        if !(paths.output.is_file() && paths.report.is_file() && paths.archived.is_file()) {
            return false;
        }
        match digest_file(&paths.archived, self.hash_chunk_size) {
            Ok(actual) => actual == job.content_digest,
            Err(e) => {
                warn!("Could not hash {}: {}", paths.archived.display(), e);
                false
            }
        }
    }

    /// Retries any unrecorded outcome, then processes at most one job.
    ///
    /// Job failures are reported inside the returned [`JobReport`]; an `Err`
    /// means the ledger itself could not be used this cycle.
    pub fn run_once(&mut self) -> Result<Option<JobReport>> {
        self.flush_pending()?;

        let Some(job) = self.ledger.dequeue_next()? else {
            return Ok(None);
        };

        let _job_span = info_span!("job",
            job_id = job.id,
            filename = %job.filename,
            digest = %job.content_digest.short(),
        )
        .entered();

        let outcome = self.process(&job);
        match &outcome {
            JobOutcome::Done(report) => info!(
                "Job #{} done: {} rows in, {} out, {} dropped",
                job.id,
                report.summary.input_rows,
                report.summary.output_rows,
                report.summary.dropped_rows
            ),
            JobOutcome::Failed(err) => {
                warn!("Job #{} failed ({}): {}", job.id, err.kind(), err)
            }
        }

        let pending = PendingFinalize {
            job_id: job.id,
            finalize: Finalize::from(&outcome),
        };
        let recorded = match self.record(&pending) {
            Ok(()) => true,
            Err(e) => {
                error!(
                    "Could not record outcome of job #{}, will retry: {}",
                    job.id, e
                );
                self.pending = Some(pending);
                false
            }
        };

        Ok(Some(JobReport {
            job_id: job.id,
            filename: job.filename,
            outcome,
            recorded,
        }))
    }

    fn flush_pending(&mut self) -> std::result::Result<(), LedgerError> {
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };

        // The earlier write may have landed even though it reported an error.
        match self.ledger.find(pending.job_id) {
            Ok(Some(job)) if job.status.is_terminal() => {
                info!(
                    "Outcome of job #{} was already recorded as {}",
                    job.id, job.status
                );
                return Ok(());
            }
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!("Job #{} vanished from the ledger", pending.job_id);
                return Ok(());
            }
            Err(e) => {
                self.pending = Some(pending);
                return Err(e);
            }
        }

        if let Err(e) = self.record(&pending) {
            self.pending = Some(pending);
            return Err(e);
        }
        info!("Recorded held outcome of job #{}", pending.job_id);
        Ok(())
    }

    fn record(&self, pending: &PendingFinalize) -> std::result::Result<(), LedgerError> {
        match &pending.finalize {
            Finalize::Success => self.ledger.finalize_success(pending.job_id),
            Finalize::Failure(text) => self.ledger.finalize_failure(pending.job_id, text),
        }
    }

    fn process(&self, job: &Job) -> JobOutcome {
        let source = self.inbox.join(&job.filename);
        let mut written = Vec::new();

        match self.execute(job, &source, &mut written) {
            Ok(report) => JobOutcome::Done(report),
            Err(err) => {
                self.discard(&written);
                self.quarantine(job, &source);
                JobOutcome::Failed(err)
            }
        }
    }

    fn execute(
        &self,
        job: &Job,
        source: &Path,
        written: &mut Vec<PathBuf>,
    ) -> std::result::Result<Report, JobError> {
        // Step 1: Locate and verify source
        {
            let _step = info_span!("verify_source").entered();
            if !source.is_file() {
                return Err(JobError::SourceMissing(source.to_path_buf()));
            }
            let actual =
                digest_file(source, self.hash_chunk_size).map_err(|e| JobError::Io {
                    path: source.to_path_buf(),
                    source: e,
                })?;
            if actual != job.content_digest {
                return Err(JobError::ContentChanged {
                    expected: job.content_digest.clone(),
                    actual,
                });
            }
        }

        let transform = self.registry.for_path(source).ok_or_else(|| {
            let ext = source
                .extension()
                .map(|e| e.to_string_lossy().to_string())
                .unwrap_or_default();
            TransformError::Unsupported(ext)
        })?;
        let paths = self
            .storage
            .artifact_paths(&job.filename, transform.output_extension());

        // Step 2: Transform into the outbox
        let summary = {
            let _step = info_span!("transform", name = transform.name()).entered();
            let input = File::open(source).map_err(|e| JobError::Io {
                path: source.to_path_buf(),
                source: e,
            })?;
            let mut staged = self.storage.stage(&paths.output)?;
            let summary = transform.apply(&mut BufReader::new(input), staged.writer())?;
            written.push(staged.commit()?);
            summary
        };

        // Step 3: Write report
        let report = {
            let _step = info_span!("write_report").entered();
            let report = Report {
                summary,
                job_id: job.id,
                filename: job.filename.clone(),
                transform: transform.name().to_string(),
                processed_at: Utc::now(),
            };
            written.push(self.storage.write_atomic(&paths.report, &report.to_json()?)?);
            report
        };

        // Step 4: Archive source
        {
            let _step = info_span!("archive_source").entered();
            self.storage.archive_success(source, &paths.archived)?;
            debug!("Archived {} to {}", job.filename, paths.archived.display());
        }

        Ok(report)
    }

    /// Removes artifacts of a job that did not complete.
    fn discard(&self, written: &[PathBuf]) {
        for path in written {
            if let Err(e) = std::fs::remove_file(path) {
                warn!("Could not remove partial artifact {}: {}", path.display(), e);
            }
        }
    }

    /// Moves the source, if still in the inbox, into the failed area.
    fn quarantine(&self, job: &Job, source: &Path) {
        if !source.is_file() {
            return;
        }
        match self.storage.archive_failure(source, &job.filename) {
            Ok(dest) => info!("Moved {} to {}", job.filename, dest.display()),
            Err(e) => error!("Could not move {} out of the inbox: {}", job.filename, e),
        }
    }
}

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info, warn};
use tracing::debug_span;

use crate::digest::{digest_file, ContentDigest};
use crate::error::Result;
use crate::ledger::{Enqueued, Ledger};
use crate::seen::{EnqueuedMark, SeenState, Stability};
use crate::transform::TransformRegistry;
use crate::worker::scanner::{Candidate, InboxScanner};

/// Per-scan counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub candidates: usize,
    /// Not yet stable.
    pub pending: usize,
    pub enqueued: usize,
    /// Stable, but already enqueued under this name with this content.
    pub duplicates: usize,
    /// Transient stat/read failures; retried next scan.
    pub errors: usize,
}

enum Sighting {
    Pending,
    Enqueued,
    Duplicate,
}

/// Feeds inbox files through stability, identity and the ledger.
pub struct Watcher {
    scanner: InboxScanner,
    ledger: Ledger,
    hash_chunk_size: usize,
}

impl Watcher {
    pub fn new<P: AsRef<Path>>(
        inbox: P,
        ledger: Ledger,
        registry: Arc<TransformRegistry>,
        hash_chunk_size: usize,
    ) -> Self {
        Self {
            scanner: InboxScanner::new(inbox, registry),
            ledger,
            hash_chunk_size,
        }
    }

    pub fn inbox(&self) -> &Path {
        self.scanner.inbox()
    }

    /// One pass over the inbox.
    ///
    /// Per-file I/O problems are counted and skipped. Ledger failures abort
    /// the scan; `seen` keeps whatever was recorded before the failure.
    pub fn scan_once(&self, seen: &mut SeenState) -> Result<ScanSummary> {
        let candidates = self.scanner.scan()?;
        let mut summary = ScanSummary {
            candidates: candidates.len(),
            ..ScanSummary::default()
        };

        for candidate in &candidates {
            let _span = debug_span!("candidate", filename = %candidate.filename).entered();
            match self.consider(seen, candidate) {
                Ok(Some(Sighting::Pending)) => summary.pending += 1,
                Ok(Some(Sighting::Enqueued)) => summary.enqueued += 1,
                Ok(Some(Sighting::Duplicate)) => summary.duplicates += 1,
                Ok(None) => summary.errors += 1,
                Err(e) => return Err(e),
            }
        }

        let present: BTreeSet<String> = candidates.into_iter().map(|c| c.filename).collect();
        seen.retain_present(&present);

        if summary.enqueued > 0 {
            info!(
                "Scan: {} candidates, {} enqueued, {} pending, {} duplicates, {} errors",
                summary.candidates,
                summary.enqueued,
                summary.pending,
                summary.duplicates,
                summary.errors
            );
        } else {
            debug!("Scan: {:?}", summary);
        }
        Ok(summary)
    }

    /// `Ok(None)` means a transient error that was already logged.
    fn consider(&self, seen: &mut SeenState, candidate: &Candidate) -> Result<Option<Sighting>> {
        let metadata = match std::fs::metadata(&candidate.path) {
            Ok(m) => m,
            Err(e) => {
                warn!("Cannot stat {}: {}", candidate.filename, e);
                return Ok(None);
            }
        };
        let size = metadata.len();

        if seen.observe_size(&candidate.filename, size) == Stability::Pending {
            debug!("{} not stable yet ({} bytes)", candidate.filename, size);
            return Ok(Some(Sighting::Pending));
        }

        let modified_ms = metadata.modified().ok().and_then(millis_since_epoch);
        let digest = match seen
            .known_digest(&candidate.filename, size, modified_ms)
            .cloned()
        {
            Some(digest) => digest,
            None => match self.hash(candidate) {
                Some(digest) => digest,
                None => return Ok(None),
            },
        };

        if seen.was_enqueued(&candidate.filename, &digest) {
            return Ok(Some(Sighting::Duplicate));
        }

        let sighting = match self.ledger.enqueue(&candidate.filename, &digest)? {
            Enqueued::New(_) => Sighting::Enqueued,
            Enqueued::Duplicate(_) => Sighting::Duplicate,
        };
        seen.mark_enqueued(
            &candidate.filename,
            EnqueuedMark {
                digest,
                size,
                modified_ms,
            },
        );
        Ok(Some(sighting))
    }

    fn hash(&self, candidate: &Candidate) -> Option<ContentDigest> {
        match digest_file(&candidate.path, self.hash_chunk_size) {
            Ok(digest) => Some(digest),
            Err(e) => {
                warn!("Cannot hash {}: {}", candidate.filename, e);
                None
            }
        }
    }
}

fn millis_since_epoch(time: SystemTime) -> Option<i64> {
    let elapsed = time.duration_since(UNIX_EPOCH).ok()?;
    i64::try_from(elapsed.as_millis()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::digest::DEFAULT_CHUNK_SIZE;
    use crate::ledger::{JobStatus, DEFAULT_MAX_ERROR_LEN};
    use tempfile::TempDir;

    fn setup() -> (TempDir, Watcher, Ledger) {
        let temp = TempDir::new().unwrap();
        let db = Database::open_in_memory().unwrap();
        let ledger = Ledger::new(db, DEFAULT_MAX_ERROR_LEN);
        let watcher = Watcher::new(
            temp.path(),
            ledger.clone(),
            Arc::new(TransformRegistry::with_defaults()),
            DEFAULT_CHUNK_SIZE,
        );
        (temp, watcher, ledger)
    }

    #[test]
    fn test_file_enqueued_on_second_scan() {
        let (temp, watcher, ledger) = setup();
        let mut seen = SeenState::new();
        std::fs::write(temp.path().join("a.csv"), "a,b\n1,2\n").unwrap();

        let first = watcher.scan_once(&mut seen).unwrap();
        assert_eq!(first.pending, 1);
        assert_eq!(first.enqueued, 0);

        let second = watcher.scan_once(&mut seen).unwrap();
        assert_eq!(second.enqueued, 1);

        let queued = ledger.list_by_status(JobStatus::Queued).unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].filename, "a.csv");
    }

    #[test]
    fn test_growing_file_waits() {
        let (temp, watcher, ledger) = setup();
        let mut seen = SeenState::new();
        let path = temp.path().join("grow.csv");

        std::fs::write(&path, "a\n").unwrap();
        watcher.scan_once(&mut seen).unwrap();
        std::fs::write(&path, "a\n1\n").unwrap();
        let summary = watcher.scan_once(&mut seen).unwrap();
        assert_eq!(summary.pending, 1);
        assert_eq!(ledger.counts().unwrap().queued, 0);

        let summary = watcher.scan_once(&mut seen).unwrap();
        assert_eq!(summary.enqueued, 1);
    }

    #[test]
    fn test_repeated_scans_enqueue_once() {
        let (temp, watcher, ledger) = setup();
        let mut seen = SeenState::new();
        std::fs::write(temp.path().join("a.csv"), "a\n1\n").unwrap();

        for _ in 0..5 {
            watcher.scan_once(&mut seen).unwrap();
        }

        assert_eq!(ledger.counts().unwrap().queued, 1);
    }

    #[test]
    fn test_lost_seen_state_still_dedups() {
        let (temp, watcher, ledger) = setup();
        std::fs::write(temp.path().join("a.csv"), "a\n1\n").unwrap();

        let mut seen = SeenState::new();
        watcher.scan_once(&mut seen).unwrap();
        watcher.scan_once(&mut seen).unwrap();

        let mut fresh = SeenState::new();
        watcher.scan_once(&mut fresh).unwrap();
        let summary = watcher.scan_once(&mut fresh).unwrap();

        assert_eq!(summary.duplicates, 1);
        assert_eq!(summary.enqueued, 0);
        assert_eq!(ledger.counts().unwrap().queued, 1);
    }

    #[test]
    fn test_zero_byte_file_never_enqueued() {
        let (temp, watcher, ledger) = setup();
        let mut seen = SeenState::new();
        std::fs::write(temp.path().join("empty.csv"), "").unwrap();

        for _ in 0..4 {
            let summary = watcher.scan_once(&mut seen).unwrap();
            assert_eq!(summary.pending, 1);
        }

        assert_eq!(ledger.counts().unwrap(), Default::default());
    }

    #[test]
    fn test_removed_file_is_forgotten() {
        let (temp, watcher, _ledger) = setup();
        let mut seen = SeenState::new();
        let path = temp.path().join("a.csv");
        std::fs::write(&path, "a\n").unwrap();

        watcher.scan_once(&mut seen).unwrap();
        std::fs::remove_file(&path).unwrap();
        watcher.scan_once(&mut seen).unwrap();

        assert!(seen.is_empty());
    }

    #[test]
    fn test_changed_content_same_name_is_new_job() {
        let (temp, watcher, ledger) = setup();
        let mut seen = SeenState::new();
        let path = temp.path().join("a.csv");

        std::fs::write(&path, "a\n1\n").unwrap();
        watcher.scan_once(&mut seen).unwrap();
        watcher.scan_once(&mut seen).unwrap();

        std::fs::write(&path, "a\n22\n").unwrap();
        let summary = watcher.scan_once(&mut seen).unwrap();
        assert_eq!(summary.pending, 1);
        let summary = watcher.scan_once(&mut seen).unwrap();

        assert_eq!(summary.enqueued, 1);
        assert_eq!(ledger.counts().unwrap().queued, 2);
    }

    #[test]
    fn test_unsupported_files_ignored() {
        let (temp, watcher, _ledger) = setup();
        let mut seen = SeenState::new();
        std::fs::write(temp.path().join("readme.txt"), "hi").unwrap();

        let summary = watcher.scan_once(&mut seen).unwrap();
        assert_eq!(summary, ScanSummary::default());
    }
}

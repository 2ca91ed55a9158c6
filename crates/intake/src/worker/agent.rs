use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{error, info, warn};
use tracing::info_span;

use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::ledger::Ledger;
use crate::seen::{SeenState, SeenStateStore};
use crate::storage::FileStorage;
use crate::transform::TransformRegistry;
use crate::worker::job::JobReport;
use crate::worker::processor::Worker;
use crate::worker::watcher::{ScanSummary, Watcher};

const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// What one cycle did.
#[derive(Debug)]
pub struct Tick {
    pub scan: ScanSummary,
    pub job: Option<JobReport>,
}

/// The long-running ingestion process: owns the ledger, seen-state, watcher
/// and worker, and drives them one cycle at a time.
pub struct Agent {
    config: Config,
    ledger: Ledger,
    seen: SeenState,
    seen_store: SeenStateStore,
    watcher: Watcher,
    worker: Worker,
}

impl Agent {
    /// Opens the agent with the default transforms.
    pub fn open(config: Config) -> Result<Self> {
        Self::with_registry(config, TransformRegistry::with_defaults())
    }

    pub fn with_registry(config: Config, registry: TransformRegistry) -> Result<Self> {
        config.ensure_directories()?;

        let db = Database::open(&config.database_path())?;
        let ledger = Ledger::new(db, config.max_error_len);

        let registry = Arc::new(registry);
        let worker = Worker::new(
            &config.inbox,
            ledger.clone(),
            FileStorage::new(&config.outbox, &config.failed),
            Arc::clone(&registry),
            config.hash_chunk_size,
        );

        let recovery = ledger.recover_interrupted(&config.inbox, |job| worker.has_completed(job))?;
        if !recovery.is_empty() {
            warn!(
                "Recovered interrupted jobs: {} requeued, {} completed, {} failed",
                recovery.requeued.len(),
                recovery.completed.len(),
                recovery.failed.len()
            );
        }

        let counts = ledger.counts()?;
        info!(
            "Ledger: {} queued, {} running, {} done, {} failed",
            counts.queued, counts.running, counts.done, counts.failed
        );

        let seen_store = SeenStateStore::new(config.seen_state_path());
        let seen = seen_store.load();

        let watcher = Watcher::new(
            &config.inbox,
            ledger.clone(),
            registry,
            config.hash_chunk_size,
        );

        info!(
            "Watching {} (outbox {}, failed {})",
            config.inbox.display(),
            config.outbox.display(),
            config.failed.display()
        );

        Ok(Self {
            config,
            ledger,
            seen,
            seen_store,
            watcher,
            worker,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn seen(&self) -> &SeenState {
        &self.seen
    }

    /// Scan, persist seen-state, then run at most one job.
    ///
    /// A failed scan skips the rest of the cycle. A failed seen-state save
    /// does not, since the ledger still prevents duplicates.
    pub fn tick(&mut self) -> Result<Tick> {
        let scan = self.watcher.scan_once(&mut self.seen)?;

        if let Err(e) = self.seen_store.save(&self.seen) {
            warn!("Could not save seen-state: {}", e);
        }

        let job = self.worker.run_once()?;
        Ok(Tick { scan, job })
    }

    /// Runs cycles until `shutdown` is set. Errors in a cycle are logged and
    /// the loop carries on after the poll interval.
    pub fn run(&mut self, shutdown: Arc<AtomicBool>) {
        info!(
            "Intake agent running (poll interval {} ms)",
            self.config.poll_interval_ms
        );
        let mut cycle: u64 = 0;

        while !shutdown.load(Ordering::Relaxed) {
            cycle += 1;
            {
                let _cycle_span = info_span!("cycle", n = cycle).entered();
                if let Err(e) = self.tick() {
                    error!("Cycle {} failed: {}", cycle, e);
                }
            }
            self.sleep(&shutdown);
        }

        if let Err(e) = self.seen_store.save(&self.seen) {
            warn!("Could not save seen-state on shutdown: {}", e);
        }
        info!("Intake agent stopped after {} cycles", cycle);
    }

    fn sleep(&self, shutdown: &AtomicBool) {
        let deadline = Instant::now() + self.config.poll_interval();
        while !shutdown.load(Ordering::Relaxed) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}

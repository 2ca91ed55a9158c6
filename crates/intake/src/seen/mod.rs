//! Seen-state: per-filename bookkeeping owned by the watcher.
//!
//! Two maps survive restarts: the size observed on the previous scan (for
//! stability) and a fingerprint of the content last enqueued (to skip
//! re-hashing an unchanged file). Both are advisory; the ledger's unique
//! `(filename, digest)` constraint is what prevents duplicate jobs.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::digest::ContentDigest;

pub mod store;

pub use store::{SeenStateError, SeenStateStore};

/// Outcome of comparing a file's size with the previous scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stability {
    Stable,
    /// First sighting, size changed, or the file is still empty.
    Pending,
}

/// What was true about a file when its content was last enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueuedMark {
    pub digest: ContentDigest,
    pub size: u64,
    /// Modification time in milliseconds since the epoch, when available.
    pub modified_ms: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeenState {
    #[serde(default)]
    pub sizes: BTreeMap<String, u64>,
    #[serde(default)]
    pub enqueued: BTreeMap<String, EnqueuedMark>,
}

impl SeenState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `size` for `filename` and reports whether it matches the
    /// previous observation.
    ///
    /// A zero-length file is never stable: producers commonly create the file
    /// before writing to it.
    pub fn observe_size(&mut self, filename: &str, size: u64) -> Stability {
        let previous = self.sizes.insert(filename.to_string(), size);
        match previous {
            Some(prev) if prev == size && size > 0 => Stability::Stable,
            _ => Stability::Pending,
        }
    }

    /// Digest recorded at enqueue time, if the file still has the same size
    /// and modification time it had then.
    pub fn known_digest(
        &self,
        filename: &str,
        size: u64,
        modified_ms: Option<i64>,
    ) -> Option<&ContentDigest> {
        self.enqueued
            .get(filename)
            .filter(|mark| mark.size == size && modified_ms.is_some() && mark.modified_ms == modified_ms)
            .map(|mark| &mark.digest)
    }

    /// True when `digest` is what was last enqueued under `filename`.
    pub fn was_enqueued(&self, filename: &str, digest: &ContentDigest) -> bool {
        self.enqueued
            .get(filename)
            .map(|mark| &mark.digest == digest)
            .unwrap_or(false)
    }

    pub fn mark_enqueued(&mut self, filename: &str, mark: EnqueuedMark) {
        self.enqueued.insert(filename.to_string(), mark);
    }

    /// Drops entries for files that are no longer in the inbox, so a file
    /// that comes back has to stabilize again.
    pub fn retain_present(&mut self, present: &BTreeSet<String>) {
        self.sizes.retain(|name, _| present.contains(name));
        self.enqueued.retain(|name, _| present.contains(name));
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty() && self.enqueued.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::digest_reader;

    fn mark(bytes: &[u8], modified_ms: Option<i64>) -> EnqueuedMark {
        EnqueuedMark {
            digest: digest_reader(bytes, 16).unwrap(),
            size: bytes.len() as u64,
            modified_ms,
        }
    }

    #[test]
    fn test_first_sighting_is_pending() {
        let mut seen = SeenState::new();
        assert_eq!(seen.observe_size("a.csv", 10), Stability::Pending);
        assert_eq!(seen.sizes.get("a.csv"), Some(&10));
    }

    #[test]
    fn test_stable_after_unchanged_size() {
        let mut seen = SeenState::new();
        seen.observe_size("a.csv", 10);
        assert_eq!(seen.observe_size("a.csv", 10), Stability::Stable);
        assert_eq!(seen.observe_size("a.csv", 10), Stability::Stable);
    }

    #[test]
    fn test_growing_file_never_stable() {
        let mut seen = SeenState::new();
        for size in 1..20 {
            assert_eq!(seen.observe_size("a.csv", size), Stability::Pending);
        }
        // Eligible exactly one observation after growth stops.
        assert_eq!(seen.observe_size("a.csv", 19), Stability::Stable);
    }

    #[test]
    fn test_empty_file_never_stable() {
        let mut seen = SeenState::new();
        for _ in 0..5 {
            assert_eq!(seen.observe_size("empty.csv", 0), Stability::Pending);
        }
    }

    #[test]
    fn test_known_digest_requires_same_size_and_mtime() {
        let mut seen = SeenState::new();
        let m = mark(b"abc", Some(1_000));
        let digest = m.digest.clone();
        seen.mark_enqueued("a.csv", m);

        assert_eq!(seen.known_digest("a.csv", 3, Some(1_000)), Some(&digest));
        assert_eq!(seen.known_digest("a.csv", 3, Some(2_000)), None);
        assert_eq!(seen.known_digest("a.csv", 4, Some(1_000)), None);
        assert_eq!(seen.known_digest("b.csv", 3, Some(1_000)), None);
    }

    #[test]
    fn test_known_digest_without_mtime_forces_hash() {
        let mut seen = SeenState::new();
        seen.mark_enqueued("a.csv", mark(b"abc", None));
        assert_eq!(seen.known_digest("a.csv", 3, None), None);
    }

    #[test]
    fn test_was_enqueued() {
        let mut seen = SeenState::new();
        let m = mark(b"abc", None);
        let digest = m.digest.clone();
        seen.mark_enqueued("a.csv", m);

        assert!(seen.was_enqueued("a.csv", &digest));
        assert!(!seen.was_enqueued("b.csv", &digest));
        assert!(!seen.was_enqueued("a.csv", &digest_reader(&b"xyz"[..], 16).unwrap()));
    }

    #[test]
    fn test_retain_present() {
        let mut seen = SeenState::new();
        seen.observe_size("a.csv", 1);
        seen.observe_size("b.csv", 1);
        seen.mark_enqueued("b.csv", mark(b"b", None));

        let present: BTreeSet<String> = ["a.csv".to_string()].into_iter().collect();
        seen.retain_present(&present);

        assert!(seen.sizes.contains_key("a.csv"));
        assert!(!seen.sizes.contains_key("b.csv"));
        assert!(seen.enqueued.is_empty());
    }
}

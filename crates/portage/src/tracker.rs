//! Shared bookkeeping of files already handed to the pipeline.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Set of tracked file identities considered already submitted.
///
/// Shared between the scanner loop (reads it to compute the delta, replaces
/// it wholesale after each scan) and the status processor (removes entries on
/// failure outcomes so the next scan re-offers them). Handles are cheap
/// clones of one underlying set; every mutation happens under the lock, so
/// neither loop can observe a half-applied snapshot.
#[derive(Debug, Clone, Default)]
pub struct ProcessedSet {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl ProcessedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identities among `candidates` that are not tracked yet, i.e. the files
    /// the scanner still has to submit.
    pub fn difference(&self, candidates: &[String]) -> Vec<String> {
        let tracked = self.inner.lock().unwrap();
        candidates
            .iter()
            .filter(|candidate| !tracked.contains(*candidate))
            .cloned()
            .collect()
    }

    /// Swap in the latest snapshot wholesale, discarding the previous one.
    ///
    /// The set is always recomputed from the newest directory listing instead
    /// of merged: a file gone from disk cannot need retries, and an ever
    /// growing "seen" set would never shrink.
    pub fn replace(&self, snapshot: impl IntoIterator<Item = String>) {
        let next: HashSet<String> = snapshot.into_iter().collect();
        *self.inner.lock().unwrap() = next;
    }

    /// Remove one identity, returning whether it was present. Removing an
    /// absent identity is a tolerated no-op.
    pub fn remove(&self, identity: &str) -> bool {
        self.inner.lock().unwrap().remove(identity)
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.inner.lock().unwrap().contains(identity)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

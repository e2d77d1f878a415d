// crates/db/src/memory.rs
//! In-process summary cache.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;

use lru::LruCache;
use session_scope_types::SessionSummary;

#[derive(Debug, Clone)]
struct MemoryEntry {
    modified: Option<SystemTime>,
    summary: SessionSummary,
}

/// Bounded LRU of summaries keyed by path, valid only for the exact
/// modification time they were built from.
pub struct MemoryCache {
    entries: Mutex<LruCache<PathBuf, MemoryEntry>>,
}

impl MemoryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }

    /// Cached summary for `path` if it was built at exactly `modified`.
    pub fn get(&self, path: &Path, modified: Option<SystemTime>) -> Option<SessionSummary> {
        let mut entries = self.lock();
        let entry = entries.get(path)?;
        (entry.modified == modified).then(|| entry.summary.clone())
    }

    pub fn put(&self, path: PathBuf, modified: Option<SystemTime>, summary: SessionSummary) {
        self.lock().put(path, MemoryEntry { modified, summary });
    }

    pub fn remove(&self, path: &Path) {
        self.lock().pop(path);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<PathBuf, MemoryEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

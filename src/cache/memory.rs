//! In-memory LRU layer.
//!
//! A bounded recency-ordered map of path to [`CacheEntry`], sitting in front
//! of the persistent store so warm lookups never touch SQLite. Not durable;
//! rebuilt lazily from store hits and fresh probes after restart.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use lru::LruCache;
use parking_lot::Mutex;

use crate::cache::entry::CacheEntry;
use crate::cache::now_epoch;
use crate::fingerprint::Fingerprint;

/// Bounded LRU map of cached durations.
pub struct MemoryCache {
    inner: Mutex<LruCache<PathBuf, CacheEntry>>,
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("MemoryCache")
            .field("len", &inner.len())
            .field("capacity", &inner.cap().get())
            .finish()
    }
}

impl MemoryCache {
    /// Create a cache holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Return the entry for `path` if present and still matching `current`.
    ///
    /// A hit is promoted to most-recently-used and gets a fresh
    /// `last_accessed`. An entry whose fingerprint no longer matches is
    /// removed and reported as a miss.
    pub fn get(&self, path: &Path, current: &Fingerprint) -> Option<CacheEntry> {
        let mut inner = self.inner.lock();

        let valid = match inner.peek(path) {
            Some(entry) => entry.is_current(current),
            None => return None,
        };
        if !valid {
            inner.pop(path);
            return None;
        }

        let entry = inner.get_mut(path)?;
        entry.last_accessed = now_epoch();
        Some(entry.clone())
    }

    /// Insert or update an entry, evicting the least-recently-used one when
    /// the cache is at capacity.
    pub fn put(&self, entry: CacheEntry) {
        self.inner.lock().put(entry.path.clone(), entry);
    }

    /// Drop the entry for `path`. Returns whether one was present.
    pub fn remove(&self, path: &Path) -> bool {
        self.inner.lock().pop(path).is_some()
    }

    /// Drop all entries.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Current number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Maximum number of entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.lock().cap().get()
    }
}

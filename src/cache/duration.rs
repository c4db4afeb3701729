//! The duration cache facade.
//!
//! [`DurationCache`] is the only type the playlist layer talks to. It owns
//! both tiers (the LRU layer and the SQLite store), serializes access to
//! them internally, and keeps the two consistent: anything promoted into
//! memory came from the store or was just written to it.
//!
//! No method here panics or returns an error for ordinary conditions:
//! missing files, stale entries, and store hiccups all degrade to a miss or
//! `false`, logged and otherwise invisible to callers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::cache::database::{CacheResult, DurationDatabase};
use crate::cache::entry::CacheEntry;
use crate::cache::memory::MemoryCache;
use crate::cache::now_epoch;
use crate::cache::stats::{CacheStats, Counters};
use crate::config::CacheConfig;
use crate::fingerprint::Fingerprint;

const SECS_PER_DAY: f64 = 86_400.0;

/// Two-tier cache of audio playback durations.
///
/// Construct one explicitly and share it (typically as an `Arc`) between the
/// UI thread and background workers; all mutable state is guarded
/// internally, so every method takes `&self`.
///
/// If the persistent store cannot be opened even after recreating it, the
/// cache runs memory-only: lookups and stores still work for the lifetime of
/// the process, persistence is silently skipped.
#[derive(Debug)]
pub struct DurationCache {
    memory: MemoryCache,
    store: Option<DurationDatabase>,
    counters: Counters,
}

impl DurationCache {
    /// Open a cache described by `config`.
    ///
    /// Only configuration problems (no resolvable cache directory) are
    /// errors; an unusable database file is handled by recreating it, and
    /// failing that, by degrading to memory-only operation.
    pub fn open(config: CacheConfig) -> CacheResult<Self> {
        let db_path = config.resolved_db_path()?;
        let store = match DurationDatabase::open_or_recreate(&db_path, config.busy_timeout) {
            Ok(db) => Some(db),
            Err(err) => {
                log::error!(
                    "duration store at {} could not be opened ({err}); running memory-only",
                    db_path.display()
                );
                None
            }
        };

        Ok(Self {
            memory: MemoryCache::new(config.lru_capacity),
            store,
            counters: Counters::default(),
        })
    }

    /// Open a cache at the per-user default location.
    pub fn open_default() -> CacheResult<Self> {
        Self::open(CacheConfig::default())
    }

    /// Cached duration for `path`, if known and still valid.
    ///
    /// Checks the LRU layer, then the store (fingerprint match first, path
    /// match fallback). Store hits are promoted into memory and touched so
    /// cleanup recency stays accurate. A path-matched row whose fingerprint
    /// no longer matches the file is a miss: the file changed, so its old
    /// duration cannot be trusted until re-probed.
    pub fn get_duration(&self, path: &Path) -> Option<u64> {
        let started = Instant::now();
        let result = self.lookup_one(path);
        self.counters.note_lookups(1, started);
        result
    }

    fn lookup_one(&self, path: &Path) -> Option<u64> {
        let Some(fp) = Fingerprint::of(path) else {
            log::debug!("no fingerprint for {}; miss", path.display());
            self.counters.note_memory_miss();
            self.counters.note_store_miss();
            return None;
        };

        if let Some(entry) = self.memory.get(path, &fp) {
            self.counters.note_memory_hit();
            return Some(entry.duration_secs);
        }
        self.counters.note_memory_miss();

        let Some(store) = self.store.as_ref() else {
            self.counters.note_store_miss();
            return None;
        };

        match store.lookup(path, &fp.digest) {
            Ok(Some(entry)) if entry.is_current(&fp) => {
                let now = now_epoch();
                if let Err(err) = store.touch(path, now) {
                    log::debug!("touch failed for {}: {err}", path.display());
                } else {
                    self.counters.note_touches(1);
                }

                let mut promoted = entry;
                promoted.last_accessed = now;
                let duration = promoted.duration_secs;
                self.memory.put(promoted);

                self.counters.note_store_hit();
                Some(duration)
            }
            Ok(Some(_)) => {
                log::debug!(
                    "stale duration entry for {} (file changed); waiting for re-probe",
                    path.display()
                );
                self.counters.note_store_miss();
                None
            }
            Ok(None) => {
                self.counters.note_store_miss();
                None
            }
            Err(err) => {
                log::warn!("duration lookup failed for {}: {err}", path.display());
                self.counters.note_store_miss();
                None
            }
        }
    }

    /// Batched [`get_duration`](Self::get_duration).
    ///
    /// Valid in-memory hits are answered directly; everything else goes to
    /// the store in a single batched query. Every input path appears in the
    /// result, with `None` for true misses. Store hits are promoted into the
    /// LRU layer.
    pub fn get_durations_batch(&self, paths: &[PathBuf]) -> HashMap<PathBuf, Option<u64>> {
        let started = Instant::now();
        let mut results: HashMap<PathBuf, Option<u64>> = HashMap::with_capacity(paths.len());
        let mut wants: Vec<(PathBuf, String)> = Vec::new();
        let mut fingerprints: HashMap<PathBuf, Fingerprint> = HashMap::new();

        for path in paths {
            if results.contains_key(path) || fingerprints.contains_key(path) {
                continue; // duplicate input path
            }
            let Some(fp) = Fingerprint::of(path) else {
                self.counters.note_memory_miss();
                self.counters.note_store_miss();
                results.insert(path.clone(), None);
                continue;
            };
            if let Some(entry) = self.memory.get(path, &fp) {
                self.counters.note_memory_hit();
                results.insert(path.clone(), Some(entry.duration_secs));
                continue;
            }
            self.counters.note_memory_miss();
            wants.push((path.clone(), fp.digest.clone()));
            fingerprints.insert(path.clone(), fp);
        }

        if !wants.is_empty() {
            match self.store.as_ref() {
                Some(store) => {
                    self.resolve_batch_from_store(store, &wants, &fingerprints, &mut results)
                }
                None => {
                    for (path, _) in wants {
                        self.counters.note_store_miss();
                        results.insert(path, None);
                    }
                }
            }
        }

        self.counters.note_lookups(paths.len() as u64, started);
        results
    }

    fn resolve_batch_from_store(
        &self,
        store: &DurationDatabase,
        wants: &[(PathBuf, String)],
        fingerprints: &HashMap<PathBuf, Fingerprint>,
        results: &mut HashMap<PathBuf, Option<u64>>,
    ) {
        let found = match store.lookup_batch(wants) {
            Ok(found) => found,
            Err(err) => {
                log::warn!("batched duration lookup failed: {err}");
                for (path, _) in wants {
                    self.counters.note_store_miss();
                    results.insert(path.clone(), None);
                }
                return;
            }
        };

        let now = now_epoch();
        let mut hit_paths: Vec<&Path> = Vec::new();
        for (path, _) in wants {
            let fp = &fingerprints[path];
            match found.get(path) {
                Some(entry) if entry.is_current(fp) => {
                    self.counters.note_store_hit();
                    let mut promoted = entry.clone();
                    promoted.path = path.clone();
                    promoted.last_accessed = now;
                    results.insert(path.clone(), Some(promoted.duration_secs));
                    self.memory.put(promoted);
                    hit_paths.push(path);
                }
                Some(_) => {
                    log::debug!(
                        "stale duration entry for {} (file changed); waiting for re-probe",
                        path.display()
                    );
                    self.counters.note_store_miss();
                    results.insert(path.clone(), None);
                }
                None => {
                    self.counters.note_store_miss();
                    results.insert(path.clone(), None);
                }
            }
        }

        if !hit_paths.is_empty() {
            if let Err(err) = store.touch_batch(&hit_paths, now) {
                log::debug!("batched touch failed: {err}");
            } else {
                self.counters.note_touches(hit_paths.len() as u64);
            }
        }
    }

    /// Record a probed duration for `path` in both layers.
    ///
    /// Returns `false` if the file cannot be fingerprinted (missing or
    /// unreadable) or the store write fails. The store write is
    /// authoritative; the in-memory put cannot fail. Storing the same
    /// duration twice for an unchanged file leaves a single record.
    pub fn store_duration(
        &self,
        path: &Path,
        duration_secs: u64,
        format: Option<&str>,
        bitrate: Option<u32>,
    ) -> bool {
        let Some(fp) = Fingerprint::of(path) else {
            log::debug!("cannot fingerprint {}; duration not stored", path.display());
            return false;
        };

        let entry = CacheEntry::new(path, &fp, duration_secs, format.map(str::to_owned), bitrate);

        if let Some(store) = self.store.as_ref() {
            if let Err(err) = store.upsert(&entry) {
                log::warn!("failed to persist duration for {}: {err}", path.display());
                return false;
            }
        }

        self.memory.put(entry);
        self.counters.note_insert();
        true
    }

    /// Drop `path` from both layers. Use when a file is known to have
    /// changed externally.
    pub fn invalidate(&self, path: &Path) {
        self.memory.remove(path);
        if let Some(store) = self.store.as_ref() {
            if let Err(err) = store.delete_path(path) {
                log::warn!("failed to invalidate {}: {err}", path.display());
            }
        }
    }

    /// Remove persistent entries not accessed for `max_age_days` days,
    /// dropping the same paths from the LRU layer. Returns the number of
    /// entries removed.
    pub fn cleanup(&self, max_age_days: u64) -> usize {
        let Some(store) = self.store.as_ref() else {
            return 0;
        };
        let cutoff = now_epoch() - max_age_days as f64 * SECS_PER_DAY;
        match store.delete_older_than(cutoff) {
            Ok((count, paths)) => {
                for path in &paths {
                    self.memory.remove(path);
                }
                log::info!("cleanup removed {count} entries older than {max_age_days} days");
                count
            }
            Err(err) => {
                log::warn!("cache cleanup failed: {err}");
                0
            }
        }
    }

    /// Drop everything from both layers.
    pub fn clear_all(&self) {
        self.memory.clear();
        if let Some(store) = self.store.as_ref() {
            if let Err(err) = store.clear() {
                log::warn!("failed to clear duration store: {err}");
            }
        }
    }

    /// Sum of known durations over `paths`, plus how many are unknown.
    ///
    /// Duplicated paths count once per occurrence, matching what a playlist
    /// footer displays.
    pub fn total_duration(&self, paths: &[PathBuf]) -> (u64, usize) {
        let durations = self.get_durations_batch(paths);
        let mut total = 0u64;
        let mut unknown = 0usize;
        for path in paths {
            match durations.get(path).copied().flatten() {
                Some(duration) => total += duration,
                None => unknown += 1,
            }
        }
        (total, unknown)
    }

    /// Snapshot of the cache's counters and occupancy.
    pub fn stats(&self) -> CacheStats {
        let (rows, bytes, available) = match self.store.as_ref() {
            Some(store) => (
                store.row_count().unwrap_or(0),
                store.on_disk_size_bytes(),
                true,
            ),
            None => (0, 0, false),
        };
        self.counters
            .snapshot(self.memory.len(), self.memory.capacity(), rows, bytes, available)
    }

    /// Whether the persistent store is in use (false when running
    /// memory-only after an unrecoverable open failure).
    #[must_use]
    pub fn persistent_available(&self) -> bool {
        self.store.is_some()
    }
}

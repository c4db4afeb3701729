//! Cache statistics.
//!
//! Counters are plain atomics updated on every operation, so taking a
//! snapshot is cheap enough for a diagnostics panel to poll.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

/// Internal hit/miss accounting, shared across threads without locking.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    memory_hits: AtomicU64,
    memory_misses: AtomicU64,
    store_hits: AtomicU64,
    store_misses: AtomicU64,
    inserts: AtomicU64,
    touches: AtomicU64,
    lookups: AtomicU64,
    lookup_nanos: AtomicU64,
}

impl Counters {
    pub fn note_memory_hit(&self) {
        self.memory_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_memory_miss(&self) {
        self.memory_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_store_hit(&self) {
        self.store_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_store_miss(&self) {
        self.store_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_touches(&self, n: u64) {
        self.touches.fetch_add(n, Ordering::Relaxed);
    }

    /// Account `n` lookups resolved since `started`.
    pub fn note_lookups(&self, n: u64, started: Instant) {
        self.lookups.fetch_add(n, Ordering::Relaxed);
        self.lookup_nanos
            .fetch_add(started.elapsed().as_nanos() as u64, Ordering::Relaxed);
    }

    /// Snapshot the counters together with the layer occupancy figures the
    /// facade supplies.
    pub fn snapshot(
        &self,
        memory_entries: usize,
        memory_capacity: usize,
        persistent_rows: u64,
        on_disk_bytes: u64,
        persistent_available: bool,
    ) -> CacheStats {
        let memory_hits = self.memory_hits.load(Ordering::Relaxed);
        let memory_misses = self.memory_misses.load(Ordering::Relaxed);
        let store_hits = self.store_hits.load(Ordering::Relaxed);
        let store_misses = self.store_misses.load(Ordering::Relaxed);
        let lookups = self.lookups.load(Ordering::Relaxed);
        let lookup_nanos = self.lookup_nanos.load(Ordering::Relaxed);

        let hits = memory_hits + store_hits;
        let hit_rate = if lookups > 0 {
            hits as f64 / lookups as f64
        } else {
            0.0
        };
        let avg_lookup_micros = if lookups > 0 {
            lookup_nanos as f64 / lookups as f64 / 1_000.0
        } else {
            0.0
        };

        CacheStats {
            memory_hits,
            memory_misses,
            store_hits,
            store_misses,
            inserts: self.inserts.load(Ordering::Relaxed),
            touches: self.touches.load(Ordering::Relaxed),
            lookups,
            hit_rate,
            avg_lookup_micros,
            memory_entries,
            memory_capacity,
            persistent_rows,
            on_disk_bytes,
            persistent_available,
        }
    }
}

/// Aggregate cache statistics at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    /// Lookups answered from the in-memory layer.
    pub memory_hits: u64,
    /// Lookups that fell through the in-memory layer.
    pub memory_misses: u64,
    /// Lookups answered from the persistent store.
    pub store_hits: u64,
    /// Lookups the persistent store could not answer.
    pub store_misses: u64,
    /// Records written via store operations.
    pub inserts: u64,
    /// `last_accessed`-only refreshes on persistent hits.
    pub touches: u64,
    /// Total lookups across both layers.
    pub lookups: u64,
    /// Fraction of lookups answered from either layer, 0.0–1.0.
    pub hit_rate: f64,
    /// Mean wall-clock lookup latency in microseconds.
    pub avg_lookup_micros: f64,
    /// Entries currently held in the in-memory layer.
    pub memory_entries: usize,
    /// Capacity of the in-memory layer.
    pub memory_capacity: usize,
    /// Rows in the persistent store.
    pub persistent_rows: u64,
    /// Size of the store's database file in bytes.
    pub on_disk_bytes: u64,
    /// False when the store could not be opened and the cache is running
    /// memory-only.
    pub persistent_available: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counts() {
        let counters = Counters::default();
        counters.note_memory_hit();
        counters.note_memory_miss();
        counters.note_store_hit();
        counters.note_lookups(2, Instant::now());

        let stats = counters.snapshot(1, 100, 5, 4096, true);
        assert_eq!(stats.memory_hits, 1);
        assert_eq!(stats.memory_misses, 1);
        assert_eq!(stats.store_hits, 1);
        assert_eq!(stats.lookups, 2);
        assert_eq!(stats.persistent_rows, 5);
        assert!(stats.persistent_available);
        assert!((stats.hit_rate - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_hit_rate_zero_without_lookups() {
        let counters = Counters::default();
        let stats = counters.snapshot(0, 100, 0, 0, true);
        assert_eq!(stats.hit_rate, 0.0);
        assert_eq!(stats.avg_lookup_micros, 0.0);
    }
}

//! Duration caching module.
//!
//! This module provides two-tier storage for audio playback durations so
//! files never have to be re-decoded just to display their length.
//!
//! # Architecture
//!
//! The caching system is split into a few cooperating components:
//!
//! * [`database`]: SQLite-based persistence, schema management, and batched
//!   lookups. Survives process restarts.
//! * [`memory`]: a bounded LRU layer in front of the database for the hot
//!   working set (the currently displayed playlist).
//! * [`entry`]: the record type stored in both layers and its validity logic.
//! * [`stats`]: hit/miss accounting for diagnostics.
//! * [`duration`]: the [`DurationCache`] facade tying the layers together.
//!
//! # Cache Invalidation
//!
//! Entries are validated using a fingerprint derived from:
//! * File path
//! * File size
//! * Modification time (mtime)
//!
//! If any of these attributes change, the cache entry is considered stale
//! and the duration will be re-probed on the next population pass. Stale
//! entries are never returned as hits; they are overwritten by the next
//! store for the same path.

pub mod database;
pub mod duration;
pub mod entry;
pub mod memory;
pub mod stats;

pub use database::{CacheError, CacheResult, DurationDatabase};
pub use duration::DurationCache;
pub use entry::CacheEntry;
pub use memory::MemoryCache;
pub use stats::CacheStats;

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as fractional seconds since the Unix epoch, the
/// timestamp format used for `last_accessed` throughout the cache.
pub(crate) fn now_epoch() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

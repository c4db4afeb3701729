//! Cache entry definitions.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cache::now_epoch;
use crate::fingerprint::Fingerprint;

/// One file's cached duration fact.
///
/// The fingerprint is the real validity key: an entry is only served as a
/// hit while a freshly computed fingerprint for the file matches the stored
/// one. `format` and `bitrate` are descriptive metadata and play no part in
/// validity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Absolute file path, the primary external identifier.
    pub path: PathBuf,
    /// Audio playback length in seconds.
    pub duration_secs: u64,
    /// Byte size of the file at caching time.
    pub file_size: u64,
    /// File mtime at caching time, seconds since the Unix epoch.
    pub modified_time: f64,
    /// Last successful read, seconds since the Unix epoch. Basis for LRU
    /// recency and age-based cleanup.
    pub last_accessed: f64,
    /// Container/codec name, if the prober reported one.
    pub format: Option<String>,
    /// Bitrate in kbit/s, if the prober reported one.
    pub bitrate: Option<u32>,
    /// Stored fingerprint digest. `None` only for rows written by versions
    /// that predate the fingerprint column.
    pub fingerprint: Option<String>,
}

impl CacheEntry {
    /// Build a fresh entry for `path` from its current fingerprint.
    #[must_use]
    pub fn new(
        path: &Path,
        fingerprint: &Fingerprint,
        duration_secs: u64,
        format: Option<String>,
        bitrate: Option<u32>,
    ) -> Self {
        Self {
            path: path.to_path_buf(),
            duration_secs,
            file_size: fingerprint.size,
            modified_time: fingerprint.modified_time,
            last_accessed: now_epoch(),
            format,
            bitrate,
            fingerprint: Some(fingerprint.digest.clone()),
        }
    }

    /// Whether this entry still describes the file identified by `current`.
    ///
    /// Rows without a stored fingerprint (pre-migration) are never current;
    /// they get refreshed by the next store.
    #[must_use]
    pub fn is_current(&self, current: &Fingerprint) -> bool {
        self.fingerprint.as_deref() == Some(current.digest.as_str())
    }
}

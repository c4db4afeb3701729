//! Cache configuration.
//!
//! A [`CacheConfig`] describes where the persistent store lives and how the
//! in-memory layer is sized. The default database location is resolved with
//! platform conventions (XDG on Linux, AppData on Windows, Library on macOS).

use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;

use crate::cache::{CacheError, CacheResult};

/// Default capacity of the in-memory LRU layer.
pub const DEFAULT_LRU_CAPACITY: usize = 5000;

/// Default SQLite busy timeout before a contended write gives up.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Default age threshold for [`cleanup`](crate::DurationCache::cleanup).
pub const DEFAULT_MAX_AGE_DAYS: u64 = 30;

/// Configuration for a [`DurationCache`](crate::DurationCache).
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Location of the SQLite database. `None` resolves to the per-user
    /// cache directory.
    pub db_path: Option<PathBuf>,
    /// Capacity of the in-memory LRU layer. Values below 1 are clamped.
    pub lru_capacity: usize,
    /// Bounded wait for the store's write lock before an operation fails.
    pub busy_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            lru_capacity: DEFAULT_LRU_CAPACITY,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }
}

impl CacheConfig {
    /// Override the database location (used by tests and embedders that
    /// manage their own data directory).
    #[must_use]
    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = Some(path.into());
        self
    }

    /// Set the in-memory LRU capacity.
    #[must_use]
    pub fn with_lru_capacity(mut self, capacity: usize) -> Self {
        self.lru_capacity = capacity.max(1);
        self
    }

    /// Set the SQLite busy timeout.
    #[must_use]
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// The database path this configuration resolves to.
    pub fn resolved_db_path(&self) -> CacheResult<PathBuf> {
        match &self.db_path {
            Some(path) => Ok(path.clone()),
            None => default_db_path(),
        }
    }
}

/// Platform-specific default location of the duration database.
fn default_db_path() -> CacheResult<PathBuf> {
    let project_dirs =
        ProjectDirs::from("com", "duracache", "duracache").ok_or(CacheError::NoCacheDir)?;
    Ok(project_dirs.cache_dir().join("durations.db"))
}

//! SQLite-backed persistent duration store.
//!
//! One table, `duration_cache`, keyed by path with a secondary fingerprint
//! index. Opened in WAL mode so the UI thread can read while a background
//! worker writes; all writes go through a single `Mutex<Connection>`, and a
//! bounded busy timeout keeps contended operations from blocking forever.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use crate::cache::entry::CacheEntry;

/// Errors surfaced by the cache subsystem.
///
/// Ordinary misses (missing file, stale entry) are not errors; these cover
/// the store itself being unusable or a query genuinely failing.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The underlying SQLite operation failed.
    #[error("duration store error: {0}")]
    Database(#[from] rusqlite::Error),
    /// Filesystem-level failure creating or removing the database.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// No per-user cache directory could be determined for this platform.
    #[error("no per-user cache directory could be determined")]
    NoCacheDir,
}

/// Convenience alias for cache results.
pub type CacheResult<T> = Result<T, CacheError>;

/// Upper bound on values bound into a single `IN (...)` clause. Keeps
/// statements well under SQLite's bound-parameter limit.
const BATCH_CHUNK: usize = 500;

const ENTRY_COLUMNS: &str =
    "path, duration, filesize, modified_time, last_accessed, format, bitrate, fingerprint";

/// Persistent store of [`CacheEntry`] records.
pub struct DurationDatabase {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl std::fmt::Debug for DurationDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurationDatabase")
            .field("db_path", &self.db_path)
            .field("conn", &"<sqlite>")
            .finish()
    }
}

impl DurationDatabase {
    /// Open (or create) the duration database at `path`.
    ///
    /// Creates parent directories, applies the concurrency-friendly PRAGMA
    /// set (WAL journal, NORMAL sync, bounded busy timeout), and ensures the
    /// schema exists. A table created by an older version without the
    /// `fingerprint` column is migrated additively; existing rows keep a
    /// NULL fingerprint and are refreshed on their next store.
    pub fn open(path: &Path, busy_timeout: Duration) -> CacheResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "cache_size", -2000)?;
        conn.pragma_update(None, "temp_store", "MEMORY")?;

        Self::ensure_schema(&conn)?;
        log::debug!("duration store opened at {}", path.display());

        Ok(Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        })
    }

    /// Open the database, deleting and recreating it once if the existing
    /// file is unreadable (corruption, bad schema).
    pub fn open_or_recreate(path: &Path, busy_timeout: Duration) -> CacheResult<Self> {
        match Self::open(path, busy_timeout) {
            Ok(db) => Ok(db),
            Err(err) => {
                log::warn!(
                    "duration store at {} is unusable ({err}); recreating from scratch",
                    path.display()
                );
                remove_database_files(path)?;
                Self::open(path, busy_timeout)
            }
        }
    }

    /// Schema setup and the one-time additive migration, decided once at
    /// open rather than re-introspected on every write.
    fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS duration_cache (
                path          TEXT PRIMARY KEY,
                duration      INTEGER NOT NULL,
                filesize      INTEGER NOT NULL,
                modified_time REAL NOT NULL,
                last_accessed REAL NOT NULL,
                format        TEXT,
                bitrate       INTEGER,
                fingerprint   TEXT
            )",
        )?;

        if !has_fingerprint_column(conn)? {
            log::info!("migrating duration store: adding fingerprint column");
            conn.execute_batch("ALTER TABLE duration_cache ADD COLUMN fingerprint TEXT")?;
        }

        conn.execute_batch(
            "CREATE INDEX IF NOT EXISTS idx_duration_last_accessed
                 ON duration_cache(last_accessed);
             CREATE INDEX IF NOT EXISTS idx_duration_path
                 ON duration_cache(path);
             CREATE INDEX IF NOT EXISTS idx_duration_fingerprint
                 ON duration_cache(fingerprint);",
        )?;

        Ok(())
    }

    /// Look up the best record for `path`: fingerprint match first (content
    /// identity), exact path match as fallback. The caller decides whether a
    /// path-matched row with a differing fingerprint is still usable.
    pub fn lookup(&self, path: &Path, digest: &str) -> CacheResult<Option<CacheEntry>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare_cached(
            "SELECT path, duration, filesize, modified_time, last_accessed,
                    format, bitrate, fingerprint
             FROM duration_cache WHERE fingerprint = ?1 LIMIT 1",
        )?;
        if let Some(entry) = stmt.query_row(params![digest], row_to_entry).optional()? {
            return Ok(Some(entry));
        }

        let mut stmt = conn.prepare_cached(
            "SELECT path, duration, filesize, modified_time, last_accessed,
                    format, bitrate, fingerprint
             FROM duration_cache WHERE path = ?1 LIMIT 1",
        )?;
        Ok(stmt
            .query_row(params![path_key(path)], row_to_entry)
            .optional()?)
    }

    /// Batched lookup: one `IN`-query over fingerprints, one more over paths
    /// for whatever the first didn't resolve. Never one query per path.
    ///
    /// The result is keyed by the *requested* path. Entries found via the
    /// path fallback may carry a stale fingerprint; validity is the
    /// caller's call, same as [`lookup`](Self::lookup).
    pub fn lookup_batch(
        &self,
        wants: &[(PathBuf, String)],
    ) -> CacheResult<HashMap<PathBuf, CacheEntry>> {
        let conn = self.conn.lock();
        let mut by_digest: HashMap<String, CacheEntry> = HashMap::new();

        for chunk in wants.chunks(BATCH_CHUNK) {
            let placeholders = placeholders(chunk.len());
            let sql = format!(
                "SELECT {ENTRY_COLUMNS} FROM duration_cache WHERE fingerprint IN ({placeholders})"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                params_from_iter(chunk.iter().map(|(_, digest)| digest.as_str())),
                row_to_entry,
            )?;
            for entry in rows {
                let entry = entry?;
                if let Some(digest) = entry.fingerprint.clone() {
                    by_digest.insert(digest, entry);
                }
            }
        }

        let mut results: HashMap<PathBuf, CacheEntry> = HashMap::with_capacity(wants.len());
        let mut unresolved: Vec<&PathBuf> = Vec::new();
        for (path, digest) in wants {
            match by_digest.get(digest) {
                Some(entry) => {
                    results.insert(path.clone(), entry.clone());
                }
                None => unresolved.push(path),
            }
        }

        for chunk in unresolved.chunks(BATCH_CHUNK) {
            let placeholders = placeholders(chunk.len());
            let sql = format!(
                "SELECT {ENTRY_COLUMNS} FROM duration_cache WHERE path IN ({placeholders})"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                params_from_iter(chunk.iter().map(|path| path_key(path))),
                row_to_entry,
            )?;
            for entry in rows {
                let entry = entry?;
                results.insert(entry.path.clone(), entry);
            }
        }

        Ok(results)
    }

    /// Insert or replace the record for `entry.path`. Safe to call from any
    /// thread; writes are serialized by the connection mutex.
    pub fn upsert(&self, entry: &CacheEntry) -> CacheResult<()> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "INSERT OR REPLACE INTO duration_cache
                (path, duration, filesize, modified_time, last_accessed,
                 format, bitrate, fingerprint)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        stmt.execute(params![
            path_key(&entry.path),
            entry.duration_secs as i64,
            entry.file_size as i64,
            entry.modified_time,
            entry.last_accessed,
            entry.format,
            entry.bitrate,
            entry.fingerprint,
        ])?;
        Ok(())
    }

    /// Refresh only `last_accessed`, keeping hit recency accurate without
    /// rewriting the whole record.
    pub fn touch(&self, path: &Path, now: f64) -> CacheResult<()> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "UPDATE duration_cache SET last_accessed = ?1 WHERE path = ?2",
        )?;
        stmt.execute(params![now, path_key(path)])?;
        Ok(())
    }

    /// Batched [`touch`](Self::touch) for the hits of a batch lookup.
    pub fn touch_batch(&self, paths: &[&Path], now: f64) -> CacheResult<()> {
        let conn = self.conn.lock();
        for chunk in paths.chunks(BATCH_CHUNK) {
            let placeholders = placeholders(chunk.len());
            let sql = format!(
                "UPDATE duration_cache SET last_accessed = ? WHERE path IN ({placeholders})"
            );
            let mut values: Vec<rusqlite::types::Value> = Vec::with_capacity(chunk.len() + 1);
            values.push(now.into());
            for path in chunk {
                values.push(path_key(path).into());
            }
            let mut stmt = conn.prepare(&sql)?;
            stmt.execute(params_from_iter(values))?;
        }
        Ok(())
    }

    /// Remove the record for `path`, if any.
    pub fn delete_path(&self, path: &Path) -> CacheResult<()> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("DELETE FROM duration_cache WHERE path = ?1")?;
        stmt.execute(params![path_key(path)])?;
        Ok(())
    }

    /// Bulk-delete entries whose `last_accessed` predates `cutoff`.
    ///
    /// Returns the number of rows removed and their paths, so the caller can
    /// drop the same entries from the in-memory layer.
    pub fn delete_older_than(&self, cutoff: f64) -> CacheResult<(usize, Vec<PathBuf>)> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let paths: Vec<PathBuf> = {
            let mut stmt =
                tx.prepare("SELECT path FROM duration_cache WHERE last_accessed < ?1")?;
            let rows = stmt.query_map(params![cutoff], |row| {
                Ok(PathBuf::from(row.get::<_, String>(0)?))
            })?;
            rows.collect::<Result<_, _>>()?
        };

        let count = tx.execute(
            "DELETE FROM duration_cache WHERE last_accessed < ?1",
            params![cutoff],
        )?;
        tx.commit()?;

        Ok((count, paths))
    }

    /// Drop all data and reclaim the file space.
    pub fn clear(&self) -> CacheResult<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM duration_cache", [])?;
        conn.execute_batch("VACUUM")?;
        Ok(())
    }

    /// Number of persisted records.
    pub fn row_count(&self) -> CacheResult<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM duration_cache", [], |row| {
            row.get(0)
        })?;
        Ok(count.max(0) as u64)
    }

    /// Size of the database file on disk, 0 if it cannot be measured.
    #[must_use]
    pub fn on_disk_size_bytes(&self) -> u64 {
        fs::metadata(&self.db_path).map(|m| m.len()).unwrap_or(0)
    }

    /// Location of the database file.
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

/// Delete the database file plus its WAL sidecars.
fn remove_database_files(path: &Path) -> std::io::Result<()> {
    for suffix in ["", "-wal", "-shm"] {
        let mut file = path.as_os_str().to_os_string();
        file.push(suffix);
        match fs::remove_file(PathBuf::from(file)) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

fn has_fingerprint_column(conn: &Connection) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare("PRAGMA table_info(duration_cache)")?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == "fingerprint" {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Paths are stored as text; lossy conversion keeps non-UTF-8 paths usable
/// as stable keys even if they cannot round-trip byte-for-byte.
fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(",")
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<CacheEntry> {
    Ok(CacheEntry {
        path: PathBuf::from(row.get::<_, String>(0)?),
        duration_secs: row.get::<_, i64>(1)?.max(0) as u64,
        file_size: row.get::<_, i64>(2)?.max(0) as u64,
        modified_time: row.get(3)?,
        last_accessed: row.get(4)?,
        format: row.get(5)?,
        bitrate: row.get(6)?,
        fingerprint: row.get(7)?,
    })
}

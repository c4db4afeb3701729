//! File identity fingerprints.
//!
//! A fingerprint is a cheap content-identity token for a file: a BLAKE3 hash
//! over the path, the byte size, and the modification time. It is computed
//! from a single `stat` call, never from file contents, which makes it cheap
//! enough to recompute on every cache lookup. If any of the inputs change,
//! the digest changes and cached durations for the old state stop matching.

use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Identity snapshot of a file at a point in time.
///
/// The `digest` is the validity key stored alongside cached durations;
/// `size` and `modified_time` are kept for record-keeping and diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct Fingerprint {
    /// Hex-encoded BLAKE3 digest of path + size + mtime.
    pub digest: String,
    /// File size in bytes at fingerprint time.
    pub size: u64,
    /// Modification time as fractional seconds since the Unix epoch.
    pub modified_time: f64,
}

impl Fingerprint {
    /// Fingerprint the file at `path`.
    ///
    /// Returns `None` if the file does not exist, is not a regular file, or
    /// its metadata cannot be read. Absence is the signal the cache layers
    /// use to treat a lookup as an unconditional miss; it is never an error.
    #[must_use]
    pub fn of(path: &Path) -> Option<Self> {
        let meta = fs::metadata(path).ok()?;
        if !meta.is_file() {
            return None;
        }

        let size = meta.len();
        let mtime_nanos = meta
            .modified()
            .ok()?
            .duration_since(UNIX_EPOCH)
            .ok()?
            .as_nanos();

        let mut hasher = blake3::Hasher::new();
        hasher.update(path.as_os_str().as_encoded_bytes());
        hasher.update(b"|");
        hasher.update(&size.to_le_bytes());
        hasher.update(b"|");
        hasher.update(&mtime_nanos.to_le_bytes());

        Some(Self {
            digest: hasher.finalize().to_hex().to_string(),
            size,
            modified_time: mtime_nanos as f64 / 1e9,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_fingerprint_deterministic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("track.mp3");
        fs::write(&path, b"audio bytes").unwrap();

        let a = Fingerprint::of(&path).unwrap();
        let b = Fingerprint::of(&path).unwrap();
        assert_eq!(a.digest, b.digest);
        assert_eq!(a.size, b.size);
    }

    #[test]
    fn test_fingerprint_changes_with_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("track.mp3");
        fs::write(&path, b"audio bytes").unwrap();
        let before = Fingerprint::of(&path).unwrap();

        let mut f = File::options().append(true).open(&path).unwrap();
        f.write_all(b"more").unwrap();
        f.sync_all().unwrap();

        let after = Fingerprint::of(&path).unwrap();
        assert_ne!(before.digest, after.digest);
        assert_ne!(before.size, after.size);
    }

    #[test]
    fn test_fingerprint_changes_with_mtime() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("track.mp3");
        fs::write(&path, b"audio bytes").unwrap();
        let before = Fingerprint::of(&path).unwrap();

        // Same content, shifted mtime
        filetime::set_file_mtime(&path, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();

        let after = Fingerprint::of(&path).unwrap();
        assert_ne!(before.digest, after.digest);
        assert_eq!(before.size, after.size);
    }

    #[test]
    fn test_fingerprint_differs_per_path() {
        let dir = TempDir::new().unwrap();
        let a_path = dir.path().join("a.mp3");
        let b_path = dir.path().join("b.mp3");
        fs::write(&a_path, b"same content").unwrap();
        fs::write(&b_path, b"same content").unwrap();
        let mtime = FileTime::from_unix_time(1_600_000_000, 0);
        filetime::set_file_mtime(&a_path, mtime).unwrap();
        filetime::set_file_mtime(&b_path, mtime).unwrap();

        let a = Fingerprint::of(&a_path).unwrap();
        let b = Fingerprint::of(&b_path).unwrap();
        assert_ne!(a.digest, b.digest);
    }

    #[test]
    fn test_fingerprint_missing_file() {
        assert!(Fingerprint::of(Path::new("/nonexistent/file.mp3")).is_none());
    }

    #[test]
    fn test_fingerprint_directory() {
        let dir = TempDir::new().unwrap();
        assert!(Fingerprint::of(dir.path()).is_none());
    }
}

use duracache::{CacheConfig, DurationCache};
use filetime::FileTime;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

fn cache_at(db_path: &Path) -> DurationCache {
    DurationCache::open(
        CacheConfig::default()
            .with_db_path(db_path)
            .with_busy_timeout(Duration::from_secs(5)),
    )
    .unwrap()
}

fn audio_file(dir: &TempDir, name: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, format!("fake audio payload for {name}")).unwrap();
    path
}

#[test]
fn test_miss_store_hit_round_trip() {
    let dir = TempDir::new().unwrap();
    let cache = cache_at(&dir.path().join("durations.db"));
    let track = audio_file(&dir, "track1.mp3");

    assert_eq!(cache.get_duration(&track), None);
    assert!(cache.store_duration(&track, 237, None, None));
    assert_eq!(cache.get_duration(&track), Some(237));
}

#[test]
fn test_durable_across_reopen() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("durations.db");
    let track = audio_file(&dir, "track1.mp3");

    {
        let cache = cache_at(&db_path);
        assert!(cache.store_duration(&track, 237, Some("mp3"), Some(320)));
    }

    // Fresh instance, empty LRU: the hit must come from the store.
    let cache = cache_at(&db_path);
    assert_eq!(cache.get_duration(&track), Some(237));
    let stats = cache.stats();
    assert_eq!(stats.memory_hits, 0);
    assert_eq!(stats.store_hits, 1);
}

#[test]
fn test_invalidation_when_file_grows() {
    let dir = TempDir::new().unwrap();
    let cache = cache_at(&dir.path().join("durations.db"));
    let track = audio_file(&dir, "track1.mp3");

    assert!(cache.store_duration(&track, 180, None, None));
    assert_eq!(cache.get_duration(&track), Some(180));

    let mut content = fs::read(&track).unwrap();
    content.extend_from_slice(b" plus a re-encode");
    fs::write(&track, content).unwrap();

    assert_eq!(cache.get_duration(&track), None);
}

#[test]
fn test_invalidation_when_mtime_changes() {
    let dir = TempDir::new().unwrap();
    let cache = cache_at(&dir.path().join("durations.db"));
    let track = audio_file(&dir, "track1.mp3");

    assert!(cache.store_duration(&track, 180, None, None));

    // Same size, different mtime: still a content change as far as the
    // fingerprint is concerned.
    filetime::set_file_mtime(&track, FileTime::from_unix_time(1_500_000_000, 0)).unwrap();

    assert_eq!(cache.get_duration(&track), None);
}

#[test]
fn test_store_fails_for_missing_file() {
    let dir = TempDir::new().unwrap();
    let cache = cache_at(&dir.path().join("durations.db"));
    let ghost = dir.path().join("never-written.mp3");

    assert!(!cache.store_duration(&ghost, 100, None, None));
    assert_eq!(cache.get_duration(&ghost), None);
}

#[test]
fn test_idempotent_store_keeps_single_row() {
    let dir = TempDir::new().unwrap();
    let cache = cache_at(&dir.path().join("durations.db"));
    let track = audio_file(&dir, "track1.mp3");

    assert!(cache.store_duration(&track, 201, None, None));
    assert!(cache.store_duration(&track, 201, None, None));

    assert_eq!(cache.stats().persistent_rows, 1);
    assert_eq!(cache.get_duration(&track), Some(201));
}

#[test]
fn test_batch_contains_every_input() {
    let dir = TempDir::new().unwrap();
    let cache = cache_at(&dir.path().join("durations.db"));

    let cached_a = audio_file(&dir, "a.mp3");
    let cached_b = audio_file(&dir, "b.mp3");
    let uncached = audio_file(&dir, "c.mp3");
    let missing = dir.path().join("missing.mp3");
    assert!(cache.store_duration(&cached_a, 100, None, None));
    assert!(cache.store_duration(&cached_b, 200, None, None));

    let paths = vec![
        cached_a.clone(),
        cached_b.clone(),
        uncached.clone(),
        missing.clone(),
    ];
    let results = cache.get_durations_batch(&paths);

    assert_eq!(results.len(), 4);
    assert_eq!(results.get(&cached_a), Some(&Some(100)));
    assert_eq!(results.get(&cached_b), Some(&Some(200)));
    assert_eq!(results.get(&uncached), Some(&None));
    assert_eq!(results.get(&missing), Some(&None));
}

#[test]
fn test_batch_promotes_store_hits_into_memory() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("durations.db");
    let tracks: Vec<PathBuf> = (0..5)
        .map(|i| audio_file(&dir, &format!("track_{i}.mp3")))
        .collect();

    {
        let cache = cache_at(&db_path);
        for (i, track) in tracks.iter().enumerate() {
            assert!(cache.store_duration(track, 60 + i as u64, None, None));
        }
    }

    let cache = cache_at(&db_path);
    let first = cache.get_durations_batch(&tracks);
    assert!(first.values().all(Option::is_some));
    assert_eq!(cache.stats().store_hits, 5);

    // Second round must be answered from memory.
    let second = cache.get_durations_batch(&tracks);
    assert!(second.values().all(Option::is_some));
    assert_eq!(cache.stats().memory_hits, 5);
    assert_eq!(cache.stats().store_hits, 5);
}

#[test]
fn test_invalidate_removes_both_layers() {
    let dir = TempDir::new().unwrap();
    let cache = cache_at(&dir.path().join("durations.db"));
    let track = audio_file(&dir, "track1.mp3");

    assert!(cache.store_duration(&track, 150, None, None));
    assert_eq!(cache.get_duration(&track), Some(150));

    cache.invalidate(&track);
    assert_eq!(cache.get_duration(&track), None);
    assert_eq!(cache.stats().persistent_rows, 0);
}

#[test]
fn test_clear_all() {
    let dir = TempDir::new().unwrap();
    let cache = cache_at(&dir.path().join("durations.db"));
    let a = audio_file(&dir, "a.mp3");
    let b = audio_file(&dir, "b.mp3");
    assert!(cache.store_duration(&a, 100, None, None));
    assert!(cache.store_duration(&b, 200, None, None));

    cache.clear_all();

    assert_eq!(cache.get_duration(&a), None);
    assert_eq!(cache.get_duration(&b), None);
    let stats = cache.stats();
    assert_eq!(stats.persistent_rows, 0);
    assert_eq!(stats.memory_entries, 0);
}

#[test]
fn test_lru_overflow_still_served_from_store() {
    let dir = TempDir::new().unwrap();
    let cache = DurationCache::open(
        CacheConfig::default()
            .with_db_path(dir.path().join("durations.db"))
            .with_lru_capacity(2),
    )
    .unwrap();

    let a = audio_file(&dir, "a.mp3");
    let b = audio_file(&dir, "b.mp3");
    let c = audio_file(&dir, "c.mp3");
    assert!(cache.store_duration(&a, 1, None, None));
    assert!(cache.store_duration(&b, 2, None, None));
    assert!(cache.store_duration(&c, 3, None, None));

    // a was evicted from memory but the store still has it.
    assert_eq!(cache.stats().memory_entries, 2);
    assert_eq!(cache.get_duration(&a), Some(1));
    assert!(cache.stats().store_hits >= 1);
}

#[test]
fn test_total_duration() {
    let dir = TempDir::new().unwrap();
    let cache = cache_at(&dir.path().join("durations.db"));
    let a = audio_file(&dir, "a.mp3");
    let b = audio_file(&dir, "b.mp3");
    let unknown = audio_file(&dir, "unknown.mp3");
    assert!(cache.store_duration(&a, 100, None, None));
    assert!(cache.store_duration(&b, 200, None, None));

    let (total, unknown_count) =
        cache.total_duration(&[a.clone(), b.clone(), unknown.clone()]);
    assert_eq!(total, 300);
    assert_eq!(unknown_count, 1);
}

#[test]
fn test_stats_accounting() {
    let dir = TempDir::new().unwrap();
    let cache = cache_at(&dir.path().join("durations.db"));
    let track = audio_file(&dir, "track1.mp3");

    assert_eq!(cache.get_duration(&track), None); // miss
    assert!(cache.store_duration(&track, 90, None, None));
    assert_eq!(cache.get_duration(&track), Some(90)); // memory hit

    let stats = cache.stats();
    assert_eq!(stats.lookups, 2);
    assert_eq!(stats.memory_hits, 1);
    assert_eq!(stats.inserts, 1);
    assert!(stats.hit_rate > 0.0 && stats.hit_rate <= 1.0);
    assert!(stats.persistent_available);
    assert_eq!(stats.persistent_rows, 1);
}

#[cfg(unix)]
#[test]
fn test_memory_only_degradation_when_store_unopenable() {
    let dir = TempDir::new().unwrap();
    // A regular file where a directory is needed makes the store path
    // impossible to create, even after the recreate attempt.
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, b"in the way").unwrap();
    let db_path = blocker.join("durations.db");

    let cache = DurationCache::open(CacheConfig::default().with_db_path(db_path)).unwrap();
    assert!(!cache.persistent_available());

    // The LRU layer still works for the life of the process.
    let track = audio_file(&dir, "track1.mp3");
    assert!(cache.store_duration(&track, 44, None, None));
    assert_eq!(cache.get_duration(&track), Some(44));
    assert!(!cache.stats().persistent_available);
}

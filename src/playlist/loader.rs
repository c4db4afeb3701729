//! Background duration population.
//!
//! Given a playlist's worth of paths, the loader resolves what the cache
//! already knows with one batched lookup per chunk, probes the rest through
//! the caller-supplied [`DurationProbe`], and stores the results. It runs on
//! a dedicated thread and cooperates with a shared stop flag, checked
//! between chunks and between files, so a playlist switch can cancel an
//! in-flight pass promptly.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::cache::DurationCache;

/// Default number of paths resolved per batched cache lookup.
pub const DEFAULT_CHUNK_SIZE: usize = 100;

/// The external audio-probing capability.
///
/// Implementations decode just enough of the file to learn its playback
/// length. The cache layer neither knows nor cares which codec library sits
/// behind this; it only stores the result.
pub trait DurationProbe: Send + Sync {
    /// Playback length of `path` in seconds, or `None` if it cannot be
    /// determined.
    fn probe(&self, path: &Path) -> Option<u64>;
}

impl<F> DurationProbe for F
where
    F: Fn(&Path) -> Option<u64> + Send + Sync,
{
    fn probe(&self, path: &Path) -> Option<u64> {
        self(path)
    }
}

/// Notification hook fired when a previously missing duration becomes
/// available, so the UI can refresh the affected row.
pub type DurationCallback = Arc<dyn Fn(&Path, u64) + Send + Sync>;

/// Configuration for a [`BackgroundLoader`] run.
#[derive(Clone)]
pub struct LoaderConfig {
    /// Paths per batched cache lookup. Values below 1 are clamped.
    pub chunk_size: usize,
    /// Shared cancellation flag; one is created if not supplied.
    pub stop_flag: Option<Arc<AtomicBool>>,
    /// Invoked for every newly stored duration.
    pub on_loaded: Option<DurationCallback>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            stop_flag: None,
            on_loaded: None,
        }
    }
}

impl std::fmt::Debug for LoaderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderConfig")
            .field("chunk_size", &self.chunk_size)
            .field("stop_flag", &self.stop_flag)
            .field("on_loaded", &self.on_loaded.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

impl LoaderConfig {
    /// Set the per-chunk batch size.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Share a cancellation flag with the loader (e.g. an application-wide
    /// shutdown flag).
    #[must_use]
    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop_flag = Some(flag);
        self
    }

    /// Register the duration-loaded notification hook.
    #[must_use]
    pub fn with_on_loaded(mut self, callback: DurationCallback) -> Self {
        self.on_loaded = Some(callback);
        self
    }
}

/// Outcome of a population pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoaderReport {
    /// Files whose duration was probed and stored this pass.
    pub probed: usize,
    /// Files the cache already knew.
    pub already_cached: usize,
    /// Files that could not be probed or stored.
    pub failed: usize,
    /// Whether the pass was cancelled before finishing.
    pub interrupted: bool,
}

/// Handle to a running background population pass.
pub struct BackgroundLoader {
    stop_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<LoaderReport>>,
}

impl std::fmt::Debug for BackgroundLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundLoader")
            .field("stopped", &self.stop_flag.load(Ordering::SeqCst))
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl BackgroundLoader {
    /// Start a population pass over `paths` on a dedicated thread.
    pub fn spawn(
        cache: Arc<DurationCache>,
        probe: Arc<dyn DurationProbe>,
        paths: Vec<PathBuf>,
        config: LoaderConfig,
    ) -> std::io::Result<Self> {
        let stop_flag = config
            .stop_flag
            .clone()
            .unwrap_or_else(|| Arc::new(AtomicBool::new(false)));
        let chunk_size = config.chunk_size.max(1);
        let on_loaded = config.on_loaded.clone();
        let flag = Arc::clone(&stop_flag);

        let handle = thread::Builder::new()
            .name("duration-loader".into())
            .spawn(move || run_pass(&cache, probe.as_ref(), &paths, chunk_size, &flag, on_loaded))?;

        Ok(Self {
            stop_flag,
            handle: Some(handle),
        })
    }

    /// Request cancellation. The pass stops at the next chunk/file boundary.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }

    /// Whether the pass has finished (completed or cancelled).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait for the pass to finish and return its report.
    pub fn join(mut self) -> LoaderReport {
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or_else(|_| {
                log::error!("duration loader thread panicked");
                LoaderReport {
                    interrupted: true,
                    ..LoaderReport::default()
                }
            }),
            None => LoaderReport::default(),
        }
    }

    /// [`stop`](Self::stop) then [`join`](Self::join).
    pub fn stop_and_join(self) -> LoaderReport {
        self.stop();
        self.join()
    }
}

fn run_pass(
    cache: &DurationCache,
    probe: &dyn DurationProbe,
    paths: &[PathBuf],
    chunk_size: usize,
    stop: &AtomicBool,
    on_loaded: Option<DurationCallback>,
) -> LoaderReport {
    let mut report = LoaderReport::default();
    log::debug!("background duration load started for {} files", paths.len());

    'outer: for chunk in paths.chunks(chunk_size) {
        if stop.load(Ordering::SeqCst) {
            report.interrupted = true;
            break;
        }

        let known = cache.get_durations_batch(chunk);
        for path in chunk {
            if stop.load(Ordering::SeqCst) {
                report.interrupted = true;
                break 'outer;
            }

            if known.get(path).copied().flatten().is_some() {
                report.already_cached += 1;
                continue;
            }

            match probe.probe(path) {
                Some(duration) => {
                    if cache.store_duration(path, duration, None, None) {
                        report.probed += 1;
                        if let Some(callback) = &on_loaded {
                            callback(path, duration);
                        }
                    } else {
                        report.failed += 1;
                    }
                }
                None => {
                    log::debug!("could not probe duration for {}", path.display());
                    report.failed += 1;
                }
            }
        }
    }

    log::debug!(
        "background duration load finished: {} probed, {} cached, {} failed{}",
        report.probed,
        report.already_cached,
        report.failed,
        if report.interrupted { " (interrupted)" } else { "" }
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builders() {
        let flag = Arc::new(AtomicBool::new(false));
        let config = LoaderConfig::default()
            .with_chunk_size(0)
            .with_stop_flag(Arc::clone(&flag));
        assert_eq!(config.chunk_size, 1);
        assert!(config.stop_flag.is_some());
        assert!(config.on_loaded.is_none());
    }

    #[test]
    fn test_closure_implements_probe() {
        let probe = |path: &Path| {
            if path.ends_with("known.mp3") {
                Some(42)
            } else {
                None
            }
        };
        assert_eq!(probe.probe(Path::new("/music/known.mp3")), Some(42));
        assert_eq!(probe.probe(Path::new("/music/other.mp3")), None);
    }
}

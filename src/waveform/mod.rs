//! Waveform cache: hot in-memory map in front of a durable store, with
//! single-flight decoding so a path is never decoded twice at once.

pub mod queue;
pub mod store;

use crate::probe::{self, ProbeError, WaveformData};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::time::UNIX_EPOCH;
use store::WaveformStore;
use thiserror::Error;

pub use queue::{PreviewQueue, PreviewTicket};

/// Entries kept in the session cache before the oldest are dropped.
const HOT_CAPACITY: usize = 1024;

#[derive(Error, Debug)]
pub enum WaveformError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Waveform store error: {0}")]
    Store(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Request cancelled")]
    Cancelled,
    #[error("Waveform cache lock poisoned")]
    Poisoned,
}

impl From<ProbeError> for WaveformError {
    fn from(e: ProbeError) -> Self {
        match e {
            ProbeError::NotFound(p) => WaveformError::NotFound(p),
            other => WaveformError::Decode(other.to_string()),
        }
    }
}

/// Something that turns an audio file into a waveform.
pub trait WaveformSource: Send + Sync {
    fn decode(&self, path: &Path, resolution: usize) -> Result<WaveformData, ProbeError>;
}

/// Decodes with the audio probe.
pub struct ProbeSource;

impl WaveformSource for ProbeSource {
    fn decode(&self, path: &Path, resolution: usize) -> Result<WaveformData, ProbeError> {
        probe::probe(path, resolution)
    }
}

/// Cache key: a file as it currently exists on disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileIdentity {
    pub path: String,
    pub size: u64,
    pub mtime_ns: i64,
}

impl FileIdentity {
    pub fn of(path: &Path) -> Result<Self, WaveformError> {
        let meta = std::fs::metadata(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => WaveformError::NotFound(path.to_path_buf()),
            _ => WaveformError::Io(e),
        })?;
        if !meta.is_file() {
            return Err(WaveformError::NotFound(path.to_path_buf()));
        }
        let mtime_ns = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos() as i64)
            .unwrap_or_default();
        Ok(Self {
            path: path.to_string_lossy().to_string(),
            size: meta.len(),
            mtime_ns,
        })
    }
}

/// A flight's error as handed to every waiting caller.
#[derive(Debug, Clone)]
enum SharedError {
    NotFound(PathBuf),
    Decode(String),
    Io(std::io::ErrorKind, String),
    Cancelled,
    Poisoned,
}

impl From<&WaveformError> for SharedError {
    fn from(e: &WaveformError) -> Self {
        match e {
            WaveformError::NotFound(p) => Self::NotFound(p.clone()),
            WaveformError::Decode(msg) => Self::Decode(msg.clone()),
            WaveformError::Io(e) => Self::Io(e.kind(), e.to_string()),
            WaveformError::Store(e) => Self::Io(std::io::ErrorKind::Other, e.to_string()),
            WaveformError::Cancelled => Self::Cancelled,
            WaveformError::Poisoned => Self::Poisoned,
        }
    }
}

impl From<SharedError> for WaveformError {
    fn from(e: SharedError) -> Self {
        match e {
            SharedError::NotFound(p) => Self::NotFound(p),
            SharedError::Decode(msg) => Self::Decode(msg),
            SharedError::Io(kind, msg) => Self::Io(std::io::Error::new(kind, msg)),
            SharedError::Cancelled => Self::Cancelled,
            SharedError::Poisoned => Self::Poisoned,
        }
    }
}

type FlightResult = Result<Arc<WaveformData>, SharedError>;

/// A decode in progress that other callers can wait on.
#[derive(Default)]
struct Flight {
    result: Mutex<Option<FlightResult>>,
    done: Condvar,
}

/// Held by the leader of a flight. Dropping it publishes the result, or a
/// decode error if the leader unwound, and wakes every follower.
struct FlightGuard<'a> {
    inflight: &'a Mutex<HashMap<FileIdentity, Arc<Flight>>>,
    id: &'a FileIdentity,
    flight: Arc<Flight>,
    result: Option<FlightResult>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        let result = self
            .result
            .take()
            .unwrap_or_else(|| Err(SharedError::Decode("decoder panicked".into())));
        if let Ok(mut inflight) = self.inflight.lock() {
            inflight.remove(self.id);
        }
        if let Ok(mut slot) = self.flight.result.lock() {
            *slot = Some(result);
        }
        self.flight.done.notify_all();
    }
}

#[derive(Default)]
struct HotCache {
    entries: HashMap<FileIdentity, Arc<WaveformData>>,
    order: VecDeque<FileIdentity>,
}

impl HotCache {
    fn get(&self, id: &FileIdentity) -> Option<Arc<WaveformData>> {
        self.entries.get(id).cloned()
    }

    fn insert(&mut self, id: FileIdentity, data: Arc<WaveformData>) {
        if self.entries.insert(id.clone(), data).is_none() {
            self.order.push_back(id);
        }
        while self.order.len() > HOT_CAPACITY {
            if let Some(old) = self.order.pop_front() {
                self.entries.remove(&old);
            }
        }
    }
}

pub struct WaveformCache {
    source: Arc<dyn WaveformSource>,
    store: Mutex<WaveformStore>,
    hot: Mutex<HotCache>,
    inflight: Mutex<HashMap<FileIdentity, Arc<Flight>>>,
    /// Held around every decode: one file is decoded at a time, system-wide.
    decode_gate: Mutex<()>,
    resolution: usize,
}

impl WaveformCache {
    pub fn new(source: Arc<dyn WaveformSource>, store: WaveformStore, resolution: usize) -> Self {
        Self {
            source,
            store: Mutex::new(store),
            hot: Mutex::new(HotCache::default()),
            inflight: Mutex::new(HashMap::new()),
            decode_gate: Mutex::new(()),
            resolution,
        }
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    /// Return the waveform for `path`, decoding at most once per file version.
    pub fn get_or_compute(&self, path: &Path) -> Result<Arc<WaveformData>, WaveformError> {
        let id = FileIdentity::of(path)?;

        if let Some(hit) = self.hot.lock().map_err(|_| WaveformError::Poisoned)?.get(&id) {
            return Ok(hit);
        }

        let stored = self
            .store
            .lock()
            .map_err(|_| WaveformError::Poisoned)?
            .get(&id, self.resolution)?;
        if let Some(data) = stored {
            log::debug!("Waveform store hit for {}", path.display());
            let data = Arc::new(data);
            self.hot
                .lock()
                .map_err(|_| WaveformError::Poisoned)?
                .insert(id, data.clone());
            return Ok(data);
        }

        let (flight, leader) = {
            let mut inflight = self.inflight.lock().map_err(|_| WaveformError::Poisoned)?;
            // A leader may have finished between the hot check and here
            if let Some(hit) = self.hot.lock().map_err(|_| WaveformError::Poisoned)?.get(&id) {
                return Ok(hit);
            }
            match inflight.get(&id) {
                Some(f) => (f.clone(), false),
                None => {
                    let f = Arc::new(Flight::default());
                    inflight.insert(id.clone(), f.clone());
                    (f, true)
                }
            }
        };

        if !leader {
            let mut slot = flight.result.lock().map_err(|_| WaveformError::Poisoned)?;
            while slot.is_none() {
                slot = flight.done.wait(slot).map_err(|_| WaveformError::Poisoned)?;
            }
            return match slot.as_ref() {
                Some(Ok(data)) => Ok(data.clone()),
                Some(Err(e)) => Err(e.clone().into()),
                None => Err(WaveformError::Poisoned),
            };
        }

        let mut guard = FlightGuard {
            inflight: &self.inflight,
            id: &id,
            flight,
            result: None,
        };
        log::debug!("Waveform cache miss for {}, decoding", path.display());
        let outcome = self.compute(&id, path);
        guard.result = Some(match &outcome {
            Ok(data) => Ok(data.clone()),
            Err(e) => Err(SharedError::from(e)),
        });
        drop(guard);

        outcome
    }

    fn compute(&self, id: &FileIdentity, path: &Path) -> Result<Arc<WaveformData>, WaveformError> {
        let decoded = {
            // Holds no data, so a gate poisoned by a panicking decoder is still usable
            let _gate = self.decode_gate.lock().unwrap_or_else(|e| e.into_inner());
            self.source.decode(path, self.resolution)
        };
        let data = Arc::new(decoded?);

        if let Err(e) = self
            .store
            .lock()
            .map_err(|_| WaveformError::Poisoned)?
            .put(id, self.resolution, &data)
        {
            log::warn!("Could not persist waveform for {}: {}", path.display(), e);
        }
        self.hot
            .lock()
            .map_err(|_| WaveformError::Poisoned)?
            .insert(id.clone(), data.clone());
        Ok(data)
    }

    /// Forget cached waveforms for deleted files.
    pub fn evict(&self, paths: &[String]) {
        if let Ok(mut hot) = self.hot.lock() {
            hot.entries.retain(|id, _| !paths.contains(&id.path));
            hot.order.retain(|id| !paths.contains(&id.path));
        }
        if let Ok(store) = self.store.lock() {
            if let Err(e) = store.remove(paths) {
                log::warn!("Could not evict cached waveforms: {e}");
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Deterministic source that counts decodes per call and the most decodes
    /// ever running at once.
    #[derive(Default)]
    pub struct CountingSource {
        pub calls: AtomicUsize,
        pub decoded: Mutex<Vec<PathBuf>>,
        pub delay: Option<std::time::Duration>,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl CountingSource {
        pub fn with_delay(delay: std::time::Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Default::default()
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn max_concurrent(&self) -> usize {
            self.max_active.load(Ordering::SeqCst)
        }
    }

    impl WaveformSource for CountingSource {
        fn decode(&self, path: &Path, resolution: usize) -> Result<WaveformData, ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            self.decoded.lock().unwrap().push(path.to_path_buf());
            if let Some(d) = self.delay {
                std::thread::sleep(d);
            }
            self.active.fetch_sub(1, Ordering::SeqCst);
            let seed = path.to_string_lossy().len() as f32;
            Ok(WaveformData {
                peaks: (0..resolution).map(|i| ((i as f32 + seed) % 10.0) / 10.0).collect(),
                colors: vec![crate::probe::colors::NEUTRAL; resolution],
                duration_secs: seed as f64,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::CountingSource;
    use super::*;
    use crate::test_support::write_sine_wav;
    use std::time::Duration;

    fn cache_with(source: Arc<CountingSource>) -> WaveformCache {
        WaveformCache::new(source, WaveformStore::open_in_memory().unwrap(), 16)
    }

    #[test]
    fn second_call_does_not_decode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kick.wav");
        std::fs::write(&path, b"RIFF").unwrap();

        let source = Arc::new(CountingSource::default());
        let cache = cache_with(source.clone());
        let first = cache.get_or_compute(&path).unwrap();
        let second = cache.get_or_compute(&path).unwrap();

        assert_eq!(*first, *second);
        assert_eq!(source.calls(), 1);
    }

    #[test]
    fn durable_store_survives_new_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kick.wav");
        let db = dir.path().join("waveforms.db");
        std::fs::write(&path, b"RIFF").unwrap();

        let first_source = Arc::new(CountingSource::default());
        let first = WaveformCache::new(first_source.clone(), WaveformStore::open(&db).unwrap(), 16)
            .get_or_compute(&path)
            .unwrap();

        let second_source = Arc::new(CountingSource::default());
        let second = WaveformCache::new(second_source.clone(), WaveformStore::open(&db).unwrap(), 16)
            .get_or_compute(&path)
            .unwrap();

        assert_eq!(*first, *second);
        assert_eq!(first_source.calls(), 1);
        assert_eq!(second_source.calls(), 0);
    }

    #[test]
    fn replaced_file_is_decoded_again() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kick.wav");
        std::fs::write(&path, b"RIFF").unwrap();

        let source = Arc::new(CountingSource::default());
        let cache = cache_with(source.clone());
        cache.get_or_compute(&path).unwrap();

        std::fs::write(&path, b"RIFF plus more bytes").unwrap();
        cache.get_or_compute(&path).unwrap();
        assert_eq!(source.calls(), 2);
    }

    #[test]
    fn concurrent_requests_share_one_decode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pad.wav");
        std::fs::write(&path, b"RIFF").unwrap();

        let source = Arc::new(CountingSource::with_delay(Duration::from_millis(150)));
        let cache = Arc::new(cache_with(source.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let path = path.clone();
                std::thread::spawn(move || cache.get_or_compute(&path).unwrap())
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(source.calls(), 1);
        assert!(results.iter().all(|r| **r == *results[0]));
    }

    #[test]
    fn missing_and_corrupt_files_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let cache = WaveformCache::new(
            Arc::new(ProbeSource),
            WaveformStore::open_in_memory().unwrap(),
            32,
        );

        let missing = cache.get_or_compute(&dir.path().join("gone.wav"));
        assert!(matches!(missing, Err(WaveformError::NotFound(_))));

        let corrupt = dir.path().join("corrupt.wav");
        std::fs::write(&corrupt, b"not audio at all").unwrap();
        assert!(matches!(cache.get_or_compute(&corrupt), Err(WaveformError::Decode(_))));

        let good = dir.path().join("tone.wav");
        write_sine_wav(&good, 0.5, 440.0, 8_000);
        assert_eq!(cache.get_or_compute(&good).unwrap().peaks.len(), 32);
    }

    #[test]
    fn evict_forgets_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kick.wav");
        std::fs::write(&path, b"RIFF").unwrap();

        let source = Arc::new(CountingSource::default());
        let cache = cache_with(source.clone());
        cache.get_or_compute(&path).unwrap();
        cache.evict(&[path.to_string_lossy().to_string()]);
        cache.get_or_compute(&path).unwrap();
        assert_eq!(source.calls(), 2);
    }

    #[test]
    fn different_files_decode_one_at_a_time() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(CountingSource::with_delay(Duration::from_millis(50)));
        let cache = Arc::new(cache_with(source.clone()));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let path = dir.path().join(format!("hit_{i}.wav"));
                std::fs::write(&path, b"RIFF").unwrap();
                let cache = cache.clone();
                std::thread::spawn(move || cache.get_or_compute(&path).unwrap())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(source.calls(), 4);
        assert_eq!(source.max_concurrent(), 1);
    }

    /// Fails the way a file deleted between stat and decode does.
    struct VanishingSource;

    impl WaveformSource for VanishingSource {
        fn decode(&self, path: &Path, _resolution: usize) -> Result<WaveformData, ProbeError> {
            std::thread::sleep(Duration::from_millis(100));
            Err(ProbeError::NotFound(path.to_path_buf()))
        }
    }

    #[test]
    fn waiting_callers_see_the_same_error_kind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snare.wav");
        std::fs::write(&path, b"RIFF").unwrap();
        let cache = Arc::new(WaveformCache::new(
            Arc::new(VanishingSource),
            WaveformStore::open_in_memory().unwrap(),
            16,
        ));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                let path = path.clone();
                std::thread::spawn(move || cache.get_or_compute(&path))
            })
            .collect();
        for h in handles {
            assert!(matches!(h.join().unwrap(), Err(WaveformError::NotFound(_))));
        }
    }

    /// Panics on its first decode, then behaves.
    #[derive(Default)]
    struct PanicOnceSource {
        calls: std::sync::atomic::AtomicUsize,
    }

    impl WaveformSource for PanicOnceSource {
        fn decode(&self, _path: &Path, resolution: usize) -> Result<WaveformData, ProbeError> {
            std::thread::sleep(Duration::from_millis(100));
            if self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                panic!("decoder blew up");
            }
            Ok(WaveformData {
                peaks: vec![0.5; resolution],
                colors: vec![crate::probe::colors::NEUTRAL; resolution],
                duration_secs: 1.0,
            })
        }
    }

    #[test]
    fn panicking_decode_releases_waiters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crash.wav");
        std::fs::write(&path, b"RIFF").unwrap();
        let cache = Arc::new(WaveformCache::new(
            Arc::new(PanicOnceSource::default()),
            WaveformStore::open_in_memory().unwrap(),
            16,
        ));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                let path = path.clone();
                std::thread::spawn(move || cache.get_or_compute(&path).map(|w| w.peaks.len()))
            })
            .collect();
        let joined: Vec<_> = handles.into_iter().map(|h| h.join()).collect();

        assert_eq!(joined.iter().filter(|r| r.is_err()).count(), 1);
        assert!(joined.into_iter().flatten().all(|r| matches!(r, Ok(16) | Err(WaveformError::Decode(_)))));
        assert_eq!(cache.get_or_compute(&path).unwrap().peaks.len(), 16);
    }
}

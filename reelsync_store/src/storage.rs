//! Durable key/value records shared by every context of one origin.
//!
//! A write is observed by the *other* handles of the origin as a
//! [`StorageEvent`], which is what the storage-signal transport rides on.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, warn};

const EVENT_CAPACITY: usize = 256;
const REMEMBERED_WRITES: usize = 4;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("storage i/o on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("storage watcher: {0}")]
    Watch(#[from] notify::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StorageEvent {
    pub key: String,
    pub new_value: String,
    writer: Option<u64>,
}

pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    /// Full overwrite of the record under `key`.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    /// Changes made by other writers, when the backend can observe them.
    fn watch(&self) -> Option<StorageWatch>;
}

pub struct StorageWatch {
    rx: broadcast::Receiver<StorageEvent>,
    own: Option<u64>,
}

impl StorageWatch {
    pub async fn recv(&mut self) -> Option<StorageEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.own.is_some() && event.writer == self.own => continue,
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "storage watch lagged behind");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

struct OriginInner {
    records: Mutex<HashMap<String, String>>,
    events: broadcast::Sender<StorageEvent>,
    next_handle: AtomicU64,
}

/// An in-process origin. Handles opened from the same origin share records,
/// like windows of one browser profile.
#[derive(Clone)]
pub struct MemoryOrigin {
    inner: Arc<OriginInner>,
}

impl MemoryOrigin {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(OriginInner {
                records: Mutex::new(HashMap::new()),
                events,
                next_handle: AtomicU64::new(1),
            }),
        }
    }

    pub fn open(&self) -> MemoryStorage {
        MemoryStorage {
            origin: self.clone(),
            handle: self.inner.next_handle.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.records.lock().get(key).cloned()
    }

    /// Writes as an outside party, e.g. a crashed peer leaving garbage behind.
    pub fn put(&self, key: &str, value: &str) {
        self.write(key, value, None);
    }

    fn write(&self, key: &str, value: &str, writer: Option<u64>) {
        let previous = self
            .inner
            .records
            .lock()
            .insert(key.to_string(), value.to_string());
        if previous.as_deref() == Some(value) {
            return;
        }
        // no receivers is fine
        let _ = self.inner.events.send(StorageEvent {
            key: key.to_string(),
            new_value: value.to_string(),
            writer,
        });
    }
}

impl Default for MemoryOrigin {
    fn default() -> Self {
        Self::new()
    }
}

pub struct MemoryStorage {
    origin: MemoryOrigin,
    handle: u64,
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.origin.get(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.origin.write(key, value, Some(self.handle));
        Ok(())
    }

    fn watch(&self) -> Option<StorageWatch> {
        Some(StorageWatch {
            rx: self.origin.inner.events.subscribe(),
            own: Some(self.handle),
        })
    }
}

/// This handle's latest writes to one key, oldest first. `seen` indexes the
/// newest of them already observed on disk; anything older is history and a
/// reappearance of it comes from someone else.
#[derive(Default)]
struct OwnWrites {
    values: VecDeque<String>,
    seen: usize,
}

impl OwnWrites {
    fn record(&mut self, value: &str) {
        if self.values.len() == REMEMBERED_WRITES {
            self.values.pop_front();
            self.seen = self.seen.saturating_sub(1);
        }
        self.values.push_back(value.to_string());
    }

    /// Whether `value` on disk is one of ours; forgets everything otherwise.
    fn observe(&mut self, value: &str) -> bool {
        match self.values.iter().skip(self.seen).position(|v| v == value) {
            Some(offset) => {
                self.seen += offset;
                true
            }
            None => {
                self.values.clear();
                self.seen = 0;
                false
            }
        }
    }
}

type RecentWrites = Arc<Mutex<HashMap<String, OwnWrites>>>;

/// One `<key>.json` file per record in a directory shared between processes.
pub struct FileStorage {
    dir: PathBuf,
    events: broadcast::Sender<StorageEvent>,
    recent: RecentWrites,
    _watcher: RecommendedWatcher,
}

impl FileStorage {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(io_error(&dir))?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let recent = RecentWrites::default();

        let tx = events.clone();
        let seen = recent.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    warn!(%e, "storage watcher error");
                    return;
                }
            };
            if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                return;
            }
            for path in event.paths {
                if let Some(change) = read_change(&path, &seen) {
                    let _ = tx.send(change);
                }
            }
        })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        Ok(Self {
            dir,
            events,
            recent,
            _watcher: watcher,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

fn read_change(path: &Path, recent: &RecentWrites) -> Option<StorageEvent> {
    if path.extension().and_then(|e| e.to_str()) != Some("json") {
        return None;
    }
    let key = path.file_stem()?.to_str()?.to_string();
    // the file may already be gone again; nothing to report then
    let new_value = std::fs::read_to_string(path).ok()?;
    if recent.lock().entry(key.clone()).or_default().observe(&new_value) {
        debug!(%key, "ignoring own storage write");
        return None;
    }
    Some(StorageEvent {
        key,
        new_value,
        writer: None,
    })
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path)(e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        if std::fs::read_to_string(&path).ok().as_deref() == Some(value) {
            return Ok(());
        }
        self.recent
            .lock()
            .entry(key.to_string())
            .or_default()
            .record(value);
        // write-then-rename so readers never see half a document
        let tmp = self.dir.join(format!(
            ".{key}.{}-{}.tmp",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::write(&tmp, value).map_err(io_error(&tmp))?;
        std::fs::rename(&tmp, &path).map_err(io_error(&path))?;
        Ok(())
    }

    fn watch(&self) -> Option<StorageWatch> {
        Some(StorageWatch {
            rx: self.events.subscribe(),
            own: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn temp_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "reelsync_storage_{tag}_{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ))
    }

    #[tokio::test]
    async fn memory_writes_reach_other_handles_only() {
        let origin = MemoryOrigin::new();
        let a = origin.open();
        let b = origin.open();
        let mut watch_a = a.watch().unwrap();
        let mut watch_b = b.watch().unwrap();

        a.set("k", "one").unwrap();
        let event = watch_b.recv().await.unwrap();
        assert_eq!(event.key, "k");
        assert_eq!(event.new_value, "one");
        assert_eq!(b.get("k").unwrap().as_deref(), Some("one"));

        // unchanged values are not re-announced
        a.set("k", "one").unwrap();
        b.set("k", "two").unwrap();
        let event = watch_a.recv().await.unwrap();
        assert_eq!(event.new_value, "two");

        // b skipped its own write, so the next thing it sees is the outside put
        origin.put("k", "three");
        assert_eq!(watch_b.recv().await.unwrap().new_value, "three");
    }

    #[tokio::test]
    async fn outside_puts_are_seen_by_everyone() {
        let origin = MemoryOrigin::new();
        let a = origin.open();
        let mut watch = a.watch().unwrap();
        origin.put("k", "{garbage");
        assert_eq!(watch.recv().await.unwrap().new_value, "{garbage");
    }

    #[test]
    fn file_records_round_trip() {
        let dir = temp_dir("roundtrip");
        let storage = FileStorage::open(&dir).unwrap();
        assert_eq!(storage.get("state").unwrap(), None);
        storage.set("state", r#"{"balance":1}"#).unwrap();
        assert_eq!(storage.get("state").unwrap().as_deref(), Some(r#"{"balance":1}"#));
        storage.set("state", r#"{"balance":2}"#).unwrap();
        assert_eq!(storage.get("state").unwrap().as_deref(), Some(r#"{"balance":2}"#));
        let leftovers = std::fs::read_dir(&dir)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
        let _ = std::fs::remove_dir_all(&dir);
    }

    async fn wait_for(watch: &mut StorageWatch, key: &str, value: &str) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let event = watch.recv().await.unwrap();
                if event.key == key && event.new_value == value {
                    return;
                }
            }
        })
        .await
        .expect("watcher reported the write")
    }

    #[test]
    fn own_write_window_tracks_what_was_seen() {
        let mut own = OwnWrites::default();
        own.record("a");
        own.record("b");
        // a late event may already read the newer value, twice
        assert!(own.observe("b"));
        assert!(own.observe("b"));
        // "a" is history now
        assert!(!own.observe("a"));
        assert!(!own.observe("b"));

        own.record("x");
        assert!(own.observe("x"));
        for v in ["1", "2", "3", "4", "5"] {
            own.record(v);
        }
        assert!(own.observe("5"));
        assert!(!own.observe("2"));
    }

    #[tokio::test]
    async fn peer_rewriting_an_old_value_is_not_mistaken_for_our_own() {
        let dir = temp_dir("rewrite");
        let ours = FileStorage::open(&dir).unwrap();
        let peer = FileStorage::open(&dir).unwrap();
        let mut watch = ours.watch().unwrap();

        ours.set("state", "one").unwrap();
        ours.set("state", "two").unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        peer.set("state", "one").unwrap();
        wait_for(&mut watch, "state", "one").await;
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn file_writes_are_observed_by_other_handles() {
        let dir = temp_dir("watch");
        let writer = FileStorage::open(&dir).unwrap();
        let reader = FileStorage::open(&dir).unwrap();
        let mut watch = reader.watch().unwrap();

        writer.set("signal", "hello").unwrap();
        let event = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let event = watch.recv().await.unwrap();
                if event.key == "signal" {
                    return event;
                }
            }
        })
        .await
        .expect("watcher reported the write");
        assert_eq!(event.new_value, "hello");
        let _ = std::fs::remove_dir_all(&dir);
    }
}

//! Snapshot persistence for one cache instance
//!
//! Every write path shares the same encoding step, which runs under the cache
//! lock and stamps the bytes with a generation. Writes are serialized and a
//! snapshot older than the one on disk is dropped, so overlapping flushes
//! never roll the file back. Shutdown is one-shot: the first trigger flushes
//! and publishes the completion flag, later triggers only wait for that flag.

use parking_lot::Mutex;
use refillstore::{snapshot, Error, KeyStore, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinError;
use tracing::{debug, info};

use crate::refill::State;

pub(crate) struct PersistenceManager {
    path: PathBuf,
    closed: AtomicBool,
    flushed: watch::Sender<bool>,
    /// Generation handed to the next encoded snapshot
    next_generation: AtomicU64,
    /// Generation of the snapshot currently on disk
    written: Mutex<u64>,
}

/// Snapshot bytes taken under the cache lock
pub(crate) struct Encoded {
    contents: Vec<u8>,
    keys: usize,
    generation: u64,
}

/// Publishes "flushed" when dropped, however the final flush ends
struct FlushedGuard(Arc<PersistenceManager>);

impl Drop for FlushedGuard {
    fn drop(&mut self) {
        self.0.mark_flushed();
    }
}

impl PersistenceManager {
    pub(crate) fn new(path: PathBuf) -> Self {
        let (flushed, _) = watch::channel(false);
        Self {
            path,
            closed: AtomicBool::new(false),
            flushed,
            next_generation: AtomicU64::new(1),
            written: Mutex::new(0),
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn load<V: DeserializeOwned>(&self) -> KeyStore<V> {
        KeyStore::load(&self.path)
    }

    /// Serialize the store while holding the lock
    ///
    /// Generations are drawn under the same lock, so a higher generation
    /// always holds a later view of the store.
    pub(crate) fn encode<V: Serialize>(&self, state: &Mutex<State<V>>) -> Result<Encoded> {
        let state = state.lock();
        let contents = state.store.to_json()?;
        Ok(Encoded {
            contents,
            keys: state.store.key_count(),
            generation: self.next_generation.fetch_add(1, Ordering::Relaxed),
        })
    }

    /// Write an encoded snapshot unless a later one is already on disk
    pub(crate) fn write(&self, encoded: Encoded) -> Result<()> {
        let mut written = self.written.lock();
        if encoded.generation < *written {
            debug!(
                path = %self.path.display(),
                generation = encoded.generation,
                on_disk = *written,
                "Skipping stale snapshot"
            );
            return Ok(());
        }

        snapshot::write(&self.path, &encoded.contents)?;
        *written = encoded.generation;
        info!(path = %self.path.display(), keys = encoded.keys, "Snapshot written");
        Ok(())
    }

    pub(crate) fn flush_blocking<V: Serialize>(&self, state: &Mutex<State<V>>) -> Result<()> {
        self.write(self.encode(state)?)
    }

    pub(crate) async fn flush<V: Serialize>(
        self: &Arc<Self>,
        state: &Mutex<State<V>>,
    ) -> Result<()> {
        let encoded = self.encode(state)?;
        let this = Arc::clone(self);
        tokio::task::spawn_blocking(move || this.write(encoded))
            .await
            .map_err(join_error)?
    }

    /// Flush once more and publish "flushed"
    ///
    /// The write runs as a detached blocking task, so it completes and
    /// publishes even when the awaiting future is dropped.
    pub(crate) async fn final_flush<V: Serialize>(
        self: &Arc<Self>,
        state: &Mutex<State<V>>,
    ) -> Result<()> {
        let guard = FlushedGuard(Arc::clone(self));
        let encoded = self.encode(state)?;
        tokio::task::spawn_blocking(move || {
            let guard = guard;
            guard.0.write(encoded)
        })
        .await
        .map_err(join_error)?
    }

    /// Claim the shutdown. Only the first caller gets `true`.
    pub(crate) fn begin_shutdown(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn mark_flushed(&self) {
        self.flushed.send_replace(true);
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<bool> {
        self.flushed.subscribe()
    }

    pub(crate) async fn wait_flushed(&self) {
        let mut rx = self.subscribe();
        // The sender lives as long as `self`, so this only returns once flushed.
        let _ = rx.wait_for(|flushed| *flushed).await;
    }
}

fn join_error(e: JoinError) -> Error {
    Error::Io(io::Error::other(e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use refillstore::Key;
    use std::fs;
    use tempfile::TempDir;

    fn state_with(values: Vec<i64>) -> Mutex<State<i64>> {
        let mut store = KeyStore::new();
        let key: Key = ["k"].into_iter().collect();
        store.append(&key, values);
        Mutex::new(State::new(store))
    }

    #[test]
    fn test_flush_blocking() {
        let dir = TempDir::new().unwrap();
        let manager = PersistenceManager::new(dir.path().join("gen.json"));

        manager.flush_blocking(&state_with(vec![1, 2])).unwrap();

        let store: KeyStore<i64> = manager.load();
        assert_eq!(store.buffer_len(r#"["k"]"#), 2);
    }

    #[tokio::test]
    async fn test_flush_async() {
        let dir = TempDir::new().unwrap();
        let manager = Arc::new(PersistenceManager::new(
            dir.path().join("sub").join("gen.json"),
        ));

        manager.flush(&state_with(vec![5])).await.unwrap();

        let text = fs::read_to_string(manager.path()).unwrap();
        assert_eq!(text, "{\n  \"[\\\"k\\\"]\": [\n    5\n  ]\n}");
    }

    #[test]
    fn test_flush_error_reported() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "").unwrap();
        // Parent "directory" is a regular file, so the write must fail.
        let manager = PersistenceManager::new(blocker.join("gen.json"));

        assert!(manager.flush_blocking(&state_with(vec![1])).is_err());
    }

    #[test]
    fn test_stale_snapshot_not_written() {
        let dir = TempDir::new().unwrap();
        let manager = PersistenceManager::new(dir.path().join("gen.json"));
        let state = state_with(vec![1]);

        let older = manager.encode(&state).unwrap();
        let key: Key = ["k"].into_iter().collect();
        state.lock().store.append(&key, vec![2]);
        let newer = manager.encode(&state).unwrap();

        manager.write(newer).unwrap();
        manager.write(older).unwrap();

        let store: KeyStore<i64> = manager.load();
        assert_eq!(store.buffer_len(r#"["k"]"#), 2);
    }

    #[tokio::test]
    async fn test_final_flush_marks_flushed_on_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "").unwrap();
        let manager = Arc::new(PersistenceManager::new(blocker.join("gen.json")));

        assert!(manager.final_flush(&state_with(vec![1])).await.is_err());
        assert!(*manager.subscribe().borrow());
    }

    #[test]
    fn test_shutdown_claimed_once() {
        let manager = PersistenceManager::new(PathBuf::from("unused.json"));
        assert!(manager.begin_shutdown());
        assert!(!manager.begin_shutdown());
    }

    #[tokio::test]
    async fn test_wait_flushed() {
        let manager = PersistenceManager::new(PathBuf::from("unused.json"));
        let rx = manager.subscribe();
        assert!(!*rx.borrow());

        manager.mark_flushed();
        manager.wait_flushed().await;
        assert!(*rx.borrow());
    }
}

//! RefillCache: non-blocking lookups over self-replenishing buffers

use refillstore::snapshot::{self, Snapshot};
use refillstore::{Arg, Error, Key, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{error, info};

use crate::config::CacheConfig;
use crate::persist::PersistenceManager;
use crate::producer::Producer;
use crate::refill::Shared;
use crate::stats::CacheStats;

/// Outcome of a lookup
///
/// Serializes as `{"status":"LOADING"}` or `{"status":"READY","value":...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Lookup<V> {
    /// Nothing buffered yet; a refill is running or has just been scheduled
    Loading,
    /// The oldest buffered value for the key
    Ready {
        /// The value
        value: V,
    },
}

impl<V> Lookup<V> {
    /// Check if a value was returned
    pub fn is_ready(&self) -> bool {
        matches!(self, Lookup::Ready { .. })
    }

    /// The value, if one was returned
    pub fn into_value(self) -> Option<V> {
        match self {
            Lookup::Ready { value } => Some(value),
            Lookup::Loading => None,
        }
    }
}

/// Prefetching cache in front of a [`Producer`]
///
/// Dropping the cache without calling [`shutdown`](Self::shutdown) writes a
/// final snapshot synchronously.
pub struct RefillCache<P: Producer> {
    /// Store, in-flight set and producer, shared with refill tasks
    shared: Arc<Shared<P>>,

    /// Snapshot file and shutdown bookkeeping, shared with the final flush task
    persistence: Arc<PersistenceManager>,
}

impl<P: Producer> RefillCache<P> {
    /// Create a cache on the current tokio runtime
    ///
    /// # Arguments
    /// * `producer` - Source of new values; its name selects the snapshot file
    /// * `config` - Threshold and snapshot directory
    ///
    /// # Returns
    /// * `Result<RefillCache<P>>` - Cache restored from the snapshot if one exists
    ///
    /// # Errors
    /// * `Error::NoRuntime` - called outside of a tokio runtime
    /// * `Error::InvalidThreshold` - threshold is 0
    pub fn new(producer: P, config: CacheConfig) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;
        Self::with_runtime(producer, config, runtime)
    }

    /// Create a cache that schedules refills on `runtime`
    ///
    /// Lookups may then be issued from any thread, inside or outside the runtime.
    pub fn with_runtime(producer: P, config: CacheConfig, runtime: Handle) -> Result<Self> {
        config.validate()?;

        let path = snapshot::snapshot_path(&config.snapshot_dir, producer.name());
        let persistence = Arc::new(PersistenceManager::new(path));
        let store = persistence.load();

        info!(
            producer = producer.name(),
            threshold = config.threshold,
            keys = store.key_count(),
            path = %persistence.path().display(),
            "Refill cache ready"
        );

        Ok(Self {
            shared: Arc::new(Shared::new(producer, config.threshold, store, runtime)),
            persistence,
        })
    }

    /// Take the next value for an argument tuple without waiting
    ///
    /// # Arguments
    /// * `args` - Ordered arguments forming the key; use the same types and
    ///   order for every call meant to hit the same key
    ///
    /// # Returns
    /// * `Lookup::Ready` - the oldest buffered value, removed from the buffer
    /// * `Lookup::Loading` - the buffer is empty; a refill is in flight
    pub fn get<I, A>(&self, args: I) -> Lookup<P::Value>
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        self.get_key(&args.into_iter().collect())
    }

    /// Take the next value for an already built key without waiting
    pub fn get_key(&self, key: &Key) -> Lookup<P::Value> {
        let mut state = self.shared.state.lock();

        match state.store.pop(key.as_str()) {
            Some((value, remaining)) => {
                if remaining < self.shared.threshold {
                    self.shared.maybe_trigger_refill(&mut state, key);
                }
                self.shared.stats.record_ready();
                Lookup::Ready { value }
            }
            None => {
                self.shared.maybe_trigger_refill(&mut state, key);
                self.shared.stats.record_loading();
                Lookup::Loading
            }
        }
    }

    /// Append values to a key's buffer directly, without scheduling a refill
    pub fn preload<I, A>(&self, args: I, values: Vec<P::Value>)
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        let key: Key = args.into_iter().collect();
        self.shared.state.lock().store.append(&key, values);
    }

    /// Number of values currently buffered for an argument tuple
    pub fn buffer_len<I, A>(&self, args: I) -> usize
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        let key: Key = args.into_iter().collect();
        self.shared.state.lock().store.buffer_len(key.as_str())
    }

    /// Number of known keys
    pub fn key_count(&self) -> usize {
        self.shared.state.lock().store.key_count()
    }

    /// Number of refills currently running
    pub fn in_flight(&self) -> usize {
        self.shared.state.lock().in_flight_count()
    }

    /// Get cache statistics
    pub fn stats(&self) -> &CacheStats {
        &self.shared.stats
    }

    /// Get the refill threshold
    pub fn threshold(&self) -> usize {
        self.shared.threshold
    }

    /// Get the producer
    pub fn producer(&self) -> &P {
        &self.shared.producer
    }

    /// Path of this cache's snapshot file
    pub fn snapshot_path(&self) -> &Path {
        self.persistence.path()
    }

    /// Copy of every buffer, ordered by canonical key
    pub fn snapshot(&self) -> Snapshot<P::Value>
    where
        P::Value: Clone,
    {
        self.shared.state.lock().store.snapshot()
    }

    /// Write a snapshot without shutting down, on the blocking pool
    pub async fn flush(&self) -> Result<()> {
        self.persistence.flush(&self.shared.state).await
    }

    /// Write a snapshot without shutting down, on the calling thread
    pub fn flush_blocking(&self) -> Result<()> {
        self.persistence.flush_blocking(&self.shared.state)
    }

    /// Final flush before the host process exits
    ///
    /// The first call writes the snapshot and then publishes completion on
    /// [`flushed`](Self::flushed). Later calls write nothing and return once
    /// the first flush has finished. Refills still running are not awaited.
    ///
    /// The final write runs on the blocking pool and finishes even if this
    /// future is dropped, so a cancelled call never leaves later callers
    /// waiting.
    ///
    /// # Returns
    /// * `Ok(())` - the snapshot was written, or another caller already flushed
    /// * `Err(_)` - the write failed; the cache is shut down regardless
    pub async fn shutdown(&self) -> Result<()> {
        if !self.persistence.begin_shutdown() {
            self.persistence.wait_flushed().await;
            return Ok(());
        }

        self.persistence.final_flush(&self.shared.state).await
    }

    /// Check if shutdown has started
    pub fn is_shut_down(&self) -> bool {
        self.persistence.is_closed()
    }

    /// Receiver that turns `true` once the final flush has been attempted
    pub fn flushed(&self) -> watch::Receiver<bool> {
        self.persistence.subscribe()
    }
}

impl<P: Producer> Drop for RefillCache<P> {
    fn drop(&mut self) {
        if !self.persistence.begin_shutdown() {
            return;
        }
        if let Err(e) = self.persistence.flush_blocking(&self.shared.state) {
            error!(
                path = %self.persistence.path().display(),
                error = %e,
                "Final snapshot failed"
            );
        }
        self.persistence.mark_flushed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::producer::FnProducer;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    type Numbers = FnProducer<fn(&[Arg]) -> anyhow::Result<Vec<i64>>, i64>;

    fn one_two_three(_: &[Arg]) -> anyhow::Result<Vec<i64>> {
        Ok(vec![1, 2, 3])
    }

    fn numbers(name: &str) -> Numbers {
        FnProducer::new(name, one_two_three as fn(&[Arg]) -> anyhow::Result<Vec<i64>>)
    }

    fn config(dir: &TempDir, threshold: usize) -> CacheConfig {
        CacheConfig::new()
            .with_threshold(threshold)
            .with_snapshot_dir(dir.path())
    }

    #[test]
    fn test_lookup_serialization() {
        let loading: Lookup<i64> = Lookup::Loading;
        assert_eq!(
            serde_json::to_string(&loading).unwrap(),
            r#"{"status":"LOADING"}"#
        );

        let ready = Lookup::Ready { value: "word" };
        assert_eq!(
            serde_json::to_string(&ready).unwrap(),
            r#"{"status":"READY","value":"word"}"#
        );
    }

    #[test]
    fn test_lookup_accessors() {
        assert!(Lookup::Ready { value: 1 }.is_ready());
        assert_eq!(Lookup::Ready { value: 1 }.into_value(), Some(1));
        assert_eq!(Lookup::<i64>::Loading.into_value(), None);
    }

    #[test]
    fn test_new_outside_runtime() {
        let dir = TempDir::new().unwrap();
        let result = RefillCache::new(numbers("gen"), config(&dir, 1));
        assert!(matches!(result, Err(Error::NoRuntime)));
    }

    #[tokio::test]
    async fn test_zero_threshold() {
        let dir = TempDir::new().unwrap();
        let result = RefillCache::new(numbers("gen"), config(&dir, 0));
        assert!(matches!(result, Err(Error::InvalidThreshold(0))));
    }

    #[tokio::test]
    async fn test_snapshot_path_from_producer_name() {
        let dir = TempDir::new().unwrap();
        let cache = RefillCache::new(numbers("make_question"), config(&dir, 1)).unwrap();
        assert_eq!(cache.snapshot_path(), dir.path().join("make_question.json"));
        assert_eq!(cache.producer().name(), "make_question");
    }

    #[tokio::test]
    async fn test_preload_does_not_schedule() {
        let dir = TempDir::new().unwrap();
        let cache = RefillCache::new(numbers("gen"), config(&dir, 1)).unwrap();

        cache.preload(["a"], vec![10, 20]);

        assert_eq!(cache.buffer_len(["a"]), 2);
        assert_eq!(cache.key_count(), 1);
        assert_eq!(cache.in_flight(), 0);
        assert_eq!(cache.stats().refills_scheduled(), 0);
    }

    #[tokio::test]
    async fn test_get_pops_and_counts() {
        let dir = TempDir::new().unwrap();
        let cache = RefillCache::new(numbers("gen"), config(&dir, 1)).unwrap();
        cache.preload(["a"], vec![10, 20]);

        assert_eq!(cache.get(["a"]), Lookup::Ready { value: 10 });
        assert_eq!(cache.in_flight(), 0);
        assert_eq!(cache.get(["a"]), Lookup::Ready { value: 20 });
        assert_eq!(cache.in_flight(), 1);
        assert_eq!(cache.stats().ready(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_writes_snapshot() {
        let dir = TempDir::new().unwrap();
        let cache = RefillCache::new(numbers("gen"), config(&dir, 1)).unwrap();
        cache.preload(["a"], vec![4]);

        cache.shutdown().await.unwrap();

        assert!(cache.is_shut_down());
        assert!(*cache.flushed().borrow());
        let text = fs::read_to_string(dir.path().join("gen.json")).unwrap();
        assert_eq!(text, "{\n  \"[\\\"a\\\"]\": [\n    4\n  ]\n}");
    }

    #[tokio::test]
    async fn test_second_shutdown_is_noop() {
        let dir = TempDir::new().unwrap();
        let cache = RefillCache::new(numbers("gen"), config(&dir, 1)).unwrap();
        cache.preload(["a"], vec![4]);
        cache.shutdown().await.unwrap();

        // Later mutations are not written by a second trigger.
        cache.preload(["b"], vec![5]);
        cache.shutdown().await.unwrap();

        let reloaded: refillstore::KeyStore<i64> =
            refillstore::KeyStore::load(&dir.path().join("gen.json"));
        assert_eq!(reloaded.key_count(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_shutdown_still_flushes() {
        let dir = TempDir::new().unwrap();
        let cache = RefillCache::new(numbers("gen"), config(&dir, 1)).unwrap();
        cache.preload(["a"], vec![4]);

        // Give up on the first shutdown after a single poll.
        tokio::select! {
            biased;
            _ = cache.shutdown() => {}
            _ = std::future::ready(()) => {}
        }

        tokio::time::timeout(Duration::from_secs(5), cache.shutdown())
            .await
            .unwrap()
            .unwrap();
        assert!(*cache.flushed().borrow());

        let reloaded: refillstore::KeyStore<i64> =
            refillstore::KeyStore::load(&dir.path().join("gen.json"));
        assert_eq!(reloaded.buffer_len(r#"["a"]"#), 1);
    }

    #[tokio::test]
    async fn test_drop_flushes() {
        let dir = TempDir::new().unwrap();
        {
            let cache = RefillCache::new(numbers("gen"), config(&dir, 1)).unwrap();
            cache.preload([7], vec![1, 2]);
        }

        let cache = RefillCache::new(numbers("gen"), config(&dir, 1)).unwrap();
        assert_eq!(cache.buffer_len([7]), 2);
    }

    #[tokio::test]
    async fn test_flush_keeps_cache_open() {
        let dir = TempDir::new().unwrap();
        let cache = RefillCache::new(numbers("gen"), config(&dir, 1)).unwrap();
        cache.preload(["a"], vec![1]);

        cache.flush().await.unwrap();
        assert!(!cache.is_shut_down());
        assert!(dir.path().join("gen.json").exists());
    }
}

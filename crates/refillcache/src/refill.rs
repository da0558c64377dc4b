//! Refill coordination
//!
//! At most one refill runs per key. The in-flight set lives under the same
//! mutex as the store, so the length check, the flag and the append are
//! always consistent with each other. The producer itself runs on the
//! blocking pool and never sees the lock.

use ahash::RandomState;
use parking_lot::Mutex;
use refillstore::{Key, KeyStore};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinError;
use tracing::{debug, error, warn};

use crate::producer::Producer;
use crate::stats::CacheStats;

/// Everything guarded by the cache's single lock
pub(crate) struct State<V> {
    pub(crate) store: KeyStore<V>,
    in_flight: HashSet<String, RandomState>,
}

impl<V> State<V> {
    pub(crate) fn new(store: KeyStore<V>) -> Self {
        Self {
            store,
            in_flight: HashSet::with_hasher(RandomState::new()),
        }
    }

    pub(crate) fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}

/// State shared between the cache handle and its refill tasks
pub(crate) struct Shared<P: Producer> {
    pub(crate) producer: P,
    pub(crate) threshold: usize,
    pub(crate) state: Mutex<State<P::Value>>,
    pub(crate) stats: CacheStats,
    runtime: Handle,
}

impl<P: Producer> Shared<P> {
    pub(crate) fn new(
        producer: P,
        threshold: usize,
        store: KeyStore<P::Value>,
        runtime: Handle,
    ) -> Self {
        Self {
            producer,
            threshold,
            state: Mutex::new(State::new(store)),
            stats: CacheStats::new(),
            runtime,
        }
    }

    /// Schedule a refill for `key` if its buffer is below the threshold and
    /// no refill is already running for it.
    ///
    /// Must be called with the state lock held; `state` is the locked state.
    ///
    /// # Returns
    /// * `true` if a refill task was spawned
    pub(crate) fn maybe_trigger_refill(
        self: &Arc<Self>,
        state: &mut State<P::Value>,
        key: &Key,
    ) -> bool {
        if state.store.buffer_len(key.as_str()) >= self.threshold {
            return false;
        }
        if !state.in_flight.insert(key.as_str().to_string()) {
            return false;
        }

        self.stats.record_refill_scheduled();
        debug!(
            producer = self.producer.name(),
            key = %key,
            buffered = state.store.buffer_len(key.as_str()),
            "Scheduling refill"
        );

        let shared = Arc::clone(self);
        let key = key.clone();
        self.runtime.spawn(async move {
            shared.refill(key).await;
        });

        true
    }

    async fn refill(self: Arc<Self>, key: Key) {
        let worker = Arc::clone(&self);
        let args = key.args().to_vec();
        let outcome = tokio::task::spawn_blocking(move || worker.producer.produce(&args)).await;
        self.complete_refill(&key, outcome);
    }

    fn complete_refill(
        &self,
        key: &Key,
        outcome: Result<anyhow::Result<Vec<P::Value>>, JoinError>,
    ) {
        let mut state = self.state.lock();

        match outcome {
            Ok(Ok(values)) if !values.is_empty() => {
                let count = values.len();
                state.store.append(key, values);
                self.stats.record_refill_success(count);
                debug!(
                    producer = self.producer.name(),
                    key = %key,
                    values = count,
                    buffered = state.store.buffer_len(key.as_str()),
                    "Refill completed"
                );
            }
            Ok(Ok(_)) => {
                self.stats.record_refill_failure();
                warn!(
                    producer = self.producer.name(),
                    key = %key,
                    "Producer returned no values"
                );
            }
            Ok(Err(e)) => {
                self.stats.record_refill_failure();
                let reason = format!("{:#}", e);
                error!(
                    producer = self.producer.name(),
                    key = %key,
                    error = %reason,
                    "Refill failed"
                );
            }
            Err(e) => {
                self.stats.record_refill_failure();
                error!(
                    producer = self.producer.name(),
                    key = %key,
                    error = %e,
                    "Producer panicked"
                );
            }
        }

        state.in_flight.remove(key.as_str());
    }
}

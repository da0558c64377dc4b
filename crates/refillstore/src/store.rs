//! Key store: one FIFO buffer of values per key
//!
//! The store itself is plain data. Callers wrap it in their own lock; the
//! cache keeps it behind a single mutex together with its in-flight set.

use ahash::RandomState;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::key::Key;
use crate::snapshot::{self, Snapshot};

/// Map from canonical key to its value buffer
pub struct KeyStore<V> {
    buffers: HashMap<Key, VecDeque<V>, RandomState>,
}

impl<V> KeyStore<V> {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            buffers: HashMap::with_hasher(RandomState::new()),
        }
    }

    /// Number of values buffered for `key` (0 when absent)
    pub fn buffer_len(&self, key: &str) -> usize {
        self.buffers.get(key).map_or(0, VecDeque::len)
    }

    /// Pop the head value of a key's buffer
    ///
    /// # Returns
    /// * `Some((value, remaining))` - the oldest value and the buffer length after the pop
    /// * `None` - the buffer is empty or absent
    pub fn pop(&mut self, key: &str) -> Option<(V, usize)> {
        let buffer = self.buffers.get_mut(key)?;
        let value = buffer.pop_front()?;
        Some((value, buffer.len()))
    }

    /// Append values at the tail of a key's buffer, creating it if absent
    pub fn append(&mut self, key: &Key, values: Vec<V>) {
        self.buffers.entry(key.clone()).or_default().extend(values);
    }

    /// Number of keys (including keys whose buffer is currently empty)
    pub fn key_count(&self) -> usize {
        self.buffers.len()
    }

    /// Total number of buffered values across all keys
    pub fn value_count(&self) -> usize {
        self.buffers.values().map(VecDeque::len).sum()
    }

    /// Check if the store holds no keys
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

impl<V: Clone> KeyStore<V> {
    /// Copy of the full map, ordered by canonical key
    pub fn snapshot(&self) -> Snapshot<V> {
        self.buffers
            .iter()
            .map(|(key, buffer)| (key.as_str().to_string(), buffer.iter().cloned().collect()))
            .collect()
    }
}

impl<V: Serialize> KeyStore<V> {
    /// Pretty-printed snapshot JSON, serialized straight from the buffers
    pub fn to_json(&self) -> Result<Vec<u8>> {
        let ordered: BTreeMap<&str, &VecDeque<V>> = self
            .buffers
            .iter()
            .map(|(key, buffer)| (key.as_str(), buffer))
            .collect();
        Ok(serde_json::to_vec_pretty(&ordered)?)
    }
}

impl<V: DeserializeOwned> KeyStore<V> {
    /// Build a store from a parsed snapshot
    ///
    /// Entries whose key does not decode are logged and skipped.
    pub fn from_snapshot(snapshot: Snapshot<V>) -> Self {
        let mut store = Self::new();
        for (encoded, values) in snapshot {
            match Key::decode(&encoded) {
                Ok(key) => store.append(&key, values),
                Err(e) => warn!(key = %encoded, error = %e, "Skipping snapshot entry"),
            }
        }
        store
    }

    /// Restore a store from a snapshot file, best effort
    ///
    /// A missing file gives an empty store. An unreadable or malformed file is
    /// logged and also gives an empty store. Never fails.
    pub fn load(path: &Path) -> Self {
        match snapshot::read(path) {
            Ok(Some(snapshot)) => {
                let store = Self::from_snapshot(snapshot);
                info!(
                    path = %path.display(),
                    keys = store.key_count(),
                    values = store.value_count(),
                    "Loaded snapshot"
                );
                store
            }
            Ok(None) => {
                debug!(path = %path.display(), "No snapshot, starting empty");
                Self::new()
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Could not load snapshot, starting empty"
                );
                Self::new()
            }
        }
    }
}

impl<V> Default for KeyStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

//! Producer contract

use refillstore::Arg;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;

/// Source of new values for a key
///
/// `produce` is called on the blocking pool with the exact argument tuple
/// the key was built from. It may take as long as it needs. An error, a
/// panic or an empty batch counts as a failed refill and is only logged.
pub trait Producer: Send + Sync + 'static {
    /// Values handed out by the cache and stored in snapshots
    type Value: Serialize + DeserializeOwned + Send + 'static;

    /// Identity of the producer, used to name its snapshot file
    fn name(&self) -> &str;

    /// Produce a batch of values for one key
    fn produce(&self, args: &[Arg]) -> anyhow::Result<Vec<Self::Value>>;
}

/// [`Producer`] backed by a named closure
pub struct FnProducer<F, V> {
    name: String,
    func: F,
    _value: PhantomData<fn() -> V>,
}

impl<F, V> FnProducer<F, V>
where
    F: Fn(&[Arg]) -> anyhow::Result<Vec<V>>,
{
    /// Wrap `func` under the identity `name`
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
            _value: PhantomData,
        }
    }
}

impl<F, V> Producer for FnProducer<F, V>
where
    F: Fn(&[Arg]) -> anyhow::Result<Vec<V>> + Send + Sync + 'static,
    V: Serialize + DeserializeOwned + Send + 'static,
{
    type Value = V;

    fn name(&self) -> &str {
        &self.name
    }

    fn produce(&self, args: &[Arg]) -> anyhow::Result<Vec<V>> {
        (self.func)(args)
    }
}

//! # refillcache
//!
//! Prefetching cache for slow producers.
//!
//! Every key owns a FIFO buffer of pre-computed values. [`RefillCache::get`]
//! never waits: it hands out the oldest buffered value, or reports
//! [`Lookup::Loading`] when the buffer is dry. Whenever a buffer falls below
//! the configured threshold a single background refill calls the
//! [`Producer`] on the blocking pool and appends whatever it returns.
//!
//! ## Architecture
//! - **Store**: [`refillstore::KeyStore`] and the in-flight set behind one mutex
//! - **Refills**: tokio tasks, producer calls offloaded with `spawn_blocking`
//! - **Persistence**: JSON snapshot per producer, flushed on shutdown or drop

#![warn(missing_docs)]

mod cache;
mod config;
mod persist;
mod producer;
mod refill;
mod stats;

pub use cache::{Lookup, RefillCache};
pub use config::{CacheConfig, DEFAULT_SNAPSHOT_DIR, DEFAULT_THRESHOLD};
pub use producer::{FnProducer, Producer};
pub use refillstore::snapshot::Snapshot;
pub use refillstore::{Arg, Error, FiniteFloat, Key, Result};
pub use stats::CacheStats;

//! Error types for refillstore

use std::io;
use thiserror::Error;

/// Result type alias for store and cache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the store and the cache built on top of it
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error while reading or writing a snapshot
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Snapshot or key (de)serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A canonical key string does not decode to an argument tuple
    #[error("Invalid key {key:?}: {reason}")]
    InvalidKey {
        /// The offending key string
        key: String,
        /// Why it was rejected
        reason: String,
    },

    /// NaN and infinity cannot be key arguments
    #[error("Non-finite float {0} cannot be a key argument")]
    NonFiniteFloat(f64),

    /// Refill threshold must be a positive integer
    #[error("Invalid threshold {0}: must be at least 1")]
    InvalidThreshold(usize),

    /// The cache was built outside of a tokio runtime
    #[error("No tokio runtime available to schedule refills")]
    NoRuntime,
}

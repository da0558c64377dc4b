//! Cache configuration

use refillstore::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default refill threshold
pub const DEFAULT_THRESHOLD: usize = 1;

/// Default directory for snapshot files
pub const DEFAULT_SNAPSHOT_DIR: &str = "_func_cache";

/// Construction parameters for a [`RefillCache`](crate::RefillCache)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Minimum buffer length (default: 1)
    ///
    /// A background refill is scheduled as soon as a key's buffer holds fewer
    /// values than this. Must be at least 1.
    #[serde(default = "default_threshold")]
    pub threshold: usize,

    /// Directory holding snapshot files (default: `_func_cache`)
    ///
    /// The snapshot for a producer lives at `<snapshot_dir>/<name>.json`.
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: PathBuf,
}

fn default_threshold() -> usize {
    DEFAULT_THRESHOLD
}

fn default_snapshot_dir() -> PathBuf {
    PathBuf::from(DEFAULT_SNAPSHOT_DIR)
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            snapshot_dir: default_snapshot_dir(),
        }
    }
}

impl CacheConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the refill threshold
    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the snapshot directory
    pub fn with_snapshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.snapshot_dir = dir.into();
        self
    }

    /// Check the configuration
    pub fn validate(&self) -> Result<()> {
        if self.threshold == 0 {
            return Err(Error::InvalidThreshold(self.threshold));
        }
        Ok(())
    }
}

//! Cache statistics tracking

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for lookups and background refills
#[derive(Debug, Default)]
pub struct CacheStats {
    ready: AtomicU64,
    loading: AtomicU64,
    refills_scheduled: AtomicU64,
    refills_succeeded: AtomicU64,
    refills_failed: AtomicU64,
    values_produced: AtomicU64,
}

impl CacheStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a lookup that returned a value
    pub fn record_ready(&self) {
        self.ready.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a lookup that found an empty buffer
    pub fn record_loading(&self) {
        self.loading.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a scheduled refill
    pub fn record_refill_scheduled(&self) {
        self.refills_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a refill that appended `values` values
    pub fn record_refill_success(&self, values: usize) {
        self.refills_succeeded.fetch_add(1, Ordering::Relaxed);
        self.values_produced
            .fetch_add(values as u64, Ordering::Relaxed);
    }

    /// Record a refill that failed or produced nothing
    pub fn record_refill_failure(&self) {
        self.refills_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Lookups that returned a value
    pub fn ready(&self) -> u64 {
        self.ready.load(Ordering::Relaxed)
    }

    /// Lookups that returned `Loading`
    pub fn loading(&self) -> u64 {
        self.loading.load(Ordering::Relaxed)
    }

    /// Refills scheduled so far
    pub fn refills_scheduled(&self) -> u64 {
        self.refills_scheduled.load(Ordering::Relaxed)
    }

    /// Refills that appended at least one value
    pub fn refills_succeeded(&self) -> u64 {
        self.refills_succeeded.load(Ordering::Relaxed)
    }

    /// Refills that failed, panicked or produced nothing
    pub fn refills_failed(&self) -> u64 {
        self.refills_failed.load(Ordering::Relaxed)
    }

    /// Refills that have run to completion either way
    pub fn refills_completed(&self) -> u64 {
        self.refills_succeeded() + self.refills_failed()
    }

    /// Values appended by successful refills
    pub fn values_produced(&self) -> u64 {
        self.values_produced.load(Ordering::Relaxed)
    }

    /// Share of lookups served from the buffer (0.0 to 1.0)
    pub fn ready_ratio(&self) -> f64 {
        let ready = self.ready();
        let total = ready + self.loading();
        if total == 0 {
            0.0
        } else {
            ready as f64 / total as f64
        }
    }

    /// Reset all statistics
    pub fn reset(&self) {
        self.ready.store(0, Ordering::Relaxed);
        self.loading.store(0, Ordering::Relaxed);
        self.refills_scheduled.store(0, Ordering::Relaxed);
        self.refills_succeeded.store(0, Ordering::Relaxed);
        self.refills_failed.store(0, Ordering::Relaxed);
        self.values_produced.store(0, Ordering::Relaxed);
    }
}

//! Block mutation counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Monotonic counters the coordinator bumps for every block it fans out.
pub trait Metrics: Send + Sync {
    fn increment_blocks_inserted(&self, n: u64);
    fn increment_blocks_patched(&self, n: u64);
    fn increment_blocks_deleted(&self, n: u64);
}

/// In-process [`Metrics`] backed by atomics.
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    inserted: AtomicU64,
    patched: AtomicU64,
    deleted: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub blocks_inserted: u64,
    pub blocks_patched: u64,
    pub blocks_deleted: u64,
}

impl AtomicMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            blocks_inserted: self.inserted.load(Ordering::Relaxed),
            blocks_patched: self.patched.load(Ordering::Relaxed),
            blocks_deleted: self.deleted.load(Ordering::Relaxed),
        }
    }
}

impl Metrics for AtomicMetrics {
    fn increment_blocks_inserted(&self, n: u64) {
        self.inserted.fetch_add(n, Ordering::Relaxed);
    }

    fn increment_blocks_patched(&self, n: u64) {
        self.patched.fetch_add(n, Ordering::Relaxed);
    }

    fn increment_blocks_deleted(&self, n: u64) {
        self.deleted.fetch_add(n, Ordering::Relaxed);
    }
}

//! Run totals shared by the workers of one pool.
//!
//! Throughput only: operation and byte counts. Latency distributions are out of
//! scope for this tool.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Lock-free counters for issued operations and payload bytes sent
#[derive(Debug, Default)]
pub struct Totals {
    ops: AtomicU64,
    bytes: AtomicU64,
}

impl Totals {
    pub fn add(&self, bytes: u64, ops: u64) {
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
        self.ops.fetch_add(ops, Ordering::Relaxed);
    }

    /// (ops, bytes)
    pub fn snapshot(&self) -> (u64, u64) {
        (
            self.ops.load(Ordering::Relaxed),
            self.bytes.load(Ordering::Relaxed),
        )
    }
}

/// Operations per second over `elapsed`
pub fn ops_per_sec(ops: u64, elapsed: Duration) -> f64 {
    ops as f64 / elapsed.as_secs_f64().max(1e-9)
}

/// MiB per second over `elapsed`
pub fn mib_per_sec(bytes: u64, elapsed: Duration) -> f64 {
    bytes as f64 / (1024.0 * 1024.0) / elapsed.as_secs_f64().max(1e-9)
}

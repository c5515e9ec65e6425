//! Bookkeeping for failures a pool logs and tolerates
//!
//! In client topology a non-success status does not stop the worker that saw
//! it. The tracker counts those failures and keeps the first few messages for
//! the run summary.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::constants::MAX_RETAINED_FAILURE_MESSAGES;
use crate::error::InjectError;

#[derive(Debug)]
pub struct FailureTracker {
    total: AtomicU64,
    max_messages: usize,
    messages: Mutex<Vec<String>>,
}

impl Default for FailureTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl FailureTracker {
    pub fn new() -> Self {
        Self::with_capacity(MAX_RETAINED_FAILURE_MESSAGES)
    }

    pub fn with_capacity(max_messages: usize) -> Self {
        Self {
            total: AtomicU64::new(0),
            max_messages,
            messages: Mutex::new(Vec::new()),
        }
    }

    /// Record a tolerated failure; returns the running total
    pub fn record(&self, error: &InjectError) -> u64 {
        let total = self.total.fetch_add(1, Ordering::Relaxed) + 1;

        let mut messages = self.messages.lock().unwrap_or_else(|e| e.into_inner());
        if messages.len() < self.max_messages {
            messages.push(error.to_string());
        }

        total
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

//! Error taxonomy for the injection engine.
//!
//! Whether an `UnexpectedStatus` ends the run is decided by the pool's
//! [`FailurePolicy`](crate::pool::FailurePolicy); every other variant is fatal.

use reqwest::StatusCode;

use crate::request::Verb;

#[derive(thiserror::Error, Debug)]
pub enum InjectError {
    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("cannot build {verb} request for key '{key}': {reason}")]
    RequestBuild {
        verb: Verb,
        key: String,
        reason: String,
    },

    #[error("{verb} {url} failed: {message}")]
    Transport {
        verb: Verb,
        url: String,
        message: String,
    },

    #[error("{verb} of key '{key}' returned {status}")]
    UnexpectedStatus {
        verb: Verb,
        key: String,
        status: StatusCode,
    },

    #[error("concurrency slot pool closed")]
    SlotPoolClosed,

    #[error("worker task failed: {0}")]
    WorkerPanicked(String),

    #[error("pool drained with {completed} of {spawned} workers completed")]
    IncompleteDrain { spawned: usize, completed: usize },
}

impl InjectError {
    /// True for a non-success status, the only error a policy may tolerate
    pub fn is_status(&self) -> bool {
        matches!(self, InjectError::UnexpectedStatus { .. })
    }
}

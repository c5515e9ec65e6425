// tests/common/mod.rs
//
// In-process stand-in for a HyperDrive deployment. Records every request in
// arrival order, tracks how many requests are in flight, and keeps a store of
// keys per endpoint so index queries answer with what was actually written.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use hd_injector::constants::{GROUP_INDEX_PATH, KEY_INDEX_PATH};
use hd_injector::request::{OperationRequest, Verb};
use hd_injector::transport::{Reply, Transport};
use hd_injector::InjectError;
use reqwest::StatusCode;
use serde_json::json;

#[derive(Debug, Clone)]
pub struct Call {
    pub seq: usize,
    pub verb: Verb,
    pub origin: String,
    pub url: String,
    pub key: String,
    pub content_type: Option<String>,
    pub body_len: u64,
    pub index: bool,
}

type StatusFn = dyn Fn(&OperationRequest) -> Option<StatusCode> + Send + Sync;

pub struct MockTransport {
    delay: Duration,
    status: Option<Box<StatusFn>>,
    refuse: bool,
    seq: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: Mutex<Vec<Call>>,
    stored: Mutex<BTreeMap<String, BTreeSet<String>>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Healthy target: stores answer 204, reads 200 (404 for unknown keys)
    pub fn new() -> Self {
        Self {
            delay: Duration::ZERO,
            status: None,
            refuse: false,
            seq: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            stored: Mutex::new(BTreeMap::new()),
        }
    }

    /// Hold every request for `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Override the status of operation requests; `None` falls back to the
    /// healthy behavior. Index queries are never overridden.
    pub fn with_status<F>(mut self, f: F) -> Self
    where
        F: Fn(&OperationRequest) -> Option<StatusCode> + Send + Sync + 'static,
    {
        self.status = Some(Box::new(f));
        self
    }

    /// Fail every request at the transport level
    pub fn refusing(mut self) -> Self {
        self.refuse = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn op_calls(&self, verb: Verb) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !c.index && c.verb == verb)
            .collect()
    }

    pub fn index_calls(&self) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.index).collect()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn stored_keys(&self, origin: &str) -> BTreeSet<String> {
        self.stored
            .lock()
            .unwrap()
            .get(origin)
            .cloned()
            .unwrap_or_default()
    }

    fn respond(&self, request: &OperationRequest, origin: &str, index: bool) -> Reply {
        let path = request.url.path();
        let mut stored = self.stored.lock().unwrap();

        if index {
            if path.ends_with(KEY_INDEX_PATH) {
                let keys: Vec<_> = stored
                    .get(origin)
                    .into_iter()
                    .flatten()
                    .map(|k| json!({ "key": k, "version": 1 }))
                    .collect();
                return Reply::with_body(StatusCode::OK, json!({ "keys": keys }).to_string());
            }
            if path.ends_with(GROUP_INDEX_PATH) {
                // Groups are the first path segment of every key written anywhere
                let groups: BTreeSet<&str> = stored
                    .values()
                    .flatten()
                    .filter_map(|k| k.split('/').next())
                    .collect();
                return Reply::with_body(StatusCode::OK, json!({ "groups": groups }).to_string());
            }
            return Reply::new(StatusCode::NOT_FOUND);
        }

        if let Some(status) = self.status.as_ref().and_then(|f| f(request)) {
            return Reply::new(status);
        }

        let keys = stored.entry(origin.to_string()).or_default();
        match request.verb {
            Verb::Store => {
                keys.insert(request.key.clone());
                Reply::new(StatusCode::NO_CONTENT)
            }
            Verb::Retrieve if keys.contains(&request.key) => Reply::new(StatusCode::OK),
            Verb::Retrieve => Reply::new(StatusCode::NOT_FOUND),
            Verb::Delete => {
                keys.remove(&request.key);
                Reply::new(StatusCode::NO_CONTENT)
            }
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: OperationRequest) -> Result<Reply, InjectError> {
        let origin = request.url.origin().ascii_serialization();
        let index = request.url.path().contains("/info/index/");

        let call = Call {
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
            verb: request.verb,
            origin: origin.clone(),
            url: request.url.to_string(),
            key: request.key.clone(),
            content_type: request
                .headers
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            body_len: request.body_len(),
            index,
        };
        self.calls.lock().unwrap().push(call);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let result = if self.refuse {
            Err(InjectError::Transport {
                verb: request.verb,
                url: request.url.to_string(),
                message: "connection refused".to_string(),
            })
        } else {
            Ok(self.respond(&request, &origin, index))
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Origin string of an endpoint URL, as recorded in [`Call::origin`]
pub fn origin(endpoint: &str) -> String {
    url::Url::parse(endpoint)
        .unwrap()
        .origin()
        .ascii_serialization()
}

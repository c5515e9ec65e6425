//! Network seam between the injection engine and the target.
//!
//! The pool and the index aggregator only see [`Transport`]; production runs use
//! [`HttpTransport`], tests substitute an in-process mock.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;

use crate::error::InjectError;
use crate::request::OperationRequest;

/// Status and body of a completed round trip
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub body: Bytes,
}

impl Reply {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            body: Bytes::new(),
        }
    }

    pub fn with_body(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue one request and wait for the full response. Only failures to
    /// complete the round trip are errors; any status is a valid reply.
    async fn execute(&self, request: OperationRequest) -> Result<Reply, InjectError>;
}

/// reqwest-backed transport shared by every worker of a run
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    max_idle_per_host: usize,
}

impl HttpTransport {
    /// Keep up to `max_idle_per_host` connections open per target, normally
    /// the run's concurrency ceiling.
    pub fn new(max_idle_per_host: usize) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(max_idle_per_host)
            .tcp_nodelay(true)
            .build()?;
        Ok(Self {
            client,
            max_idle_per_host,
        })
    }

    pub fn max_idle_per_host(&self) -> usize {
        self.max_idle_per_host
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: OperationRequest) -> Result<Reply, InjectError> {
        let OperationRequest {
            verb,
            url,
            headers,
            body,
            ..
        } = request;
        let failed = |e: reqwest::Error| InjectError::Transport {
            verb,
            url: url.to_string(),
            message: e.to_string(),
        };

        let mut builder = self
            .client
            .request(verb.method(), url.clone())
            .headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(failed)?;
        let status = response.status();
        // Drain the body so the connection goes back to the pool
        let body = response.bytes().await.map_err(failed)?;

        Ok(Reply { status, body })
    }
}

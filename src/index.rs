//! Index aggregation: read-only queries of a target's key and group index.
//!
//! Runs after a pool has drained. Reporting is best effort, so an unreachable
//! endpoint or a body that does not parse is logged and yields an empty list.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::constants::{GROUP_INDEX_PATH, KEY_INDEX_PATH};
use crate::request::{self, Endpoint};
use crate::transport::Transport;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyVersion {
    pub key: String,
    pub version: i64,
}

// Index services may answer `null` for an empty list
#[derive(Debug, Default, Deserialize)]
struct KeyList {
    #[serde(default)]
    keys: Option<Vec<KeyVersion>>,
}

#[derive(Debug, Default, Deserialize)]
struct GroupList {
    #[serde(default)]
    groups: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Keys,
    Groups,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexEntries {
    Keys(Vec<KeyVersion>),
    Groups(Vec<String>),
}

/// One index read, produced once per query and never persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSnapshot {
    pub endpoint: String,
    pub entries: IndexEntries,
}

impl IndexSnapshot {
    pub fn kind(&self) -> IndexKind {
        match self.entries {
            IndexEntries::Keys(_) => IndexKind::Keys,
            IndexEntries::Groups(_) => IndexKind::Groups,
        }
    }

    pub fn len(&self) -> usize {
        match &self.entries {
            IndexEntries::Keys(k) => k.len(),
            IndexEntries::Groups(g) => g.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone)]
pub struct IndexAggregator {
    transport: Arc<dyn Transport>,
}

impl IndexAggregator {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Keys with their versions, in the order the endpoint returned them
    pub async fn list_keys(&self, endpoint: &Endpoint) -> Vec<KeyVersion> {
        match self.fetch::<KeyList>(endpoint, KEY_INDEX_PATH).await {
            Ok(list) => list.keys.unwrap_or_default(),
            Err(e) => {
                warn!("Key index query against {} failed: {:#}", endpoint, e);
                Vec::new()
            }
        }
    }

    pub async fn list_groups(&self, endpoint: &Endpoint) -> Vec<String> {
        match self.fetch::<GroupList>(endpoint, GROUP_INDEX_PATH).await {
            Ok(list) => list.groups.unwrap_or_default(),
            Err(e) => {
                warn!("Group index query against {} failed: {:#}", endpoint, e);
                Vec::new()
            }
        }
    }

    pub async fn snapshot(&self, endpoint: &Endpoint, kind: IndexKind) -> IndexSnapshot {
        let entries = match kind {
            IndexKind::Keys => IndexEntries::Keys(self.list_keys(endpoint).await),
            IndexKind::Groups => IndexEntries::Groups(self.list_groups(endpoint).await),
        };
        let snapshot = IndexSnapshot {
            endpoint: endpoint.to_string(),
            entries,
        };
        info!("{:?} index of {}: {} entries", kind, endpoint, snapshot.len());
        snapshot
    }

    async fn fetch<T: DeserializeOwned>(&self, endpoint: &Endpoint, path: &str) -> Result<T> {
        let request = request::index_query(endpoint, path)?;
        debug!("Querying index {}", request.url);

        let reply = self.transport.execute(request).await?;
        if !reply.status.is_success() {
            bail!("index endpoint returned {}", reply.status);
        }
        serde_json::from_slice(&reply.body).context("malformed index body")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InjectError;
    use crate::request::OperationRequest;
    use crate::transport::Reply;
    use async_trait::async_trait;
    use reqwest::StatusCode;

    struct Canned(Result<Reply, ()>);

    #[async_trait]
    impl Transport for Canned {
        async fn execute(&self, request: OperationRequest) -> Result<Reply, InjectError> {
            self.0.clone().map_err(|_| InjectError::Transport {
                verb: request.verb,
                url: request.url.to_string(),
                message: "connection refused".to_string(),
            })
        }
    }

    fn aggregator(reply: Result<Reply, ()>) -> IndexAggregator {
        IndexAggregator::new(Arc::new(Canned(reply)))
    }

    fn endpoint() -> Endpoint {
        Endpoint::parse("http://127.0.0.1:4244/").unwrap()
    }

    #[tokio::test]
    async fn test_list_keys_parses_body() {
        let body = r#"{"keys":[{"key":"AB","version":1},{"key":"CD","version":3}]}"#;
        let agg = aggregator(Ok(Reply::with_body(StatusCode::OK, body)));

        let keys = agg.list_keys(&endpoint()).await;
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[1], KeyVersion { key: "CD".into(), version: 3 });
    }

    #[tokio::test]
    async fn test_list_groups_parses_body() {
        let agg = aggregator(Ok(Reply::with_body(StatusCode::OK, r#"{"groups":["g1","g2"]}"#)));
        let snap = agg.snapshot(&endpoint(), IndexKind::Groups).await;
        assert_eq!(snap.kind(), IndexKind::Groups);
        assert_eq!(snap.len(), 2);
    }

    #[tokio::test]
    async fn test_null_and_missing_lists_are_empty() {
        let agg = aggregator(Ok(Reply::with_body(StatusCode::OK, r#"{"keys":null}"#)));
        assert!(agg.list_keys(&endpoint()).await.is_empty());

        let agg = aggregator(Ok(Reply::with_body(StatusCode::OK, "{}")));
        assert!(agg.list_groups(&endpoint()).await.is_empty());
    }

    #[tokio::test]
    async fn test_failures_yield_empty_results() {
        let agg = aggregator(Ok(Reply::with_body(StatusCode::OK, "not json")));
        assert!(agg.list_keys(&endpoint()).await.is_empty());

        let agg = aggregator(Ok(Reply::new(StatusCode::SERVICE_UNAVAILABLE)));
        assert!(agg.list_groups(&endpoint()).await.is_empty());

        let agg = aggregator(Err(()));
        assert!(agg.snapshot(&endpoint(), IndexKind::Keys).await.is_empty());
    }
}

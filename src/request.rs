// src/request.rs
//
// Request formatting for the two HyperDrive API flavors.
//
// Server API: keys live under `{endpoint}store/{key}` and store requests carry
// the payload length in a vendor Content-Type. Client API: keys are
// path-like and appended directly to the endpoint.

use std::fmt;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use url::Url;

use crate::config::Topology;
use crate::constants::{SERVER_ACCEPT, SERVER_DATA_CONTENT_TYPE, SERVER_STORE_PREFIX};
use crate::error::InjectError;

/// One addressable target instance. Always ends with '/'.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    base: Url,
}

impl Endpoint {
    pub fn parse(input: &str) -> Result<Self, InjectError> {
        let invalid = |reason: String| InjectError::InvalidEndpoint {
            endpoint: input.to_string(),
            reason,
        };

        let mut base = Url::parse(input.trim()).map_err(|e| invalid(e.to_string()))?;
        match base.scheme() {
            "http" | "https" => {}
            other => return Err(invalid(format!("unsupported scheme '{}'", other))),
        }
        if base.host_str().is_none() {
            return Err(invalid("missing host".to_string()));
        }
        if base.query().is_some() || base.fragment().is_some() {
            return Err(invalid("query and fragment are not allowed".to_string()));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self { base })
    }

    /// Client endpoint `ordinal`, listening on `base_port + ordinal`
    pub fn client(host: &str, base_port: u16, ordinal: usize) -> Result<Self, InjectError> {
        let port = usize::from(base_port)
            .checked_add(ordinal)
            .and_then(|p| u16::try_from(p).ok())
            .ok_or_else(|| InjectError::InvalidEndpoint {
                endpoint: format!("{}:{}+{}", host, base_port, ordinal),
                reason: "port out of range".to_string(),
            })?;
        Self::parse(&format!("http://{}:{}/", host, port))
    }

    pub fn as_str(&self) -> &str {
        self.base.as_str()
    }

    /// Append a raw path to the base, the way keys are addressed on the wire
    pub fn resolve(&self, path: &str) -> Result<Url, url::ParseError> {
        Url::parse(&format!("{}{}", self.base, path))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.base.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Store,
    Retrieve,
    Delete,
}

impl Verb {
    pub fn method(self) -> Method {
        match self {
            Verb::Store => Method::PUT,
            Verb::Retrieve => Method::GET,
            Verb::Delete => Method::DELETE,
        }
    }

    /// Status the target answers with when the operation succeeded
    pub fn accepts(self, status: StatusCode) -> bool {
        match self {
            Verb::Store => status == StatusCode::NO_CONTENT,
            Verb::Retrieve => status == StatusCode::OK,
            Verb::Delete => status.is_success(),
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verb::Store => "store",
            Verb::Retrieve => "retrieve",
            Verb::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// A fully formatted operation, built fresh for every issue and consumed by
/// the transport.
#[derive(Debug, Clone)]
pub struct OperationRequest {
    pub verb: Verb,
    pub key: String,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl OperationRequest {
    pub fn method(&self) -> Method {
        self.verb.method()
    }

    pub fn body_len(&self) -> u64 {
        self.body.as_ref().map_or(0, |b| b.len() as u64)
    }
}

/// Build `verb` against `key` on `endpoint`. The payload is attached to store
/// requests only.
pub fn build(
    topology: Topology,
    verb: Verb,
    key: &str,
    endpoint: &Endpoint,
    payload: &Bytes,
) -> Result<OperationRequest, InjectError> {
    let fail = |reason: String| InjectError::RequestBuild {
        verb,
        key: key.to_string(),
        reason,
    };

    if key.is_empty() {
        return Err(fail("empty key".to_string()));
    }

    let path = match topology {
        Topology::Server => format!("{}{}", SERVER_STORE_PREFIX, key),
        Topology::Client => key.to_string(),
    };
    let url = endpoint.resolve(&path).map_err(|e| fail(e.to_string()))?;

    let mut headers = HeaderMap::new();
    if topology == Topology::Server {
        match verb {
            Verb::Store => {
                let value = format!("{}{};", SERVER_DATA_CONTENT_TYPE, payload.len());
                let value = HeaderValue::from_str(&value).map_err(|e| fail(e.to_string()))?;
                headers.insert(CONTENT_TYPE, value);
            }
            Verb::Retrieve | Verb::Delete => {
                headers.insert(ACCEPT, HeaderValue::from_static(SERVER_ACCEPT));
            }
        }
    }

    let body = (verb == Verb::Store).then(|| payload.clone());

    Ok(OperationRequest {
        verb,
        key: key.to_string(),
        url,
        headers,
        body,
    })
}

/// Build a read-only JSON query for an index listing path
pub fn index_query(endpoint: &Endpoint, path: &str) -> Result<OperationRequest, InjectError> {
    let url = endpoint
        .resolve(path)
        .map_err(|e| InjectError::RequestBuild {
            verb: Verb::Retrieve,
            key: path.to_string(),
            reason: e.to_string(),
        })?;

    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    Ok(OperationRequest {
        verb: Verb::Retrieve,
        key: path.to_string(),
        url,
        headers,
        body: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::KEY_INDEX_PATH;

    fn server() -> Endpoint {
        Endpoint::parse("http://127.0.0.1:4244/").unwrap()
    }

    #[test]
    fn test_endpoint_adds_trailing_slash() {
        let ep = Endpoint::parse("http://127.0.0.1:8889/prefix").unwrap();
        assert_eq!(ep.as_str(), "http://127.0.0.1:8889/prefix/");
    }

    #[test]
    fn test_endpoint_rejects_malformed() {
        assert!(Endpoint::parse("not a url").is_err());
        assert!(Endpoint::parse("ftp://127.0.0.1/").is_err());
        assert!(Endpoint::parse("http://127.0.0.1:4244/?x=1").is_err());
    }

    #[test]
    fn test_client_endpoint_port_offset() {
        let ep = Endpoint::client("127.0.0.1", 8889, 2).unwrap();
        assert_eq!(ep.as_str(), "http://127.0.0.1:8891/");
        assert!(Endpoint::client("127.0.0.1", u16::MAX, 1).is_err());
    }

    #[test]
    fn test_server_store_request() {
        let payload = Bytes::from_static(b"ABCDE");
        let req = build(Topology::Server, Verb::Store, "00FF", &server(), &payload).unwrap();

        assert_eq!(req.method(), Method::PUT);
        assert_eq!(req.url.as_str(), "http://127.0.0.1:4244/store/00FF");
        assert_eq!(
            req.headers.get(CONTENT_TYPE).unwrap(),
            "application/x-scality-storage-data;data=5;"
        );
        assert_eq!(req.body_len(), 5);
    }

    #[test]
    fn test_server_retrieve_and_delete_carry_accept() {
        let payload = Bytes::from_static(b"ABCDE");
        for verb in [Verb::Retrieve, Verb::Delete] {
            let req = build(Topology::Server, verb, "00FF", &server(), &payload).unwrap();
            assert_eq!(req.url.as_str(), "http://127.0.0.1:4244/store/00FF");
            assert_eq!(req.headers.get(ACCEPT).unwrap(), SERVER_ACCEPT);
            assert!(req.body.is_none());
        }
    }

    #[test]
    fn test_client_store_request() {
        let ep = Endpoint::client("127.0.0.1", 8889, 0).unwrap();
        let payload = Bytes::from_static(b"XYZ");
        let req = build(Topology::Client, Verb::Store, "dir-0/obj-42", &ep, &payload).unwrap();

        assert_eq!(req.url.as_str(), "http://127.0.0.1:8889/dir-0/obj-42");
        assert!(req.headers.is_empty());
        assert_eq!(req.body.as_deref(), Some(&b"XYZ"[..]));
    }

    #[test]
    fn test_empty_key_is_rejected() {
        let err = build(Topology::Client, Verb::Store, "", &server(), &Bytes::new()).unwrap_err();
        assert!(matches!(err, InjectError::RequestBuild { .. }));
    }

    #[test]
    fn test_status_acceptance() {
        assert!(Verb::Store.accepts(StatusCode::NO_CONTENT));
        assert!(!Verb::Store.accepts(StatusCode::OK));
        assert!(Verb::Retrieve.accepts(StatusCode::OK));
        assert!(Verb::Delete.accepts(StatusCode::OK));
        assert!(Verb::Delete.accepts(StatusCode::NO_CONTENT));
        assert!(!Verb::Delete.accepts(StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_index_query() {
        let req = index_query(&server(), KEY_INDEX_PATH).unwrap();
        assert_eq!(req.url.as_str(), "http://127.0.0.1:4244/info/index/key/list/");
        assert_eq!(req.headers.get(ACCEPT).unwrap(), "application/json");
    }
}

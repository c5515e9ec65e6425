// src/config.rs
use std::fmt;
use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::constants::{
    DEFAULT_CLIENT_BASE_PORT, DEFAULT_CLIENT_COUNT, DEFAULT_CLIENT_HOST, DEFAULT_MAX_IN_FLIGHT,
    DEFAULT_OPS_PER_WORKER, DEFAULT_PAYLOAD_SIZE, DEFAULT_REFERENCE_ENDPOINTS,
    DEFAULT_SERVER_ENDPOINT, DEFAULT_WORKERS, MAX_REFERENCE_ENDPOINTS,
};
use crate::pool::OpPlan;
use crate::request::Endpoint;

/// Which HyperDrive API shape a run addresses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    /// Low-level server API: raw hex keys under `store/`
    #[default]
    Server,
    /// Client API: path-like keys, one or more client endpoints
    Client,
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topology::Server => f.write_str("server"),
            Topology::Client => f.write_str("client"),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// Target API shape. Defaults to server.
    #[serde(default)]
    pub topology: Topology,

    /// Logical workers launched per pool.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Sequential operations issued by each worker.
    #[serde(default = "default_ops_per_worker")]
    pub ops_per_worker: usize,

    /// Store payload size; a number of bytes or a string such as "1MiB".
    #[serde(
        default = "default_payload_size",
        deserialize_with = "crate::size_parser::deserialize_size"
    )]
    pub payload_size: u64,

    /// Number of client endpoints addressed in client topology.
    #[serde(default = "default_client_count")]
    pub client_count: usize,

    /// Primary endpoint in server topology.
    #[serde(default = "default_server")]
    pub server: String,

    /// Host of the client endpoints.
    #[serde(default = "default_client_host")]
    pub client_host: String,

    /// Port of client endpoint 0; endpoint N uses base + N.
    #[serde(default = "default_client_base_port")]
    pub client_base_port: u16,

    /// Servers whose group index is reported after a client-topology run (at most 3).
    #[serde(default = "default_reference_endpoints")]
    pub reference_endpoints: Vec<String>,

    /// Process-wide ceiling on workers in flight.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Retrieve each key right after storing it.
    #[serde(default)]
    pub read_back: bool,

    /// Delete each key after storing (and reading back) it.
    #[serde(default)]
    pub delete: bool,

    /// Seed for reproducible keys and payloads. Random when omitted.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Show a progress bar per pool.
    #[serde(default)]
    pub progress: bool,
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_ops_per_worker() -> usize {
    DEFAULT_OPS_PER_WORKER
}

fn default_payload_size() -> u64 {
    DEFAULT_PAYLOAD_SIZE
}

fn default_client_count() -> usize {
    DEFAULT_CLIENT_COUNT
}

fn default_server() -> String {
    DEFAULT_SERVER_ENDPOINT.to_string()
}

fn default_client_host() -> String {
    DEFAULT_CLIENT_HOST.to_string()
}

fn default_client_base_port() -> u16 {
    DEFAULT_CLIENT_BASE_PORT
}

fn default_reference_endpoints() -> Vec<String> {
    DEFAULT_REFERENCE_ENDPOINTS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_max_in_flight() -> usize {
    DEFAULT_MAX_IN_FLIGHT
}

impl Default for Config {
    fn default() -> Self {
        Self {
            topology: Topology::default(),
            workers: default_workers(),
            ops_per_worker: default_ops_per_worker(),
            payload_size: default_payload_size(),
            client_count: default_client_count(),
            server: default_server(),
            client_host: default_client_host(),
            client_base_port: default_client_base_port(),
            reference_endpoints: default_reference_endpoints(),
            max_in_flight: default_max_in_flight(),
            read_back: false,
            delete: false,
            seed: None,
            progress: false,
        }
    }
}

/// Values given on the command line; each one set replaces the config value.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub topology: Option<Topology>,
    pub workers: Option<usize>,
    pub ops_per_worker: Option<usize>,
    pub payload_size: Option<u64>,
    pub client_count: Option<usize>,
    pub server: Option<String>,
    pub client_host: Option<String>,
    pub client_base_port: Option<u16>,
    pub reference_endpoints: Vec<String>,
    pub max_in_flight: Option<usize>,
    pub read_back: bool,
    pub delete: bool,
    pub seed: Option<u64>,
    pub progress: bool,
}

impl Config {
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let buf = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
        serde_yaml::from_slice(&buf).with_context(|| format!("parse {}", path.display()))
    }

    pub fn apply(&mut self, o: ConfigOverrides) {
        if let Some(v) = o.topology {
            self.topology = v;
        }
        if let Some(v) = o.workers {
            self.workers = v;
        }
        if let Some(v) = o.ops_per_worker {
            self.ops_per_worker = v;
        }
        if let Some(v) = o.payload_size {
            self.payload_size = v;
        }
        if let Some(v) = o.client_count {
            self.client_count = v;
        }
        if let Some(v) = o.server {
            self.server = v;
        }
        if let Some(v) = o.client_host {
            self.client_host = v;
        }
        if let Some(v) = o.client_base_port {
            self.client_base_port = v;
        }
        if !o.reference_endpoints.is_empty() {
            self.reference_endpoints = o.reference_endpoints;
        }
        if let Some(v) = o.max_in_flight {
            self.max_in_flight = v;
        }
        if let Some(v) = o.seed {
            self.seed = Some(v);
        }
        // Flags can only switch features on
        self.read_back |= o.read_back;
        self.delete |= o.delete;
        self.progress |= o.progress;
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.max_in_flight > 0, "max_in_flight must be > 0");
        ensure!(
            self.max_in_flight <= Semaphore::MAX_PERMITS,
            "max_in_flight must be <= {}, got {}",
            Semaphore::MAX_PERMITS,
            self.max_in_flight
        );
        self.payload_len()?;

        match self.topology {
            Topology::Server => {
                self.server_endpoint()?;
            }
            Topology::Client => {
                let refs = &self.reference_endpoints;
                if refs.is_empty() || refs.len() > MAX_REFERENCE_ENDPOINTS {
                    bail!(
                        "client topology needs 1 to {} reference endpoints, got {}",
                        MAX_REFERENCE_ENDPOINTS,
                        refs.len()
                    );
                }
                self.client_endpoints()?;
                self.reference_endpoints()?;
            }
        }
        Ok(())
    }

    pub fn payload_len(&self) -> Result<usize> {
        usize::try_from(self.payload_size)
            .with_context(|| format!("payload size {} does not fit in memory", self.payload_size))
    }

    pub fn op_plan(&self) -> OpPlan {
        OpPlan {
            read_back: self.read_back,
            delete: self.delete,
        }
    }

    pub fn server_endpoint(&self) -> Result<Endpoint> {
        Ok(Endpoint::parse(&self.server)?)
    }

    /// Client endpoints 0..client_count at consecutive ports
    pub fn client_endpoints(&self) -> Result<Vec<Endpoint>> {
        (0..self.client_count)
            .map(|i| Endpoint::client(&self.client_host, self.client_base_port, i).map_err(Into::into))
            .collect()
    }

    pub fn reference_endpoints(&self) -> Result<Vec<Endpoint>> {
        self.reference_endpoints
            .iter()
            .map(|s| Endpoint::parse(s).map_err(Into::into))
            .collect()
    }
}

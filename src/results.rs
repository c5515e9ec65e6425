//! Run summary: console report and optional JSON export.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;

use crate::config::Topology;
use crate::index::{IndexKind, IndexSnapshot};
use crate::metrics::{mib_per_sec, ops_per_sec};
use crate::pool::PoolOutcome;

/// Entry count of one index after the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub endpoint: String,
    pub kind: IndexKind,
    pub count: usize,
}

impl From<&IndexSnapshot> for IndexReport {
    fn from(snapshot: &IndexSnapshot) -> Self {
        Self {
            endpoint: snapshot.endpoint.clone(),
            kind: snapshot.kind(),
            count: snapshot.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub version: String,
    pub topology: Topology,
    pub started_at: String,
    #[serde(rename = "elapsed_secs", serialize_with = "crate::pool::serialize_secs")]
    pub elapsed: Duration,
    pub pools: Vec<PoolOutcome>,
    pub indexes: Vec<IndexReport>,
}

impl RunSummary {
    pub fn new(topology: Topology) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            topology,
            started_at: Local::now().to_rfc3339(),
            elapsed: Duration::ZERO,
            pools: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn total_ops(&self) -> u64 {
        self.pools.iter().map(|p| p.ops_issued).sum()
    }

    pub fn total_bytes(&self) -> u64 {
        self.pools.iter().map(|p| p.bytes_sent).sum()
    }

    pub fn total_failures(&self) -> u64 {
        self.pools.iter().map(|p| p.failed_ops).sum()
    }

    pub fn completed_workers(&self) -> usize {
        self.pools.iter().map(|p| p.completed).sum()
    }

    pub fn print(&self) {
        let mb = self.total_bytes() as f64 / (1024.0 * 1024.0);
        println!(
            "WALL {:>6.2}s  WORKERS {:>6}  OPS {:>8}  BYTES {:>12} ({:.2} MB)  {:.1} ops/s  {:.2} MB/s  FAILED {}",
            self.elapsed.as_secs_f64(),
            self.completed_workers(),
            self.total_ops(),
            self.total_bytes(),
            mb,
            ops_per_sec(self.total_ops(), self.elapsed),
            mib_per_sec(self.total_bytes(), self.elapsed),
            self.total_failures(),
        );

        if self.pools.len() > 1 {
            for p in &self.pools {
                println!(
                    "  {:<28} workers={:<6} ops={:<8} failed={:<6} {:.2}s",
                    p.endpoint,
                    p.completed,
                    p.ops_issued,
                    p.failed_ops,
                    p.elapsed.as_secs_f64()
                );
            }
        }

        for idx in &self.indexes {
            let label = match idx.kind {
                IndexKind::Keys => "Keys",
                IndexKind::Groups => "Groups",
            };
            println!("{} {}: {}", label, idx.endpoint, idx.count);
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("serialize run summary")?;
        fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }
}

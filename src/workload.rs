// src/workload.rs
//
// Run orchestration. Server topology drives one pool against the primary
// server; client topology drives one pool per client endpoint, all at once.
// Index aggregation starts only once every pool of the run has drained.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use futures::future::{join_all, try_join_all};
use tracing::info;

use crate::config::{Config, Topology};
use crate::index::{IndexAggregator, IndexKind};
use crate::keygen;
use crate::pool::{SlotPool, WorkerPool};
use crate::results::{IndexReport, RunSummary};
use crate::transport::{HttpTransport, Transport};

/// Public entry: run a config over HTTP and return the summary.
pub async fn run(cfg: &Config) -> Result<RunSummary> {
    let transport = http_transport(cfg)?;
    run_with_transport(cfg, Arc::new(transport)).await
}

/// HTTP client sized to keep one idle connection per slot of the ceiling
pub fn http_transport(cfg: &Config) -> Result<HttpTransport> {
    HttpTransport::new(cfg.max_in_flight).context("build HTTP client")
}

/// Same as [`run`] over any transport.
pub async fn run_with_transport(cfg: &Config, transport: Arc<dyn Transport>) -> Result<RunSummary> {
    cfg.validate()?;

    // One ceiling for the whole run, shared by every pool
    let slots = Arc::new(SlotPool::new(cfg.max_in_flight));

    match cfg.topology {
        Topology::Server => run_server(cfg, transport, slots).await,
        Topology::Client => run_client(cfg, transport, slots).await,
    }
}

fn build_pool(
    cfg: &Config,
    transport: &Arc<dyn Transport>,
    slots: &Arc<SlotPool>,
    seed: Option<u64>,
) -> WorkerPool {
    WorkerPool::new(cfg.topology, Arc::clone(transport), Arc::clone(slots))
        .with_plan(cfg.op_plan())
        .with_seed(seed)
        .with_progress(cfg.progress)
}

async fn run_server(
    cfg: &Config,
    transport: Arc<dyn Transport>,
    slots: Arc<SlotPool>,
) -> Result<RunSummary> {
    let endpoint = cfg.server_endpoint()?;
    let mut summary = RunSummary::new(Topology::Server);
    let pool = build_pool(cfg, &transport, &slots, cfg.seed);
    let payload = keygen::payload(cfg.payload_len()?, cfg.seed);

    info!("Launch injector routines: {}", cfg.workers);
    let start = Instant::now();
    let outcome = pool
        .run(&endpoint, cfg.workers, cfg.ops_per_worker, payload)
        .await
        .with_context(|| format!("injection against {} aborted", endpoint))?;
    summary.elapsed = start.elapsed();
    summary.pools.push(outcome);

    let aggregator = IndexAggregator::new(transport);
    let snapshot = aggregator.snapshot(&endpoint, IndexKind::Keys).await;
    summary.indexes.push(IndexReport::from(&snapshot));

    Ok(summary)
}

async fn run_client(
    cfg: &Config,
    transport: Arc<dyn Transport>,
    slots: Arc<SlotPool>,
) -> Result<RunSummary> {
    let endpoints = cfg.client_endpoints()?;
    let references = cfg.reference_endpoints()?;
    let payload_len = cfg.payload_len()?;
    let mut summary = RunSummary::new(Topology::Client);

    info!(
        "Launching {} client pools of {} workers each",
        endpoints.len(),
        cfg.workers
    );
    let start = Instant::now();

    let pools = endpoints.iter().enumerate().map(|(i, endpoint)| {
        let seed = cfg.seed.map(|s| s ^ ((i as u64) << 32));
        let pool = build_pool(cfg, &transport, &slots, seed);
        async move {
            let payload = keygen::payload(payload_len, seed);
            pool.run(endpoint, cfg.workers, cfg.ops_per_worker, payload)
                .await
                .with_context(|| format!("injection against {} aborted", endpoint))
        }
    });
    // Outer barrier: every pool drains, or the first fatal error cancels the rest
    summary.pools = try_join_all(pools).await?;
    summary.elapsed = start.elapsed();

    let aggregator = IndexAggregator::new(transport);
    let snapshots = join_all(
        references
            .iter()
            .map(|endpoint| aggregator.snapshot(endpoint, IndexKind::Groups)),
    )
    .await;
    summary.indexes = snapshots.iter().map(IndexReport::from).collect();

    Ok(summary)
}

//! Bounded worker pool: the injection engine.
//!
//! A pool launches `workers` logical workers against one endpoint. Each worker
//! must hold a slot from the process-wide [`SlotPool`] while it runs, so no more
//! than `capacity` workers are ever in flight no matter how many are requested.
//! Slots are acquired by the launch loop *before* the worker task is spawned,
//! which also bounds the number of live tasks.
//!
//! Every worker issues its operations sequentially, releases its slot, then
//! signals the pool's [`CompletionCounter`]. [`WorkerPool::run`] returns only
//! after every launched task has been joined (the drain barrier).
//!
//! Errors flow back as task results. A fatal error sets the pool's abort flag
//! before the failing worker releases its slot: the launch loop checks the flag
//! after every acquisition, so no new worker starts once a fatal error is seen.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::Topology;
use crate::constants::PROGRESS_TEMPLATE;
use crate::error::InjectError;
use crate::error_tracking::FailureTracker;
use crate::keygen::{KeyStrategy, WorkerKeys};
use crate::metrics::Totals;
use crate::request::{self, Endpoint, Verb};
use crate::transport::Transport;

// -----------------------------------------------------------------------------
// Concurrency slots
// -----------------------------------------------------------------------------

/// Fixed-size pool of concurrency slots shared by every pool of a run
#[derive(Debug)]
pub struct SlotPool {
    sem: Arc<Semaphore>,
    capacity: usize,
    held: AtomicUsize,
    peak: AtomicUsize,
}

impl SlotPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            sem: Arc::new(Semaphore::new(capacity)),
            capacity,
            held: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Wait until a slot is free. The slot is released when the returned
    /// guard is dropped, on every exit path including task cancellation.
    pub async fn acquire(self: &Arc<Self>) -> Result<Slot, InjectError> {
        let permit = self
            .sem
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| InjectError::SlotPoolClosed)?;

        let held = self.held.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(held, Ordering::SeqCst);

        Ok(Slot {
            pool: Arc::clone(self),
            _permit: permit,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently held
    pub fn in_use(&self) -> usize {
        self.held.load(Ordering::SeqCst)
    }

    /// Highest number of slots held at once since creation
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// A held concurrency slot
#[derive(Debug)]
pub struct Slot {
    pool: Arc<SlotPool>,
    _permit: OwnedSemaphorePermit,
}

impl Drop for Slot {
    fn drop(&mut self) {
        // Runs before the permit field is dropped, so `held` never overshoots
        self.pool.held.fetch_sub(1, Ordering::SeqCst);
    }
}

// -----------------------------------------------------------------------------
// Completion accounting
// -----------------------------------------------------------------------------

/// Incremented once by each worker that ran all of its operations
#[derive(Debug, Default)]
pub struct CompletionCounter {
    count: AtomicUsize,
}

impl CompletionCounter {
    /// Returns the count including this signal
    pub fn signal(&self) -> usize {
        self.count.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn get(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }
}

// -----------------------------------------------------------------------------
// Policy
// -----------------------------------------------------------------------------

/// What a pool does with a non-success status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop the whole run on the first bad status
    Abort,
    /// Log it, count it, and let the worker carry on
    LogAndContinue,
}

impl FailurePolicy {
    pub fn for_topology(topology: Topology) -> Self {
        match topology {
            Topology::Server => FailurePolicy::Abort,
            Topology::Client => FailurePolicy::LogAndContinue,
        }
    }
}

/// Operations issued for every generated key, in order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpPlan {
    pub read_back: bool,
    pub delete: bool,
}

impl OpPlan {
    pub fn verbs(self) -> impl Iterator<Item = Verb> {
        std::iter::once(Verb::Store)
            .chain(self.read_back.then_some(Verb::Retrieve))
            .chain(self.delete.then_some(Verb::Delete))
    }
}

// -----------------------------------------------------------------------------
// Pool
// -----------------------------------------------------------------------------

/// Result of a drained pool
#[derive(Debug, Clone, Serialize)]
pub struct PoolOutcome {
    pub endpoint: String,
    pub spawned: usize,
    pub completed: usize,
    pub ops_issued: u64,
    pub bytes_sent: u64,
    pub failed_ops: u64,
    pub failure_messages: Vec<String>,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
}

pub(crate) fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// State shared by the workers of one `run` call
#[derive(Debug, Default)]
struct RunState {
    aborted: AtomicBool,
    completed: CompletionCounter,
    totals: Totals,
    failures: FailureTracker,
}

impl RunState {
    fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
    }

    fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }
}

#[derive(Clone)]
pub struct WorkerPool {
    topology: Topology,
    transport: Arc<dyn Transport>,
    slots: Arc<SlotPool>,
    policy: FailurePolicy,
    plan: OpPlan,
    seed: Option<u64>,
    progress: bool,
}

impl WorkerPool {
    pub fn new(topology: Topology, transport: Arc<dyn Transport>, slots: Arc<SlotPool>) -> Self {
        Self {
            topology,
            transport,
            slots,
            policy: FailurePolicy::for_topology(topology),
            plan: OpPlan::default(),
            seed: None,
            progress: false,
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_plan(mut self, plan: OpPlan) -> Self {
        self.plan = plan;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Run `workers` workers of `ops_per_worker` operations each against
    /// `endpoint`, and wait for all of them.
    pub async fn run(
        &self,
        endpoint: &Endpoint,
        workers: usize,
        ops_per_worker: usize,
        payload: Bytes,
    ) -> Result<PoolOutcome, InjectError> {
        let start = Instant::now();
        let state = Arc::new(RunState::default());
        let pb = self.progress_bar(workers, endpoint);

        info!(
            "Launching {} workers x {} ops against {} ({} topology, ceiling {})",
            workers,
            ops_per_worker,
            endpoint,
            self.topology,
            self.slots.capacity()
        );

        let mut tasks = JoinSet::new();
        let mut spawned = 0usize;

        for ordinal in 0..workers {
            let slot = self.slots.acquire().await?;
            if state.is_aborted() {
                debug!("Abort flag set, not launching worker {}", ordinal);
                break;
            }

            let worker = Worker {
                ordinal,
                ops: ops_per_worker,
                endpoint: endpoint.clone(),
                payload: payload.clone(),
                topology: self.topology,
                policy: self.policy,
                plan: self.plan,
                seed: self.seed,
                transport: Arc::clone(&self.transport),
                state: Arc::clone(&state),
            };
            tasks.spawn(worker.run(slot));
            spawned += 1;
        }

        // Drain barrier
        let mut fatal: Option<InjectError> = None;
        if state.is_aborted() {
            tasks.abort_all();
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(WorkerExit::Completed)) => pb.inc(1),
                Ok(Ok(WorkerExit::Stopped)) => {}
                Ok(Err(e)) => {
                    if fatal.is_none() {
                        error!("Fatal error against {}: {}", endpoint, e);
                        fatal = Some(e);
                        tasks.abort_all();
                    }
                }
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    state.abort();
                    if fatal.is_none() {
                        fatal = Some(InjectError::WorkerPanicked(e.to_string()));
                        tasks.abort_all();
                    }
                }
            }
        }

        if let Some(e) = fatal {
            pb.abandon_with_message("aborted");
            return Err(e);
        }

        let completed = state.completed.get();
        if completed != spawned || spawned != workers {
            return Err(InjectError::IncompleteDrain {
                spawned: workers,
                completed,
            });
        }

        let (ops_issued, bytes_sent) = state.totals.snapshot();
        let elapsed = start.elapsed();
        pb.finish_with_message("drained");
        info!(
            "Pool {} drained: {} workers, {} ops in {:.2}s ({} logged failures)",
            endpoint,
            completed,
            ops_issued,
            elapsed.as_secs_f64(),
            state.failures.total()
        );

        Ok(PoolOutcome {
            endpoint: endpoint.to_string(),
            spawned,
            completed,
            ops_issued,
            bytes_sent,
            failed_ops: state.failures.total(),
            failure_messages: state.failures.messages(),
            elapsed,
        })
    }

    fn progress_bar(&self, workers: usize, endpoint: &Endpoint) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(workers as u64);
        let style = ProgressStyle::with_template(PROGRESS_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        pb.set_style(style);
        pb.set_message(endpoint.to_string());
        pb
    }
}

// -----------------------------------------------------------------------------
// Worker
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerExit {
    Completed,
    /// Saw the abort flag before finishing; does not count as completed
    Stopped,
}

struct Worker {
    ordinal: usize,
    ops: usize,
    endpoint: Endpoint,
    payload: Bytes,
    topology: Topology,
    policy: FailurePolicy,
    plan: OpPlan,
    seed: Option<u64>,
    transport: Arc<dyn Transport>,
    state: Arc<RunState>,
}

impl Worker {
    async fn run(self, slot: Slot) -> Result<WorkerExit, InjectError> {
        let mut keys = WorkerKeys::new(
            KeyStrategy::for_topology(self.topology),
            self.ordinal,
            self.seed,
        );
        debug!(
            "Worker {} started against {} (discriminator {})",
            self.ordinal,
            self.endpoint,
            keys.discriminator()
        );

        for op_index in 0..self.ops {
            if self.state.is_aborted() {
                return Ok(WorkerExit::Stopped);
            }
            let key = keys.next_key(op_index);
            if let Err(e) = self.inject(&key).await {
                // Flag before the slot is released on return
                self.state.abort();
                return Err(e);
            }
        }

        drop(slot);
        self.state.completed.signal();
        debug!("End of worker {} against {}", self.ordinal, self.endpoint);
        Ok(WorkerExit::Completed)
    }

    /// Issue every verb of the plan for one key. A tolerated bad status skips
    /// the remaining verbs for that key.
    async fn inject(&self, key: &str) -> Result<(), InjectError> {
        for verb in self.plan.verbs() {
            let request = request::build(self.topology, verb, key, &self.endpoint, &self.payload)?;
            let sent = request.body_len();
            debug!("{} key: {}", verb, key);

            let reply = self.transport.execute(request).await?;
            self.state.totals.add(sent, 1);

            if verb.accepts(reply.status) {
                continue;
            }
            let err = InjectError::UnexpectedStatus {
                verb,
                key: key.to_string(),
                status: reply.status,
            };
            match self.policy {
                FailurePolicy::Abort => return Err(err),
                FailurePolicy::LogAndContinue => {
                    let total = self.state.failures.record(&err);
                    warn!("Worker {}: {} ({} logged so far)", self.ordinal, err, total);
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

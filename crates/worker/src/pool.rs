//! Worker pool and queued-job poller.
//!
//! `worker_count` tasks share one queue of job ids. Each job runs in its
//! own task under the hard time limit; when the limit expires the task is
//! aborted and the job failed with stage `timeout`. Shutdown lets every
//! worker finish its current job.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use radiarch_core::stages::{STAGE_ERROR, STAGE_TIMEOUT};
use radiarch_core::types::EntityId;
use radiarch_db::store::{Store, StoreError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::runner::{JobRunner, RunOutcome};

/// Default hard time limit per job.
pub const DEFAULT_HARD_LIMIT: Duration = Duration::from_secs(1800);

/// Maximum queued jobs fetched per poll.
const POLL_BATCH_SIZE: usize = 64;

type JobQueue = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<EntityId>>>;
type InFlight = Arc<Mutex<HashSet<EntityId>>>;

// ---------------------------------------------------------------------------
// WorkerPool
// ---------------------------------------------------------------------------

pub struct WorkerPool {
    sender: mpsc::UnboundedSender<EntityId>,
    in_flight: InFlight,
    cancel: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Start `worker_count` workers (at least one).
    pub fn spawn(runner: Arc<JobRunner>, worker_count: usize, hard_limit: Duration) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let queue: JobQueue = Arc::new(tokio::sync::Mutex::new(receiver));
        let in_flight: InFlight = Arc::default();
        let cancel = CancellationToken::new();

        let handles = (0..worker_count.max(1))
            .map(|worker| {
                let worker = Worker {
                    index: worker,
                    queue: Arc::clone(&queue),
                    runner: Arc::clone(&runner),
                    in_flight: Arc::clone(&in_flight),
                    hard_limit,
                };
                tokio::spawn(worker.run(cancel.clone()))
            })
            .collect();

        tracing::info!(
            worker_count = worker_count.max(1),
            hard_limit_secs = hard_limit.as_secs(),
            "Worker pool started",
        );

        Self {
            sender,
            in_flight,
            cancel,
            handles: Mutex::new(handles),
        }
    }

    /// Queue a job. Returns `false` if it is already queued or running in
    /// this process, or the pool is shut down.
    pub fn submit(&self, job_id: EntityId) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        if !lock(&self.in_flight).insert(job_id) {
            return false;
        }
        if self.sender.send(job_id).is_err() {
            lock(&self.in_flight).remove(&job_id);
            return false;
        }
        tracing::debug!(job_id = %job_id, "Job submitted to pool");
        true
    }

    /// Jobs queued or running.
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    pub fn is_in_flight(&self, job_id: EntityId) -> bool {
        lock(&self.in_flight).contains(&job_id)
    }

    /// Stop taking jobs and wait for running ones to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handles = std::mem::take(&mut *lock(&self.handles));
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Worker task failed");
            }
        }
        tracing::info!("Worker pool stopped");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Worker {
    index: usize,
    queue: JobQueue,
    runner: Arc<JobRunner>,
    in_flight: InFlight,
    hard_limit: Duration,
}

impl Worker {
    async fn run(self, cancel: CancellationToken) {
        loop {
            let next = {
                let mut queue = self.queue.lock().await;
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    job_id = queue.recv() => job_id,
                }
            };
            let Some(job_id) = next else {
                break;
            };
            tracing::debug!(worker = self.index, job_id = %job_id, "Worker picked up job");
            self.run_job(job_id).await;
            lock(&self.in_flight).remove(&job_id);
        }
        tracing::debug!(worker = self.index, "Worker exiting");
    }

    async fn run_job(&self, job_id: EntityId) {
        let runner = Arc::clone(&self.runner);
        let mut task = tokio::spawn(async move { runner.run(job_id).await });

        let (stage, message) = match tokio::time::timeout(self.hard_limit, &mut task).await {
            Ok(Ok(outcome)) => {
                tracing::debug!(job_id = %job_id, ?outcome, "Job task finished");
                return;
            }
            Ok(Err(e)) => {
                tracing::error!(job_id = %job_id, error = %e, "Job task crashed");
                (STAGE_ERROR, format!("Internal error: {e}"))
            }
            Err(_) => {
                task.abort();
                tracing::error!(
                    job_id = %job_id,
                    hard_limit_secs = self.hard_limit.as_secs(),
                    "Hard time limit exceeded, job task aborted",
                );
                (
                    STAGE_TIMEOUT,
                    format!("Timed out after {:.0}s", self.hard_limit.as_secs_f64()),
                )
            }
        };

        match self.runner.fail_unfinished(job_id, stage, message).await {
            Ok(RunOutcome::Finished(state)) => {
                tracing::debug!(job_id = %job_id, state = state.as_str(), "Aborted job recorded");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Failed to record aborted job");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// QueuedJobPoller
// ---------------------------------------------------------------------------

/// Periodically submits queued jobs found in the store, including jobs
/// created by another process against the same database.
pub struct QueuedJobPoller {
    store: Arc<dyn Store>,
    pool: Arc<WorkerPool>,
    poll_interval: Duration,
}

impl QueuedJobPoller {
    pub fn new(store: Arc<dyn Store>, pool: Arc<WorkerPool>, poll_interval: Duration) -> Self {
        Self {
            store,
            pool,
            poll_interval,
        }
    }

    /// Run the poll loop until the cancellation token is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Queued job poller started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Queued job poller shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        tracing::error!(error = %e, "Poll cycle failed");
                    }
                }
            }
        }
    }

    /// One poll cycle; returns how many jobs were newly submitted.
    pub async fn poll_once(&self) -> Result<usize, StoreError> {
        let jobs = self.store.queued_jobs(POLL_BATCH_SIZE).await?;
        let submitted = jobs
            .iter()
            .filter(|job| self.pool.submit(job.id))
            .count();
        if submitted > 0 {
            tracing::info!(submitted, "Queued jobs picked up");
        }
        Ok(submitted)
    }
}

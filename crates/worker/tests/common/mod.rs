//! Shared fixtures for the worker integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use radiarch_core::job_state::JobState;
use radiarch_core::plan::PlanRequest;
use radiarch_core::registry::WorkflowRegistry;
use radiarch_core::types::EntityId;
use radiarch_core::workflow::WorkflowId;
use radiarch_db::memory::MemoryStore;
use radiarch_db::models::artifact::{Artifact, CreateArtifact};
use radiarch_db::models::job::{Job, JobUpdate};
use radiarch_db::models::plan::Plan;
use radiarch_db::store::{Store, StoreError};
use radiarch_pacs::access::AccessError;
use radiarch_pacs::notifier::{DisabledNotifier, Notifier};
use radiarch_pacs::sample::SampleDataAccess;
use radiarch_pipeline::capability::ComputeCapability;
use radiarch_pipeline::dispatcher::{Dispatcher, FallbackPolicy};
use radiarch_pipeline::engine::UnavailableEngine;
use radiarch_pipeline::error::PlannerError;
use radiarch_pipeline::qa::QaSummary;
use radiarch_pipeline::synthetic::SyntheticGenerator;
use radiarch_worker::retry::RetryPolicy;
use radiarch_worker::runner::JobRunner;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

pub fn request(workflow: &str) -> PlanRequest {
    PlanRequest::new("S1", WorkflowId::parse(workflow).unwrap(), 2.0)
}

/// Dispatcher over the built-in workflows with no dose engine, so every
/// plan gets a synthetic summary.
pub fn synthetic_dispatcher(root: &Path) -> Dispatcher {
    Dispatcher::with_engine(
        &WorkflowRegistry::builtin(),
        Arc::new(UnavailableEngine),
        Arc::new(SampleDataAccess::new()),
        root,
        FallbackPolicy::PreferEngine,
        SyntheticGenerator::seeded(42),
    )
}

/// Dispatcher with a single workflow served by `capability`.
pub fn dispatcher_with(root: &Path, workflow: &str, capability: Arc<dyn ComputeCapability>) -> Dispatcher {
    let mut dispatcher = Dispatcher::new(root, FallbackPolicy::PreferEngine, SyntheticGenerator::seeded(42));
    dispatcher.register(workflow, capability);
    dispatcher
}

pub fn runner(store: Arc<dyn Store>, dispatcher: Dispatcher) -> JobRunner {
    runner_with_notifier(store, dispatcher, Arc::new(DisabledNotifier))
}

pub fn runner_with_notifier(
    store: Arc<dyn Store>,
    dispatcher: Dispatcher,
    notifier: Arc<dyn Notifier>,
) -> JobRunner {
    JobRunner::new(
        store,
        Arc::new(WorkflowRegistry::builtin()),
        Arc::new(dispatcher),
        notifier,
    )
    .with_retry(fast_retry(3))
}

pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        multiplier: 2.0,
    }
}

/// Poll until the job reaches a terminal state.
pub async fn wait_terminal(store: &dyn Store, job_id: EntityId) -> Job {
    for _ in 0..500 {
        if let Some(job) = store.get_job(job_id).await.unwrap() {
            if job.state.is_terminal() {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} did not finish");
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Fails with a 503 for the first `failures` calls, then succeeds.
pub struct FlakyCapability {
    failures: usize,
    pub calls: AtomicUsize,
}

impl FlakyCapability {
    pub fn new(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ComputeCapability for FlakyCapability {
    fn engine_name(&self) -> &str {
        "flaky"
    }

    fn probe(&self) -> Result<(), String> {
        Ok(())
    }

    async fn run(&self, _plan: &Plan) -> Result<QaSummary, PlannerError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(PlannerError::Transient(AccessError::HttpStatus(503)));
        }
        Ok(QaSummary::new("flaky"))
    }
}

/// Sleeps for `delay` before succeeding.
pub struct SlowCapability(pub Duration);

#[async_trait]
impl ComputeCapability for SlowCapability {
    fn engine_name(&self) -> &str {
        "slow"
    }

    fn probe(&self) -> Result<(), String> {
        Ok(())
    }

    async fn run(&self, _plan: &Plan) -> Result<QaSummary, PlannerError> {
        tokio::time::sleep(self.0).await;
        Ok(QaSummary::new("slow"))
    }
}

/// Always fails with the error built by the closure.
pub struct FailingCapability(pub fn() -> PlannerError);

#[async_trait]
impl ComputeCapability for FailingCapability {
    fn engine_name(&self) -> &str {
        "failing"
    }

    fn probe(&self) -> Result<(), String> {
        Ok(())
    }

    async fn run(&self, _plan: &Plan) -> Result<QaSummary, PlannerError> {
        Err((self.0)())
    }
}

/// Cancels the plan's job through the store while computing.
pub struct CancellingCapability {
    pub store: Arc<dyn Store>,
}

#[async_trait]
impl ComputeCapability for CancellingCapability {
    fn engine_name(&self) -> &str {
        "cancelling"
    }

    fn probe(&self) -> Result<(), String> {
        Ok(())
    }

    async fn run(&self, plan: &Plan) -> Result<QaSummary, PlannerError> {
        self.store
            .update_job(plan.job_id, JobUpdate::state(JobState::Cancelled))
            .await
            .unwrap();
        Ok(QaSummary::new("cancelling"))
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// Enabled notifier that records every pushed payload.
#[derive(Default)]
pub struct RecordingNotifier {
    pub pushed: Mutex<Vec<Vec<u8>>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn enabled(&self) -> bool {
        true
    }

    async fn store_instances(&self, bytes: Vec<u8>) -> bool {
        self.pushed.lock().unwrap().push(bytes);
        true
    }
}

/// Enabled notifier whose every push is rejected.
#[derive(Default)]
pub struct FailingNotifier {
    pub attempts: AtomicUsize,
}

#[async_trait]
impl Notifier for FailingNotifier {
    fn enabled(&self) -> bool {
        true
    }

    async fn store_instances(&self, _bytes: Vec<u8>) -> bool {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        false
    }
}

// ---------------------------------------------------------------------------
// ObservedStore
// ---------------------------------------------------------------------------

/// Memory store that records every job update it applies.
#[derive(Default)]
pub struct ObservedStore {
    inner: MemoryStore,
    pub updates: Mutex<Vec<JobUpdate>>,
}

impl ObservedStore {
    pub fn stages(&self) -> Vec<String> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .filter_map(|u| u.stage.clone())
            .collect()
    }

    pub fn progress(&self) -> Vec<f64> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .filter_map(|u| u.progress)
            .collect()
    }
}

#[async_trait]
impl Store for ObservedStore {
    async fn create_plan(&self, request: &PlanRequest) -> Result<(Plan, Job), StoreError> {
        self.inner.create_plan(request).await
    }

    async fn list_plans(&self) -> Result<Vec<Plan>, StoreError> {
        self.inner.list_plans().await
    }

    async fn get_plan(&self, id: EntityId) -> Result<Option<Plan>, StoreError> {
        self.inner.get_plan(id).await
    }

    async fn get_job(&self, id: EntityId) -> Result<Option<Job>, StoreError> {
        self.inner.get_job(id).await
    }

    async fn get_artifact(&self, id: EntityId) -> Result<Option<Artifact>, StoreError> {
        self.inner.get_artifact(id).await
    }

    async fn update_job(
        &self,
        id: EntityId,
        update: JobUpdate,
    ) -> Result<Option<Job>, StoreError> {
        self.updates.lock().unwrap().push(update.clone());
        self.inner.update_job(id, update).await
    }

    async fn register_artifact(
        &self,
        input: &CreateArtifact,
    ) -> Result<Option<EntityId>, StoreError> {
        self.inner.register_artifact(input).await
    }

    async fn set_plan_summary(
        &self,
        plan_id: EntityId,
        summary: serde_json::Value,
    ) -> Result<bool, StoreError> {
        self.inner.set_plan_summary(plan_id, summary).await
    }

    async fn delete_plan(&self, id: EntityId) -> Result<bool, StoreError> {
        self.inner.delete_plan(id).await
    }

    async fn queued_jobs(&self, limit: usize) -> Result<Vec<Job>, StoreError> {
        self.inner.queued_jobs(limit).await
    }
}

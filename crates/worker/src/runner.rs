//! Job runner: drives one job from `queued` to a terminal state.
//!
//! Stage updates are written without a state field and only after the job
//! has been re-read and found non-terminal, so an external cancel observed
//! at a stage boundary stops the run. A cancel that lands between that
//! read and the next write is overwritten: last write wins. Terminal
//! writes re-check [`JobState::can_transition`] against the stored state,
//! which keeps a job that was cancelled before the final write cancelled.

use std::sync::Arc;
use std::time::{Duration, Instant};

use radiarch_core::job_state::JobState;
use radiarch_core::registry::WorkflowRegistry;
use radiarch_core::stages::{
    compute_stage, eta_remaining, DOSE_BUDGET, FETCH_BUDGET, PERSIST_BUDGET, PROGRESS_COMPUTING,
    PROGRESS_DONE, PROGRESS_FETCHING, PROGRESS_INITIALIZING, PROGRESS_PERSISTING,
    PROGRESS_PUSHING, STAGE_COMPUTING, STAGE_COMPUTING_BEAMLETS, STAGE_COMPUTING_PHOTON,
    STAGE_COMPUTING_ROBUST, STAGE_DONE, STAGE_ERROR, STAGE_FETCHING, STAGE_INITIALIZING,
    STAGE_PERSISTING, STAGE_PUSHING, STAGE_RETRYING, STAGE_TIMEOUT,
};
use radiarch_core::types::EntityId;
use radiarch_db::models::artifact::{CreateArtifact, CONTENT_TYPE_DICOM};
use radiarch_db::models::job::JobUpdate;
use radiarch_db::models::plan::Plan;
use radiarch_db::store::{Store, StoreError};
use radiarch_pacs::notifier::Notifier;
use radiarch_pipeline::dispatcher::{Dispatcher, DoseExport, ExecutionResult};
use radiarch_pipeline::error::PlannerError;

use crate::retry::RetryPolicy;

/// Default soft time limit per job.
pub const DEFAULT_SOFT_LIMIT: Duration = Duration::from_secs(1500);

// ---------------------------------------------------------------------------
// Errors and outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Workflow-level failure; its message is reported as is.
    #[error(transparent)]
    Planner(PlannerError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Timed out after {:.0}s", .elapsed.as_secs_f64())]
    TimeLimitExceeded { elapsed: Duration },

    #[error("{0}")]
    Internal(String),

    /// Another writer moved the job to a terminal state.
    #[error("Job is already {0}")]
    Interrupted(JobState),

    /// The job row disappeared, usually because its plan was deleted.
    #[error("Job {0} no longer exists")]
    JobMissing(EntityId),
}

impl From<PlannerError> for RunError {
    fn from(err: PlannerError) -> Self {
        match err {
            // A panicking engine task is not a workflow outcome.
            PlannerError::EngineTask(_) => RunError::Internal(err.to_string()),
            other => RunError::Planner(other),
        }
    }
}

impl RunError {
    pub fn is_transient(&self) -> bool {
        match self {
            RunError::Planner(e) => e.is_transient(),
            RunError::Store(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Stage tag and message recorded on the failed job.
    fn failure(&self) -> (&'static str, String) {
        match self {
            RunError::Planner(e) => (STAGE_ERROR, e.to_string()),
            RunError::TimeLimitExceeded { .. } => (STAGE_TIMEOUT, self.to_string()),
            other => (STAGE_ERROR, format!("Internal error: {other}")),
        }
    }
}

/// What [`JobRunner::run`] did with a job id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Missing, not queued, or without a plan; nothing was written.
    Skipped,
    /// The job ended in this state.
    Finished(JobState),
    /// The job was deleted while running.
    Vanished,
    /// The terminal state could not be written to the store.
    Unrecorded,
}

// ---------------------------------------------------------------------------
// ProgressTracker
// ---------------------------------------------------------------------------

/// Non-decreasing progress floor plus the time the job started running.
#[derive(Debug)]
pub struct ProgressTracker {
    floor: f64,
    started: Instant,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            floor: 0.0,
            started: Instant::now(),
        }
    }

    /// Enter a stage at `progress`; returns the value to report, which is
    /// never below anything reported before.
    pub fn advance(&mut self, progress: f64) -> f64 {
        if progress > self.floor {
            self.floor = progress;
        }
        self.floor
    }

    pub fn current(&self) -> f64 {
        self.floor
    }

    /// Time since the job started, across stages and retries.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

fn compute_message(stage: &str) -> &'static str {
    match stage {
        STAGE_COMPUTING_PHOTON => "Running CCC photon dose calculation",
        STAGE_COMPUTING_BEAMLETS => "Computing beamlets (interaction matrix)",
        STAGE_COMPUTING_ROBUST => "Computing robust scenario beamlets",
        _ => "Running dose calculation",
    }
}

// ---------------------------------------------------------------------------
// JobRunner
// ---------------------------------------------------------------------------

pub struct JobRunner {
    store: Arc<dyn Store>,
    registry: Arc<WorkflowRegistry>,
    dispatcher: Arc<Dispatcher>,
    notifier: Arc<dyn Notifier>,
    retry: RetryPolicy,
    soft_limit: Duration,
}

impl JobRunner {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<WorkflowRegistry>,
        dispatcher: Arc<Dispatcher>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            registry,
            dispatcher,
            notifier,
            retry: RetryPolicy::default(),
            soft_limit: DEFAULT_SOFT_LIMIT,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_soft_limit(mut self, soft_limit: Duration) -> Self {
        self.soft_limit = soft_limit;
        self
    }

    /// Execute a queued job to completion.
    ///
    /// Every error is converted into the job's terminal state here; the
    /// caller only learns the outcome.
    pub async fn run(&self, job_id: EntityId) -> RunOutcome {
        let plan = match self.pickup(job_id).await {
            Ok(Some(plan)) => plan,
            Ok(None) => return RunOutcome::Skipped,
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Job pickup failed");
                return RunOutcome::Skipped;
            }
        };

        let mut tracker = ProgressTracker::new();
        tracing::info!(
            job_id = %job_id,
            plan_id = %plan.id,
            workflow_id = %plan.workflow_id,
            "Job started",
        );

        let timed =
            tokio::time::timeout(self.soft_limit, self.execute(job_id, &plan, &mut tracker)).await;
        let result = timed.unwrap_or_else(|_| {
            Err(RunError::TimeLimitExceeded {
                elapsed: tracker.elapsed(),
            })
        });

        let recorded = match result {
            Ok(()) => {
                let secs = tracker.elapsed().as_secs_f64();
                tracing::info!(job_id = %job_id, elapsed_secs = secs, "Job succeeded");
                let update = JobUpdate::stage(
                    STAGE_DONE,
                    PROGRESS_DONE,
                    format!("Plan completed in {secs:.1}s"),
                )
                .with_eta(0.0);
                self.write_terminal(job_id, JobState::Succeeded, update).await
            }
            Err(RunError::Interrupted(state)) => {
                tracing::info!(job_id = %job_id, state = state.as_str(), "Job interrupted");
                Ok(RunOutcome::Finished(state))
            }
            Err(RunError::JobMissing(_)) => {
                tracing::info!(job_id = %job_id, "Job deleted while running");
                Ok(RunOutcome::Vanished)
            }
            Err(err) => {
                let (stage, message) = err.failure();
                match &err {
                    RunError::Planner(_) | RunError::TimeLimitExceeded { .. } => {
                        tracing::warn!(job_id = %job_id, stage, error = %err, "Job failed");
                    }
                    _ => {
                        tracing::error!(job_id = %job_id, error = ?err, "Job failed unexpectedly");
                    }
                }
                self.write_terminal(job_id, JobState::Failed, Self::failed(stage, message))
                    .await
            }
        };

        recorded.unwrap_or_else(|e| {
            tracing::error!(job_id = %job_id, error = %e, "Failed to record job outcome");
            RunOutcome::Unrecorded
        })
    }

    /// Fail a job that is still non-terminal. Used by the pool when it has
    /// to abort a job task.
    pub async fn fail_unfinished(
        &self,
        job_id: EntityId,
        stage: &str,
        message: String,
    ) -> Result<RunOutcome, StoreError> {
        self.write_terminal(job_id, JobState::Failed, Self::failed(stage, message))
            .await
    }

    fn failed(stage: &str, message: String) -> JobUpdate {
        JobUpdate::stage(stage, PROGRESS_DONE, message).with_eta(0.0)
    }

    /// Load the plan of a queued job and mark the job running.
    async fn pickup(&self, job_id: EntityId) -> Result<Option<Plan>, StoreError> {
        let Some(job) = self.store.get_job(job_id).await? else {
            tracing::debug!(job_id = %job_id, "Job not found, skipping");
            return Ok(None);
        };
        if job.state != JobState::Queued {
            tracing::debug!(job_id = %job_id, state = job.state.as_str(), "Job not queued, skipping");
            return Ok(None);
        }
        let Some(plan) = self.store.get_plan(job.plan_id).await? else {
            tracing::warn!(job_id = %job_id, plan_id = %job.plan_id, "Job has no plan, skipping");
            return Ok(None);
        };

        let update = JobUpdate::stage(
            STAGE_INITIALIZING,
            PROGRESS_INITIALIZING,
            "Starting plan workflow",
        )
        .with_state(JobState::Running);
        Ok(self.store.update_job(job_id, update).await?.map(|_| plan))
    }

    async fn execute(
        &self,
        job_id: EntityId,
        plan: &Plan,
        tracker: &mut ProgressTracker,
    ) -> Result<(), RunError> {
        let result = self.dispatch_with_retry(job_id, plan, tracker).await?;
        self.persist(job_id, plan, tracker, result).await
    }

    /// Fetch and compute, retrying transient failures.
    async fn dispatch_with_retry(
        &self,
        job_id: EntityId,
        plan: &Plan,
        tracker: &mut ProgressTracker,
    ) -> Result<ExecutionResult, RunError> {
        let (stage, budget) = self
            .registry
            .get(plan.workflow_id.as_str())
            .map(|definition| compute_stage(definition.category, definition.modality))
            .unwrap_or((STAGE_COMPUTING, DOSE_BUDGET));

        let mut attempt = 1;
        loop {
            let err = match self.attempt(job_id, plan, tracker, stage, budget).await {
                Ok(result) => return Ok(result),
                Err(err) if self.retry.retryable(&err, attempt) => err,
                Err(err) => return Err(err),
            };

            let delay = self.retry.backoff(attempt);
            tracing::warn!(
                job_id = %job_id,
                attempt,
                max_attempts = self.retry.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient failure, retrying",
            );
            let progress = tracker.current();
            let message = format!(
                "Attempt {attempt}/{} failed: {err}; retrying in {:.0}s",
                self.retry.max_attempts,
                delay.as_secs_f64(),
            );
            let eta = Some(delay.as_secs_f64());
            self.report(job_id, tracker, STAGE_RETRYING, progress, message, eta)
                .await?;
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn attempt(
        &self,
        job_id: EntityId,
        plan: &Plan,
        tracker: &mut ProgressTracker,
        stage: &'static str,
        budget: Duration,
    ) -> Result<ExecutionResult, RunError> {
        let eta = eta_remaining(FETCH_BUDGET, tracker.elapsed());
        self.report(
            job_id,
            tracker,
            STAGE_FETCHING,
            PROGRESS_FETCHING,
            "Fetching study/segmentation",
            Some(eta),
        )
        .await?;
        let eta = eta_remaining(budget, tracker.elapsed());
        self.report(
            job_id,
            tracker,
            stage,
            PROGRESS_COMPUTING,
            compute_message(stage),
            Some(eta),
        )
        .await?;
        Ok(self.dispatcher.run(plan).await?)
    }

    /// Register artifacts, store the QA summary and push the dose file.
    async fn persist(
        &self,
        job_id: EntityId,
        plan: &Plan,
        tracker: &mut ProgressTracker,
        result: ExecutionResult,
    ) -> Result<(), RunError> {
        let eta = eta_remaining(PERSIST_BUDGET, tracker.elapsed());
        self.report(
            job_id,
            tracker,
            STAGE_PERSISTING,
            PROGRESS_PERSISTING,
            "Persisting artifacts",
            Some(eta),
        )
        .await?;

        if let Some(export) = &result.dose_export {
            let dose = CreateArtifact::new(
                plan.id,
                export.path.display().to_string(),
                &export.content_type,
            )
            .with_file_name(&export.file_name);
            self.register(job_id, &dose).await?;
        }
        let summary = CreateArtifact::new(
            plan.id,
            result.artifact_path.display().to_string(),
            &result.content_type,
        );
        self.register(job_id, &summary).await?;

        if !self.store.set_plan_summary(plan.id, result.qa_summary).await? {
            return Err(RunError::JobMissing(job_id));
        }

        let pushable = result
            .dose_export
            .filter(|export| self.notifier.enabled() && export.content_type == CONTENT_TYPE_DICOM);
        if let Some(export) = pushable {
            self.report(
                job_id,
                tracker,
                STAGE_PUSHING,
                PROGRESS_PUSHING,
                "Pushing to PACS via STOW-RS",
                None,
            )
            .await?;
            self.push(job_id, &export).await;
        }
        Ok(())
    }

    async fn register(&self, job_id: EntityId, input: &CreateArtifact) -> Result<(), RunError> {
        let artifact_id = self
            .store
            .register_artifact(input)
            .await?
            .ok_or(RunError::JobMissing(job_id))?;
        tracing::debug!(
            job_id = %job_id,
            artifact_id = %artifact_id,
            content_type = %input.content_type,
            "Artifact registered",
        );
        Ok(())
    }

    /// Best-effort STOW-RS push; failures are logged only.
    async fn push(&self, job_id: EntityId, export: &DoseExport) {
        let bytes = match tokio::fs::read(&export.path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(
                    job_id = %job_id,
                    path = %export.path.display(),
                    error = %e,
                    "Could not read dose export for push",
                );
                return;
            }
        };
        if self.notifier.store_instances(bytes).await {
            tracing::info!(job_id = %job_id, "Dose export pushed to PACS");
        } else {
            tracing::warn!(job_id = %job_id, "PACS push failed");
        }
    }

    /// Write a stage update if the job is still active.
    async fn report(
        &self,
        job_id: EntityId,
        tracker: &mut ProgressTracker,
        stage: &str,
        progress: f64,
        message: impl Into<String>,
        eta_seconds: Option<f64>,
    ) -> Result<(), RunError> {
        match self.store.get_job(job_id).await? {
            None => return Err(RunError::JobMissing(job_id)),
            Some(job) if job.state.is_terminal() => return Err(RunError::Interrupted(job.state)),
            Some(_) => {}
        }

        let progress = tracker.advance(progress);
        let mut update = JobUpdate::stage(stage, progress, message);
        if let Some(eta) = eta_seconds {
            update = update.with_eta(eta);
        }
        tracing::debug!(job_id = %job_id, stage, progress, "Stage update");
        self.store
            .update_job(job_id, update)
            .await?
            .ok_or(RunError::JobMissing(job_id))?;
        Ok(())
    }

    /// Move the job to `state` unless another writer already ended it.
    async fn write_terminal(
        &self,
        job_id: EntityId,
        state: JobState,
        update: JobUpdate,
    ) -> Result<RunOutcome, StoreError> {
        let Some(current) = self.store.get_job(job_id).await? else {
            return Ok(RunOutcome::Vanished);
        };
        if !current.state.can_transition(state) {
            tracing::info!(
                job_id = %job_id,
                current = current.state.as_str(),
                requested = state.as_str(),
                "Job already terminal, keeping stored state",
            );
            return Ok(RunOutcome::Finished(current.state));
        }
        Ok(match self.store.update_job(job_id, update.with_state(state)).await? {
            Some(job) => RunOutcome::Finished(job.state),
            None => RunOutcome::Vanished,
        })
    }
}

//! Plan submission, cancellation and deletion.

use std::sync::Arc;

use radiarch_core::error::CoreError;
use radiarch_core::job_state::JobState;
use radiarch_core::plan::PlanRequest;
use radiarch_core::stages::{CANCELLED_BY_USER, STAGE_CANCELLED};
use radiarch_core::types::EntityId;
use radiarch_db::models::job::{Job, JobUpdate};
use radiarch_db::models::plan::Plan;
use radiarch_db::store::{Store, StoreError};

use crate::pool::WorkerPool;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct PlanService {
    store: Arc<dyn Store>,
    pool: Option<Arc<WorkerPool>>,
}

impl PlanService {
    /// A service that only records plans; queued jobs are left for a
    /// poller to pick up.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store, pool: None }
    }

    /// Enqueue new jobs directly on `pool`.
    pub fn with_pool(mut self, pool: Arc<WorkerPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Validate and store a plan request and queue its job.
    ///
    /// The workflow id is not checked against the registry here; an
    /// unknown workflow fails the job when it runs.
    pub async fn submit(&self, request: &PlanRequest) -> Result<(Plan, Job), ServiceError> {
        request.validate()?;
        let (plan, job) = self.store.create_plan(request).await?;
        tracing::info!(
            plan_id = %plan.id,
            job_id = %job.id,
            workflow_id = %plan.workflow_id,
            "Plan submitted",
        );
        if let Some(pool) = &self.pool {
            pool.submit(job.id);
        }
        Ok((plan, job))
    }

    pub async fn get_plan(&self, plan_id: EntityId) -> Result<Plan, ServiceError> {
        self.store
            .get_plan(plan_id)
            .await?
            .ok_or_else(|| not_found("plan", plan_id))
    }

    pub async fn get_job(&self, job_id: EntityId) -> Result<Job, ServiceError> {
        self.store
            .get_job(job_id)
            .await?
            .ok_or_else(|| not_found("job", job_id))
    }

    pub async fn list_plans(&self) -> Result<Vec<Plan>, ServiceError> {
        Ok(self.store.list_plans().await?)
    }

    /// Cancel the plan's job. Fails with `Conflict` if it already ended.
    pub async fn cancel(&self, plan_id: EntityId) -> Result<Job, ServiceError> {
        let plan = self.get_plan(plan_id).await?;
        let job = self.get_job(plan.job_id).await?;
        job.state.validate_transition(JobState::Cancelled)?;

        let job = self
            .store
            .update_job(job.id, cancel_update())
            .await?
            .ok_or_else(|| not_found("job", plan.job_id))?;
        tracing::info!(plan_id = %plan_id, job_id = %job.id, "Plan cancelled");
        Ok(job)
    }

    /// Delete a plan with its job and artifacts, cancelling the job first
    /// if it is still active.
    pub async fn delete(&self, plan_id: EntityId) -> Result<(), ServiceError> {
        let plan = self.get_plan(plan_id).await?;
        if let Some(job) = self.store.get_job(plan.job_id).await? {
            if job.state.can_transition(JobState::Cancelled) {
                self.store.update_job(job.id, cancel_update()).await?;
                tracing::info!(plan_id = %plan_id, job_id = %job.id, "Active job cancelled before delete");
            }
        }
        if !self.store.delete_plan(plan_id).await? {
            return Err(not_found("plan", plan_id));
        }
        tracing::info!(plan_id = %plan_id, "Plan deleted");
        Ok(())
    }
}

fn cancel_update() -> JobUpdate {
    JobUpdate::state(JobState::Cancelled)
        .with_stage(STAGE_CANCELLED)
        .with_message(CANCELLED_BY_USER)
}

fn not_found(entity: &'static str, id: EntityId) -> ServiceError {
    CoreError::NotFound { entity, id }.into()
}

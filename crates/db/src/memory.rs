//! Volatile in-process store.
//!
//! All three tables live behind one `RwLock`, so every operation (including
//! the plan status mirror in `update_job` and the cascade in `delete_plan`)
//! runs in a single critical section.

use async_trait::async_trait;
use indexmap::IndexMap;
use radiarch_core::job_state::JobState;
use radiarch_core::plan::PlanRequest;
use radiarch_core::types::{new_id, EntityId};
use tokio::sync::RwLock;

use crate::models::artifact::{Artifact, CreateArtifact};
use crate::models::job::{Job, JobUpdate};
use crate::models::plan::Plan;
use crate::store::{Store, StoreError};

#[derive(Default)]
struct Tables {
    plans: IndexMap<EntityId, Plan>,
    jobs: IndexMap<EntityId, Job>,
    artifacts: IndexMap<EntityId, Artifact>,
}

/// In-memory [`Store`]; contents are lost on drop.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_plan(&self, request: &PlanRequest) -> Result<(Plan, Job), StoreError> {
        let plan_id = new_id();
        let job_id = new_id();
        let plan = Plan::from_request(request, plan_id, job_id, chrono::Utc::now());
        let job = Job::queued(job_id, plan_id);

        let mut tables = self.tables.write().await;
        tables.plans.insert(plan_id, plan.clone());
        tables.jobs.insert(job_id, job.clone());
        Ok((plan, job))
    }

    async fn list_plans(&self) -> Result<Vec<Plan>, StoreError> {
        Ok(self.tables.read().await.plans.values().cloned().collect())
    }

    async fn get_plan(&self, id: EntityId) -> Result<Option<Plan>, StoreError> {
        Ok(self.tables.read().await.plans.get(&id).cloned())
    }

    async fn get_job(&self, id: EntityId) -> Result<Option<Job>, StoreError> {
        Ok(self.tables.read().await.jobs.get(&id).cloned())
    }

    async fn get_artifact(&self, id: EntityId) -> Result<Option<Artifact>, StoreError> {
        Ok(self.tables.read().await.artifacts.get(&id).cloned())
    }

    async fn update_job(
        &self,
        id: EntityId,
        update: JobUpdate,
    ) -> Result<Option<Job>, StoreError> {
        let now = chrono::Utc::now();
        let mut tables = self.tables.write().await;
        let Some(job) = tables.jobs.get_mut(&id) else {
            return Ok(None);
        };
        job.apply(update, now);
        let job = job.clone();

        if let Some(plan) = tables.plans.get_mut(&job.plan_id) {
            plan.status = job.state;
            plan.updated_at = now;
        }
        Ok(Some(job))
    }

    async fn register_artifact(
        &self,
        input: &CreateArtifact,
    ) -> Result<Option<EntityId>, StoreError> {
        let now = chrono::Utc::now();
        let mut tables = self.tables.write().await;
        let Some(plan) = tables.plans.get_mut(&input.plan_id) else {
            return Ok(None);
        };
        let id = new_id();
        plan.artifact_ids.push(id);
        plan.updated_at = now;
        tables
            .artifacts
            .insert(id, input.clone().into_artifact(id, now));
        Ok(Some(id))
    }

    async fn set_plan_summary(
        &self,
        plan_id: EntityId,
        summary: serde_json::Value,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let Some(plan) = tables.plans.get_mut(&plan_id) else {
            return Ok(false);
        };
        plan.qa_summary = Some(summary);
        plan.updated_at = chrono::Utc::now();
        Ok(true)
    }

    async fn delete_plan(&self, id: EntityId) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let Some(plan) = tables.plans.shift_remove(&id) else {
            return Ok(false);
        };
        tables.jobs.shift_remove(&plan.job_id);
        tables.artifacts.retain(|_, artifact| artifact.plan_id != id);
        Ok(true)
    }

    async fn queued_jobs(&self, limit: usize) -> Result<Vec<Job>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .jobs
            .values()
            .filter(|job| job.state == JobState::Queued)
            .take(limit)
            .cloned()
            .collect())
    }
}

//! Durable SQLite-backed store.
//!
//! Every write runs in its own transaction. Cascade deletion is left to the
//! `ON DELETE CASCADE` foreign keys.

use async_trait::async_trait;
use radiarch_core::plan::PlanRequest;
use radiarch_core::types::{new_id, EntityId};

use crate::models::artifact::{Artifact, CreateArtifact};
use crate::models::job::{Job, JobUpdate};
use crate::models::plan::Plan;
use crate::repositories::{ArtifactRepo, JobRepo, PlanRepo};
use crate::store::{Store, StoreError};
use crate::DbPool;

/// SQL [`Store`] over a SQLite pool.
pub struct SqlStore {
    pool: DbPool,
    persist_transient_fields: bool,
}

impl SqlStore {
    /// Wrap a migrated pool. `stage` and `eta_seconds` are persisted.
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            persist_transient_fields: true,
        }
    }

    /// Choose whether `stage` and `eta_seconds` survive a restart.
    ///
    /// When disabled they are written as NULL and reads never return them.
    pub fn with_transient_fields(mut self, persist: bool) -> Self {
        self.persist_transient_fields = persist;
        self
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl Store for SqlStore {
    async fn create_plan(&self, request: &PlanRequest) -> Result<(Plan, Job), StoreError> {
        let plan_id = new_id();
        let job_id = new_id();
        let plan = Plan::from_request(request, plan_id, job_id, chrono::Utc::now());
        let job = Job::queued(job_id, plan_id);

        let mut tx = self.pool.begin().await?;
        PlanRepo::insert(&mut tx, &plan).await?;
        JobRepo::insert(&mut tx, &job).await?;
        tx.commit().await?;

        tracing::debug!(plan_id = %plan_id, job_id = %job_id, "Plan created");
        Ok((plan, job))
    }

    async fn list_plans(&self) -> Result<Vec<Plan>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        PlanRepo::list(&mut conn).await
    }

    async fn get_plan(&self, id: EntityId) -> Result<Option<Plan>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        PlanRepo::find_by_id(&mut conn, id).await
    }

    async fn get_job(&self, id: EntityId) -> Result<Option<Job>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        JobRepo::find_by_id(&mut conn, id).await
    }

    async fn get_artifact(&self, id: EntityId) -> Result<Option<Artifact>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        ArtifactRepo::find_by_id(&mut conn, id).await
    }

    async fn update_job(
        &self,
        id: EntityId,
        mut update: JobUpdate,
    ) -> Result<Option<Job>, StoreError> {
        if !self.persist_transient_fields {
            update.stage = None;
            update.eta_seconds = None;
        }

        let now = chrono::Utc::now();
        let mut tx = self.pool.begin().await?;
        if !JobRepo::lock(&mut tx, id).await? {
            return Ok(None);
        }
        let Some(mut job) = JobRepo::find_by_id(&mut tx, id).await? else {
            return Ok(None);
        };
        job.apply(update, now);
        JobRepo::save(&mut tx, &job).await?;
        PlanRepo::update_status(&mut tx, job.plan_id, job.state, now).await?;
        tx.commit().await?;
        Ok(Some(job))
    }

    async fn register_artifact(
        &self,
        input: &CreateArtifact,
    ) -> Result<Option<EntityId>, StoreError> {
        let now = chrono::Utc::now();
        let mut tx = self.pool.begin().await?;
        if !PlanRepo::touch(&mut tx, input.plan_id, now).await? {
            return Ok(None);
        }
        let artifact = input.clone().into_artifact(new_id(), now);
        ArtifactRepo::insert(&mut tx, &artifact).await?;
        tx.commit().await?;
        Ok(Some(artifact.id))
    }

    async fn set_plan_summary(
        &self,
        plan_id: EntityId,
        summary: serde_json::Value,
    ) -> Result<bool, StoreError> {
        let mut conn = self.pool.acquire().await?;
        PlanRepo::set_summary(&mut conn, plan_id, &summary, chrono::Utc::now()).await
    }

    async fn delete_plan(&self, id: EntityId) -> Result<bool, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let deleted = PlanRepo::delete(&mut conn, id).await?;
        if deleted {
            tracing::debug!(plan_id = %id, "Plan deleted");
        }
        Ok(deleted)
    }

    async fn queued_jobs(&self, limit: usize) -> Result<Vec<Job>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        JobRepo::list_queued(&mut conn, limit).await
    }
}

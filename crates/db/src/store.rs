//! The persistence interface shared by the volatile and durable backends.
//!
//! Absence is never an error: lookups and updates on unknown ids return
//! `None` (or `false`) with no side effect. [`StoreError`] is reserved for
//! I/O failures of the durable backend.
//!
//! Neither backend checks job transition legality or progress
//! monotonicity. The job runner is the only writer of job progress and
//! consults the state machine before each write.

use async_trait::async_trait;
use radiarch_core::plan::PlanRequest;
use radiarch_core::types::EntityId;

use crate::models::artifact::{Artifact, CreateArtifact};
use crate::models::job::{Job, JobUpdate};
use crate::models::plan::Plan;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored row could not be decoded into a model.
    #[error("Corrupt row in {table}: {reason}")]
    Corrupt { table: &'static str, reason: String },
}

impl StoreError {
    /// Connectivity problems and lock contention that may succeed on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Database(err) => match err {
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::WorkerCrashed => {
                    true
                }
                // SQLITE_BUSY (5) and SQLITE_LOCKED (6).
                sqlx::Error::Database(db) => matches!(db.code().as_deref(), Some("5" | "6")),
                _ => false,
            },
            StoreError::Migration(_) | StoreError::Corrupt { .. } => false,
        }
    }
}

/// Plan/Job/Artifact persistence.
#[async_trait]
pub trait Store: Send + Sync {
    /// Create a plan and its queued job atomically.
    async fn create_plan(&self, request: &PlanRequest) -> Result<(Plan, Job), StoreError>;

    /// All plans in creation order.
    async fn list_plans(&self) -> Result<Vec<Plan>, StoreError>;

    async fn get_plan(&self, id: EntityId) -> Result<Option<Plan>, StoreError>;

    async fn get_job(&self, id: EntityId) -> Result<Option<Job>, StoreError>;

    async fn get_artifact(&self, id: EntityId) -> Result<Option<Artifact>, StoreError>;

    /// Apply a partial update and mirror the resulting state into the
    /// owning plan's `status`, bumping its `updated_at`.
    ///
    /// Returns `None` for an unknown job.
    async fn update_job(&self, id: EntityId, update: JobUpdate)
        -> Result<Option<Job>, StoreError>;

    /// Register an artifact and append its id to the plan's `artifact_ids`.
    ///
    /// Returns `None` when the plan does not exist.
    async fn register_artifact(
        &self,
        input: &CreateArtifact,
    ) -> Result<Option<EntityId>, StoreError>;

    /// Set the plan's QA summary. Returns `false` for an unknown plan.
    async fn set_plan_summary(
        &self,
        plan_id: EntityId,
        summary: serde_json::Value,
    ) -> Result<bool, StoreError>;

    /// Delete a plan together with its job and artifacts.
    async fn delete_plan(&self, id: EntityId) -> Result<bool, StoreError>;

    /// Up to `limit` jobs still queued, oldest first.
    async fn queued_jobs(&self, limit: usize) -> Result<Vec<Job>, StoreError>;
}

//! Repository for the `plans` table.
//!
//! `artifact_ids` is not a column; it is read back from `artifacts` in
//! insertion (rowid) order.

use std::collections::HashMap;

use radiarch_core::job_state::JobState;
use radiarch_core::plan::{DoseObjective, OptimizationSettings, PhotonSettings, RobustnessConfig};
use radiarch_core::types::{EntityId, Timestamp};
use radiarch_core::workflow::WorkflowId;
use sqlx::types::Json;
use sqlx::{FromRow, SqliteConnection};

use super::corrupt;
use crate::models::plan::Plan;
use crate::repositories::ArtifactRepo;
use crate::store::StoreError;

/// Column list for `plans` queries.
const COLUMNS: &str = "\
    id, workflow_id, status, study_instance_uid, segmentation_uid, \
    prescription_gy, fraction_count, beam_count, notes, \
    objectives, robustness, optimization, photon, \
    job_id, qa_summary, created_at, updated_at";

const TABLE: &str = "plans";

/// A raw row from the `plans` table.
#[derive(Debug, FromRow)]
struct PlanRow {
    id: EntityId,
    workflow_id: String,
    status: String,
    study_instance_uid: String,
    segmentation_uid: Option<String>,
    prescription_gy: f64,
    fraction_count: i32,
    beam_count: i32,
    notes: Option<String>,
    objectives: Option<Json<Vec<DoseObjective>>>,
    robustness: Option<Json<RobustnessConfig>>,
    optimization: Json<OptimizationSettings>,
    photon: Json<PhotonSettings>,
    job_id: EntityId,
    qa_summary: Option<Json<serde_json::Value>>,
    created_at: Timestamp,
    updated_at: Timestamp,
}

impl PlanRow {
    fn into_plan(self, artifact_ids: Vec<EntityId>) -> Result<Plan, StoreError> {
        Ok(Plan {
            id: self.id,
            workflow_id: WorkflowId::parse(self.workflow_id).map_err(|e| corrupt(TABLE, e))?,
            status: self
                .status
                .parse::<JobState>()
                .map_err(|e| corrupt(TABLE, e))?,
            study_instance_uid: self.study_instance_uid,
            segmentation_uid: self.segmentation_uid,
            prescription_gy: self.prescription_gy,
            fraction_count: self.fraction_count,
            beam_count: self.beam_count,
            notes: self.notes,
            objectives: self.objectives.map(|j| j.0),
            robustness: self.robustness.map(|j| j.0),
            optimization: self.optimization.0,
            photon: self.photon.0,
            job_id: self.job_id,
            qa_summary: self.qa_summary.map(|j| j.0),
            artifact_ids,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Provides persistence operations for plans.
pub struct PlanRepo;

impl PlanRepo {
    pub async fn insert(conn: &mut SqliteConnection, plan: &Plan) -> Result<(), StoreError> {
        let query = format!(
            "INSERT INTO plans ({COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
        );
        sqlx::query(&query)
            .bind(plan.id)
            .bind(plan.workflow_id.as_str())
            .bind(plan.status.as_str())
            .bind(&plan.study_instance_uid)
            .bind(&plan.segmentation_uid)
            .bind(plan.prescription_gy)
            .bind(plan.fraction_count)
            .bind(plan.beam_count)
            .bind(&plan.notes)
            .bind(plan.objectives.as_ref().map(Json))
            .bind(plan.robustness.as_ref().map(Json))
            .bind(Json(&plan.optimization))
            .bind(Json(&plan.photon))
            .bind(plan.job_id)
            .bind(plan.qa_summary.as_ref().map(Json))
            .bind(plan.created_at)
            .bind(plan.updated_at)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn find_by_id(
        conn: &mut SqliteConnection,
        id: EntityId,
    ) -> Result<Option<Plan>, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM plans WHERE id = ?1");
        let row = sqlx::query_as::<_, PlanRow>(&query)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        match row {
            Some(row) => {
                let artifact_ids = ArtifactRepo::ids_for_plan(conn, id).await?;
                Ok(Some(row.into_plan(artifact_ids)?))
            }
            None => Ok(None),
        }
    }

    /// All plans in creation order.
    pub async fn list(conn: &mut SqliteConnection) -> Result<Vec<Plan>, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM plans ORDER BY rowid");
        let rows = sqlx::query_as::<_, PlanRow>(&query)
            .fetch_all(&mut *conn)
            .await?;

        let mut artifacts: HashMap<EntityId, Vec<EntityId>> = HashMap::new();
        for (plan_id, artifact_id) in ArtifactRepo::all_ids(conn).await? {
            artifacts.entry(plan_id).or_default().push(artifact_id);
        }

        rows.into_iter()
            .map(|row| {
                let ids = artifacts.remove(&row.id).unwrap_or_default();
                row.into_plan(ids)
            })
            .collect()
    }

    /// Mirror a job state into the plan's `status`.
    pub async fn update_status(
        conn: &mut SqliteConnection,
        id: EntityId,
        status: JobState,
        now: Timestamp,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE plans SET status = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(status.as_str())
            .bind(now)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Returns `true` if the plan exists.
    pub async fn set_summary(
        conn: &mut SqliteConnection,
        id: EntityId,
        summary: &serde_json::Value,
        now: Timestamp,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE plans SET qa_summary = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(Json(summary))
            .bind(now)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Bump `updated_at`. Returns `true` if the plan exists.
    pub async fn touch(
        conn: &mut SqliteConnection,
        id: EntityId,
        now: Timestamp,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE plans SET updated_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(now)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a plan; its job and artifacts go with it via `ON DELETE CASCADE`.
    pub async fn delete(conn: &mut SqliteConnection, id: EntityId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM plans WHERE id = ?1")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

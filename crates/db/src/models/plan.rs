//! Plan entity: a requested treatment-planning computation.

use radiarch_core::job_state::JobState;
use radiarch_core::plan::{
    DoseObjective, OptimizationSettings, PhotonSettings, PlanRequest, RobustnessConfig,
};
use radiarch_core::types::{EntityId, Timestamp};
use radiarch_core::workflow::WorkflowId;
use serde::Serialize;

/// A stored plan.
///
/// `status` mirrors the state of the plan's job and is rewritten on every
/// job update. `artifact_ids` is append-only and ordered by registration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    pub id: EntityId,
    pub workflow_id: WorkflowId,
    pub status: JobState,
    pub study_instance_uid: String,
    pub segmentation_uid: Option<String>,
    pub prescription_gy: f64,
    pub fraction_count: i32,
    pub beam_count: i32,
    pub notes: Option<String>,
    pub objectives: Option<Vec<DoseObjective>>,
    pub robustness: Option<RobustnessConfig>,
    pub optimization: OptimizationSettings,
    pub photon: PhotonSettings,
    pub job_id: EntityId,
    pub qa_summary: Option<serde_json::Value>,
    pub artifact_ids: Vec<EntityId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Plan {
    /// Build a freshly queued plan from a creation request.
    pub fn from_request(
        request: &PlanRequest,
        id: EntityId,
        job_id: EntityId,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            workflow_id: request.workflow_id.clone(),
            status: JobState::Queued,
            study_instance_uid: request.study_instance_uid.clone(),
            segmentation_uid: request.segmentation_uid.clone(),
            prescription_gy: request.prescription_gy,
            fraction_count: request.fraction_count,
            beam_count: request.beam_count,
            notes: request.notes.clone(),
            objectives: request.objectives.clone(),
            robustness: request.robustness.clone(),
            optimization: request.optimization.clone(),
            photon: request.photon.clone(),
            job_id,
            qa_summary: None,
            artifact_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

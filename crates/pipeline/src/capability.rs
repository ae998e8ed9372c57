//! Compute capabilities: what the dispatcher runs for a workflow.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use radiarch_core::plan::{DoseObjective, ObjectiveType};
use radiarch_core::registry::{PHOTON_CCC, PROTON_IMPT_BASIC, PROTON_IMPT_OPTIMIZED, PROTON_ROBUST};
use radiarch_db::models::plan::Plan;
use radiarch_pacs::access::DataAccess;

use crate::dvh::compute_dvh;
use crate::engine::{
    evenly_spaced_gantry_angles, BeamGeometry, ComputeMode, DoseEngine, DoseRequest,
    DoseResult, DEFAULT_DOSE_PRIMARIES,
};
use crate::error::PlannerError;
use crate::qa::{round_to, DoseExport, QaSummary};

/// File name of the exported dose grid.
pub const DOSE_FILE_NAME: &str = "RTDOSE.dcm";

/// Structure names treated as the planning target (case-insensitive).
pub const TARGET_NAMES: [&str; 5] = ["ptv", "target", "gtv", "ctv", "targetvolume"];

/// Objective weight for the default uniform-dose objective on the target.
const DEFAULT_TARGET_WEIGHT: f64 = 100.0;

/// Something that can turn a plan into a QA summary.
#[async_trait]
pub trait ComputeCapability: Send + Sync {
    /// Engine tag used in fallback notes.
    fn engine_name(&self) -> &str;

    /// `Ok(())` when runnable, otherwise the reason it is not.
    fn probe(&self) -> Result<(), String>;

    fn available(&self) -> bool {
        self.probe().is_ok()
    }

    async fn run(&self, plan: &Plan) -> Result<QaSummary, PlannerError>;
}

// ---------------------------------------------------------------------------
// WorkflowVariant
// ---------------------------------------------------------------------------

/// The engine-backed workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowVariant {
    ProtonBasic,
    ProtonOptimized,
    ProtonRobust,
    PhotonCcc,
}

impl WorkflowVariant {
    pub fn for_workflow(workflow_id: &str) -> Option<Self> {
        match workflow_id {
            PROTON_IMPT_BASIC => Some(Self::ProtonBasic),
            PROTON_IMPT_OPTIMIZED => Some(Self::ProtonOptimized),
            PROTON_ROBUST => Some(Self::ProtonRobust),
            PHOTON_CCC => Some(Self::PhotonCcc),
            _ => None,
        }
    }

    /// Engine tag written into the QA summary.
    pub fn qa_engine_tag(self) -> &'static str {
        match self {
            Self::ProtonBasic | Self::ProtonOptimized => "opentps",
            Self::ProtonRobust => "opentps_robust",
            Self::PhotonCcc => "opentps_photon_ccc",
        }
    }

    /// Only the basic workflow plans on an arbitrary structure when no
    /// named target exists.
    fn falls_back_to_first_structure(self) -> bool {
        self == Self::ProtonBasic
    }

    fn compute_mode(self, plan: &Plan) -> ComputeMode {
        match self {
            Self::ProtonBasic => ComputeMode::ProtonDose {
                nb_primaries: DEFAULT_DOSE_PRIMARIES,
            },
            Self::ProtonOptimized => ComputeMode::ProtonOptimized {
                settings: plan.optimization.clone(),
            },
            Self::ProtonRobust => ComputeMode::ProtonRobust {
                settings: plan.optimization.clone(),
                robustness: plan.robustness.clone().unwrap_or_default(),
            },
            Self::PhotonCcc => ComputeMode::PhotonCcc {
                settings: plan.photon.clone(),
            },
        }
    }

    fn gantry_angles(self, beam_count: i32) -> Vec<f64> {
        match self {
            // Single beam at 0 degrees; the basic workflow has no beam arrangement.
            Self::ProtonBasic => vec![0.0],
            _ => evenly_spaced_gantry_angles(usize::try_from(beam_count).unwrap_or(1)),
        }
    }
}

/// Pick the target among `structures`.
pub fn find_target(structures: &[String], fallback_to_first: bool) -> Option<&str> {
    structures
        .iter()
        .find(|name| TARGET_NAMES.contains(&name.to_lowercase().as_str()))
        .or_else(|| fallback_to_first.then(|| structures.first()).flatten())
        .map(String::as_str)
}

/// Plan objectives, or a uniform prescription dose on the target.
fn objectives_for(plan: &Plan, target: Option<&str>) -> Vec<DoseObjective> {
    match (&plan.objectives, target) {
        (Some(objectives), _) if !objectives.is_empty() => objectives.clone(),
        (_, Some(target)) => vec![DoseObjective {
            structure_name: target.to_string(),
            objective_type: ObjectiveType::DUniform,
            dose_gy: plan.prescription_gy,
            weight: DEFAULT_TARGET_WEIGHT,
            volume_fraction: None,
        }],
        _ => Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// EngineCapability
// ---------------------------------------------------------------------------

/// Runs a workflow variant on a [`DoseEngine`].
pub struct EngineCapability {
    variant: WorkflowVariant,
    engine_name: String,
    engine: Arc<dyn DoseEngine>,
    data: Arc<dyn DataAccess>,
    artifact_root: PathBuf,
}

impl EngineCapability {
    pub fn new(
        variant: WorkflowVariant,
        engine_name: &str,
        engine: Arc<dyn DoseEngine>,
        data: Arc<dyn DataAccess>,
        artifact_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            variant,
            engine_name: engine_name.to_string(),
            engine,
            data,
            artifact_root: artifact_root.into(),
        }
    }

    pub fn variant(&self) -> WorkflowVariant {
        self.variant
    }

    /// Load study and segmentation and build the engine request.
    async fn build_request(&self, plan: &Plan) -> Result<DoseRequest, PlannerError> {
        let study = self
            .data
            .get_study(&plan.study_instance_uid)
            .await?
            .ok_or_else(|| {
                PlannerError::MissingData(format!(
                    "Study {} not found",
                    plan.study_instance_uid
                ))
            })?;

        let structures = match &plan.segmentation_uid {
            Some(uid) => self
                .data
                .get_segmentation(uid)
                .await?
                .ok_or_else(|| PlannerError::MissingData(format!("Segmentation {uid} not found")))?
                .label_names(),
            None => Vec::new(),
        };

        let target = find_target(&structures, self.variant.falls_back_to_first_structure())
            .map(str::to_string);
        match &target {
            Some(name) => tracing::info!(plan_id = %plan.id, roi = %name, "Using ROI as target"),
            None => tracing::warn!(plan_id = %plan.id, "No target ROI found"),
        }

        let beams = self
            .variant
            .gantry_angles(plan.beam_count)
            .into_iter()
            .map(|gantry_angle_deg| BeamGeometry {
                gantry_angle_deg,
                couch_angle_deg: 0.0,
            })
            .collect();

        Ok(DoseRequest {
            plan_id: plan.id,
            study_instance_uid: study.study_instance_uid,
            objectives: objectives_for(plan, target.as_deref()),
            structures,
            target,
            prescription_gy: plan.prescription_gy,
            fraction_count: plan.fraction_count,
            beams,
            mode: self.variant.compute_mode(plan),
        })
    }

    async fn write_dose(&self, plan: &Plan, result: &DoseResult) -> Result<DoseExport, PlannerError> {
        let sim_dir = simulation_dir(&self.artifact_root, plan);
        tokio::fs::create_dir_all(&sim_dir)
            .await
            .map_err(|e| PlannerError::io(&sim_dir, e))?;

        let path = sim_dir.join(DOSE_FILE_NAME);
        let bytes = self.engine.export(&result.grid);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| PlannerError::io(&path, e))?;
        tracing::info!(plan_id = %plan.id, path = %path.display(), "Dose grid exported");

        Ok(DoseExport {
            path,
            content_type: self.engine.export_content_type().to_string(),
            file_name: DOSE_FILE_NAME.to_string(),
        })
    }

    fn summarize(
        &self,
        plan: &Plan,
        request: &DoseRequest,
        result: &DoseResult,
        export: DoseExport,
    ) -> Result<QaSummary, PlannerError> {
        let mut qa = QaSummary::new(self.variant.qa_engine_tag());
        let gantry_angles: Vec<f64> = request.beams.iter().map(|b| b.gantry_angle_deg).collect();
        qa.set("beamCount", request.beams.len())
            .set("gantryAngles", gantry_angles)
            .set("maxDose", round_to(result.grid.max(), 4))
            .set("meanDose", round_to(result.grid.mean(), 4))
            .set("simDir", simulation_dir(&self.artifact_root, plan).display().to_string())
            .set("rtdosePath", export.path.display().to_string());

        let dvh = match (&request.target, &result.target_mask) {
            (Some(name), Some(mask)) => compute_dvh(name, &result.grid, mask),
            _ => None,
        };
        match dvh {
            Some(dvh) => {
                qa.set_serialized("dvh", &dvh)?;
            }
            None => {
                qa.set("dvh", serde_json::json!({}));
            }
        }

        match &request.mode {
            ComputeMode::ProtonDose { .. } | ComputeMode::ProtonOptimized { .. } => {}
            ComputeMode::ProtonRobust { robustness, .. } => {
                qa.set(
                    "robustness",
                    serde_json::json!({
                        "scenarios": robustness.num_scenarios,
                        "rangeError": robustness.range_systematic_error_pct,
                    }),
                );
            }
            ComputeMode::PhotonCcc { settings } => {
                qa.set("muPerBeam", settings.mu_per_beam);
            }
        }
        if let Some(outcome) = &result.optimization {
            qa.set(
                "optimization",
                serde_json::json!({
                    "success": outcome.success,
                    "iterations": outcome.iterations,
                    "final_cost": outcome.final_cost,
                }),
            );
        }

        qa.set_notes(format!("Success: {} dose calculation", self.engine.name()));
        Ok(qa.with_dose_export(export))
    }
}

/// Per-plan engine output directory.
pub fn simulation_dir(artifact_root: &Path, plan: &Plan) -> PathBuf {
    artifact_root.join("simulations").join(plan.id.to_string())
}

#[async_trait]
impl ComputeCapability for EngineCapability {
    fn engine_name(&self) -> &str {
        &self.engine_name
    }

    fn probe(&self) -> Result<(), String> {
        self.engine.probe()
    }

    async fn run(&self, plan: &Plan) -> Result<QaSummary, PlannerError> {
        tracing::info!(
            plan_id = %plan.id,
            variant = ?self.variant,
            engine = self.engine.name(),
            "Running engine workflow",
        );
        let request = self.build_request(plan).await?;

        let engine = Arc::clone(&self.engine);
        let (request, result) = tokio::task::spawn_blocking(move || {
            let result = engine.compute(&request);
            (request, result)
        })
        .await
        .map_err(|e| PlannerError::EngineTask(e.to_string()))?;
        let result = result?;
        result.grid.validate()?;

        let export = self.write_dose(plan, &result).await?;
        self.summarize(plan, &request, &result, export)
    }
}

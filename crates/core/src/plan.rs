//! Plan creation request and the clinical parameter types it carries.
//!
//! Validation is hand-rolled and returns [`CoreError::Validation`] with a
//! message naming the offending field.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::registry::PROTON_IMPT_BASIC;
use crate::workflow::WorkflowId;

/// Maximum number of beams a plan may request.
pub const MAX_BEAM_COUNT: i32 = 9;

/// Maximum number of robustness scenarios.
pub const MAX_ROBUST_SCENARIOS: i32 = 21;

// ---------------------------------------------------------------------------
// Dose objectives
// ---------------------------------------------------------------------------

/// Kind of dose objective applied to a structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectiveType {
    /// Minimum dose to structure.
    DMin,
    /// Maximum dose to structure.
    DMax,
    /// Uniform dose.
    DUniform,
    /// DVH-based minimum.
    DVHMin,
    /// DVH-based maximum.
    DVHMax,
}

impl ObjectiveType {
    /// DVH objectives need a volume fraction.
    pub fn needs_volume(self) -> bool {
        matches!(self, ObjectiveType::DVHMin | ObjectiveType::DVHMax)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoseObjective {
    /// ROI name, e.g. `PTV` or `SpinalCord`.
    pub structure_name: String,
    pub objective_type: ObjectiveType,
    pub dose_gy: f64,
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Fraction of the structure volume (0..=1); DVH objectives only.
    pub volume_fraction: Option<f64>,
}

fn default_weight() -> f64 {
    1.0
}

// ---------------------------------------------------------------------------
// Robustness
// ---------------------------------------------------------------------------

/// How robustness scenarios are selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScenarioSelection {
    ReducedSet,
    All,
    Random,
}

/// Setup and range uncertainty parameters for robust optimization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobustnessConfig {
    pub setup_systematic_error_mm: [f64; 3],
    pub setup_random_error_mm: [f64; 3],
    pub range_systematic_error_pct: f64,
    pub selection_strategy: ScenarioSelection,
    pub num_scenarios: i32,
}

impl Default for RobustnessConfig {
    fn default() -> Self {
        Self {
            setup_systematic_error_mm: [1.6, 1.6, 1.6],
            setup_random_error_mm: [0.0, 0.0, 0.0],
            range_systematic_error_pct: 5.0,
            selection_strategy: ScenarioSelection::ReducedSet,
            num_scenarios: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// Optimization / photon settings
// ---------------------------------------------------------------------------

/// Proton optimization settings (used by optimized and robust workflows).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationSettings {
    pub method: String,
    pub max_iterations: i32,
    pub spot_spacing_mm: f64,
    pub layer_spacing_mm: f64,
    pub scoring_spacing_mm: [f64; 3],
    pub beamlet_primaries: u64,
    pub final_primaries: u64,
}

impl Default for OptimizationSettings {
    fn default() -> Self {
        Self {
            method: "Scipy_L-BFGS-B".to_string(),
            max_iterations: 50,
            spot_spacing_mm: 5.0,
            layer_spacing_mm: 5.0,
            scoring_spacing_mm: [2.0, 2.0, 2.0],
            beamlet_primaries: 10_000,
            final_primaries: 1_000_000,
        }
    }
}

/// Photon beam settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhotonSettings {
    pub mlc_leaf_width_mm: f64,
    pub jaw_opening_mm: [f64; 2],
    pub mu_per_beam: f64,
}

impl Default for PhotonSettings {
    fn default() -> Self {
        Self {
            mlc_leaf_width_mm: 10.0,
            jaw_opening_mm: [-50.0, 50.0],
            mu_per_beam: 5000.0,
        }
    }
}

// ---------------------------------------------------------------------------
// PlanRequest
// ---------------------------------------------------------------------------

/// DTO for creating a plan (and its job).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRequest {
    /// DICOM Study Instance UID.
    pub study_instance_uid: String,
    /// RTSTRUCT/SEG UID with target contours.
    #[serde(default)]
    pub segmentation_uid: Option<String>,
    #[serde(default = "default_workflow")]
    pub workflow_id: WorkflowId,
    pub prescription_gy: f64,
    #[serde(default = "default_count")]
    pub fraction_count: i32,
    #[serde(default = "default_count")]
    pub beam_count: i32,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub objectives: Option<Vec<DoseObjective>>,
    #[serde(default)]
    pub optimization: OptimizationSettings,
    #[serde(default)]
    pub photon: PhotonSettings,
    #[serde(default)]
    pub robustness: Option<RobustnessConfig>,
}

fn default_workflow() -> WorkflowId {
    WorkflowId::from_static(PROTON_IMPT_BASIC)
}

fn default_count() -> i32 {
    1
}

impl PlanRequest {
    /// A request with the given study, workflow and prescription; every
    /// other field takes its default.
    pub fn new(study_instance_uid: &str, workflow_id: WorkflowId, prescription_gy: f64) -> Self {
        Self {
            study_instance_uid: study_instance_uid.to_string(),
            segmentation_uid: None,
            workflow_id,
            prescription_gy,
            fraction_count: 1,
            beam_count: 1,
            notes: None,
            objectives: None,
            optimization: OptimizationSettings::default(),
            photon: PhotonSettings::default(),
            robustness: None,
        }
    }

    /// Validate field ranges.
    ///
    /// Rules:
    /// - `study_instance_uid` must not be empty.
    /// - `prescription_gy` must be finite and > 0.
    /// - `fraction_count` must be >= 1.
    /// - `beam_count` must be in `1..=MAX_BEAM_COUNT`.
    /// - Each objective needs a structure name, a non-negative dose and
    ///   weight, and (for DVH types) a volume fraction in `0..=1`.
    /// - Robustness scenarios must be in `1..=MAX_ROBUST_SCENARIOS`.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.study_instance_uid.trim().is_empty() {
            return Err(CoreError::Validation(
                "study_instance_uid must not be empty".to_string(),
            ));
        }
        if !self.prescription_gy.is_finite() || self.prescription_gy <= 0.0 {
            return Err(CoreError::Validation(format!(
                "prescription_gy must be greater than 0 (got {})",
                self.prescription_gy
            )));
        }
        if self.fraction_count < 1 {
            return Err(CoreError::Validation(
                "fraction_count must be at least 1".to_string(),
            ));
        }
        if !(1..=MAX_BEAM_COUNT).contains(&self.beam_count) {
            return Err(CoreError::Validation(format!(
                "beam_count must be between 1 and {MAX_BEAM_COUNT} (got {})",
                self.beam_count
            )));
        }

        for (i, objective) in self.objectives.iter().flatten().enumerate() {
            validate_objective(i, objective)?;
        }

        if let Some(robustness) = &self.robustness {
            if !(1..=MAX_ROBUST_SCENARIOS).contains(&robustness.num_scenarios) {
                return Err(CoreError::Validation(format!(
                    "robustness.num_scenarios must be between 1 and {MAX_ROBUST_SCENARIOS}"
                )));
            }
            if robustness.range_systematic_error_pct < 0.0 {
                return Err(CoreError::Validation(
                    "robustness.range_systematic_error_pct must not be negative".to_string(),
                ));
            }
        }

        if self.optimization.max_iterations < 1 {
            return Err(CoreError::Validation(
                "optimization.max_iterations must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

fn validate_objective(index: usize, objective: &DoseObjective) -> Result<(), CoreError> {
    if objective.structure_name.trim().is_empty() {
        return Err(CoreError::Validation(format!(
            "Objective at index {index} must name a structure"
        )));
    }
    if objective.dose_gy < 0.0 || objective.weight < 0.0 {
        return Err(CoreError::Validation(format!(
            "Objective at index {index} must have non-negative dose and weight"
        )));
    }
    match (objective.objective_type.needs_volume(), objective.volume_fraction) {
        (true, None) => Err(CoreError::Validation(format!(
            "Objective at index {index} is a DVH objective and needs volume_fraction"
        ))),
        (_, Some(v)) if !(0.0..=1.0).contains(&v) => Err(CoreError::Validation(format!(
            "Objective at index {index} has volume_fraction outside 0..=1"
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn basic() -> PlanRequest {
        PlanRequest::new("S1", WorkflowId::parse(PROTON_IMPT_BASIC).unwrap(), 2.0)
    }

    #[test]
    fn defaults_are_valid() {
        assert!(basic().validate().is_ok());
    }

    #[test]
    fn rejects_empty_study() {
        let req = PlanRequest {
            study_instance_uid: "  ".to_string(),
            ..basic()
        };
        assert_matches!(req.validate(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn rejects_non_positive_prescription() {
        for rx in [0.0, -1.0, f64::NAN] {
            let req = PlanRequest {
                prescription_gy: rx,
                ..basic()
            };
            assert_matches!(req.validate(), Err(CoreError::Validation(_)));
        }
    }

    #[test]
    fn beam_count_bounds() {
        let ok = PlanRequest {
            beam_count: MAX_BEAM_COUNT,
            ..basic()
        };
        assert!(ok.validate().is_ok());
        for beams in [0, MAX_BEAM_COUNT + 1] {
            let req = PlanRequest {
                beam_count: beams,
                ..basic()
            };
            assert_matches!(req.validate(), Err(CoreError::Validation(_)));
        }
    }

    #[test]
    fn dvh_objective_needs_volume() {
        let req = PlanRequest {
            objectives: Some(vec![DoseObjective {
                structure_name: "PTV".to_string(),
                objective_type: ObjectiveType::DVHMin,
                dose_gy: 1.9,
                weight: 1.0,
                volume_fraction: None,
            }]),
            ..basic()
        };
        assert_matches!(req.validate(), Err(CoreError::Validation(ref m)) if m.contains("volume_fraction"));
    }

    #[test]
    fn robustness_scenarios_bounds() {
        let req = PlanRequest {
            robustness: Some(RobustnessConfig {
                num_scenarios: 0,
                ..Default::default()
            }),
            ..basic()
        };
        assert_matches!(req.validate(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn deserializes_with_defaults() {
        let req: PlanRequest = serde_json::from_value(serde_json::json!({
            "study_instance_uid": "S1",
            "prescription_gy": 2.0,
        }))
        .unwrap();
        assert_eq!(req.workflow_id.as_str(), PROTON_IMPT_BASIC);
        assert_eq!(req.fraction_count, 1);
        assert_eq!(req.beam_count, 1);
        assert_eq!(req.photon.mu_per_beam, 5000.0);
        assert!(req.robustness.is_none());
    }

    #[test]
    fn robustness_strategy_wire_names() {
        let json = serde_json::to_value(RobustnessConfig::default()).unwrap();
        assert_eq!(json["selection_strategy"], "REDUCED_SET");
    }
}

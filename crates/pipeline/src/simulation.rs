//! Delivery simulation of a finished plan, with the same synthetic fallback
//! rules as plan dispatch.

use std::path::PathBuf;
use std::sync::Arc;

use radiarch_core::simulation::SimulationRequest;
use serde::Serialize;
use serde_json::Value;

use crate::dispatcher::{unavailable_notes, FallbackPolicy};
use crate::engine::{DeliveredDose, DeliveryRequest, DoseEngine};
use crate::error::{EngineError, PlannerError};
use crate::qa::round_to;
use crate::synthetic::SyntheticGenerator;

/// File name of the exported delivered dose grid.
pub const DELIVERED_DOSE_FILE_NAME: &str = "RTDOSE_delivered.dcm";

/// Label used in fallback notes.
const SIMULATION_LABEL: &str = "delivery simulation";

/// Result of one delivery simulation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationOutcome {
    pub engine: String,
    pub delivered_dose_max_gy: f64,
    pub delivered_dose_mean_gy: f64,
    pub gamma_pass_rate: Option<f64>,
    pub dose_difference_pct: Option<f64>,
    pub motion_amplitude_mm: [f64; 3],
    pub num_fractions: i32,
    /// Delivered dose export; synthetic runs have none.
    pub artifact_path: Option<String>,
    pub notes: Option<String>,
}

pub struct DeliverySimulator {
    engine: Arc<dyn DoseEngine>,
    policy: FallbackPolicy,
    synthetic: Arc<SyntheticGenerator>,
    artifact_root: PathBuf,
}

impl DeliverySimulator {
    pub fn new(
        engine: Arc<dyn DoseEngine>,
        policy: FallbackPolicy,
        synthetic: SyntheticGenerator,
        artifact_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            engine,
            policy,
            synthetic: Arc::new(synthetic),
            artifact_root: artifact_root.into(),
        }
    }

    /// Simulate delivery of the plan whose QA summary is `plan_qa`.
    pub async fn run(
        &self,
        request: &SimulationRequest,
        plan_qa: &Value,
    ) -> Result<SimulationOutcome, PlannerError> {
        if self.policy == FallbackPolicy::ForceSynthetic {
            return Ok(self.synthetic(request, "Synthetic simulation result".to_string()));
        }
        if let Err(reason) = self.engine.probe() {
            let notes = unavailable_notes(self.engine.name(), SIMULATION_LABEL, &reason);
            return Ok(self.synthetic(request, notes));
        }
        match self.simulate(request, plan_qa).await {
            Err(PlannerError::Compute(EngineError::Unavailable(reason))) => {
                let notes = unavailable_notes(self.engine.name(), SIMULATION_LABEL, &reason);
                Ok(self.synthetic(request, notes))
            }
            result => result,
        }
    }

    fn synthetic(&self, request: &SimulationRequest, notes: String) -> SimulationOutcome {
        tracing::warn!(plan_id = %request.plan_id, %notes, "Using synthetic simulation");
        let mut outcome = self.synthetic.simulate(request);
        outcome.notes = Some(notes);
        outcome
    }

    async fn simulate(
        &self,
        request: &SimulationRequest,
        plan_qa: &Value,
    ) -> Result<SimulationOutcome, PlannerError> {
        let sim_dir = plan_qa["simDir"].as_str().unwrap_or_default();
        let is_dir = !sim_dir.is_empty()
            && tokio::fs::metadata(sim_dir)
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false);
        if !is_dir {
            return Err(PlannerError::MissingData(format!(
                "Plan simulation directory not found: {sim_dir}"
            )));
        }

        let delivery = DeliveryRequest {
            plan_id: request.plan_id,
            sim_dir: PathBuf::from(sim_dir),
            planned_dose_path: plan_qa["rtdosePath"].as_str().map(PathBuf::from),
            motion_amplitude_mm: request.motion_amplitude_mm,
            motion_period_s: request.motion_period_s,
            delivery_time_per_spot_ms: request.delivery_time_per_spot_ms,
            num_fractions: request.num_fractions,
        };
        tracing::info!(
            plan_id = %request.plan_id,
            fractions = request.num_fractions,
            max_motion_mm = request.max_motion_mm(),
            "Running delivery simulation",
        );

        let engine = Arc::clone(&self.engine);
        let delivered: DeliveredDose =
            tokio::task::spawn_blocking(move || engine.simulate_delivery(&delivery))
                .await
                .map_err(|e| PlannerError::EngineTask(e.to_string()))??;
        delivered.grid.validate()?;

        let out_dir = self.artifact_root.join("simulations").join(request.plan_id.to_string());
        tokio::fs::create_dir_all(&out_dir)
            .await
            .map_err(|e| PlannerError::io(&out_dir, e))?;
        let path = out_dir.join(DELIVERED_DOSE_FILE_NAME);
        tokio::fs::write(&path, self.engine.export(&delivered.grid))
            .await
            .map_err(|e| PlannerError::io(&path, e))?;

        Ok(SimulationOutcome {
            engine: format!("{}_simulation", self.engine.name()),
            delivered_dose_max_gy: round_to(delivered.grid.max(), 4),
            delivered_dose_mean_gy: round_to(delivered.grid.mean(), 4),
            gamma_pass_rate: delivered.gamma_pass_rate,
            dose_difference_pct: delivered.dose_difference_pct,
            motion_amplitude_mm: request.motion_amplitude_mm,
            num_fractions: request.num_fractions,
            artifact_path: Some(path.display().to_string()),
            notes: None,
        })
    }
}

//! Delivery simulation: engine path, fallback and missing planning output.

use std::sync::Arc;

use assert_matches::assert_matches;
use radiarch_core::simulation::SimulationRequest;
use radiarch_pipeline::dispatcher::FallbackPolicy;
use radiarch_pipeline::engine::{
    DeliveredDose, DeliveryRequest, DoseEngine, DoseGrid, DoseRequest, DoseResult,
    UnavailableEngine,
};
use radiarch_pipeline::error::{EngineError, PlannerError};
use radiarch_pipeline::simulation::{DeliverySimulator, DELIVERED_DOSE_FILE_NAME};
use radiarch_pipeline::synthetic::{SyntheticGenerator, SYNTHETIC_SIMULATION_ENGINE};
use serde_json::json;

/// Engine that only simulates delivery, returning a fixed grid.
struct MotionEngine;

impl DoseEngine for MotionEngine {
    fn name(&self) -> &str {
        "motion"
    }

    fn probe(&self) -> Result<(), String> {
        Ok(())
    }

    fn compute(&self, _request: &DoseRequest) -> Result<DoseResult, EngineError> {
        Err(EngineError::Computation("not used".into()))
    }

    fn simulate_delivery(&self, request: &DeliveryRequest) -> Result<DeliveredDose, EngineError> {
        assert!(request.sim_dir.is_dir());
        Ok(DeliveredDose {
            grid: DoseGrid::new([1, 1, 4], [2.0; 3], [0.0; 3], vec![2.0, 1.0, 1.0, 0.0])?,
            gamma_pass_rate: Some(96.5),
            dose_difference_pct: Some(1.25),
        })
    }
}

/// Engine that probes fine but has no delivery simulation.
struct DoseOnlyEngine;

impl DoseEngine for DoseOnlyEngine {
    fn name(&self) -> &str {
        "dose-only"
    }

    fn probe(&self) -> Result<(), String> {
        Ok(())
    }

    fn compute(&self, _request: &DoseRequest) -> Result<DoseResult, EngineError> {
        Err(EngineError::Computation("not used".into()))
    }
}

fn simulator(
    root: &std::path::Path,
    engine: Arc<dyn DoseEngine>,
    policy: FallbackPolicy,
) -> DeliverySimulator {
    DeliverySimulator::new(engine, policy, SyntheticGenerator::seeded(3), root)
}

#[tokio::test]
async fn engine_simulation_exports_delivered_dose() {
    let dir = tempfile::tempdir().unwrap();
    let plan_id = uuid::Uuid::new_v4();
    let sim_dir = dir.path().join("simulations").join(plan_id.to_string());
    std::fs::create_dir_all(&sim_dir).unwrap();
    let qa = json!({ "engine": "opentps", "simDir": sim_dir.display().to_string() });
    let request = SimulationRequest::new(plan_id).with_motion([0.0, 3.0, 0.0]);

    let outcome = simulator(dir.path(), Arc::new(MotionEngine), FallbackPolicy::PreferEngine)
        .run(&request, &qa)
        .await
        .unwrap();

    assert_eq!(outcome.engine, "motion_simulation");
    assert_eq!(outcome.delivered_dose_max_gy, 2.0);
    assert_eq!(outcome.delivered_dose_mean_gy, 1.0);
    assert_eq!(outcome.gamma_pass_rate, Some(96.5));
    assert_eq!(outcome.motion_amplitude_mm, [0.0, 3.0, 0.0]);
    assert!(outcome.notes.is_none());
    let expected = sim_dir.join(DELIVERED_DOSE_FILE_NAME);
    assert_eq!(outcome.artifact_path, Some(expected.display().to_string()));
    assert!(expected.exists());

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["gammaPassRate"], 96.5);
    assert_eq!(json["numFractions"], 1);
}

#[tokio::test]
async fn missing_planning_output_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let request = SimulationRequest::new(uuid::Uuid::new_v4());

    let err = simulator(dir.path(), Arc::new(MotionEngine), FallbackPolicy::PreferEngine)
        .run(&request, &json!({ "engine": "opentps" }))
        .await
        .unwrap_err();

    assert_matches!(err, PlannerError::MissingData(_));
    assert_eq!(err.to_string(), "Plan simulation directory not found: ");
}

#[tokio::test]
async fn unavailable_engine_falls_back_to_synthetic() {
    let dir = tempfile::tempdir().unwrap();
    let request = SimulationRequest::new(uuid::Uuid::new_v4());

    let outcome = simulator(dir.path(), Arc::new(UnavailableEngine), FallbackPolicy::PreferEngine)
        .run(&request, &json!({}))
        .await
        .unwrap();

    assert_eq!(outcome.engine, SYNTHETIC_SIMULATION_ENGINE);
    assert_eq!(
        outcome.notes.as_deref(),
        Some("unavailable unavailable (delivery simulation skipped): no dose engine configured")
    );
    assert!(outcome.artifact_path.is_none());
}

#[tokio::test]
async fn engine_without_simulation_falls_back_to_synthetic() {
    let dir = tempfile::tempdir().unwrap();
    let sim_dir = dir.path().join("planned");
    std::fs::create_dir_all(&sim_dir).unwrap();
    let qa = json!({ "simDir": sim_dir.display().to_string() });

    let outcome = simulator(dir.path(), Arc::new(DoseOnlyEngine), FallbackPolicy::PreferEngine)
        .run(&SimulationRequest::new(uuid::Uuid::new_v4()), &qa)
        .await
        .unwrap();

    assert_eq!(outcome.engine, SYNTHETIC_SIMULATION_ENGINE);
    assert_eq!(
        outcome.notes.as_deref(),
        Some("dose-only unavailable (delivery simulation skipped): dose-only does not simulate delivery")
    );
}

#[tokio::test]
async fn forced_synthetic_skips_engine() {
    let dir = tempfile::tempdir().unwrap();

    let outcome = simulator(dir.path(), Arc::new(MotionEngine), FallbackPolicy::ForceSynthetic)
        .run(&SimulationRequest::new(uuid::Uuid::new_v4()), &json!({}))
        .await
        .unwrap();

    assert_eq!(outcome.engine, SYNTHETIC_SIMULATION_ENGINE);
    assert_eq!(outcome.notes.as_deref(), Some("Synthetic simulation result"));
}

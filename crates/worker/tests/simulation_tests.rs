//! Delivery simulations against plans run through the job runner.

mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use radiarch_core::error::CoreError;
use radiarch_core::job_state::JobState;
use radiarch_core::simulation::SimulationRequest;
use radiarch_core::types::EntityId;
use radiarch_db::memory::MemoryStore;
use radiarch_db::store::Store;
use radiarch_pipeline::dispatcher::FallbackPolicy;
use radiarch_pipeline::engine::{DoseEngine, DoseRequest, DoseResult, UnavailableEngine};
use radiarch_pipeline::error::EngineError;
use radiarch_pipeline::simulation::DeliverySimulator;
use radiarch_pipeline::synthetic::SyntheticGenerator;
use radiarch_worker::service::ServiceError;
use radiarch_worker::simulation::SimulationService;

use common::*;

/// Probes fine, so the simulator takes the engine path.
struct ReadyEngine;

impl DoseEngine for ReadyEngine {
    fn name(&self) -> &str {
        "ready"
    }

    fn probe(&self) -> Result<(), String> {
        Ok(())
    }

    fn compute(&self, _request: &DoseRequest) -> Result<DoseResult, EngineError> {
        Err(EngineError::Computation("not used".into()))
    }
}

fn service(store: &Arc<dyn Store>, engine: Arc<dyn DoseEngine>, root: &std::path::Path) -> SimulationService {
    let simulator = DeliverySimulator::new(
        engine,
        FallbackPolicy::PreferEngine,
        SyntheticGenerator::seeded(8),
        root,
    );
    SimulationService::new(Arc::clone(store), Arc::new(simulator))
}

/// Create a plan and run it to success with synthetic QA.
async fn finished_plan(store: &Arc<dyn Store>, root: &std::path::Path) -> EntityId {
    let (plan, job) = store.create_plan(&request("proton-impt-basic")).await.unwrap();
    runner(Arc::clone(store), synthetic_dispatcher(root))
        .run(job.id)
        .await;
    plan.id
}

#[tokio::test]
async fn simulation_of_finished_plan_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let plan_id = finished_plan(&store, dir.path()).await;
    let service = service(&store, Arc::new(UnavailableEngine), dir.path());

    let simulation = service
        .submit(SimulationRequest::new(plan_id).with_motion([2.0, 0.0, 0.0]))
        .await
        .unwrap();

    assert_eq!(simulation.state, JobState::Succeeded);
    assert_eq!(simulation.plan_id, plan_id);
    assert_eq!(simulation.progress(), 1.0);
    assert_eq!(simulation.message, "Simulation completed");
    let outcome = simulation.outcome.clone().unwrap();
    assert_eq!(outcome.engine, "synthetic_simulation");
    assert_eq!(outcome.motion_amplitude_mm, [2.0, 0.0, 0.0]);
    assert!(outcome.notes.unwrap().contains("(delivery simulation skipped)"));

    assert_eq!(service.get(simulation.id).await.unwrap(), simulation);
    assert_eq!(service.list().await.len(), 1);
}

#[tokio::test]
async fn simulator_error_fails_the_simulation() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let plan_id = finished_plan(&store, dir.path()).await;
    let service = service(&store, Arc::new(ReadyEngine), dir.path());

    let simulation = service.submit(SimulationRequest::new(plan_id)).await.unwrap();

    assert_eq!(simulation.state, JobState::Failed);
    assert!(simulation.outcome.is_none());
    assert_eq!(simulation.progress(), 1.0);
    assert_eq!(
        simulation.message,
        "Simulation failed: Plan simulation directory not found: "
    );
}

#[tokio::test]
async fn plan_without_summary_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let (plan, _) = store.create_plan(&request("proton-impt-basic")).await.unwrap();
    let service = service(&store, Arc::new(UnavailableEngine), dir.path());

    assert_matches!(
        service.submit(SimulationRequest::new(plan.id)).await,
        Err(ServiceError::Core(CoreError::Conflict(_)))
    );
    assert!(service.list().await.is_empty());
}

#[tokio::test]
async fn unknown_plan_and_simulation_are_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let service = service(&store, Arc::new(UnavailableEngine), dir.path());

    assert_matches!(
        service.submit(SimulationRequest::new(uuid::Uuid::new_v4())).await,
        Err(ServiceError::Core(CoreError::NotFound { entity: "plan", .. }))
    );
    assert_matches!(
        service.get(uuid::Uuid::new_v4()).await,
        Err(ServiceError::Core(CoreError::NotFound { entity: "simulation", .. }))
    );
}

#[tokio::test]
async fn invalid_request_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let plan_id = finished_plan(&store, dir.path()).await;
    let service = service(&store, Arc::new(UnavailableEngine), dir.path());
    let mut req = SimulationRequest::new(plan_id);
    req.num_fractions = 0;

    assert_matches!(
        service.submit(req).await,
        Err(ServiceError::Core(CoreError::Validation(_)))
    );
}

//! Delivery simulations of finished plans.
//!
//! Simulations are short and run inline on submit. They are kept in process
//! only; a restart forgets them.

use std::sync::Arc;

use indexmap::IndexMap;
use radiarch_core::error::CoreError;
use radiarch_core::job_state::JobState;
use radiarch_core::simulation::SimulationRequest;
use radiarch_core::types::{new_id, EntityId, Timestamp};
use radiarch_db::store::Store;
use radiarch_pipeline::simulation::{DeliverySimulator, SimulationOutcome};
use tokio::sync::RwLock;

use crate::service::ServiceError;

#[derive(Debug, Clone, PartialEq)]
pub struct Simulation {
    pub id: EntityId,
    pub plan_id: EntityId,
    pub state: JobState,
    pub request: SimulationRequest,
    pub outcome: Option<SimulationOutcome>,
    pub message: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Simulation {
    pub fn progress(&self) -> f64 {
        if self.state.is_terminal() {
            1.0
        } else {
            0.0
        }
    }
}

pub struct SimulationService {
    store: Arc<dyn Store>,
    simulator: Arc<DeliverySimulator>,
    simulations: RwLock<IndexMap<EntityId, Simulation>>,
}

impl SimulationService {
    pub fn new(store: Arc<dyn Store>, simulator: Arc<DeliverySimulator>) -> Self {
        Self {
            store,
            simulator,
            simulations: RwLock::new(IndexMap::new()),
        }
    }

    /// Validate, record and run a simulation; returns it in its final state.
    ///
    /// The plan must exist and carry a QA summary. A simulator error fails
    /// the simulation rather than the call.
    pub async fn submit(&self, request: SimulationRequest) -> Result<Simulation, ServiceError> {
        request.validate()?;
        let plan = self
            .store
            .get_plan(request.plan_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "plan",
                id: request.plan_id,
            })?;
        let Some(plan_qa) = plan.qa_summary else {
            return Err(CoreError::Conflict(
                "Plan has no QA summary; planning must complete before simulation".to_string(),
            )
            .into());
        };

        let now = chrono::Utc::now();
        let id = new_id();
        let simulation = Simulation {
            id,
            plan_id: plan.id,
            state: JobState::Queued,
            request,
            outcome: None,
            message: String::new(),
            created_at: now,
            updated_at: now,
        };
        self.simulations
            .write()
            .await
            .insert(id, simulation.clone());
        self.transition(id, JobState::Running, None, "Simulating delivery")
            .await?;
        tracing::info!(simulation_id = %id, plan_id = %plan.id, "Simulation started");

        let finished = match self.simulator.run(&simulation.request, &plan_qa).await {
            Ok(outcome) => {
                tracing::info!(simulation_id = %id, engine = %outcome.engine, "Simulation succeeded");
                self.transition(id, JobState::Succeeded, Some(outcome), "Simulation completed")
                    .await?
            }
            Err(e) => {
                tracing::warn!(simulation_id = %id, error = %e, "Simulation failed");
                let message = format!("Simulation failed: {e}");
                self.transition(id, JobState::Failed, None, &message).await?
            }
        };
        Ok(finished)
    }

    pub async fn list(&self) -> Vec<Simulation> {
        self.simulations.read().await.values().cloned().collect()
    }

    pub async fn get(&self, id: EntityId) -> Result<Simulation, ServiceError> {
        self.simulations
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| {
                CoreError::NotFound {
                    entity: "simulation",
                    id,
                }
                .into()
            })
    }

    async fn transition(
        &self,
        id: EntityId,
        state: JobState,
        outcome: Option<SimulationOutcome>,
        message: &str,
    ) -> Result<Simulation, ServiceError> {
        let mut simulations = self.simulations.write().await;
        let simulation = simulations.get_mut(&id).ok_or(CoreError::NotFound {
            entity: "simulation",
            id,
        })?;
        simulation.state.validate_transition(state)?;
        simulation.state = state;
        if outcome.is_some() {
            simulation.outcome = outcome;
        }
        simulation.message = message.to_string();
        simulation.updated_at = chrono::Utc::now();
        Ok(simulation.clone())
    }
}

//! Plan dispatch: workflow id to capability, synthetic fallback, packaging.
//!
//! [`Dispatcher::run`] never falls back on a *failed* engine run; only an
//! engine that reports itself unavailable, from its probe or from the
//! compute call, (or a forced synthetic policy) routes to the
//! [`SyntheticGenerator`]. The QA summary is always written
//! to `summaries/<plan_id>.json` under the artifact root.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use radiarch_core::registry::WorkflowRegistry;
use radiarch_db::models::plan::Plan;
use radiarch_pacs::access::DataAccess;
use serde_json::Value;

use crate::capability::{ComputeCapability, EngineCapability, WorkflowVariant};
use crate::engine::DoseEngine;
use crate::error::{EngineError, PlannerError};
use crate::qa::QaSummary;
use crate::synthetic::SyntheticGenerator;

pub use crate::qa::DoseExport;

/// Content type of the packaged QA summary.
pub const SUMMARY_CONTENT_TYPE: &str = "application/json";

// ---------------------------------------------------------------------------
// FallbackPolicy
// ---------------------------------------------------------------------------

/// When to use the synthetic generator instead of the workflow capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackPolicy {
    /// Use the capability when its probe succeeds, synthetic otherwise.
    #[default]
    PreferEngine,
    /// Always synthetic.
    ForceSynthetic,
}

/// Outcome of applying the policy to one capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Capability,
    /// Synthetic, with the notes to record.
    Synthetic { notes: String },
}

impl FallbackPolicy {
    pub fn from_force_flag(force_synthetic: bool) -> Self {
        if force_synthetic {
            FallbackPolicy::ForceSynthetic
        } else {
            FallbackPolicy::PreferEngine
        }
    }

    pub fn route(&self, workflow_id: &str, capability: &dyn ComputeCapability) -> Route {
        match self {
            FallbackPolicy::ForceSynthetic => Route::Synthetic {
                notes: format!("Synthetic result ({workflow_id} skipped)"),
            },
            FallbackPolicy::PreferEngine => match capability.probe() {
                Ok(()) => Route::Capability,
                Err(reason) => Route::Synthetic {
                    notes: unavailable_notes(capability.engine_name(), workflow_id, &reason),
                },
            },
        }
    }
}

pub(crate) fn unavailable_notes(engine: &str, workflow_id: &str, reason: &str) -> String {
    format!("{engine} unavailable ({workflow_id} skipped): {reason}")
}

// ---------------------------------------------------------------------------
// ExecutionResult
// ---------------------------------------------------------------------------

/// Everything the job runner persists after a successful dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    /// Packaged JSON document (also written to `artifact_path`).
    pub artifact_bytes: Vec<u8>,
    pub content_type: String,
    pub qa_summary: Value,
    pub artifact_path: PathBuf,
    pub dose_export: Option<DoseExport>,
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

pub struct Dispatcher {
    capabilities: HashMap<String, Arc<dyn ComputeCapability>>,
    synthetic: Arc<SyntheticGenerator>,
    policy: FallbackPolicy,
    artifact_root: PathBuf,
}

impl Dispatcher {
    /// A dispatcher with no registered workflows.
    pub fn new(
        artifact_root: impl Into<PathBuf>,
        policy: FallbackPolicy,
        synthetic: SyntheticGenerator,
    ) -> Self {
        Self {
            capabilities: HashMap::new(),
            synthetic: Arc::new(synthetic),
            policy,
            artifact_root: artifact_root.into(),
        }
    }

    /// Register an [`EngineCapability`] for every registry workflow that has
    /// an engine-backed variant.
    pub fn with_engine(
        registry: &WorkflowRegistry,
        engine: Arc<dyn DoseEngine>,
        data: Arc<dyn DataAccess>,
        artifact_root: impl Into<PathBuf>,
        policy: FallbackPolicy,
        synthetic: SyntheticGenerator,
    ) -> Self {
        let mut dispatcher = Self::new(artifact_root, policy, synthetic);
        for definition in registry.list() {
            let Some(variant) = WorkflowVariant::for_workflow(definition.id.as_str()) else {
                tracing::debug!(workflow_id = %definition.id, "No engine variant for workflow");
                continue;
            };
            let capability = EngineCapability::new(
                variant,
                &definition.engine,
                Arc::clone(&engine),
                Arc::clone(&data),
                dispatcher.artifact_root.clone(),
            );
            dispatcher.register(definition.id.as_str(), Arc::new(capability));
        }
        dispatcher
    }

    /// Map a workflow id to a capability, replacing any previous one.
    pub fn register(&mut self, workflow_id: &str, capability: Arc<dyn ComputeCapability>) {
        self.capabilities.insert(workflow_id.to_string(), capability);
    }

    pub fn supports(&self, workflow_id: &str) -> bool {
        self.capabilities.contains_key(workflow_id)
    }

    pub fn policy(&self) -> FallbackPolicy {
        self.policy
    }

    pub fn artifact_root(&self) -> &Path {
        &self.artifact_root
    }

    /// Run the plan's workflow and package the result.
    pub async fn run(&self, plan: &Plan) -> Result<ExecutionResult, PlannerError> {
        let workflow_id = plan.workflow_id.as_str();
        tracing::info!(plan_id = %plan.id, workflow_id, "Running planner");

        let capability = self
            .capabilities
            .get(workflow_id)
            .ok_or_else(|| PlannerError::UnknownWorkflow(workflow_id.to_string()))?;

        let qa = match self.policy.route(workflow_id, capability.as_ref()) {
            Route::Capability => match capability.run(plan).await {
                Err(PlannerError::Compute(EngineError::Unavailable(reason))) => {
                    let notes = unavailable_notes(capability.engine_name(), workflow_id, &reason);
                    self.synthetic(plan, notes).await?
                }
                result => result?,
            },
            Route::Synthetic { notes } => self.synthetic(plan, notes).await?,
        };

        self.package(plan, qa).await
    }

    async fn synthetic(&self, plan: &Plan, notes: String) -> Result<QaSummary, PlannerError> {
        tracing::warn!(plan_id = %plan.id, workflow_id = %plan.workflow_id, %notes, "Using synthetic QA");
        let mut qa = self.synthetic.run(plan).await?;
        qa.set_notes(notes);
        Ok(qa)
    }

    /// Write the summary document and assemble the execution result.
    async fn package(&self, plan: &Plan, qa: QaSummary) -> Result<ExecutionResult, PlannerError> {
        let (qa_summary, dose_export) = qa.into_parts();
        let document = serde_json::json!({
            "planId": plan.id,
            "workflowId": plan.workflow_id,
            "studyInstanceUID": plan.study_instance_uid,
            "segmentationUID": plan.segmentation_uid,
            "prescriptionGy": plan.prescription_gy,
            "fractions": plan.fraction_count,
            "qa": qa_summary,
        });
        let artifact_bytes = serde_json::to_vec_pretty(&document)?;

        let summary_dir = self.artifact_root.join("summaries");
        tokio::fs::create_dir_all(&summary_dir)
            .await
            .map_err(|e| PlannerError::io(&summary_dir, e))?;
        let artifact_path = summary_dir.join(format!("{}.json", plan.id));
        tokio::fs::write(&artifact_path, &artifact_bytes)
            .await
            .map_err(|e| PlannerError::io(&artifact_path, e))?;

        tracing::debug!(
            plan_id = %plan.id,
            path = %artifact_path.display(),
            size = artifact_bytes.len(),
            "QA summary packaged",
        );

        Ok(ExecutionResult {
            artifact_bytes,
            content_type: SUMMARY_CONTENT_TYPE.to_string(),
            qa_summary,
            artifact_path,
            dose_export,
        })
    }
}

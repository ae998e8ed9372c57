//! Workflow registry: the catalog of workflow definitions.
//!
//! Built once at startup (usually via [`WorkflowRegistry::builtin`]) and then
//! shared read-only behind an `Arc`. Registering an id that already exists
//! replaces the definition in place, keeping its original list position.

use indexmap::IndexMap;

use crate::error::CoreError;
use crate::workflow::{
    Modality, WorkflowCategory, WorkflowDefinition, WorkflowId, WorkflowParameter,
};

/// Single/multi-beam proton dose calculation, no optimization.
pub const PROTON_IMPT_BASIC: &str = "proton-impt-basic";
/// Proton IMPT with beamlet-based optimization.
pub const PROTON_IMPT_OPTIMIZED: &str = "proton-impt-optimized";
/// Proton optimization over setup/range error scenarios.
pub const PROTON_ROBUST: &str = "proton-robust";
/// Photon collapsed-cone convolution dose.
pub const PHOTON_CCC: &str = "photon-ccc";

/// Ordered catalog of workflow definitions keyed by id.
#[derive(Debug, Clone, Default)]
pub struct WorkflowRegistry {
    workflows: IndexMap<WorkflowId, WorkflowDefinition>,
}

impl WorkflowRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in workflow catalog.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for definition in builtin_definitions() {
            registry.register(definition);
        }
        registry
    }

    /// Register a workflow, overwriting any existing definition with the same id.
    pub fn register(&mut self, definition: WorkflowDefinition) {
        self.workflows.insert(definition.id.clone(), definition);
    }

    pub fn get(&self, id: &str) -> Option<&WorkflowDefinition> {
        self.workflows.get(id)
    }

    /// Resolve a workflow id, failing with [`CoreError::UnknownWorkflow`].
    pub fn resolve(&self, id: &WorkflowId) -> Result<&WorkflowDefinition, CoreError> {
        self.workflows
            .get(id)
            .ok_or_else(|| CoreError::UnknownWorkflow(id.to_string()))
    }

    /// All definitions in registration order.
    pub fn list(&self) -> Vec<&WorkflowDefinition> {
        self.workflows.values().collect()
    }

    pub fn ids(&self) -> Vec<&WorkflowId> {
        self.workflows.keys().collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.workflows.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Built-in catalog
// ---------------------------------------------------------------------------

fn spot_spacing() -> WorkflowParameter {
    WorkflowParameter::number("spot_spacing", "Spot Spacing (mm)", 5.0).with_units("mm")
}

fn optimizer() -> WorkflowParameter {
    WorkflowParameter::string("optimization_method", "Optimizer", "Scipy_L-BFGS-B")
        .with_description("Optimization algorithm")
}

fn max_iterations() -> WorkflowParameter {
    WorkflowParameter::integer("max_iterations", "Max Iterations", 50)
        .with_bounds(Some(1.0), Some(500.0))
}

fn builtin_id(raw: &'static str) -> WorkflowId {
    WorkflowId::from_static(raw)
}

fn builtin_definitions() -> Vec<WorkflowDefinition> {
    vec![
        WorkflowDefinition {
            id: builtin_id(PROTON_IMPT_BASIC),
            name: "Proton IMPT (basic)".to_string(),
            description: "Single/multi-beam proton plan using the MCsquare dose engine, no optimization"
                .to_string(),
            modality: Modality::Proton,
            engine: "mcsquare".to_string(),
            category: WorkflowCategory::Dose,
            default_parameters: vec![
                WorkflowParameter::number("gantry_angle", "Gantry Angle (deg)", 0.0)
                    .with_units("deg"),
                WorkflowParameter::number("couch_angle", "Couch Angle (deg)", 0.0)
                    .with_units("deg"),
                spot_spacing(),
                WorkflowParameter::integer("nb_primaries", "MC Primaries", 10_000)
                    .with_description("Number of Monte Carlo primaries for dose calculation"),
            ],
        },
        WorkflowDefinition {
            id: builtin_id(PROTON_IMPT_OPTIMIZED),
            name: "Proton IMPT Optimized".to_string(),
            description: "Multi-beam proton plan with IMPT optimization using a beamlet interaction matrix"
                .to_string(),
            modality: Modality::Proton,
            engine: "mcsquare".to_string(),
            category: WorkflowCategory::Optimization,
            default_parameters: vec![
                spot_spacing(),
                WorkflowParameter::number("layer_spacing", "Layer Spacing (mm)", 5.0)
                    .with_units("mm"),
                optimizer(),
                max_iterations(),
                WorkflowParameter::integer("nb_primaries_beamlets", "Beamlet Primaries", 10_000),
                WorkflowParameter::integer("nb_primaries_final", "Final Primaries", 1_000_000),
            ],
        },
        WorkflowDefinition {
            id: builtin_id(PROTON_ROBUST),
            name: "Proton Robust Optimization".to_string(),
            description: "Robust proton optimization with setup/range error scenarios".to_string(),
            modality: Modality::Proton,
            engine: "mcsquare".to_string(),
            category: WorkflowCategory::Robust,
            default_parameters: vec![
                spot_spacing(),
                optimizer(),
                max_iterations(),
                WorkflowParameter::number("range_systematic_error_pct", "Range Error (%)", 5.0)
                    .with_bounds(Some(0.0), Some(20.0))
                    .with_units("%"),
                WorkflowParameter::integer("num_scenarios", "Robustness Scenarios", 5)
                    .with_bounds(Some(1.0), Some(21.0)),
            ],
        },
        WorkflowDefinition {
            id: builtin_id(PHOTON_CCC),
            name: "Photon CCC Dose".to_string(),
            description: "Photon plan using the collapsed-cone convolution dose engine".to_string(),
            modality: Modality::Photon,
            engine: "ccc".to_string(),
            category: WorkflowCategory::Dose,
            default_parameters: vec![
                WorkflowParameter::number("mlc_leaf_width_mm", "MLC Leaf Width (mm)", 10.0)
                    .with_units("mm"),
                WorkflowParameter::number("mu_per_beam", "MU per Beam", 5000.0)
                    .with_bounds(Some(100.0), None),
            ],
        },
    ]
}

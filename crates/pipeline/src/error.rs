use std::path::PathBuf;

use radiarch_pacs::access::AccessError;

/// Failure reported by a [`DoseEngine`](crate::engine::DoseEngine).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The engine cannot run in this deployment.
    #[error("Dose engine unavailable: {0}")]
    Unavailable(String),

    /// The engine ran and failed.
    #[error("Dose calculation failed: {0}")]
    Computation(String),

    /// The engine returned a grid whose shape and data disagree.
    #[error("Invalid dose grid: {0}")]
    InvalidGrid(String),
}

/// Workflow-level failure. Its message is what the job reports.
#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    #[error("Unknown workflow: {0}")]
    UnknownWorkflow(String),

    /// Study, segmentation or target structure could not be found.
    #[error("{0}")]
    MissingData(String),

    /// The imaging archive could not be reached or answered badly.
    #[error("Data access failed: {0}")]
    Transient(#[from] AccessError),

    #[error("{0}")]
    Compute(#[from] EngineError),

    /// The blocking engine task panicked or was cancelled.
    #[error("Dose engine task failed: {0}")]
    EngineTask(String),

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize QA summary: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl PlannerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PlannerError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether a retry may succeed: archive transport failures and
    /// filesystem errors.
    pub fn is_transient(&self) -> bool {
        match self {
            PlannerError::Transient(e) => e.is_transient(),
            PlannerError::Io { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_workflow_message() {
        let err = PlannerError::UnknownWorkflow("does-not-exist".into());
        assert_eq!(err.to_string(), "Unknown workflow: does-not-exist");
    }

    #[test]
    fn transient_classification() {
        assert!(PlannerError::Transient(AccessError::HttpStatus(503)).is_transient());
        assert!(!PlannerError::Transient(AccessError::HttpStatus(400)).is_transient());
        assert!(PlannerError::io(
            "/tmp/x",
            std::io::Error::new(std::io::ErrorKind::Other, "disk full")
        )
        .is_transient());
        assert!(!PlannerError::MissingData("no study".into()).is_transient());
        assert!(!PlannerError::Compute(EngineError::Computation("nan".into())).is_transient());
    }

    #[test]
    fn compute_error_keeps_engine_message() {
        let err: PlannerError = EngineError::Computation("beam model missing".into()).into();
        assert_eq!(err.to_string(), "Dose calculation failed: beam model missing");
    }
}

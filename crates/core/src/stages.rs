//! Stage names, progress floors and ETA budgets for plan job execution.
//!
//! Written into `Job.stage` by the job runner and read by status pollers.

use std::time::Duration;

use crate::workflow::{Modality, WorkflowCategory};

pub const STAGE_INITIALIZING: &str = "initializing";
pub const STAGE_FETCHING: &str = "fetching";
pub const STAGE_COMPUTING: &str = "computing";
pub const STAGE_COMPUTING_PHOTON: &str = "computing_photon";
pub const STAGE_COMPUTING_BEAMLETS: &str = "computing_beamlets";
pub const STAGE_COMPUTING_ROBUST: &str = "computing_robust_beamlets";
pub const STAGE_PERSISTING: &str = "persisting";
pub const STAGE_PUSHING: &str = "pushing";
pub const STAGE_DONE: &str = "done";
pub const STAGE_RETRYING: &str = "retrying";
pub const STAGE_ERROR: &str = "error";
pub const STAGE_TIMEOUT: &str = "timeout";
pub const STAGE_CANCELLED: &str = "cancelled";

pub const PROGRESS_INITIALIZING: f64 = 0.05;
pub const PROGRESS_FETCHING: f64 = 0.15;
pub const PROGRESS_COMPUTING: f64 = 0.20;
pub const PROGRESS_PERSISTING: f64 = 0.85;
pub const PROGRESS_PUSHING: f64 = 0.92;
pub const PROGRESS_DONE: f64 = 1.0;

/// ETA budget for loading study data.
pub const FETCH_BUDGET: Duration = Duration::from_secs(30);
/// ETA budget for a plain dose calculation.
pub const DOSE_BUDGET: Duration = Duration::from_secs(120);
/// ETA budget for beamlet-based (and robust) optimization.
pub const OPTIMIZATION_BUDGET: Duration = Duration::from_secs(300);
/// ETA budget for packaging and persisting artifacts.
pub const PERSIST_BUDGET: Duration = Duration::from_secs(10);

/// Message written when a user cancels or deletes a plan.
pub const CANCELLED_BY_USER: &str = "Cancelled by user";

/// Compute stage label and ETA budget for a workflow.
///
/// Photon plans always use `computing_photon`; proton plans are labelled
/// by category.
pub fn compute_stage(category: WorkflowCategory, modality: Modality) -> (&'static str, Duration) {
    match (modality, category) {
        (Modality::Photon, _) => (STAGE_COMPUTING_PHOTON, DOSE_BUDGET),
        (_, WorkflowCategory::Optimization) => (STAGE_COMPUTING_BEAMLETS, OPTIMIZATION_BUDGET),
        (_, WorkflowCategory::Robust) => (STAGE_COMPUTING_ROBUST, OPTIMIZATION_BUDGET),
        (_, WorkflowCategory::Dose | WorkflowCategory::Simulation) => {
            (STAGE_COMPUTING, DOSE_BUDGET)
        }
    }
}

/// Remaining seconds of a stage budget, never negative.
pub fn eta_remaining(budget: Duration, elapsed: Duration) -> f64 {
    budget.saturating_sub(elapsed).as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_stage_by_category() {
        assert_eq!(
            compute_stage(WorkflowCategory::Dose, Modality::Proton),
            (STAGE_COMPUTING, DOSE_BUDGET)
        );
        assert_eq!(
            compute_stage(WorkflowCategory::Optimization, Modality::Proton),
            (STAGE_COMPUTING_BEAMLETS, OPTIMIZATION_BUDGET)
        );
        assert_eq!(
            compute_stage(WorkflowCategory::Robust, Modality::Proton).0,
            STAGE_COMPUTING_ROBUST
        );
    }

    #[test]
    fn photon_overrides_category() {
        assert_eq!(
            compute_stage(WorkflowCategory::Dose, Modality::Photon),
            (STAGE_COMPUTING_PHOTON, DOSE_BUDGET)
        );
    }

    #[test]
    fn eta_is_clamped_at_zero() {
        assert_eq!(eta_remaining(FETCH_BUDGET, Duration::from_secs(10)), 20.0);
        assert_eq!(eta_remaining(FETCH_BUDGET, Duration::from_secs(45)), 0.0);
    }

    #[test]
    fn progress_floors_increase() {
        let floors = [
            PROGRESS_INITIALIZING,
            PROGRESS_FETCHING,
            PROGRESS_COMPUTING,
            PROGRESS_PERSISTING,
            PROGRESS_PUSHING,
            PROGRESS_DONE,
        ];
        assert!(floors.windows(2).all(|w| w[0] < w[1]));
    }
}

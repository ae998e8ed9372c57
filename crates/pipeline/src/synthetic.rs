//! Synthetic QA results used when no dose engine is available.
//!
//! The numbers are plausible, not physical: a random spot count and
//! coverage, and a Gaussian-like fall-off DVH scaled to the prescription.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use radiarch_core::simulation::SimulationRequest;
use radiarch_db::models::plan::Plan;

use crate::capability::ComputeCapability;
use crate::error::PlannerError;
use crate::qa::{round_to, QaSummary};
use crate::simulation::SimulationOutcome;

/// Engine tag of synthetic summaries.
pub const SYNTHETIC_ENGINE: &str = "synthetic";

/// Engine tag of synthetic delivery simulations.
pub const SYNTHETIC_SIMULATION_ENGINE: &str = "synthetic_simulation";

/// Points in the synthetic DVH curve.
pub const SYNTHETIC_DVH_POINTS: usize = 50;

const DEFAULT_NOTES: &str = "Dose engine unavailable; generated synthetic QA";

/// Build a synthetic QA summary for `plan` using `rng`.
///
/// - spot count: uniform in `200..=400`, times the beam count
/// - target coverage: `0.8 + 0.05 * U`, clamped to `[0.7, 0.99]`
/// - max dose ratio: `1.10 + 0.05 * U`, at least 1.0
/// - DVH: dose `linspace(0, 1.2 * Rx, 50)`, volume `100 * exp(-2 * (d / Rx)^2)`
/// - gantry angles: `i * 360 / beams`, rounded to 0.1 degree
pub fn synthetic_summary<R: Rng>(plan: &Plan, rng: &mut R) -> QaSummary {
    let beam_count = plan.beam_count.max(1);
    let spot_count = rng.random_range(200..=400) * i64::from(beam_count);
    let coverage = (0.8 + 0.05 * rng.random::<f64>()).clamp(0.7, 0.99);
    let hot_spot = (1.10 + 0.05 * rng.random::<f64>()).max(1.0);

    let rx = plan.prescription_gy;
    let dose = linspace(0.0, rx * 1.2, SYNTHETIC_DVH_POINTS);
    let volume: Vec<f64> = dose
        .iter()
        .map(|d| (-(d / rx).powi(2) * 2.0).exp() * 100.0)
        .collect();
    let gantry_angles: Vec<f64> = (0..beam_count)
        .map(|i| round_to(f64::from(i) * (360.0 / f64::from(beam_count)), 1))
        .collect();

    let mut qa = QaSummary::new(SYNTHETIC_ENGINE);
    qa.set("beamCount", beam_count)
        .set("gantryAngles", gantry_angles)
        .set("spotCount", spot_count)
        .set("targetCoverage", round_to(coverage, 3))
        .set("maxDoseRatio", round_to(hot_spot, 3))
        .set(
            "dvh",
            serde_json::json!({ "dose": dose, "volume": volume }),
        )
        .set_notes(DEFAULT_NOTES);
    qa
}

fn linspace(start: f64, stop: f64, points: usize) -> Vec<f64> {
    match points {
        0 => Vec::new(),
        1 => vec![start],
        n => {
            let step = (stop - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

/// Build a synthetic delivery simulation result using `rng`.
///
/// The gamma pass rate starts at 98% and loses 1.5 points per mm of the
/// largest motion amplitude, at most 15 points.
pub fn synthetic_simulation<R: Rng>(request: &SimulationRequest, rng: &mut R) -> SimulationOutcome {
    let motion = request.max_motion_mm();
    let gamma_penalty = (motion * 1.5).min(15.0);
    let gamma = 98.0 - gamma_penalty + rng.random_range(-0.5_f64..0.5);
    let max_dose = 2.0 + rng.random_range(-0.1_f64..0.1);
    let mean_dose = 1.8 + rng.random_range(-0.05_f64..0.05);
    let dose_difference = (motion * 0.5 + rng.random_range(-0.2_f64..0.2)).max(0.1);

    SimulationOutcome {
        engine: SYNTHETIC_SIMULATION_ENGINE.to_string(),
        delivered_dose_max_gy: round_to(max_dose, 3),
        delivered_dose_mean_gy: round_to(mean_dose, 3),
        gamma_pass_rate: Some(round_to(gamma, 1)),
        dose_difference_pct: Some(round_to(dose_difference, 2)),
        motion_amplitude_mm: request.motion_amplitude_mm,
        num_fractions: request.num_fractions,
        artifact_path: None,
        notes: None,
    }
}

// ---------------------------------------------------------------------------
// SyntheticGenerator
// ---------------------------------------------------------------------------

/// Synthetic capability. Owns its random source so tests can seed it.
#[derive(Debug)]
pub struct SyntheticGenerator {
    rng: Mutex<StdRng>,
}

impl SyntheticGenerator {
    /// Generator seeded from the OS.
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_os_rng())
    }

    /// Deterministic generator.
    pub fn seeded(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    pub fn from_rng(rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
        }
    }

    pub fn generate(&self, plan: &Plan) -> QaSummary {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        synthetic_summary(plan, &mut *rng)
    }

    pub fn simulate(&self, request: &SimulationRequest) -> SimulationOutcome {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        synthetic_simulation(request, &mut *rng)
    }
}

impl Default for SyntheticGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ComputeCapability for SyntheticGenerator {
    fn engine_name(&self) -> &str {
        SYNTHETIC_ENGINE
    }

    fn probe(&self) -> Result<(), String> {
        Ok(())
    }

    async fn run(&self, plan: &Plan) -> Result<QaSummary, PlannerError> {
        Ok(self.generate(plan))
    }
}

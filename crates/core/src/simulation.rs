//! Delivery simulation request: replays a finished plan under breathing
//! motion.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::EntityId;

pub const DEFAULT_MOTION_PERIOD_S: f64 = 4.0;
pub const DEFAULT_DELIVERY_TIME_PER_SPOT_MS: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRequest {
    /// Plan whose delivery is simulated; it must have a QA summary.
    pub plan_id: EntityId,
    /// Breathing motion amplitude along x, y and z.
    #[serde(default)]
    pub motion_amplitude_mm: [f64; 3],
    #[serde(default = "default_motion_period")]
    pub motion_period_s: f64,
    #[serde(default = "default_spot_time")]
    pub delivery_time_per_spot_ms: f64,
    #[serde(default = "default_fractions")]
    pub num_fractions: i32,
    pub notes: Option<String>,
}

fn default_motion_period() -> f64 {
    DEFAULT_MOTION_PERIOD_S
}

fn default_spot_time() -> f64 {
    DEFAULT_DELIVERY_TIME_PER_SPOT_MS
}

fn default_fractions() -> i32 {
    1
}

impl SimulationRequest {
    /// Static delivery of a single fraction.
    pub fn new(plan_id: EntityId) -> Self {
        Self {
            plan_id,
            motion_amplitude_mm: [0.0; 3],
            motion_period_s: DEFAULT_MOTION_PERIOD_S,
            delivery_time_per_spot_ms: DEFAULT_DELIVERY_TIME_PER_SPOT_MS,
            num_fractions: 1,
            notes: None,
        }
    }

    pub fn with_motion(mut self, motion_amplitude_mm: [f64; 3]) -> Self {
        self.motion_amplitude_mm = motion_amplitude_mm;
        self
    }

    /// Largest amplitude over the three axes.
    pub fn max_motion_mm(&self) -> f64 {
        self.motion_amplitude_mm
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self
            .motion_amplitude_mm
            .iter()
            .any(|a| !a.is_finite() || *a < 0.0)
        {
            return Err(CoreError::Validation(
                "motion_amplitude_mm values must be finite and non-negative".to_string(),
            ));
        }
        if !self.motion_period_s.is_finite() || self.motion_period_s <= 0.0 {
            return Err(CoreError::Validation(format!(
                "motion_period_s must be greater than 0 (got {})",
                self.motion_period_s
            )));
        }
        if !self.delivery_time_per_spot_ms.is_finite() || self.delivery_time_per_spot_ms <= 0.0 {
            return Err(CoreError::Validation(format!(
                "delivery_time_per_spot_ms must be greater than 0 (got {})",
                self.delivery_time_per_spot_ms
            )));
        }
        if self.num_fractions < 1 {
            return Err(CoreError::Validation(
                "num_fractions must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

//! Dose engine interface.
//!
//! A [`DoseEngine`] is a blocking physics backend. The pipeline builds a
//! [`DoseRequest`] from the plan, runs [`DoseEngine::compute`] on a
//! blocking thread and writes [`DoseEngine::export`] bytes to disk.
//! Delivery simulation goes through [`DoseEngine::simulate_delivery`] the
//! same way.

use std::path::PathBuf;

use radiarch_core::plan::{
    DoseObjective, OptimizationSettings, PhotonSettings, RobustnessConfig,
};
use radiarch_core::types::EntityId;
use radiarch_db::models::artifact::CONTENT_TYPE_OCTET_STREAM;

use crate::error::EngineError;

/// Primaries for a plain proton dose calculation.
pub const DEFAULT_DOSE_PRIMARIES: u64 = 10_000;

/// Leading bytes of the default dose grid encoding.
pub const DOSE_GRID_MAGIC: &[u8; 8] = b"RADOSE01";

/// Largest stored voxel value; the grid maximum maps onto it.
const MAX_SCALED_VALUE: f64 = 2_147_483_647.0;

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeamGeometry {
    pub gantry_angle_deg: f64,
    pub couch_angle_deg: f64,
}

/// Evenly spaced gantry angles, `i * 360 / n`, starting at 0.
pub fn evenly_spaced_gantry_angles(beam_count: usize) -> Vec<f64> {
    let count = beam_count.max(1);
    (0..count)
        .map(|i| i as f64 * (360.0 / count as f64))
        .collect()
}

/// What the engine should compute.
#[derive(Debug, Clone, PartialEq)]
pub enum ComputeMode {
    /// Forward dose on a fixed spot map.
    ProtonDose { nb_primaries: u64 },
    /// Beamlet calculation, spot-weight optimization, final dose.
    ProtonOptimized { settings: OptimizationSettings },
    /// As optimized, over setup/range error scenarios.
    ProtonRobust {
        settings: OptimizationSettings,
        robustness: RobustnessConfig,
    },
    /// Collapsed-cone convolution photon dose.
    PhotonCcc { settings: PhotonSettings },
}

/// Engine-side plan representation.
#[derive(Debug, Clone, PartialEq)]
pub struct DoseRequest {
    pub plan_id: EntityId,
    pub study_instance_uid: String,
    /// Structure names from the segmentation, in label order.
    pub structures: Vec<String>,
    /// Structure the prescription is defined on, if one was found.
    pub target: Option<String>,
    pub prescription_gy: f64,
    pub fraction_count: i32,
    pub beams: Vec<BeamGeometry>,
    pub mode: ComputeMode,
    pub objectives: Vec<DoseObjective>,
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// 3-D dose grid in Gy, stored frame-major (`[frames, rows, columns]`).
#[derive(Debug, Clone, PartialEq)]
pub struct DoseGrid {
    pub shape: [usize; 3],
    pub spacing_mm: [f64; 3],
    pub origin_mm: [f64; 3],
    pub values: Vec<f32>,
}

impl DoseGrid {
    pub fn new(
        shape: [usize; 3],
        spacing_mm: [f64; 3],
        origin_mm: [f64; 3],
        values: Vec<f32>,
    ) -> Result<Self, EngineError> {
        let grid = Self {
            shape,
            spacing_mm,
            origin_mm,
            values,
        };
        grid.validate()?;
        Ok(grid)
    }

    pub fn voxel_count(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.voxel_count() == 0 {
            return Err(EngineError::InvalidGrid(format!(
                "empty grid shape {:?}",
                self.shape
            )));
        }
        if self.values.len() != self.voxel_count() {
            return Err(EngineError::InvalidGrid(format!(
                "shape {:?} needs {} values, got {}",
                self.shape,
                self.voxel_count(),
                self.values.len()
            )));
        }
        Ok(())
    }

    pub fn max(&self) -> f64 {
        self.values
            .iter()
            .copied()
            .fold(0.0_f32, f32::max)
            .into()
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.values.iter().map(|&v| f64::from(v)).sum();
        sum / self.values.len() as f64
    }
}

/// Optimizer report for the optimized and robust workflows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizationOutcome {
    pub success: bool,
    pub iterations: u32,
    pub final_cost: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DoseResult {
    pub grid: DoseGrid,
    /// Target voxels, same length as `grid.values`.
    pub target_mask: Option<Vec<bool>>,
    pub optimization: Option<OptimizationOutcome>,
}

// ---------------------------------------------------------------------------
// Delivery simulation
// ---------------------------------------------------------------------------

/// Replay of a finished plan under breathing motion.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryRequest {
    pub plan_id: EntityId,
    /// Engine output directory of the planning run.
    pub sim_dir: PathBuf,
    /// Planned dose export, compared against the delivered dose if present.
    pub planned_dose_path: Option<PathBuf>,
    pub motion_amplitude_mm: [f64; 3],
    pub motion_period_s: f64,
    pub delivery_time_per_spot_ms: f64,
    pub num_fractions: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveredDose {
    pub grid: DoseGrid,
    /// Gamma pass rate (3%/3mm) against the planned dose, in percent.
    pub gamma_pass_rate: Option<f64>,
    pub dose_difference_pct: Option<f64>,
}

// ---------------------------------------------------------------------------
// DoseEngine
// ---------------------------------------------------------------------------

/// Blocking dose-physics backend.
pub trait DoseEngine: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(())` when the engine can run here, otherwise the reason it can't.
    fn probe(&self) -> Result<(), String>;

    /// Run the calculation. Called from a blocking thread.
    fn compute(&self, request: &DoseRequest) -> Result<DoseResult, EngineError>;

    /// Serialize a grid for storage.
    ///
    /// The default is [`encode_dose_grid`], which is not DICOM. Engines that
    /// write a DICOM RTDOSE override this together with
    /// [`export_content_type`](Self::export_content_type); only DICOM
    /// exports are pushed to the archive.
    fn export(&self, grid: &DoseGrid) -> Vec<u8> {
        encode_dose_grid(grid)
    }

    /// Content type of the bytes returned by [`export`](Self::export).
    fn export_content_type(&self) -> &'static str {
        CONTENT_TYPE_OCTET_STREAM
    }

    /// Simulate delivery of a finished plan. Called from a blocking thread.
    fn simulate_delivery(&self, _request: &DeliveryRequest) -> Result<DeliveredDose, EngineError> {
        Err(EngineError::Unavailable(format!(
            "{} does not simulate delivery",
            self.name()
        )))
    }
}

/// Engine used when no physics backend is installed.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableEngine;

impl DoseEngine for UnavailableEngine {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn probe(&self) -> Result<(), String> {
        Err("no dose engine configured".to_string())
    }

    fn compute(&self, _request: &DoseRequest) -> Result<DoseResult, EngineError> {
        Err(EngineError::Unavailable("no dose engine configured".to_string()))
    }
}

/// Default little-endian grid encoding.
///
/// Layout: magic, three `u32` dimensions, spacing and origin as three `f64`
/// each, the `f64` scaling factor, then one `u32` per voxel. A stored value
/// times the scaling factor gives Gy; the grid maximum is stored as
/// `i32::MAX`. Negative doses are stored as zero.
pub fn encode_dose_grid(grid: &DoseGrid) -> Vec<u8> {
    let max = grid.max();
    let scaling = if max > 0.0 { max / MAX_SCALED_VALUE } else { 1.0 };

    let mut out = Vec::with_capacity(8 + 12 + 24 + 24 + 8 + grid.values.len() * 4);
    out.extend_from_slice(DOSE_GRID_MAGIC);
    for dim in grid.shape {
        out.extend_from_slice(&(dim as u32).to_le_bytes());
    }
    for v in grid.spacing_mm.iter().chain(grid.origin_mm.iter()) {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out.extend_from_slice(&scaling.to_le_bytes());
    for &v in &grid.values {
        let scaled = (f64::from(v).max(0.0) / scaling)
            .round()
            .min(MAX_SCALED_VALUE) as u32;
        out.extend_from_slice(&scaled.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn grid(values: Vec<f32>) -> DoseGrid {
        DoseGrid::new([1, 1, values.len()], [2.0; 3], [0.0; 3], values).unwrap()
    }

    #[test]
    fn gantry_angles_are_evenly_spaced() {
        assert_eq!(evenly_spaced_gantry_angles(1), vec![0.0]);
        assert_eq!(evenly_spaced_gantry_angles(4), vec![0.0, 90.0, 180.0, 270.0]);
        assert_eq!(evenly_spaced_gantry_angles(0), vec![0.0]);
    }

    #[test]
    fn grid_rejects_mismatched_values() {
        let err = DoseGrid::new([2, 2, 2], [1.0; 3], [0.0; 3], vec![0.0; 7]).unwrap_err();
        assert_matches!(err, EngineError::InvalidGrid(_));
        let err = DoseGrid::new([0, 2, 2], [1.0; 3], [0.0; 3], vec![]).unwrap_err();
        assert_matches!(err, EngineError::InvalidGrid(_));
    }

    #[test]
    fn grid_stats() {
        let g = grid(vec![1.0, 2.0, 3.0, 6.0]);
        assert_eq!(g.max(), 6.0);
        assert_eq!(g.mean(), 3.0);
    }

    #[test]
    fn encoding_header_and_scaling() {
        let g = grid(vec![0.0, 1.0, 2.0]);
        let bytes = encode_dose_grid(&g);
        assert_eq!(bytes.len(), 8 + 12 + 48 + 8 + 3 * 4);
        assert_eq!(&bytes[..8], DOSE_GRID_MAGIC);
        assert_eq!(u32::from_le_bytes(bytes[16..20].try_into().unwrap()), 3);

        let last = &bytes[bytes.len() - 4..];
        assert_eq!(u32::from_le_bytes(last.try_into().unwrap()), i32::MAX as u32);
        let first = &bytes[bytes.len() - 12..bytes.len() - 8];
        assert_eq!(u32::from_le_bytes(first.try_into().unwrap()), 0);
    }

    #[test]
    fn zero_grid_uses_unit_scaling() {
        let bytes = encode_dose_grid(&grid(vec![0.0, 0.0]));
        let scaling = f64::from_le_bytes(bytes[68..76].try_into().unwrap());
        assert_eq!(scaling, 1.0);
    }

    #[test]
    fn unavailable_engine_reports_reason() {
        let engine = UnavailableEngine;
        assert_eq!(engine.probe().unwrap_err(), "no dose engine configured");
    }

    #[test]
    fn default_export_is_not_dicom() {
        assert_eq!(UnavailableEngine.export_content_type(), "application/octet-stream");
    }
}

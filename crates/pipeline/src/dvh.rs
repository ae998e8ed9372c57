//! Cumulative dose-volume histogram over a target mask.

use serde::Serialize;

use crate::engine::DoseGrid;
use crate::qa::round_to;

/// Number of dose bins.
pub const DVH_BINS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dvh {
    pub roi_name: String,
    /// Bin centers in Gy.
    pub dose_gy: Vec<f64>,
    /// Percent of target voxels receiving at least each bin's lower edge.
    pub volume_pct: Vec<f64>,
    pub min_dose_gy: f64,
    pub max_dose_gy: f64,
    pub mean_dose_gy: f64,
}

/// Compute the DVH of the voxels selected by `mask`.
///
/// Returns `None` when the mask does not match the grid or selects nothing.
pub fn compute_dvh(roi_name: &str, grid: &DoseGrid, mask: &[bool]) -> Option<Dvh> {
    if mask.len() != grid.values.len() {
        tracing::warn!(
            mask_len = mask.len(),
            grid_len = grid.values.len(),
            "DVH mask does not match dose grid, skipping",
        );
        return None;
    }

    let mut doses: Vec<f64> = grid
        .values
        .iter()
        .zip(mask)
        .filter(|&(_, &inside)| inside)
        .map(|(&v, _)| f64::from(v))
        .collect();
    if doses.is_empty() {
        return None;
    }
    doses.sort_by(f64::total_cmp);

    let total = doses.len() as f64;
    let min = doses[0];
    let max = doses[doses.len() - 1];
    let mean = doses.iter().sum::<f64>() / total;

    let edge = |i: usize| max * i as f64 / DVH_BINS as f64;
    let mut dose_gy = Vec::with_capacity(DVH_BINS);
    let mut volume_pct = Vec::with_capacity(DVH_BINS);
    for bin in 0..DVH_BINS {
        let lower = edge(bin);
        let at_least = doses.len() - doses.partition_point(|&d| d < lower);
        dose_gy.push(round_to((lower + edge(bin + 1)) / 2.0, 4));
        volume_pct.push(round_to(at_least as f64 / total * 100.0, 2));
    }

    Some(Dvh {
        roi_name: roi_name.to_string(),
        dose_gy,
        volume_pct,
        min_dose_gy: round_to(min, 4),
        max_dose_gy: round_to(max, 4),
        mean_dose_gy: round_to(mean, 4),
    })
}

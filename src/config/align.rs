//! Engine settings shared by every tool: window layout, whitening, refit
//! outlier rejection, bias iterations and job dispatch. Layers may override
//! the window scale and whitening through their own method data.

use crate::driver::DispatchOptions;
use crate::project::MethodData;
use crate::recipe::RecipeParams;
use crate::swim::SwimMatcher;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Engine-wide alignment settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    /// Window size relative to the grid cell.
    pub win_scale_factor: f64,
    /// Spectral whitening exponent of the correlation.
    pub whitening_factor: f64,
    /// Correlate/refit rounds per swim step.
    pub iterations: usize,
    pub check_iterations: usize,
    /// Match-point window side as a fraction of the image width.
    pub match_point_window_fraction: f64,
    /// Refit RMS in pixels above which correspondences are dropped.
    pub mir_rms_threshold: f64,
    pub mir_min_points: usize,
    /// Radius of the sub-pixel peak neighbourhood.
    pub peak_radius: usize,
    pub bias_iterations: usize,
    pub dispatch: DispatchOptions,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        let recipe = RecipeParams::default();
        Self {
            win_scale_factor: recipe.win_scale_factor,
            whitening_factor: recipe.whitening,
            iterations: recipe.iterations,
            check_iterations: recipe.check_iterations,
            match_point_window_fraction: recipe.match_point_window_fraction,
            mir_rms_threshold: recipe.rms_threshold,
            mir_min_points: recipe.min_points,
            peak_radius: 5,
            bias_iterations: 2,
            dispatch: DispatchOptions::default(),
        }
    }
}

impl AlignmentConfig {
    /// Recipe knobs for one layer; the layer's own factors win when set.
    pub fn recipe_params(&self, layer: &MethodData) -> RecipeParams {
        RecipeParams {
            win_scale_factor: layer
                .win_scale_factor
                .filter(|v| v.is_finite() && *v > 0.0)
                .unwrap_or(self.win_scale_factor),
            whitening: layer
                .whitening_factor
                .filter(|v| v.is_finite())
                .unwrap_or(self.whitening_factor),
            iterations: self.iterations.max(1),
            check_iterations: self.check_iterations.max(1),
            match_point_window_fraction: self.match_point_window_fraction,
            rms_threshold: self.mir_rms_threshold,
            min_points: self.mir_min_points,
        }
    }

    pub fn matcher(&self) -> SwimMatcher {
        SwimMatcher::new(self.peak_radius)
    }
}

pub fn load_config(path: &Path) -> Result<AlignmentConfig, String> {
    let data = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config {}: {e}", path.display()))?;
    serde_json::from_str(&data)
        .map_err(|e| format!("Failed to parse config {}: {e}", path.display()))
}

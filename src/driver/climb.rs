//! Choosing the scale to align and seeding it from a coarser one.
//!
//! Scales are climbed from coarse to fine. A scale aligned with
//! `refine_affine` or `apply_affine` starts from the results of the next
//! coarser scale, which must be completely aligned. Pixel sizes differ by
//! `k = N_seed / N_target`, so translations and point coordinates are
//! multiplied by `k` while the linear part is kept.

use super::AlignRequest;
use crate::error::AlignmentError;
use crate::project::{evaluate_status, ImageEntry, LayerRecord, MethodResults, ProjectModel};
use log::info;
use std::ops::Range;

/// Scale selected for a request.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScalePlan {
    pub target: u32,
    /// Coarser aligned scale to carry results from.
    pub seed: Option<u32>,
}

impl ScalePlan {
    pub fn upscale_factor(&self) -> Option<f64> {
        self.seed.map(|s| s as f64 / self.target as f64)
    }
}

/// Resolve the target scale and its seed without touching the project.
pub fn plan_scale(project: &ProjectModel, request: &AlignRequest) -> Result<ScalePlan, AlignmentError> {
    let status = evaluate_status(project);
    let target = match request.scale {
        Some(n) if status.scale(n).is_some() => n,
        Some(n) => {
            return Err(AlignmentError::InvalidRequest(format!(
                "project has no scale_{n}"
            )))
        }
        None => status.scale_tbd.ok_or_else(|| {
            AlignmentError::InvalidRequest("every scale is already aligned".to_string())
        })?,
    };

    if !request.alignment_option.needs_seed() {
        return Ok(ScalePlan { target, seed: None });
    }
    let seed = status
        .coarser_than(target)
        .filter(|&s| status.is_aligned(s))
        .ok_or_else(|| AlignmentError::ScaleClimbOrderViolation {
            scale: target,
            reason: format!(
                "{} needs a completely aligned coarser scale to start from",
                request.alignment_option
            ),
        })?;
    let (n_target, n_seed) = (
        project.scale(target).map_or(0, |s| s.alignment_stack.len()),
        project.scale(seed).map_or(0, |s| s.alignment_stack.len()),
    );
    if n_target != n_seed {
        return Err(AlignmentError::ScaleClimbOrderViolation {
            scale: target,
            reason: format!("scale_{seed} has {n_seed} layers, scale_{target} has {n_target}"),
        });
    }
    Ok(ScalePlan {
        target,
        seed: Some(seed),
    })
}

/// Copy the seed scale's results into `range` of the target scale.
pub fn seed_from_coarser(project: &mut ProjectModel, plan: &ScalePlan, range: Range<usize>) {
    let (Some(seed), Some(k)) = (plan.seed, plan.upscale_factor()) else {
        return;
    };
    let Some(seed_stack) = project.scale(seed).map(|s| s.alignment_stack.clone()) else {
        return;
    };
    let Some(target) = project.scale_mut(plan.target) else {
        return;
    };
    info!(
        "seeding scale_{} layers {}..{} from scale_{seed} (k = {k})",
        plan.target, range.start, range.end
    );
    for i in range {
        let (Some(layer), Some(from)) = (target.alignment_stack.get_mut(i), seed_stack.get(i)) else {
            continue;
        };
        upscale_layer(layer, from, k);
    }
}

fn upscale_layer(layer: &mut LayerRecord, seed: &LayerRecord, k: f64) {
    let method = &mut layer.align_to_ref_method;
    method.method_results = if layer.skip || seed.skip || seed.results().is_empty() {
        MethodResults::unaligned()
    } else {
        upscale_results(seed.results(), k)
    };
    let seed_data = &seed.align_to_ref_method.method_data;
    method.method_data.bias_x_per_image = seed_data.bias_x_per_image * k;
    method.method_data.bias_y_per_image = seed_data.bias_y_per_image * k;
    inherit_points(&mut layer.images.reference, &seed.images.reference, k);
    inherit_points(&mut layer.images.base, &seed.images.base, k);
}

fn upscale_results(results: &MethodResults, k: f64) -> MethodResults {
    MethodResults {
        affine_matrix: results.affine_matrix.map(|a| a.scale_translation(k)),
        cumulative_afm: results.cumulative_afm.map(|a| a.scale_translation(k)),
        ..results.clone()
    }
}

fn inherit_points(entry: &mut ImageEntry, seed: &ImageEntry, k: f64) {
    if entry.metadata.match_points.is_empty() {
        entry.metadata.match_points = seed
            .metadata
            .match_points
            .iter()
            .map(|p| [p[0] * k, p[1] * k])
            .collect();
    }
}

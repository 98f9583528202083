//! Batch driver: align one scale of a project.
//!
//! 1. resolve the target scale and, for `refine_affine`/`apply_affine`, the
//!    coarser seed scale (nothing is written if this fails);
//! 2. relink the reference chain and seed the requested layer range;
//! 3. build one [`LayerJob`] per non-skipped layer with a reference image and
//!    run them, possibly in parallel;
//! 4. write each job's result back into its own layer record; failed layers
//!    become skipped identity layers;
//! 5. recompute cumulative affines (optionally with bias nulling) and the
//!    bounding rectangle.

pub mod climb;
pub mod dispatch;
pub mod stack;

use crate::config::align::AlignmentConfig;
use crate::diagnostics::timing::elapsed_ms;
use crate::diagnostics::{BatchReport, LayerOutcome, LayerStatus, TimingBreakdown};
use crate::error::AlignmentError;
use crate::image::ImageSource;
use crate::project::{
    link_stack, scale_key, AlignmentOption, LayerRecord, MethodResults, ProjectModel,
    ScaleRecord,
};
use crate::recipe::LayerPlan;
use crate::swim::Matcher;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::time::Instant;

pub use climb::{plan_scale, seed_from_coarser, ScalePlan};
pub use dispatch::{run_jobs, DispatchOptions, JobOutcome, LayerJob};
pub use stack::{update_bounding_rect, update_cumulative};

/// What to align.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignRequest {
    /// Downsampling factor; `None` picks the coarsest scale not yet aligned.
    pub scale: Option<u32>,
    pub alignment_option: AlignmentOption,
    pub start_layer: usize,
    /// Number of layers from `start_layer`; `-1` runs to the end.
    pub num_layers: i64,
}

impl Default for AlignRequest {
    fn default() -> Self {
        Self {
            scale: None,
            alignment_option: AlignmentOption::InitAffine,
            start_layer: 0,
            num_layers: -1,
        }
    }
}

impl AlignRequest {
    /// Layer range inside a stack of `len` layers.
    pub fn layer_range(&self, len: usize) -> Result<Range<usize>, AlignmentError> {
        if len == 0 {
            return Err(AlignmentError::InvalidRequest("stack is empty".to_string()));
        }
        if self.start_layer >= len {
            return Err(AlignmentError::InvalidRequest(format!(
                "start layer {} is outside a stack of {len} layers",
                self.start_layer
            )));
        }
        let end = match self.num_layers {
            -1 => len,
            n if n > 0 => (self.start_layer + n as usize).min(len),
            n => {
                return Err(AlignmentError::InvalidRequest(format!(
                    "num_layers must be positive or -1, got {n}"
                )))
            }
        };
        Ok(self.start_layer..end)
    }
}

/// Align one scale of `project` in place.
///
/// Only request-level problems are returned as errors; a layer that cannot
/// be aligned is marked skip and reported in the [`BatchReport`].
pub fn align_scale(
    project: &mut ProjectModel,
    request: &AlignRequest,
    config: &AlignmentConfig,
    matcher: &dyn Matcher,
    images: &dyn ImageSource,
) -> Result<BatchReport, AlignmentError> {
    let total = Instant::now();
    let mut timing = TimingBreakdown::default();

    let plan = plan_scale(project, request)?;
    let len = project
        .scale(plan.target)
        .map_or(0, |s| s.alignment_stack.len());
    let range = request.layer_range(len)?;
    info!(
        "aligning scale_{} layers {}..{} with {}",
        plan.target, range.start, range.end, request.alignment_option
    );

    let t = Instant::now();
    seed_from_coarser(project, &plan, range.clone());
    project.data.current_scale = scale_key(plan.target);
    let scale = project.scale_mut(plan.target).ok_or_else(|| {
        AlignmentError::InvalidRequest(format!("project has no scale_{}", plan.target))
    })?;
    link_stack(&mut scale.alignment_stack);
    let (jobs, mut outcomes) = build_jobs(scale, request, config, range.clone());
    timing.push_since("prepare", t);

    let t = Instant::now();
    let finished = run_jobs(&jobs, images, matcher, &config.dispatch);
    timing.push_since("dispatch", t);

    let frame = frame_size(scale, images);
    for outcome in finished {
        outcomes.push(write_back(scale, request.alignment_option, outcome));
    }
    outcomes.sort_by_key(|o| o.index);

    let t = Instant::now();
    let correction = update_cumulative(scale, range.start, config.bias_iterations);
    update_bounding_rect(scale, frame);
    timing.push_since("stack", t);
    timing.total_ms = elapsed_ms(total);

    let report = BatchReport {
        scale: plan.target,
        alignment_option: request.alignment_option,
        seed_scale: plan.seed,
        upscale_factor: plan.upscale_factor(),
        start_layer: range.start,
        end_layer: range.end,
        layers: outcomes,
        bias_nulled: correction.is_some(),
        bounding_rect: scale.bounding_rect,
        timing,
    };
    info!(
        "scale_{}: {} aligned, {} failed in {:.0} ms",
        report.scale,
        report.aligned_count(),
        report.failed_count(),
        report.timing.total_ms
    );
    Ok(report)
}

/// Jobs for the dispatchable layers of `range`, plus outcomes for the rest.
fn build_jobs(
    scale: &mut ScaleRecord,
    request: &AlignRequest,
    config: &AlignmentConfig,
    range: Range<usize>,
) -> (Vec<LayerJob>, Vec<LayerOutcome>) {
    let mut jobs = Vec::new();
    let mut skipped = Vec::new();
    for i in range {
        let layer = &mut scale.alignment_stack[i];
        let reason = if layer.skip {
            Some("skip flag set")
        } else if layer.images.reference.filename.is_empty() {
            Some("no reference image")
        } else {
            None
        };
        if let Some(reason) = reason {
            *layer.results_mut() = MethodResults::unaligned();
            skipped.push(LayerOutcome::not_dispatched(i, reason));
            continue;
        }
        jobs.push(LayerJob {
            index: i,
            ref_file: layer.images.reference.filename.clone(),
            base_file: layer.images.base.filename.clone(),
            plan: layer_plan(layer, request, config),
        });
    }
    (jobs, skipped)
}

fn layer_plan(layer: &LayerRecord, request: &AlignRequest, config: &AlignmentConfig) -> LayerPlan {
    let method = &layer.align_to_ref_method;
    let mut plan = LayerPlan::new(
        method.selected_method,
        request.alignment_option,
        config.recipe_params(&method.method_data),
    );
    if request.alignment_option.needs_seed() {
        if let Some(afm) = method.method_results.affine_matrix {
            plan.initial = afm;
        }
    }
    plan.ref_points = layer.images.reference.metadata.match_points.clone();
    plan.base_points = layer.images.base.metadata.match_points.clone();
    plan
}

/// Store one job's result in its layer. Job indices are unique, so each
/// layer has exactly one writer.
fn write_back(scale: &mut ScaleRecord, option: AlignmentOption, outcome: JobOutcome) -> LayerOutcome {
    let JobOutcome {
        index,
        attempts,
        elapsed_ms,
        result,
    } = outcome;
    let layer = &mut scale.alignment_stack[index];
    layer.align_to_ref_method.method_data.alignment_option = option;
    match result {
        Ok(done) => {
            let snr_mean = (!done.snr.is_empty())
                .then(|| done.snr.iter().sum::<f64>() / done.snr.len() as f64);
            let results = layer.results_mut();
            results.affine_matrix = Some(done.afm);
            results.snr = done.snr;
            results.snr_report = Some(done.snr_report.clone());
            LayerOutcome {
                index,
                status: LayerStatus::Aligned,
                attempts,
                elapsed_ms,
                snr_mean,
                snr_report: done.snr_report,
                ingredients: done.ingredients,
            }
        }
        Err(err) => {
            warn!("{err}; layer {index} marked skipped");
            layer.skip = true;
            *layer.results_mut() = MethodResults::unaligned();
            LayerOutcome {
                index,
                status: LayerStatus::Failed {
                    reason: err.to_string(),
                },
                attempts,
                elapsed_ms,
                snr_mean: None,
                snr_report: "SNR: --".to_string(),
                ingredients: Vec::new(),
            }
        }
    }
}

/// Size of the first loadable base image of the stack.
fn frame_size(scale: &ScaleRecord, images: &dyn ImageSource) -> Option<(usize, usize)> {
    if !scale.use_bounding_rect {
        return None;
    }
    scale
        .alignment_stack
        .iter()
        .filter(|l| !l.images.base.filename.is_empty())
        .find_map(|l| images.load(&l.images.base.filename).ok())
        .map(|img| (img.w, img.h))
}

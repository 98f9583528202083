//! Whole-stack pass run after every layer job of a batch has finished.

use crate::affine::Affine;
use crate::bias::{bounding_rect, chain_cumulative, null_bias, BiasCorrection};
use crate::project::{MethodResults, ScaleRecord};
use log::{debug, warn};

/// Per-layer affines of the stack; skipped layers and layers without a
/// result count as identity. With `mark_missing` a layer without a result is
/// also marked skip and given identity results.
pub fn layer_affines(scale: &mut ScaleRecord, mark_missing: bool) -> Vec<Affine> {
    scale
        .alignment_stack
        .iter_mut()
        .enumerate()
        .map(|(i, layer)| {
            if mark_missing && layer.results().is_empty() {
                if !layer.skip {
                    warn!("layer {i} has no affine, marking it skipped");
                }
                layer.skip = true;
                *layer.results_mut() = MethodResults::unaligned();
            }
            match (layer.skip, layer.results().affine_matrix) {
                (false, Some(afm)) => afm,
                _ => Affine::identity(),
            }
        })
        .collect()
}

/// Recompute cumulative affines.
///
/// With `null_cafm_trends` the whole stack is rebuilt with bias nulling; if
/// the stack cannot be decomposed it is chained without correction instead.
/// Otherwise chaining starts at `start` from the persisted cumulative affine
/// of `start - 1`; if that one is missing the whole stack is rechained.
pub fn update_cumulative(
    scale: &mut ScaleRecord,
    start: usize,
    bias_iterations: usize,
) -> Option<BiasCorrection> {
    let nulling = scale.null_cafm_trends;
    let afms = layer_affines(scale, nulling);
    let start = if nulling {
        match null_bias(&afms, scale.poly_order, bias_iterations) {
            Ok(correction) => {
                for (layer, c) in scale.alignment_stack.iter_mut().zip(&correction.cumulative) {
                    layer.results_mut().cumulative_afm = Some(*c);
                }
                debug!("bias nulled over {} layers", afms.len());
                return Some(correction);
            }
            Err(err) => {
                warn!("bias nulling failed ({err}), chaining the stack without correction");
                0
            }
        }
    } else {
        start
    };

    let start = start.min(afms.len());
    let seed = if start == 0 {
        None
    } else {
        scale.alignment_stack[start - 1].results().cumulative_afm
    };
    let start = match (start, seed) {
        (0, _) | (_, Some(_)) => start,
        (_, None) => {
            warn!(
                "layer {} has no cumulative affine, rechaining the whole stack",
                start - 1
            );
            0
        }
    };
    let chained = chain_cumulative(&afms[start..], seed.as_ref().filter(|_| start > 0));
    for (layer, c) in scale.alignment_stack[start..].iter_mut().zip(chained) {
        layer.results_mut().cumulative_afm = Some(c);
    }
    None
}

/// Store the bounding rectangle when the scale asks for one. A degenerate
/// cumulative affine leaves it unset.
pub fn update_bounding_rect(scale: &mut ScaleRecord, frame: Option<(usize, usize)>) {
    if !scale.use_bounding_rect {
        scale.bounding_rect = None;
        return;
    }
    let Some((w, h)) = frame else {
        warn!("no image size available, bounding rectangle left unset");
        scale.bounding_rect = None;
        return;
    };
    let cafms: Vec<Affine> = scale
        .alignment_stack
        .iter()
        .map(|l| l.results().cumulative_afm.unwrap_or_else(Affine::identity))
        .collect();
    scale.bounding_rect = match bounding_rect(&cafms, w, h) {
        Ok(rect) => Some(rect),
        Err(err) => {
            warn!("bounding rectangle not computed: {err}");
            None
        }
    };
}

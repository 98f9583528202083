//! Reference chain of a stack.
//!
//! Every non-skipped layer is aligned to the nearest earlier layer that is not
//! skipped. Layer 0 and skipped layers have no reference.

use super::LayerRecord;

/// Index of the layer `i` aligns to, if any.
pub fn reference_index(stack: &[LayerRecord], i: usize) -> Option<usize> {
    if i == 0 || i >= stack.len() || stack[i].skip {
        return None;
    }
    (0..i).rev().find(|&j| !stack[j].skip)
}

/// Rewrite every layer's `ref` image from the skip flags.
pub fn link_stack(stack: &mut [LayerRecord]) {
    for i in 0..stack.len() {
        let filename = reference_index(stack, i)
            .map(|j| stack[j].images.base.filename.clone())
            .unwrap_or_default();
        stack[i].images.reference.filename = filename;
    }
}

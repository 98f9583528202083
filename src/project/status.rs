//! Which scales are aligned and which one comes next.

use super::ProjectModel;
use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
pub struct ScaleStatus {
    pub factor: u32,
    /// Per layer: skipped or holding an affine.
    pub aligned: Vec<bool>,
}

impl ScaleStatus {
    /// Every layer aligned; an empty stack never counts as aligned.
    pub fn all_aligned(&self) -> bool {
        !self.aligned.is_empty() && self.aligned.iter().all(|&a| a)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ProjectStatus {
    /// Finest first.
    pub scales: Vec<ScaleStatus>,
    /// Smallest factor whose stack is completely aligned.
    pub finest_scale_done: Option<u32>,
    /// Largest factor whose stack is not yet aligned.
    pub scale_tbd: Option<u32>,
}

impl ProjectStatus {
    pub fn scale(&self, factor: u32) -> Option<&ScaleStatus> {
        self.scales.iter().find(|s| s.factor == factor)
    }

    pub fn is_aligned(&self, factor: u32) -> bool {
        self.scale(factor).is_some_and(ScaleStatus::all_aligned)
    }

    /// Next coarser defined factor above `factor`.
    pub fn coarser_than(&self, factor: u32) -> Option<u32> {
        self.scales
            .iter()
            .map(|s| s.factor)
            .filter(|&f| f > factor)
            .min()
    }
}

pub fn evaluate_status(project: &ProjectModel) -> ProjectStatus {
    let scales: Vec<ScaleStatus> = project
        .scale_factors()
        .into_iter()
        .filter_map(|factor| {
            let record = project.scale(factor)?;
            Some(ScaleStatus {
                factor,
                aligned: record
                    .alignment_stack
                    .iter()
                    .map(|layer| layer.is_aligned())
                    .collect(),
            })
        })
        .collect();
    let finest_scale_done = scales.iter().find(|s| s.all_aligned()).map(|s| s.factor);
    let scale_tbd = scales
        .iter()
        .rev()
        .find(|s| !s.all_aligned())
        .map(|s| s.factor);
    ProjectStatus {
        scales,
        finest_scale_done,
        scale_tbd,
    }
}

//! Error taxonomy shared by the matcher, solver, recipe and batch driver.
//!
//! Matcher and solver calls return these as values; the batch driver decides
//! per layer whether an error becomes a skip flag or aborts the request.

/// Errors raised by the alignment engine.
#[derive(Debug)]
pub enum AlignmentError {
    /// Affine matrix with a (near) zero determinant.
    DegenerateTransform { det: f64 },
    /// Not enough usable point correspondences for the requested solve.
    InsufficientCorrespondence {
        found: usize,
        required: usize,
        reason: &'static str,
    },
    /// A whole layer could not be aligned.
    LayerAlignmentFailure {
        layer: usize,
        cause: Box<AlignmentError>,
    },
    /// `refine_affine`/`apply_affine` requested without an aligned seed scale.
    ScaleClimbOrderViolation { scale: u32, reason: String },
    /// Request does not match the project (unknown scale, empty stack, ...).
    InvalidRequest(String),
    /// Image could not be loaded or does not fit the request.
    Image(String),
    /// A layer job panicked or ran past its deadline.
    JobFailed(String),
}

impl AlignmentError {
    /// Wrap an error raised while aligning `layer`.
    pub fn layer(layer: usize, cause: AlignmentError) -> Self {
        match cause {
            err @ AlignmentError::LayerAlignmentFailure { .. } => err,
            other => AlignmentError::LayerAlignmentFailure {
                layer,
                cause: Box::new(other),
            },
        }
    }
}

impl std::fmt::Display for AlignmentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlignmentError::DegenerateTransform { det } => {
                write!(f, "degenerate affine transform (det={det:.3e})")
            }
            AlignmentError::InsufficientCorrespondence {
                found,
                required,
                reason,
            } => write!(
                f,
                "insufficient correspondences ({found} usable, need {required}): {reason}"
            ),
            AlignmentError::LayerAlignmentFailure { layer, cause } => {
                write!(f, "layer {layer} could not be aligned: {cause}")
            }
            AlignmentError::ScaleClimbOrderViolation { scale, reason } => {
                write!(f, "cannot align scale_{scale}: {reason}")
            }
            AlignmentError::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
            AlignmentError::Image(msg) => write!(f, "image error: {msg}"),
            AlignmentError::JobFailed(msg) => write!(f, "layer job failed: {msg}"),
        }
    }
}

impl std::error::Error for AlignmentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AlignmentError::LayerAlignmentFailure { cause, .. } => Some(cause.as_ref()),
            _ => None,
        }
    }
}

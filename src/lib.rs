#![doc = include_str!("../README.md")]

// Public modules (stable-ish surface)
pub mod affine;
pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod error;
pub mod image;
pub mod project;

// Engine internals – public for tools and tests, expect churn.
pub mod bias;
pub mod mir;
pub mod recipe;
pub mod scales;
pub mod swim;

// --- High-level re-exports -------------------------------------------------

pub use crate::affine::{Affine, AffineParams};
pub use crate::config::AlignmentConfig;
pub use crate::diagnostics::BatchReport;
pub use crate::driver::{align_scale, AlignRequest};
pub use crate::error::AlignmentError;
pub use crate::project::ProjectModel;

// --- Prelude ---------------------------------------------------------------

/// Small prelude for scripts and tests.
///
/// ```no_run
/// use swim_align::prelude::*;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut project: ProjectModel =
///     swim_align::image::io::read_json_file(std::path::Path::new("project.json"))?;
/// let config = AlignmentConfig::default();
/// let report = align_scale(
///     &mut project,
///     &AlignRequest::default(),
///     &config,
///     &config.matcher(),
///     &FsImageSource::new(),
/// )?;
/// println!("aligned {} layers", report.aligned_count());
/// # Ok(())
/// # }
/// ```
pub mod prelude {
    pub use crate::image::{FsImageSource, ImageF32, ImageSource, MemoryImageSource};
    pub use crate::swim::{Matcher, SwimMatcher};
    pub use crate::{
        align_scale, Affine, AlignRequest, AlignmentConfig, AlignmentError, BatchReport,
        ProjectModel,
    };
}

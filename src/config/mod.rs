//! JSON configuration for the engine and the command-line tools.

pub mod align;
pub mod align_stack;
pub mod generate_scales;

pub use align::AlignmentConfig;

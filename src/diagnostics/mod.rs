//! Reports returned by the batch driver and consumed by the command-line
//! tools. Everything serializes to camelCase JSON.

pub mod batch;
pub mod timing;

pub use batch::{BatchReport, LayerOutcome, LayerStatus};
pub use timing::{StageTiming, TimingBreakdown};

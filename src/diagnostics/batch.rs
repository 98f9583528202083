use super::timing::TimingBreakdown;
use crate::project::AlignmentOption;
use crate::recipe::IngredientReport;
use serde::Serialize;

/// What happened to one layer of a batch.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LayerStatus {
    Aligned,
    /// Not dispatched (skip flag set, or first layer of the stack).
    Skipped { reason: String },
    /// Dispatched but failed; the layer is now marked skip.
    Failed { reason: String },
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerOutcome {
    pub index: usize,
    #[serde(flatten)]
    pub status: LayerStatus,
    pub attempts: usize,
    pub elapsed_ms: f64,
    pub snr_mean: Option<f64>,
    pub snr_report: String,
    pub ingredients: Vec<IngredientReport>,
}

impl LayerOutcome {
    pub fn not_dispatched(index: usize, reason: impl Into<String>) -> Self {
        Self {
            index,
            status: LayerStatus::Skipped {
                reason: reason.into(),
            },
            attempts: 0,
            elapsed_ms: 0.0,
            snr_mean: None,
            snr_report: "SNR: --".to_string(),
            ingredients: Vec::new(),
        }
    }
}

/// Summary of one `align_scale` call.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub scale: u32,
    pub alignment_option: AlignmentOption,
    pub seed_scale: Option<u32>,
    pub upscale_factor: Option<f64>,
    pub start_layer: usize,
    /// Exclusive.
    pub end_layer: usize,
    pub layers: Vec<LayerOutcome>,
    pub bias_nulled: bool,
    pub bounding_rect: Option<[i64; 4]>,
    pub timing: TimingBreakdown,
}

impl BatchReport {
    pub fn layer(&self, index: usize) -> Option<&LayerOutcome> {
        self.layers.iter().find(|l| l.index == index)
    }

    pub fn aligned_count(&self) -> usize {
        self.count(|s| matches!(s, LayerStatus::Aligned))
    }

    pub fn failed_count(&self) -> usize {
        self.count(|s| matches!(s, LayerStatus::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&LayerStatus) -> bool) -> usize {
        self.layers.iter().filter(|l| pred(&l.status)).count()
    }
}

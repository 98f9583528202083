use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Wall time of one named stage of a batch.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTiming {
    pub label: String,
    pub elapsed_ms: f64,
}

impl StageTiming {
    pub fn new(label: impl Into<String>, elapsed_ms: f64) -> Self {
        Self {
            label: label.into(),
            elapsed_ms,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingBreakdown {
    pub total_ms: f64,
    pub stages: Vec<StageTiming>,
}

impl TimingBreakdown {
    pub fn with_total(total_ms: f64) -> Self {
        Self {
            total_ms,
            stages: Vec::new(),
        }
    }

    pub fn push(&mut self, label: impl Into<String>, elapsed_ms: f64) {
        self.stages.push(StageTiming::new(label, elapsed_ms));
    }

    /// Record the time since `since` under `label`.
    pub fn push_since(&mut self, label: impl Into<String>, since: Instant) {
        self.push(label, elapsed_ms(since));
    }
}

pub fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_camel_case() {
        let mut t = TimingBreakdown::with_total(3.5);
        t.push("dispatch", 2.0);
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["totalMs"], 3.5);
        assert_eq!(json["stages"][0]["elapsedMs"], 2.0);
        assert_eq!(json["stages"][0]["label"], "dispatch");
    }
}

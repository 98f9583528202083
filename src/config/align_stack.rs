use super::align::AlignmentConfig;
use crate::driver::AlignRequest;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
pub struct AlignStackConfig {
    /// Project JSON to align.
    pub project: PathBuf,
    /// Base directory for relative image names in the project.
    #[serde(default)]
    pub image_root: Option<PathBuf>,
    #[serde(default)]
    pub request: AlignRequest,
    #[serde(default)]
    pub alignment: AlignmentConfig,
    #[serde(default)]
    pub output: AlignStackOutputConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AlignStackOutputConfig {
    /// Where to write the updated project; the input is overwritten if unset.
    pub project: Option<PathBuf>,
    pub report_json: Option<PathBuf>,
    /// Directory for the per-parameter bias analysis `.dat` files.
    pub bias_analysis_dir: Option<PathBuf>,
}

impl AlignStackConfig {
    pub fn output_project(&self) -> &Path {
        self.output.project.as_deref().unwrap_or(&self.project)
    }
}

pub fn load_config(path: &Path) -> Result<AlignStackConfig, String> {
    let data = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config {}: {e}", path.display()))?;
    serde_json::from_str(&data)
        .map_err(|e| format!("Failed to parse config {}: {e}", path.display()))
}

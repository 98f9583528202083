use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: [&str; 5] = ["tif", "tiff", "png", "jpg", "jpeg"];

#[derive(Debug, Deserialize)]
pub struct GenerateScalesConfig {
    pub source_dir: PathBuf,
    /// File names inside `source_dir`, in stack order. All images in the
    /// directory, sorted by name, when empty.
    #[serde(default)]
    pub images: Vec<String>,
    pub destination: PathBuf,
    #[serde(default = "default_factors")]
    pub factors: Vec<u32>,
    /// Defaults to `<destination>/project.json`.
    #[serde(default)]
    pub project_out: Option<PathBuf>,
}

fn default_factors() -> Vec<u32> {
    vec![1, 2, 4]
}

impl GenerateScalesConfig {
    pub fn project_path(&self) -> PathBuf {
        self.project_out
            .clone()
            .unwrap_or_else(|| self.destination.join("project.json"))
    }

    /// Stack images in order.
    pub fn resolve_images(&self) -> Result<Vec<String>, String> {
        if !self.images.is_empty() {
            return Ok(self.images.clone());
        }
        let entries = fs::read_dir(&self.source_dir)
            .map_err(|e| format!("Failed to list {}: {e}", self.source_dir.display()))?;
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            })
            .filter_map(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        names.sort();
        if names.is_empty() {
            return Err(format!("No images found in {}", self.source_dir.display()));
        }
        Ok(names)
    }
}

pub fn load_config(path: &Path) -> Result<GenerateScalesConfig, String> {
    let data = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config {}: {e}", path.display()))?;
    serde_json::from_str(&data)
        .map_err(|e| format!("Failed to parse config {}: {e}", path.display()))
}

//! Where the batch driver gets its rasters from.

use super::io::load_grayscale_f32;
use super::ImageF32;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Read-only image provider shared by concurrent layer jobs.
pub trait ImageSource: Sync {
    fn load(&self, filename: &str) -> Result<Arc<ImageF32>, String>;
}

/// Loads images from disk; relative names resolve against `root`.
#[derive(Clone, Debug, Default)]
pub struct FsImageSource {
    root: Option<PathBuf>,
}

impl FsImageSource {
    pub fn new() -> Self {
        Self { root: None }
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, filename: &str) -> PathBuf {
        let path = Path::new(filename);
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl ImageSource for FsImageSource {
    fn load(&self, filename: &str) -> Result<Arc<ImageF32>, String> {
        load_grayscale_f32(&self.resolve(filename)).map(Arc::new)
    }
}

/// In-memory images keyed by filename.
#[derive(Clone, Debug, Default)]
pub struct MemoryImageSource {
    images: HashMap<String, Arc<ImageF32>>,
}

impl MemoryImageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, filename: impl Into<String>, image: ImageF32) {
        self.images.insert(filename.into(), Arc::new(image));
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

impl ImageSource for MemoryImageSource {
    fn load(&self, filename: &str) -> Result<Arc<ImageF32>, String> {
        self.images
            .get(filename)
            .cloned()
            .ok_or_else(|| format!("No image named {filename}"))
    }
}

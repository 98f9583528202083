//! Per-scale images for coarse-to-fine alignment.
//!
//! Scale `N` is the source image decimated by the integer factor `N` with a
//! box (area) average. Blocks that run past the right or bottom edge average
//! only the pixels that exist, so the output size is `ceil(w / N) × ceil(h / N)`.

use crate::error::AlignmentError;
use crate::image::{ImageF32, ImageView, ImageViewMut};
use crate::project::scale_key;
use std::path::{Path, PathBuf};

/// Area-average decimation by `factor`. A factor of 1 (or 0) copies the image.
pub fn downsample(image: &ImageF32, factor: u32) -> ImageF32 {
    let f = factor.max(1) as usize;
    if f == 1 {
        return image.clone();
    }
    let (nw, nh) = (image.w.div_ceil(f), image.h.div_ceil(f));
    let mut out = ImageF32::new(nw, nh);
    for y in 0..nh {
        let (y0, y1) = (y * f, ((y + 1) * f).min(image.h));
        let dst = out.row_mut(y);
        for (x, px) in dst.iter_mut().enumerate() {
            let (x0, x1) = (x * f, ((x + 1) * f).min(image.w));
            let sum: f64 = (y0..y1)
                .map(|sy| image.row(sy)[x0..x1].iter().map(|&v| v as f64).sum::<f64>())
                .sum();
            *px = (sum / ((y1 - y0) * (x1 - x0)) as f64) as f32;
        }
    }
    out
}

#[derive(Clone, Debug)]
pub struct ScaleImage {
    pub factor: u32,
    pub image: ImageF32,
}

/// One image at several scales, finest first.
#[derive(Clone, Debug)]
pub struct ScaleSet {
    pub levels: Vec<ScaleImage>,
}

impl ScaleSet {
    pub fn build(image: &ImageF32, factors: &[u32]) -> Result<Self, AlignmentError> {
        if factors.contains(&0) {
            return Err(AlignmentError::InvalidRequest(
                "scale factors must be positive".to_string(),
            ));
        }
        let mut sorted = factors.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        let levels = sorted
            .into_iter()
            .map(|factor| ScaleImage {
                factor,
                image: downsample(image, factor),
            })
            .collect();
        Ok(Self { levels })
    }

    pub fn get(&self, factor: u32) -> Option<&ImageF32> {
        self.levels
            .iter()
            .find(|l| l.factor == factor)
            .map(|l| &l.image)
    }

    pub fn factors(&self) -> Vec<u32> {
        self.levels.iter().map(|l| l.factor).collect()
    }
}

/// `<destination>/scale_N/img_src/<filename>`.
pub fn scale_image_path(destination: &Path, factor: u32, filename: &str) -> PathBuf {
    destination
        .join(scale_key(factor))
        .join("img_src")
        .join(filename)
}

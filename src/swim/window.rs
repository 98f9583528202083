//! Patch extraction for windowed matching.
//!
//! Patch pixel `(u, v)` of a `w × h` window centred on `c` samples the source
//! image at `c + L · (u - w/2, v - h/2)`, where `L` is the 2×2 linear part of
//! the current affine (identity for stationary windows). Samples outside the
//! source take the supplied fill value.

use crate::image::ImageF32;
use log::debug;
use nalgebra::Matrix2;
use serde::{Deserialize, Serialize};

/// Window dimensions in pixels; always even and at least 2.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSize {
    pub w: usize,
    pub h: usize,
}

impl WindowSize {
    /// Round fractional sizes up to the next even integer.
    pub fn new(w: f64, h: f64) -> Self {
        Self {
            w: round_up_even(w),
            h: round_up_even(h),
        }
    }

    pub fn square(side: f64) -> Self {
        Self::new(side, side)
    }

    pub fn area(&self) -> usize {
        self.w * self.h
    }
}

fn round_up_even(v: f64) -> usize {
    if !v.is_finite() || v <= 2.0 {
        return 2;
    }
    let n = v.ceil() as usize;
    n + (n & 1)
}

/// Row-major patch of `f64` samples.
#[derive(Clone, Debug)]
pub struct Patch {
    pub w: usize,
    pub h: usize,
    pub data: Vec<f64>,
    /// Fraction of samples that fell outside the source image.
    pub outside: f64,
}

impl Patch {
    pub fn mean(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().sum::<f64>() / self.data.len() as f64
    }
}

/// Sample a window around `center` through `linear`.
pub fn extract_patch(
    image: &ImageF32,
    center: [f64; 2],
    window: WindowSize,
    linear: &Matrix2<f64>,
    fill: f64,
) -> Patch {
    let (hw, hh) = (window.w as f64 / 2.0, window.h as f64 / 2.0);
    let mut data = Vec::with_capacity(window.area());
    let mut outside = 0usize;
    for v in 0..window.h {
        let oy = v as f64 - hh;
        for u in 0..window.w {
            let ox = u as f64 - hw;
            let x = center[0] + linear[(0, 0)] * ox + linear[(0, 1)] * oy;
            let y = center[1] + linear[(1, 0)] * ox + linear[(1, 1)] * oy;
            match image.sample_bilinear(x, y) {
                Some(val) => data.push(val),
                None => {
                    outside += 1;
                    data.push(fill);
                }
            }
        }
    }
    let outside = outside as f64 / window.area().max(1) as f64;
    if outside > 0.5 {
        debug!(
            "window at ({:.1}, {:.1}) is {:.0}% outside the image",
            center[0],
            center[1],
            outside * 100.0
        );
    }
    Patch {
        w: window.w,
        h: window.h,
        data,
        outside,
    }
}

/// Fade the outer quarter on each side to the patch mean with a cosine ramp.
pub fn apodize(patch: &mut Patch) {
    let gray = patch.mean();
    let wx = fade_profile(patch.w);
    let wy = fade_profile(patch.h);
    for (v, fy) in wy.iter().enumerate() {
        let row = &mut patch.data[v * patch.w..(v + 1) * patch.w];
        for (px, fx) in row.iter_mut().zip(&wx) {
            *px = gray + fx * fy * (*px - gray);
        }
    }
}

fn fade_profile(n: usize) -> Vec<f64> {
    if n < 2 {
        return vec![1.0; n];
    }
    (0..n)
        .map(|i| {
            let t = -1.0 + 2.0 * i as f64 / (n - 1) as f64;
            if t.abs() > 0.5 {
                0.5 - 0.5 * (2.0 * std::f64::consts::PI * t).cos()
            } else {
                1.0
            }
        })
        .collect()
}

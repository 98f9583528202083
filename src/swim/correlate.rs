//! Whitened FFT cross-correlation of equally sized patches.
//!
//! The cross-power spectrum `conj(F_sta) · F_mov` is multiplied by its own
//! magnitude raised to the whitening exponent before the inverse transform.
//! An exponent of `-1` is pure phase correlation, `0` plain correlation; the
//! usual negative values in between flatten the spectrum and suppress slow
//! illumination gradients. The correlogram peaks at the displacement `d` for
//! which `mov(u) ≈ sta(u - d)`.

use super::window::Patch;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Added to `|R|²` so that the power law stays finite at empty frequencies.
const POWER_FLOOR: f64 = 1e-40;

/// Peak location and quality of one correlation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PeakEstimate {
    /// Displacement of the moving patch content, in patch pixels.
    pub offset: [f64; 2],
    /// `(peak - mean) / std` of the correlogram; 0 when degenerate.
    pub snr: f64,
}

impl PeakEstimate {
    pub fn degenerate() -> Self {
        Self {
            offset: [0.0, 0.0],
            snr: 0.0,
        }
    }
}

/// Cached FFT plans for one patch size.
pub struct Correlator {
    w: usize,
    h: usize,
    forward_w: Arc<dyn Fft<f64>>,
    forward_h: Arc<dyn Fft<f64>>,
    inverse_w: Arc<dyn Fft<f64>>,
    inverse_h: Arc<dyn Fft<f64>>,
}

impl Correlator {
    pub fn new(w: usize, h: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            w,
            h,
            forward_w: planner.plan_fft_forward(w),
            forward_h: planner.plan_fft_forward(h),
            inverse_w: planner.plan_fft_inverse(w),
            inverse_h: planner.plan_fft_inverse(h),
        }
    }

    /// Forward spectrum of a zero-mean copy of `patch`.
    pub fn spectrum(&self, patch: &Patch) -> Vec<Complex<f64>> {
        debug_assert_eq!(patch.data.len(), self.w * self.h);
        let mean = patch.mean();
        let mut data: Vec<Complex<f64>> = patch
            .data
            .iter()
            .map(|&v| Complex::new(v - mean, 0.0))
            .collect();
        self.fft_2d(&mut data, false);
        data
    }

    /// Correlogram (real, row-major `w × h`) of two spectra.
    pub fn correlate(
        &self,
        sta: &[Complex<f64>],
        mov: &[Complex<f64>],
        whitening: f64,
    ) -> Vec<f64> {
        let mut prod: Vec<Complex<f64>> = sta
            .iter()
            .zip(mov)
            .map(|(&s, &m)| {
                let r = s.conj() * m;
                let power = r.norm_sqr() + POWER_FLOOR;
                r * power.powf(0.5 * whitening)
            })
            .collect();
        self.fft_2d(&mut prod, true);
        prod.iter().map(|c| c.re).collect()
    }

    /// Locate the correlogram peak and refine it to sub-pixel precision with a
    /// centre of mass over the part of the peak above half its height, inside
    /// a `(2·radius + 1)²` neighbourhood taken with wraparound.
    pub fn find_peak(&self, corr: &[f64], radius: usize) -> PeakEstimate {
        let (w, h) = (self.w, self.h);
        let n = corr.len();
        if n == 0 {
            return PeakEstimate::degenerate();
        }
        let mean = corr.iter().sum::<f64>() / n as f64;
        let var = corr.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
        let std = var.sqrt();

        let (imax, peak) = corr
            .iter()
            .copied()
            .enumerate()
            .fold((0usize, f64::NEG_INFINITY), |best, (i, v)| {
                if v > best.1 {
                    (i, v)
                } else {
                    best
                }
            });
        if !std.is_finite() || !peak.is_finite() || std <= 1e-12 * (peak.abs() + 1.0) {
            return PeakEstimate::degenerate();
        }
        let (px, py) = (imax % w, imax / w);

        let r = radius.min((w.min(h).saturating_sub(1)) / 2) as isize;
        let threshold = mean + 0.5 * (peak - mean);
        let (mut sw, mut sx, mut sy) = (0.0, 0.0, 0.0);
        for dy in -r..=r {
            let yy = wrap(py as isize + dy, h);
            for dx in -r..=r {
                let xx = wrap(px as isize + dx, w);
                let wgt = corr[yy * w + xx] - threshold;
                if wgt > 0.0 {
                    sw += wgt;
                    sx += wgt * dx as f64;
                    sy += wgt * dy as f64;
                }
            }
        }
        let (cx, cy) = if sw > 0.0 {
            (sx / sw, sy / sw)
        } else {
            (0.0, 0.0)
        };

        PeakEstimate {
            offset: [fold(px, w) + cx, fold(py, h) + cy],
            snr: (peak - mean) / std,
        }
    }

    fn fft_2d(&self, data: &mut Vec<Complex<f64>>, inverse: bool) {
        let (row_fft, col_fft) = if inverse {
            (&self.inverse_w, &self.inverse_h)
        } else {
            (&self.forward_w, &self.forward_h)
        };
        // Rows are contiguous chunks of length w.
        row_fft.process(data);
        let mut transposed = transpose(data, self.w, self.h);
        col_fft.process(&mut transposed);
        *data = transpose(&transposed, self.h, self.w);
    }
}

/// Transpose a row-major `w × h` buffer into a row-major `h × w` buffer.
fn transpose(data: &[Complex<f64>], w: usize, h: usize) -> Vec<Complex<f64>> {
    let mut out = vec![Complex::new(0.0, 0.0); data.len()];
    for y in 0..h {
        for x in 0..w {
            out[x * h + y] = data[y * w + x];
        }
    }
    out
}

#[inline]
fn wrap(i: isize, n: usize) -> usize {
    i.rem_euclid(n as isize) as usize
}

/// Map an FFT index to a signed displacement.
#[inline]
fn fold(i: usize, n: usize) -> f64 {
    if i > n / 2 {
        i as f64 - n as f64
    } else {
        i as f64
    }
}

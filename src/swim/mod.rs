//! Windowed correlation matcher.
//!
//! [`Matcher`] is the seam between the recipe machinery and whatever backend
//! estimates window offsets. [`SwimMatcher`] is the in-process implementation:
//!
//! 1. stationary windows are cut around `psta`, apodized and transformed once;
//! 2. moving windows are resampled around `pmov = afm(psta)` through the
//!    affine's linear part;
//! 3. each pair is correlated, the peak offset is mapped back into moving
//!    image coordinates and added to `pmov`;
//! 4. the affine is refitted from `(psta, pmov)` and the loop repeats.

pub mod correlate;
pub mod window;

use crate::affine::Affine;
use crate::error::AlignmentError;
use crate::image::ImageF32;
use crate::mir;
use correlate::{Correlator, PeakEstimate};
use log::debug;
use nalgebra::Matrix2;
use window::{apodize, extract_patch};

pub use window::WindowSize;

/// One matching request over a set of sample windows.
#[derive(Clone, Debug)]
pub struct MatchRequest<'a> {
    /// Window centres in the stationary image.
    pub psta: &'a [[f64; 2]],
    pub window: WindowSize,
    /// Correlate/refit rounds (at least one is run).
    pub iterations: usize,
    pub whitening: f64,
    /// Starting stationary → moving affine.
    pub initial: Affine,
    /// Outlier rejection for the refit, see [`mir::solve_iterative`].
    pub rms_threshold: f64,
    pub min_points: usize,
}

/// Matching result.
#[derive(Clone, Debug)]
pub struct MatchOutcome {
    /// Refined moving-image positions of the window centres.
    pub pmov: Vec<[f64; 2]>,
    /// Per-window peak SNR from the last round.
    pub snr: Vec<f64>,
    /// Refitted stationary → moving affine.
    pub affine: Affine,
    /// Correction relative to the initial affine: `affine = delta · initial`.
    pub delta: Affine,
}

/// Estimates window correspondences between two images.
pub trait Matcher: Sync {
    fn match_windows(
        &self,
        sta: &ImageF32,
        mov: &ImageF32,
        request: &MatchRequest<'_>,
    ) -> Result<MatchOutcome, AlignmentError>;
}

/// FFT-based whitened correlation matcher.
#[derive(Clone, Copy, Debug)]
pub struct SwimMatcher {
    /// Neighbourhood radius for the sub-pixel centre of mass.
    pub peak_radius: usize,
}

impl Default for SwimMatcher {
    fn default() -> Self {
        Self { peak_radius: 5 }
    }
}

impl SwimMatcher {
    pub fn new(peak_radius: usize) -> Self {
        Self { peak_radius }
    }
}

impl Matcher for SwimMatcher {
    fn match_windows(
        &self,
        sta: &ImageF32,
        mov: &ImageF32,
        request: &MatchRequest<'_>,
    ) -> Result<MatchOutcome, AlignmentError> {
        let psta = request.psta;
        if psta.is_empty() {
            return Err(AlignmentError::InsufficientCorrespondence {
                found: 0,
                required: 1,
                reason: "no sample windows",
            });
        }
        let initial_inv = request.initial.invert()?;
        let window = request.window;
        let correlator = Correlator::new(window.w, window.h);
        let (sta_fill, mov_fill) = (sta.mean(), mov.mean());

        let identity = Matrix2::identity();
        let sta_spectra: Vec<_> = psta
            .iter()
            .map(|&p| {
                let mut patch = extract_patch(sta, p, window, &identity, sta_fill);
                apodize(&mut patch);
                correlator.spectrum(&patch)
            })
            .collect();

        let mut afm = request.initial;
        let mut pmov = afm.apply_to_points(psta);
        let mut snr = vec![0.0; psta.len()];
        for round in 0..request.iterations.max(1) {
            let linear = afm.linear_part();
            for (k, sta_spec) in sta_spectra.iter().enumerate() {
                let patch = extract_patch(mov, pmov[k], window, &linear, mov_fill);
                let estimate = if patch.outside >= 1.0 {
                    PeakEstimate::degenerate()
                } else {
                    let corr = correlator.correlate(
                        sta_spec,
                        &correlator.spectrum(&patch),
                        request.whitening,
                    );
                    correlator.find_peak(&corr, self.peak_radius)
                };
                let d = afm.apply_linear(estimate.offset);
                pmov[k] = [pmov[k][0] + d[0], pmov[k][1] + d[1]];
                snr[k] = estimate.snr;
            }
            afm = refit(&afm, psta, &pmov, request)?;
            pmov = afm.apply_to_points(psta);
            debug!(
                "swim round {}: {} windows {}x{}, afm {:?}",
                round + 1,
                psta.len(),
                window.w,
                window.h,
                afm.rows()
            );
        }

        let delta = afm.compose(&initial_inv);
        Ok(MatchOutcome {
            pmov,
            snr,
            affine: afm,
            delta,
        })
    }
}

/// Refit the affine from refined correspondences. A single window only moves
/// the translation and keeps the current shape.
fn refit(
    afm: &Affine,
    psta: &[[f64; 2]],
    pmov: &[[f64; 2]],
    request: &MatchRequest<'_>,
) -> Result<Affine, AlignmentError> {
    if psta.len() == 1 {
        let cur = afm.apply(psta[0]);
        return Ok(afm.shifted(pmov[0][0] - cur[0], pmov[0][1] - cur[1]));
    }
    let fit = mir::solve_iterative(psta, pmov, request.rms_threshold, request.min_points)?;
    Ok(fit.solution.forward)
}

/// Summary line for a set of per-window SNR values:
/// `SNR: mean (+-std n:count)  <min  max>`.
pub fn snr_report(snr: &[f64]) -> String {
    if snr.is_empty() {
        return "SNR: --".to_string();
    }
    let n = snr.len() as f64;
    let mean = snr.iter().sum::<f64>() / n;
    let std = (snr.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
    let min = snr.iter().copied().fold(f64::INFINITY, f64::min);
    let max = snr.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    format!(
        "SNR: {mean:.1} (+-{std:.1} n:{})  <{min:.1}  {max:.1}>",
        snr.len()
    )
}

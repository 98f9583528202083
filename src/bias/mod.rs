//! Stack-wide drift ("bias") removal.
//!
//! Cumulative affines are decomposed into six parameters, each parameter is
//! fitted with a polynomial over the layer index, and the stack is rebuilt
//! with a per-layer correction that cancels the fitted slope. The constant
//! terms of the first fit define an initial correction applied to layer 0.
//!
//! Typical use:
//! ```
//! use swim_align::affine::Affine;
//! use swim_align::bias::null_bias;
//!
//! let afms: Vec<Affine> = (0..20).map(|i| Affine::translation(0.5, 0.01 * i as f64)).collect();
//! let corrected = null_bias(&afms, 4, 2).unwrap();
//! assert_eq!(corrected.cumulative.len(), afms.len());
//! ```

pub mod poly;
pub mod report;

use crate::affine::{Affine, AffineParams};
use crate::error::AlignmentError;
use log::debug;
use serde::Serialize;

pub use poly::{IndexAxis, Polynomial};

/// Decomposed affine parameter that gets its own trend polynomial.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BiasParam {
    SkewX,
    ScaleX,
    ScaleY,
    Rot,
    X,
    Y,
}

impl BiasParam {
    pub const ALL: [BiasParam; 6] = [
        BiasParam::SkewX,
        BiasParam::ScaleX,
        BiasParam::ScaleY,
        BiasParam::Rot,
        BiasParam::X,
        BiasParam::Y,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BiasParam::SkewX => "skew_x",
            BiasParam::ScaleX => "scale_x",
            BiasParam::ScaleY => "scale_y",
            BiasParam::Rot => "rot",
            BiasParam::X => "x",
            BiasParam::Y => "y",
        }
    }

    pub fn of(self, p: &AffineParams) -> f64 {
        match self {
            BiasParam::SkewX => p.skew_x,
            BiasParam::ScaleX => p.scale_x,
            BiasParam::ScaleY => p.scale_y,
            BiasParam::Rot => p.rot,
            BiasParam::X => p.tx,
            BiasParam::Y => p.ty,
        }
    }
}

/// Fitted trend of one parameter.
#[derive(Clone, Debug, Serialize)]
pub struct ParamTrend {
    pub param: BiasParam,
    pub trend: Polynomial,
    /// Value of the first fit at index 0.
    pub origin: f64,
}

/// Six trend polynomials, in [`BiasParam::ALL`] order.
#[derive(Clone, Debug, Serialize)]
pub struct BiasFuncs {
    pub trends: Vec<ParamTrend>,
}

impl BiasFuncs {
    /// Fit every parameter with a polynomial of degree `order`.
    pub fn fit(params: &[AffineParams], order: usize) -> Self {
        let axis = IndexAxis::for_len(params.len());
        let trends = BiasParam::ALL
            .iter()
            .map(|&param| {
                let ys: Vec<f64> = params.iter().map(|p| param.of(p)).collect();
                let trend = Polynomial::fit(axis, &ys, order);
                let origin = trend.eval(0.0);
                ParamTrend {
                    param,
                    trend,
                    origin,
                }
            })
            .collect();
        Self { trends }
    }

    /// Trends that are flat zero, with the identity as origin.
    pub fn zero(n: usize) -> Self {
        let axis = IndexAxis::for_len(n);
        let trends = BiasParam::ALL
            .iter()
            .map(|&param| ParamTrend {
                param,
                trend: Polynomial::zero(axis),
                origin: match param {
                    BiasParam::ScaleX | BiasParam::ScaleY => 1.0,
                    _ => 0.0,
                },
            })
            .collect();
        Self { trends }
    }

    /// Add the trends of a later refit. Origins stay those of the first fit.
    pub fn accumulate(&mut self, refit: &BiasFuncs) {
        for (mine, theirs) in self.trends.iter_mut().zip(&refit.trends) {
            mine.trend.accumulate(&theirs.trend);
        }
    }

    pub fn trend(&self, param: BiasParam) -> &ParamTrend {
        // trends are always built in ALL order
        &self.trends[param as usize]
    }

    fn slope(&self, param: BiasParam, i: usize) -> f64 {
        self.trend(param).trend.derivative(i as f64)
    }

    /// Correction that cancels the fitted per-layer drift at index `i`.
    pub fn bias_matrix(&self, i: usize) -> Affine {
        Affine::from_params(&AffineParams {
            tx: -self.slope(BiasParam::X, i),
            ty: -self.slope(BiasParam::Y, i),
            rot: -self.slope(BiasParam::Rot, i),
            scale_x: 1.0 - self.slope(BiasParam::ScaleX, i),
            scale_y: 1.0 - self.slope(BiasParam::ScaleY, i),
            skew_x: -self.slope(BiasParam::SkewX, i),
        })
    }

    /// Correction that moves the fitted origin back to the identity.
    pub fn init_matrix(&self) -> Result<Affine, AlignmentError> {
        let origin = |p: BiasParam| self.trend(p).origin;
        let (sx, sy) = (origin(BiasParam::ScaleX), origin(BiasParam::ScaleY));
        if sx.abs() <= f64::EPSILON || sy.abs() <= f64::EPSILON {
            return Err(AlignmentError::DegenerateTransform { det: sx * sy });
        }
        Ok(Affine::from_params(&AffineParams {
            tx: -origin(BiasParam::X),
            ty: -origin(BiasParam::Y),
            rot: -origin(BiasParam::Rot),
            scale_x: 1.0 / sx,
            scale_y: 1.0 / sy,
            skew_x: -origin(BiasParam::SkewX),
        }))
    }
}

/// Result of [`null_bias`].
#[derive(Clone, Debug)]
pub struct BiasCorrection {
    /// Corrected cumulative affines, one per input layer.
    pub cumulative: Vec<Affine>,
    pub funcs: BiasFuncs,
    pub init: Affine,
}

/// Compose per-layer affines into cumulative ones: `c[i] = afm[i] · c[i-1]`.
/// `seed` is the cumulative affine of the layer preceding `afms[0]`.
pub fn chain_cumulative(afms: &[Affine], seed: Option<&Affine>) -> Vec<Affine> {
    let mut out = Vec::with_capacity(afms.len());
    let mut prev = seed.copied().unwrap_or_else(Affine::identity);
    for afm in afms {
        prev = afm.compose(&prev);
        out.push(prev);
    }
    out
}

/// Inverse of [`chain_cumulative`] without a seed.
pub fn layer_affines_from_cumulative(cafms: &[Affine]) -> Result<Vec<Affine>, AlignmentError> {
    let mut out = Vec::with_capacity(cafms.len());
    for (i, c) in cafms.iter().enumerate() {
        if i == 0 {
            out.push(*c);
        } else {
            out.push(c.compose(&cafms[i - 1].invert()?));
        }
    }
    Ok(out)
}

pub fn decompose_stack(cafms: &[Affine]) -> Result<Vec<AffineParams>, AlignmentError> {
    cafms.iter().map(Affine::decompose).collect()
}

fn corrected_chain(afms: &[Affine], funcs: &BiasFuncs, init: &Affine) -> Vec<Affine> {
    let mut out = Vec::with_capacity(afms.len());
    for (i, afm) in afms.iter().enumerate() {
        let c = match out.last() {
            None => afm.compose(init),
            Some(prev) => funcs.bias_matrix(i).compose(&afm.compose(prev)),
        };
        out.push(c);
    }
    out
}

/// Remove polynomial drift from a stack of per-layer affines.
///
/// With `iterations == 0` the raw cumulative chain is returned unchanged.
/// Every later iteration refits the corrected stack and adds its residual
/// trend to the bias functions before rebuilding from the raw affines.
pub fn null_bias(
    afms: &[Affine],
    poly_order: usize,
    iterations: usize,
) -> Result<BiasCorrection, AlignmentError> {
    let raw = chain_cumulative(afms, None);
    if iterations == 0 || afms.is_empty() {
        return Ok(BiasCorrection {
            cumulative: raw,
            funcs: BiasFuncs::zero(afms.len()),
            init: Affine::identity(),
        });
    }

    let mut funcs = BiasFuncs::fit(&decompose_stack(&raw)?, poly_order);
    let init = funcs.init_matrix()?;
    let mut cumulative = corrected_chain(afms, &funcs, &init);
    for iteration in 1..iterations {
        let refit = BiasFuncs::fit(&decompose_stack(&cumulative)?, poly_order);
        funcs.accumulate(&refit);
        cumulative = corrected_chain(afms, &funcs, &init);
        debug!(
            "bias iteration {}: residual x slope {:.3e}, y slope {:.3e}",
            iteration + 1,
            refit.trend(BiasParam::X).trend.derivative(0.0),
            refit.trend(BiasParam::Y).trend.derivative(0.0)
        );
    }
    Ok(BiasCorrection {
        cumulative,
        funcs,
        init,
    })
}

/// Output rectangle `[x, y, w, h]` that contains every layer of a `w × h`
/// stack after resampling through its cumulative affine, as a symmetric
/// border around the original frame.
pub fn bounding_rect(cafms: &[Affine], w: usize, h: usize) -> Result<[i64; 4], AlignmentError> {
    let mut border = 0.0f64;
    for c in cafms {
        let [x0, y0, x1, y1] = c.model_bounds(w, h)?;
        border = border
            .max(-x0)
            .max(-y0)
            .max(x1 - w as f64)
            .max(y1 - h as f64);
    }
    let b = border.ceil() as i64;
    Ok([-b, -b, w as i64 + 2 * b, h as i64 + 2 * b])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slope(ys: &[f64]) -> f64 {
        let n = ys.len() as f64;
        let mx = (n - 1.0) / 2.0;
        let my = ys.iter().sum::<f64>() / n;
        let (mut sxy, mut sxx) = (0.0, 0.0);
        for (i, y) in ys.iter().enumerate() {
            let dx = i as f64 - mx;
            sxy += dx * (y - my);
            sxx += dx * dx;
        }
        sxy / sxx
    }

    fn drifting_stack(n: usize) -> Vec<Affine> {
        (0..n)
            .map(|i| {
                if i == 0 {
                    return Affine::identity();
                }
                let f = i as f64;
                Affine::from_params(&AffineParams {
                    tx: 0.5 + 0.05 * (1.3 * f).sin(),
                    ty: -0.2 + 0.05 * (0.7 * f).cos(),
                    rot: 0.0005,
                    scale_x: 1.0,
                    scale_y: 1.0,
                    skew_x: 0.0,
                })
            })
            .collect()
    }

    #[test]
    fn chain_composes_in_layer_order() {
        let afms = [
            Affine::identity(),
            Affine::translation(1.0, 0.0),
            Affine::translation(0.0, 2.0),
        ];
        let c = chain_cumulative(&afms, None);
        assert_eq!(c[2], Affine::translation(1.0, 2.0));
        let seeded = chain_cumulative(&afms[1..], Some(&Affine::translation(5.0, 5.0)));
        assert_eq!(seeded[1], Affine::translation(6.0, 7.0));
        let back = layer_affines_from_cumulative(&c).unwrap();
        for (a, b) in back.iter().zip(&afms) {
            assert!(a.max_abs_diff(b) < 1e-12);
        }
    }

    #[test]
    fn nulling_removes_translation_and_rotation_drift() {
        let afms = drifting_stack(40);
        let raw = decompose_stack(&chain_cumulative(&afms, None)).unwrap();
        let raw_x: Vec<f64> = raw.iter().map(|p| p.tx).collect();
        assert!(slope(&raw_x) > 0.4);

        let corrected = null_bias(&afms, 4, 2).unwrap();
        let params = decompose_stack(&corrected.cumulative).unwrap();
        for param in [BiasParam::X, BiasParam::Y] {
            let ys: Vec<f64> = params.iter().map(|p| param.of(p)).collect();
            assert!(slope(&ys).abs() < 0.01, "{} slope {}", param.name(), slope(&ys));
        }
        let rot: Vec<f64> = params.iter().map(|p| p.rot).collect();
        assert!(slope(&rot).abs() < 1e-4);
    }

    /// Per-layer shifts growing linearly with the index, so the cumulative
    /// drift is an exact quadratic.
    fn quadratic_drift_stack(n: usize) -> Vec<Affine> {
        (0..n)
            .map(|i| match i {
                0 => Affine::identity(),
                _ => Affine::translation(0.3 + 0.02 * i as f64, -0.1 + 0.004 * i as f64),
            })
            .collect()
    }

    #[test]
    fn polynomial_drift_is_removed_exactly() {
        let afms = quadratic_drift_stack(40);
        let corrected = null_bias(&afms, 4, 2).unwrap();
        for (i, c) in corrected.cumulative.iter().enumerate() {
            assert!(
                c.max_abs_diff(&Affine::identity()) < 1e-6,
                "layer {i}: {:?}",
                c.rows()
            );
        }

        let refit = BiasFuncs::fit(&decompose_stack(&corrected.cumulative).unwrap(), 4);
        for param in [BiasParam::X, BiasParam::Y, BiasParam::Rot] {
            let trend = &refit.trend(param).trend;
            for i in 0..40 {
                assert!(trend.derivative(i as f64).abs() < 1e-6, "{} at {i}", param.name());
                assert!(trend.eval(i as f64).abs() < 1e-6, "{} at {i}", param.name());
            }
        }
    }

    #[test]
    fn nulling_is_a_fixed_point() {
        let first = null_bias(&quadratic_drift_stack(40), 4, 2).unwrap();
        let again = layer_affines_from_cumulative(&first.cumulative).unwrap();
        let second = null_bias(&again, 4, 2).unwrap();
        for (a, b) in first.cumulative.iter().zip(&second.cumulative) {
            assert!(a.max_abs_diff(b) < 1e-6, "{:?} vs {:?}", a.rows(), b.rows());
        }
    }

    #[test]
    fn zero_iterations_returns_raw_chain() {
        let afms = drifting_stack(10);
        let out = null_bias(&afms, 4, 0).unwrap();
        assert_eq!(out.cumulative, chain_cumulative(&afms, None));
        assert_eq!(out.init, Affine::identity());
    }

    #[test]
    fn driftless_stack_is_untouched() {
        let afms = vec![Affine::identity(); 12];
        let out = null_bias(&afms, 4, 2).unwrap();
        for c in &out.cumulative {
            assert!(c.max_abs_diff(&Affine::identity()) < 1e-9);
        }
    }

    #[test]
    fn bounding_rect_covers_shifted_layers() {
        let cafms = [Affine::identity(), Affine::translation(-3.2, 1.0)];
        assert_eq!(bounding_rect(&cafms, 100, 80).unwrap(), [-4, -4, 108, 88]);
        assert_eq!(
            bounding_rect(&[Affine::identity()], 100, 80).unwrap(),
            [0, 0, 100, 80]
        );
        let degenerate = Affine::from_rows([[0.0, 0.0, 0.0], [0.0, 0.0, 0.0]]);
        assert!(bounding_rect(&[degenerate], 10, 10).is_err());
    }
}

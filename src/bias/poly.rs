//! Least-squares polynomials over the layer index.
//!
//! Indices are mapped to `t = (i - center) / half_range` before fitting so
//! that the Vandermonde system stays well conditioned for long stacks.
//! Polynomials fitted on the same [`IndexAxis`] can be added together.

use log::warn;
use nalgebra::{DMatrix, DVector};
use serde::Serialize;

/// Normalization of the layer index.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct IndexAxis {
    pub center: f64,
    pub half_range: f64,
}

impl IndexAxis {
    /// Axis for indices `0..n`.
    pub fn for_len(n: usize) -> Self {
        let half = (n.saturating_sub(1)) as f64 / 2.0;
        Self {
            center: half,
            half_range: half.max(1.0),
        }
    }

    #[inline]
    fn t(&self, x: f64) -> f64 {
        (x - self.center) / self.half_range
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Polynomial {
    axis: IndexAxis,
    /// Ascending powers of the normalized index.
    coeffs: Vec<f64>,
}

impl Polynomial {
    pub fn zero(axis: IndexAxis) -> Self {
        Self {
            axis,
            coeffs: Vec::new(),
        }
    }

    /// Fit `ys[i]` at index `i` with degree `min(order, n - 1)`.
    pub fn fit(axis: IndexAxis, ys: &[f64], order: usize) -> Self {
        let n = ys.len();
        if n == 0 {
            return Self::zero(axis);
        }
        let order = order.min(n - 1);
        let vander = DMatrix::from_fn(n, order + 1, |r, c| axis.t(r as f64).powi(c as i32));
        let rhs = DVector::from_column_slice(ys);
        match vander.svd(true, true).solve(&rhs, 1e-12) {
            Ok(sol) => Self {
                axis,
                coeffs: sol.iter().copied().collect(),
            },
            Err(e) => {
                warn!("polynomial fit failed ({e}), falling back to the mean");
                Self {
                    axis,
                    coeffs: vec![ys.iter().sum::<f64>() / n as f64],
                }
            }
        }
    }

    pub fn axis(&self) -> IndexAxis {
        self.axis
    }

    pub fn degree(&self) -> usize {
        self.coeffs.len().saturating_sub(1)
    }

    pub fn eval(&self, x: f64) -> f64 {
        let t = self.axis.t(x);
        self.coeffs.iter().rev().fold(0.0, |acc, c| acc * t + c)
    }

    /// Derivative with respect to the raw index.
    pub fn derivative(&self, x: f64) -> f64 {
        let t = self.axis.t(x);
        let dt = self
            .coeffs
            .iter()
            .enumerate()
            .skip(1)
            .rev()
            .fold(0.0, |acc, (k, c)| acc * t + k as f64 * c);
        dt / self.axis.half_range
    }

    /// Add `other` term by term. Both must share the same axis.
    pub fn accumulate(&mut self, other: &Polynomial) {
        debug_assert_eq!(self.axis, other.axis);
        if other.coeffs.len() > self.coeffs.len() {
            self.coeffs.resize(other.coeffs.len(), 0.0);
        }
        for (a, b) in self.coeffs.iter_mut().zip(&other.coeffs) {
            *a += b;
        }
    }
}

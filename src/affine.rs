//! 2×3 affine matrices in double precision.
//!
//! An [`Affine`] maps stationary (reference) pixel coordinates to moving (base)
//! pixel coordinates, i.e. it is the pixel-lookup transform used to resample
//! the moving image into the reference frame. `a.compose(&b)` is the
//! homogeneous product `a · b`: `b` is applied to points first, then `a`.
//!
//! Matrices serialize as `[[a00, a01, a02], [a10, a11, a12]]`.

use crate::error::AlignmentError;
use nalgebra::{Matrix2, Matrix3, Vector2, Vector3};
use serde::{Deserialize, Serialize};

/// Determinants at or below this magnitude are treated as degenerate.
pub const DET_EPS: f64 = 1e-12;

/// Six-parameter affine transform stored in homogeneous form.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[[f64; 3]; 2]", into = "[[f64; 3]; 2]")]
pub struct Affine {
    m: Matrix3<f64>,
}

/// Decomposed affine parameters.
///
/// The linear part equals `R(rot) · [[scale_x, skew_x·scale_y], [0, scale_y]]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AffineParams {
    pub tx: f64,
    pub ty: f64,
    /// Rotation in radians, `atan2(a10, a00)`.
    pub rot: f64,
    pub scale_x: f64,
    pub scale_y: f64,
    pub skew_x: f64,
}

impl Default for Affine {
    fn default() -> Self {
        Self::identity()
    }
}

impl Affine {
    pub fn identity() -> Self {
        Self {
            m: Matrix3::identity(),
        }
    }

    pub fn from_rows(rows: [[f64; 3]; 2]) -> Self {
        let [r0, r1] = rows;
        Self {
            m: Matrix3::new(r0[0], r0[1], r0[2], r1[0], r1[1], r1[2], 0.0, 0.0, 1.0),
        }
    }

    pub fn rows(&self) -> [[f64; 3]; 2] {
        let m = &self.m;
        [
            [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
            [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
        ]
    }

    /// Pure translation by `(tx, ty)`.
    pub fn translation(tx: f64, ty: f64) -> Self {
        Self::from_rows([[1.0, 0.0, tx], [0.0, 1.0, ty]])
    }

    pub fn from_linear(linear: Matrix2<f64>, t: Vector2<f64>) -> Self {
        Self::from_rows([
            [linear[(0, 0)], linear[(0, 1)], t[0]],
            [linear[(1, 0)], linear[(1, 1)], t[1]],
        ])
    }

    /// Coefficient `a_rc` for `r < 2`, `c < 3`.
    #[inline]
    pub fn get(&self, r: usize, c: usize) -> f64 {
        self.m[(r, c)]
    }

    pub fn linear_part(&self) -> Matrix2<f64> {
        self.m.fixed_view::<2, 2>(0, 0).into_owned()
    }

    pub fn translation_part(&self) -> [f64; 2] {
        [self.m[(0, 2)], self.m[(1, 2)]]
    }

    pub fn homogeneous(&self) -> &Matrix3<f64> {
        &self.m
    }

    pub fn determinant(&self) -> f64 {
        self.m[(0, 0)] * self.m[(1, 1)] - self.m[(0, 1)] * self.m[(1, 0)]
    }

    pub fn is_finite(&self) -> bool {
        self.m.iter().all(|v| v.is_finite())
    }

    /// `self · other`: apply `other` first, then `self`.
    pub fn compose(&self, other: &Affine) -> Affine {
        Affine {
            m: self.m * other.m,
        }
    }

    pub fn invert(&self) -> Result<Affine, AlignmentError> {
        let det = self.determinant();
        if !det.is_finite() || det.abs() <= DET_EPS {
            return Err(AlignmentError::DegenerateTransform { det });
        }
        let inv = self
            .m
            .try_inverse()
            .ok_or(AlignmentError::DegenerateTransform { det })?;
        Ok(Affine { m: inv })
    }

    #[inline]
    pub fn apply(&self, p: [f64; 2]) -> [f64; 2] {
        let v = self.m * Vector3::new(p[0], p[1], 1.0);
        [v[0], v[1]]
    }

    /// Apply only the linear part (for displacement vectors).
    #[inline]
    pub fn apply_linear(&self, d: [f64; 2]) -> [f64; 2] {
        [
            self.m[(0, 0)] * d[0] + self.m[(0, 1)] * d[1],
            self.m[(1, 0)] * d[0] + self.m[(1, 1)] * d[1],
        ]
    }

    pub fn apply_to_points(&self, points: &[[f64; 2]]) -> Vec<[f64; 2]> {
        points.iter().map(|&p| self.apply(p)).collect()
    }

    /// Same linear part, translation moved by `(dx, dy)`.
    pub fn shifted(&self, dx: f64, dy: f64) -> Affine {
        let mut out = *self;
        out.m[(0, 2)] += dx;
        out.m[(1, 2)] += dy;
        out
    }

    /// Translation multiplied by `k`, shape unchanged. Carries an affine between
    /// scales whose pixel sizes differ by a factor `k`.
    pub fn scale_translation(&self, k: f64) -> Affine {
        let mut out = *self;
        out.m[(0, 2)] *= k;
        out.m[(1, 2)] *= k;
        out
    }

    /// Split into translation, rotation, scale and skew.
    pub fn decompose(&self) -> Result<AffineParams, AlignmentError> {
        let det = self.determinant();
        if !det.is_finite() || det.abs() <= DET_EPS {
            return Err(AlignmentError::DegenerateTransform { det });
        }
        let (a00, a01, a10, a11) = (
            self.m[(0, 0)],
            self.m[(0, 1)],
            self.m[(1, 0)],
            self.m[(1, 1)],
        );
        let rot = a10.atan2(a00);
        let (sin, cos) = rot.sin_cos();
        let scale_x = (a00 * a00 + a10 * a10).sqrt();
        let scale_y = a11 * cos - a01 * sin;
        let skew_x = (a01 * cos + a11 * sin) / scale_y;
        let [tx, ty] = self.translation_part();
        Ok(AffineParams {
            tx,
            ty,
            rot,
            scale_x,
            scale_y,
            skew_x,
        })
    }

    /// Rebuild from decomposed parameters.
    pub fn from_params(p: &AffineParams) -> Affine {
        let (sin, cos) = p.rot.sin_cos();
        let rot = Matrix2::new(cos, -sin, sin, cos);
        let shape = Matrix2::new(p.scale_x, p.skew_x * p.scale_y, 0.0, p.scale_y);
        Affine::from_linear(rot * shape, Vector2::new(p.tx, p.ty))
    }

    /// Output-space box `[min_x, min_y, max_x, max_y]` covered by a `w × h`
    /// image resampled through this lookup transform.
    pub fn model_bounds(&self, w: usize, h: usize) -> Result<[f64; 4], AlignmentError> {
        let inv = self.invert()?;
        let corners = [
            [0.0, 0.0],
            [w as f64, 0.0],
            [w as f64, h as f64],
            [0.0, h as f64],
        ];
        let mut bounds = [f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY];
        for c in corners {
            let p = inv.apply(c);
            bounds[0] = bounds[0].min(p[0]);
            bounds[1] = bounds[1].min(p[1]);
            bounds[2] = bounds[2].max(p[0]);
            bounds[3] = bounds[3].max(p[1]);
        }
        Ok([
            bounds[0].floor(),
            bounds[1].floor(),
            bounds[2].ceil(),
            bounds[3].ceil(),
        ])
    }

    /// Largest absolute coefficient difference.
    pub fn max_abs_diff(&self, other: &Affine) -> f64 {
        (self.m - other.m).amax()
    }
}

/// Free-function form of [`Affine::compose`].
pub fn compose(a: &Affine, b: &Affine) -> Affine {
    a.compose(b)
}

impl From<[[f64; 3]; 2]> for Affine {
    fn from(rows: [[f64; 3]; 2]) -> Self {
        Affine::from_rows(rows)
    }
}

impl From<Affine> for [[f64; 3]; 2] {
    fn from(a: Affine) -> Self {
        a.rows()
    }
}

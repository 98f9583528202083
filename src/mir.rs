//! Point-correspondence to affine solver.
//!
//! Fits the affine that maps stationary points onto moving points in the least
//! squares sense. One correspondence gives a translation, two give a
//! similarity (a fictive third point is added by rotating the second point
//! 90° about the first in both sets), three or more give a full affine.
//! Collinear stationary points cannot constrain a full affine and are
//! rejected.

use crate::affine::Affine;
use crate::error::AlignmentError;
use log::debug;
use nalgebra::{Matrix2, Vector2};

/// Relative threshold on the scatter determinant below which points count as collinear.
const COLLINEAR_EPS: f64 = 1e-10;

/// Refit RMS in pixels above which [`solve_iterative`] drops a correspondence.
pub const DEFAULT_RMS_THRESHOLD: f64 = 3.0;
/// Fewest correspondences [`solve_iterative`] keeps.
pub const DEFAULT_MIN_POINTS: usize = 4;

/// Result of a point-set solve.
#[derive(Clone, Debug)]
pub struct MirSolution {
    /// Stationary → moving.
    pub forward: Affine,
    /// Moving → stationary.
    pub inverse: Affine,
    /// Root mean square residual over the supplied points (pixels).
    pub rms: f64,
    pub n_points: usize,
    /// Index of the correspondence with the largest residual.
    pub worst: Option<usize>,
}

/// Solution of [`solve_iterative`] together with the correspondences it kept.
#[derive(Clone, Debug)]
pub struct IterativeSolution {
    pub solution: MirSolution,
    /// Indices into the input sets that survived outlier removal.
    pub kept: Vec<usize>,
}

/// Solve for the affine mapping `psta` onto `pmov`.
pub fn solve(psta: &[[f64; 2]], pmov: &[[f64; 2]]) -> Result<MirSolution, AlignmentError> {
    if psta.len() != pmov.len() {
        return Err(AlignmentError::InvalidRequest(format!(
            "point sets differ in length ({} vs {})",
            psta.len(),
            pmov.len()
        )));
    }
    let forward = match psta.len() {
        0 => {
            return Err(AlignmentError::InsufficientCorrespondence {
                found: 0,
                required: 1,
                reason: "no correspondences",
            })
        }
        1 => Affine::translation(pmov[0][0] - psta[0][0], pmov[0][1] - psta[0][1]),
        2 => {
            let (s3, m3) = (fictive_point(psta), fictive_point(pmov));
            if squared_dist(psta[0], psta[1]) <= f64::EPSILON {
                return Err(AlignmentError::InsufficientCorrespondence {
                    found: 2,
                    required: 3,
                    reason: "coincident points",
                });
            }
            fit_least_squares(&[psta[0], psta[1], s3], &[pmov[0], pmov[1], m3])?
        }
        _ => fit_least_squares(psta, pmov)?,
    };

    let inverse = forward.invert()?;
    let (rms, worst) = residuals(&forward, psta, pmov);
    Ok(MirSolution {
        forward,
        inverse,
        rms,
        n_points: psta.len(),
        worst,
    })
}

/// Solve, then repeatedly drop the worst correspondence while the RMS exceeds
/// `rms_threshold` and more than `min_points` remain.
pub fn solve_iterative(
    psta: &[[f64; 2]],
    pmov: &[[f64; 2]],
    rms_threshold: f64,
    min_points: usize,
) -> Result<IterativeSolution, AlignmentError> {
    let mut kept: Vec<usize> = (0..psta.len().min(pmov.len())).collect();
    if psta.len() != pmov.len() {
        // Surface the length mismatch from `solve`.
        solve(psta, pmov)?;
    }
    loop {
        let s: Vec<[f64; 2]> = kept.iter().map(|&i| psta[i]).collect();
        let m: Vec<[f64; 2]> = kept.iter().map(|&i| pmov[i]).collect();
        let solution = solve(&s, &m)?;
        let worst = match solution.worst {
            Some(w) if solution.rms > rms_threshold && kept.len() > min_points => w,
            _ => return Ok(IterativeSolution { solution, kept }),
        };
        debug!(
            "mir: rms {:.3} > {:.3}, dropping correspondence {} ({} left)",
            solution.rms,
            rms_threshold,
            kept[worst],
            kept.len() - 1
        );
        kept.remove(worst);
    }
}

fn fictive_point(p: &[[f64; 2]]) -> [f64; 2] {
    let dx = p[1][0] - p[0][0];
    let dy = p[1][1] - p[0][1];
    [p[0][0] - dy, p[0][1] + dx]
}

fn squared_dist(a: [f64; 2], b: [f64; 2]) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)
}

fn fit_least_squares(psta: &[[f64; 2]], pmov: &[[f64; 2]]) -> Result<Affine, AlignmentError> {
    let mut accum = CorrespondenceAccum::new(psta, pmov);
    for (s, m) in psta.iter().zip(pmov) {
        accum.accumulate(*s, *m);
    }
    let scatter = accum.scatter();
    let det = scatter.determinant();
    let trace = scatter.trace();
    if trace <= f64::EPSILON || det <= COLLINEAR_EPS * trace * trace {
        return Err(AlignmentError::InsufficientCorrespondence {
            found: psta.len(),
            required: 3,
            reason: "stationary points are collinear",
        });
    }
    let inv = scatter
        .try_inverse()
        .ok_or(AlignmentError::DegenerateTransform { det })?;
    let linear = accum.cross() * inv;
    let t = accum.mean_mov - linear * accum.mean_sta;
    Ok(Affine::from_linear(linear, t))
}

/// Centred second moments of a correspondence set.
struct CorrespondenceAccum {
    mean_sta: Vector2<f64>,
    mean_mov: Vector2<f64>,
    sxx: f64,
    sxy: f64,
    syy: f64,
    // moving (row) × stationary (column) cross moments
    cxx: f64,
    cxy: f64,
    cyx: f64,
    cyy: f64,
}

impl CorrespondenceAccum {
    fn new(psta: &[[f64; 2]], pmov: &[[f64; 2]]) -> Self {
        Self {
            mean_sta: mean(psta),
            mean_mov: mean(pmov),
            sxx: 0.0,
            sxy: 0.0,
            syy: 0.0,
            cxx: 0.0,
            cxy: 0.0,
            cyx: 0.0,
            cyy: 0.0,
        }
    }

    fn accumulate(&mut self, s: [f64; 2], m: [f64; 2]) {
        let (sx, sy) = (s[0] - self.mean_sta[0], s[1] - self.mean_sta[1]);
        let (mx, my) = (m[0] - self.mean_mov[0], m[1] - self.mean_mov[1]);
        self.sxx += sx * sx;
        self.sxy += sx * sy;
        self.syy += sy * sy;
        self.cxx += mx * sx;
        self.cxy += mx * sy;
        self.cyx += my * sx;
        self.cyy += my * sy;
    }

    fn scatter(&self) -> Matrix2<f64> {
        Matrix2::new(self.sxx, self.sxy, self.sxy, self.syy)
    }

    fn cross(&self) -> Matrix2<f64> {
        Matrix2::new(self.cxx, self.cxy, self.cyx, self.cyy)
    }
}

fn mean(points: &[[f64; 2]]) -> Vector2<f64> {
    let n = points.len().max(1) as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(ax, ay), p| (ax + p[0], ay + p[1]));
    Vector2::new(sx / n, sy / n)
}

fn residuals(forward: &Affine, psta: &[[f64; 2]], pmov: &[[f64; 2]]) -> (f64, Option<usize>) {
    let mut sum = 0.0;
    let mut worst: Option<(usize, f64)> = None;
    for (i, (s, m)) in psta.iter().zip(pmov).enumerate() {
        let r2 = squared_dist(forward.apply(*s), *m);
        sum += r2;
        if worst.map_or(true, |(_, w)| r2 > w) {
            worst = Some((i, r2));
        }
    }
    let rms = (sum / psta.len().max(1) as f64).sqrt();
    (rms, worst.map(|(i, _)| i))
}

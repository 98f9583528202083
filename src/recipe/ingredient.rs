use super::{AlignMode, Ingredient, IngredientOutcome, RecipeContext};
use crate::affine::Affine;
use crate::error::AlignmentError;
use crate::mir::{self, DEFAULT_MIN_POINTS, DEFAULT_RMS_THRESHOLD};
use crate::swim::{MatchRequest, WindowSize};

/// Windowed correlation step. In `SwimAlign` mode the refined affine replaces
/// the running one; in `CheckAlign` mode only the SNR is kept.
#[derive(Clone, Debug)]
pub struct SwimIngredient {
    mode: AlignMode,
    points: Vec<[f64; 2]>,
    window: WindowSize,
    iterations: usize,
    whitening: f64,
    rms_threshold: f64,
    min_points: usize,
}

impl SwimIngredient {
    pub fn align(
        points: Vec<[f64; 2]>,
        window: WindowSize,
        iterations: usize,
        whitening: f64,
    ) -> Self {
        Self {
            mode: AlignMode::SwimAlign,
            points,
            window,
            iterations,
            whitening,
            rms_threshold: DEFAULT_RMS_THRESHOLD,
            min_points: DEFAULT_MIN_POINTS,
        }
    }

    pub fn check(points: Vec<[f64; 2]>, window: WindowSize, iterations: usize, whitening: f64) -> Self {
        Self {
            mode: AlignMode::CheckAlign,
            ..Self::align(points, window, iterations, whitening)
        }
    }

    /// Outlier rejection used when refitting the affine.
    pub fn with_outlier_rejection(mut self, rms_threshold: f64, min_points: usize) -> Self {
        self.rms_threshold = rms_threshold;
        self.min_points = min_points;
        self
    }
}

impl Ingredient for SwimIngredient {
    fn mode(&self) -> AlignMode {
        self.mode
    }

    fn window(&self) -> Option<WindowSize> {
        Some(self.window)
    }

    fn n_points(&self) -> usize {
        self.points.len()
    }

    fn execute(
        &mut self,
        ctx: &RecipeContext<'_>,
        afm: &Affine,
    ) -> Result<IngredientOutcome, AlignmentError> {
        let request = MatchRequest {
            psta: &self.points,
            window: self.window,
            iterations: self.iterations,
            whitening: self.whitening,
            initial: *afm,
            rms_threshold: self.rms_threshold,
            min_points: self.min_points,
        };
        let outcome = ctx.matcher.match_windows(ctx.sta, ctx.mov, &request)?;
        let afm = match self.mode {
            AlignMode::CheckAlign => *afm,
            _ => outcome.affine,
        };
        Ok(IngredientOutcome {
            afm,
            snr: outcome.snr,
        })
    }
}

/// Direct solve from manual correspondences; reports zero SNR.
#[derive(Clone, Debug)]
pub struct MatchPointIngredient {
    psta: Vec<[f64; 2]>,
    pmov: Vec<[f64; 2]>,
    rms_threshold: f64,
    min_points: usize,
}

impl MatchPointIngredient {
    pub fn new(psta: Vec<[f64; 2]>, pmov: Vec<[f64; 2]>) -> Self {
        Self {
            psta,
            pmov,
            rms_threshold: DEFAULT_RMS_THRESHOLD,
            min_points: DEFAULT_MIN_POINTS,
        }
    }

    pub fn with_outlier_rejection(mut self, rms_threshold: f64, min_points: usize) -> Self {
        self.rms_threshold = rms_threshold;
        self.min_points = min_points;
        self
    }
}

impl Ingredient for MatchPointIngredient {
    fn mode(&self) -> AlignMode {
        AlignMode::MatchPointAlign
    }

    fn n_points(&self) -> usize {
        self.psta.len()
    }

    fn execute(
        &mut self,
        _ctx: &RecipeContext<'_>,
        _afm: &Affine,
    ) -> Result<IngredientOutcome, AlignmentError> {
        let fit = mir::solve_iterative(&self.psta, &self.pmov, self.rms_threshold, self.min_points)?;
        Ok(IngredientOutcome {
            afm: fit.solution.forward,
            snr: vec![0.0; fit.kept.len()],
        })
    }
}

/// Keeps the incoming affine.
#[derive(Clone, Copy, Debug, Default)]
pub struct ApplyIngredient;

impl Ingredient for ApplyIngredient {
    fn mode(&self) -> AlignMode {
        AlignMode::ApplyAffine
    }

    fn n_points(&self) -> usize {
        0
    }

    fn execute(
        &mut self,
        _ctx: &RecipeContext<'_>,
        afm: &Affine,
    ) -> Result<IngredientOutcome, AlignmentError> {
        Ok(IngredientOutcome {
            afm: *afm,
            snr: vec![0.0],
        })
    }
}

//! Canonical recipes per alignment method and option.
//!
//! | method / option      | ingredients                                   |
//! |----------------------|-----------------------------------------------|
//! | swim, `init_affine`  | 1×1 → 2×2 → 4×4 → check                       |
//! | swim, `refine_affine`| 4×4 seeded with the carried affine → check    |
//! | swim, `apply_affine` | apply the carried affine → check              |
//! | match points         | point solve → swim at the points → check      |

use super::ingredient::{ApplyIngredient, MatchPointIngredient, SwimIngredient};
use super::layout::{full_image, grid, match_point_window};
use super::Recipe;
use crate::affine::Affine;
use crate::error::AlignmentError;
use crate::mir::{DEFAULT_MIN_POINTS, DEFAULT_RMS_THRESHOLD};
use crate::project::{AlignmentOption, SelectedMethod};

/// Numeric knobs resolved for one layer.
#[derive(Clone, Debug, PartialEq)]
pub struct RecipeParams {
    /// Window size relative to the grid cell.
    pub win_scale_factor: f64,
    /// Spectral whitening exponent (negative flattens the spectrum).
    pub whitening: f64,
    /// Correlate/refit rounds per swim step.
    pub iterations: usize,
    /// Rounds for the final SNR measurement.
    pub check_iterations: usize,
    /// Match-point window side as a fraction of the image width.
    pub match_point_window_fraction: f64,
    /// Refit RMS (pixels) above which the worst correspondence is dropped.
    pub rms_threshold: f64,
    /// Never drop below this many correspondences.
    pub min_points: usize,
}

impl Default for RecipeParams {
    fn default() -> Self {
        Self {
            win_scale_factor: 0.75,
            whitening: -0.68,
            iterations: 2,
            check_iterations: 1,
            match_point_window_fraction: 1.0 / 32.0,
            rms_threshold: DEFAULT_RMS_THRESHOLD,
            min_points: DEFAULT_MIN_POINTS,
        }
    }
}

/// Everything needed to assemble one layer's recipe.
#[derive(Clone, Debug)]
pub struct LayerPlan {
    pub method: SelectedMethod,
    pub option: AlignmentOption,
    /// Carried-over affine for `refine_affine` / `apply_affine`.
    pub initial: Affine,
    pub params: RecipeParams,
    /// Manual correspondences in the reference image.
    pub ref_points: Vec<[f64; 2]>,
    /// Manual correspondences in the base image.
    pub base_points: Vec<[f64; 2]>,
}

impl LayerPlan {
    pub fn new(method: SelectedMethod, option: AlignmentOption, params: RecipeParams) -> Self {
        Self {
            method,
            option,
            initial: Affine::identity(),
            params,
            ref_points: Vec::new(),
            base_points: Vec::new(),
        }
    }
}

/// Assemble the recipe for a `width × height` image pair.
pub fn build_recipe(plan: &LayerPlan, width: usize, height: usize) -> Result<Recipe, AlignmentError> {
    let p = &plan.params;
    let swim = |n: usize| {
        let g = grid(width, height, n, p.win_scale_factor);
        SwimIngredient::align(g.points, g.window, p.iterations, p.whitening)
            .with_outlier_rejection(p.rms_threshold, p.min_points)
    };
    let check = {
        let g = full_image(width, height);
        SwimIngredient::check(g.points, g.window, p.check_iterations, p.whitening)
            .with_outlier_rejection(p.rms_threshold, p.min_points)
    };

    let recipe = match (plan.method, plan.option) {
        (SelectedMethod::MatchPointAlign, _) => {
            let (psta, pmov) = (&plan.ref_points, &plan.base_points);
            if psta.is_empty() || psta.len() != pmov.len() {
                return Err(AlignmentError::InsufficientCorrespondence {
                    found: psta.len().min(pmov.len()),
                    required: psta.len().max(pmov.len()).max(1),
                    reason: "reference and base match points must pair up",
                });
            }
            let window = match_point_window(width, p.match_point_window_fraction);
            Recipe::new(Affine::identity())
                .with(
                    MatchPointIngredient::new(psta.clone(), pmov.clone())
                        .with_outlier_rejection(p.rms_threshold, p.min_points),
                )
                .with(
                    SwimIngredient::align(psta.clone(), window, p.iterations, p.whitening)
                        .with_outlier_rejection(p.rms_threshold, p.min_points),
                )
                .with(check)
        }
        (SelectedMethod::AutoSwimAlign, AlignmentOption::InitAffine) => Recipe::new(Affine::identity())
            .with(swim(1))
            .with(swim(2))
            .with(swim(4))
            .with(check),
        (SelectedMethod::AutoSwimAlign, AlignmentOption::RefineAffine) => {
            Recipe::new(plan.initial).with(swim(4)).with(check)
        }
        (SelectedMethod::AutoSwimAlign, AlignmentOption::ApplyAffine) => {
            Recipe::new(plan.initial).with(ApplyIngredient).with(check)
        }
    };
    Ok(recipe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ImageF32;
    use crate::recipe::{AlignMode, RecipeContext};
    use crate::swim::{MatchOutcome, MatchRequest, Matcher};
    use std::sync::Mutex;

    /// Keeps the affine and records the rejection settings of every request.
    #[derive(Default)]
    struct SettingsRecorder {
        seen: Mutex<Vec<(f64, usize)>>,
    }

    impl Matcher for SettingsRecorder {
        fn match_windows(
            &self,
            _sta: &ImageF32,
            _mov: &ImageF32,
            request: &MatchRequest<'_>,
        ) -> Result<MatchOutcome, AlignmentError> {
            self.seen
                .lock()
                .unwrap()
                .push((request.rms_threshold, request.min_points));
            Ok(MatchOutcome {
                pmov: request.initial.apply_to_points(request.psta),
                snr: vec![1.0; request.psta.len()],
                affine: request.initial,
                delta: Affine::identity(),
            })
        }
    }

    #[test]
    fn bootstrap_recipe_runs_three_grids_then_check() {
        let plan = LayerPlan::new(
            SelectedMethod::AutoSwimAlign,
            AlignmentOption::InitAffine,
            RecipeParams::default(),
        );
        let recipe = build_recipe(&plan, 512, 512).unwrap();
        assert_eq!(
            recipe.modes(),
            vec![
                AlignMode::SwimAlign,
                AlignMode::SwimAlign,
                AlignMode::SwimAlign,
                AlignMode::CheckAlign
            ]
        );
        assert_eq!(*recipe.afm(), Affine::identity());
    }

    #[test]
    fn refine_recipe_starts_from_carried_affine() {
        let mut plan = LayerPlan::new(
            SelectedMethod::AutoSwimAlign,
            AlignmentOption::RefineAffine,
            RecipeParams::default(),
        );
        plan.initial = Affine::translation(8.0, -4.0);
        let recipe = build_recipe(&plan, 256, 256).unwrap();
        assert_eq!(recipe.modes(), vec![AlignMode::SwimAlign, AlignMode::CheckAlign]);
        assert_eq!(*recipe.afm(), Affine::translation(8.0, -4.0));
    }

    #[test]
    fn apply_recipe_only_checks() {
        let plan = LayerPlan::new(
            SelectedMethod::AutoSwimAlign,
            AlignmentOption::ApplyAffine,
            RecipeParams::default(),
        );
        let recipe = build_recipe(&plan, 256, 256).unwrap();
        assert_eq!(recipe.modes(), vec![AlignMode::ApplyAffine, AlignMode::CheckAlign]);
    }

    #[test]
    fn match_point_recipe_needs_paired_points() {
        let mut plan = LayerPlan::new(
            SelectedMethod::MatchPointAlign,
            AlignmentOption::InitAffine,
            RecipeParams::default(),
        );
        assert!(build_recipe(&plan, 256, 256).is_err());
        plan.ref_points = vec![[10.0, 10.0], [200.0, 40.0], [60.0, 220.0]];
        plan.base_points = vec![[12.0, 9.0], [202.0, 39.0], [62.0, 219.0]];
        let recipe = build_recipe(&plan, 256, 256).unwrap();
        assert_eq!(
            recipe.modes(),
            vec![
                AlignMode::MatchPointAlign,
                AlignMode::SwimAlign,
                AlignMode::CheckAlign
            ]
        );
    }

    #[test]
    fn every_swim_step_uses_the_configured_rejection() {
        let params = RecipeParams {
            rms_threshold: 1.5,
            min_points: 6,
            ..RecipeParams::default()
        };
        let plan = LayerPlan::new(SelectedMethod::AutoSwimAlign, AlignmentOption::InitAffine, params);
        let recipe = build_recipe(&plan, 128, 128).unwrap();
        let img = ImageF32::new(128, 128);
        let matcher = SettingsRecorder::default();
        let ctx = RecipeContext {
            sta: &img,
            mov: &img,
            matcher: &matcher,
        };
        recipe.execute(&ctx).unwrap();
        let seen = matcher.seen.lock().unwrap();
        assert_eq!(*seen, vec![(1.5, 6); 4]);
    }
}

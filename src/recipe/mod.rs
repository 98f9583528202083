//! Recipes: ordered matching steps that build one layer's affine.
//!
//! A [`Recipe`] owns its ingredients and a running affine. Executing it runs
//! every ingredient once, in order, feeding each the affine produced by the
//! previous one. `execute` consumes the recipe so it cannot run twice.

pub mod ingredient;
pub mod layout;
pub mod plan;

use crate::affine::Affine;
use crate::error::AlignmentError;
use crate::image::ImageF32;
use crate::swim::{snr_report, Matcher, WindowSize};
use log::debug;
use serde::Serialize;

pub use ingredient::{ApplyIngredient, MatchPointIngredient, SwimIngredient};
pub use plan::{build_recipe, LayerPlan, RecipeParams};

/// What an ingredient does with the affine it is given.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignMode {
    /// Solve directly from manual correspondences.
    MatchPointAlign,
    /// Correlate windows and refit.
    SwimAlign,
    /// Measure SNR, keep the affine.
    CheckAlign,
    /// Pass the affine through unchanged.
    ApplyAffine,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngredientState {
    Pending,
    Executing,
    Done,
}

/// Images and backend shared by all ingredients of one recipe.
pub struct RecipeContext<'a> {
    pub sta: &'a ImageF32,
    pub mov: &'a ImageF32,
    pub matcher: &'a dyn Matcher,
}

/// Affine and SNR produced by one ingredient.
#[derive(Clone, Debug)]
pub struct IngredientOutcome {
    pub afm: Affine,
    pub snr: Vec<f64>,
}

/// One step of a recipe.
pub trait Ingredient: Send {
    fn mode(&self) -> AlignMode;

    /// Window size, for diagnostics.
    fn window(&self) -> Option<WindowSize> {
        None
    }

    /// Number of correspondences the step works with, for diagnostics.
    fn n_points(&self) -> usize;

    fn execute(
        &mut self,
        ctx: &RecipeContext<'_>,
        afm: &Affine,
    ) -> Result<IngredientOutcome, AlignmentError>;
}

/// Per-ingredient diagnostics.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngredientReport {
    pub mode: AlignMode,
    pub state: IngredientState,
    pub window: Option<WindowSize>,
    pub n_points: usize,
    pub afm: Affine,
    pub snr: Vec<f64>,
}

/// Final state of an executed recipe.
#[derive(Clone, Debug)]
pub struct RecipeResult {
    pub afm: Affine,
    /// SNR of the last ingredient.
    pub snr: Vec<f64>,
    pub snr_report: String,
    pub ingredients: Vec<IngredientReport>,
}

struct Step {
    ingredient: Box<dyn Ingredient>,
    state: IngredientState,
}

pub struct Recipe {
    steps: Vec<Step>,
    afm: Affine,
}

impl Recipe {
    /// Empty recipe whose running affine starts at `initial`.
    pub fn new(initial: Affine) -> Self {
        Self {
            steps: Vec::new(),
            afm: initial,
        }
    }

    pub fn push(&mut self, ingredient: impl Ingredient + 'static) {
        self.push_boxed(Box::new(ingredient));
    }

    pub fn push_boxed(&mut self, ingredient: Box<dyn Ingredient>) {
        self.steps.push(Step {
            ingredient,
            state: IngredientState::Pending,
        });
    }

    pub fn with(mut self, ingredient: impl Ingredient + 'static) -> Self {
        self.push(ingredient);
        self
    }

    pub fn afm(&self) -> &Affine {
        &self.afm
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn modes(&self) -> Vec<AlignMode> {
        self.steps.iter().map(|s| s.ingredient.mode()).collect()
    }

    pub fn states(&self) -> Vec<IngredientState> {
        self.steps.iter().map(|s| s.state).collect()
    }

    /// Run every ingredient in order. The first failure, including a
    /// singular affine, aborts the recipe.
    pub fn execute(mut self, ctx: &RecipeContext<'_>) -> Result<RecipeResult, AlignmentError> {
        let mut reports = Vec::with_capacity(self.steps.len());
        let mut last_snr = Vec::new();
        for (i, step) in self.steps.iter_mut().enumerate() {
            step.state = IngredientState::Executing;
            let outcome = step.ingredient.execute(ctx, &self.afm)?;
            if !outcome.afm.is_finite() {
                return Err(AlignmentError::DegenerateTransform {
                    det: outcome.afm.determinant(),
                });
            }
            // Every stored affine must be invertible for the stack pass.
            outcome.afm.invert()?;
            step.state = IngredientState::Done;
            debug!(
                "ingredient {} ({:?}): afm {:?}, snr {}",
                i,
                step.ingredient.mode(),
                outcome.afm.rows(),
                snr_report(&outcome.snr)
            );
            self.afm = outcome.afm;
            reports.push(IngredientReport {
                mode: step.ingredient.mode(),
                state: step.state,
                window: step.ingredient.window(),
                n_points: step.ingredient.n_points(),
                afm: outcome.afm,
                snr: outcome.snr.clone(),
            });
            last_snr = outcome.snr;
        }
        Ok(RecipeResult {
            afm: self.afm,
            snr_report: snr_report(&last_snr),
            snr: last_snr,
            ingredients: reports,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swim::SwimMatcher;
    use std::sync::{Arc, Mutex};

    /// Records its input and applies a fixed extra shift.
    struct Recording {
        shift: [f64; 2],
        seen: Arc<Mutex<Vec<Affine>>>,
    }

    impl Ingredient for Recording {
        fn mode(&self) -> AlignMode {
            AlignMode::SwimAlign
        }

        fn n_points(&self) -> usize {
            1
        }

        fn execute(
            &mut self,
            _ctx: &RecipeContext<'_>,
            afm: &Affine,
        ) -> Result<IngredientOutcome, AlignmentError> {
            self.seen.lock().unwrap().push(*afm);
            Ok(IngredientOutcome {
                afm: afm.shifted(self.shift[0], self.shift[1]),
                snr: vec![self.shift[0]],
            })
        }
    }

    struct Failing;

    impl Ingredient for Failing {
        fn mode(&self) -> AlignMode {
            AlignMode::MatchPointAlign
        }

        fn n_points(&self) -> usize {
            0
        }

        fn execute(
            &mut self,
            _ctx: &RecipeContext<'_>,
            _afm: &Affine,
        ) -> Result<IngredientOutcome, AlignmentError> {
            Err(AlignmentError::InsufficientCorrespondence {
                found: 0,
                required: 1,
                reason: "test",
            })
        }
    }

    /// Collapses the plane onto a line.
    struct Singular;

    impl Ingredient for Singular {
        fn mode(&self) -> AlignMode {
            AlignMode::SwimAlign
        }

        fn n_points(&self) -> usize {
            1
        }

        fn execute(
            &mut self,
            _ctx: &RecipeContext<'_>,
            _afm: &Affine,
        ) -> Result<IngredientOutcome, AlignmentError> {
            Ok(IngredientOutcome {
                afm: Affine::from_rows([[0.0, 0.0, 1.0], [0.0, 0.0, 1.0]]),
                snr: vec![4.0],
            })
        }
    }

    fn with_ctx<R>(f: impl FnOnce(&RecipeContext<'_>) -> R) -> R {
        let img = ImageF32::new(8, 8);
        let matcher = SwimMatcher::default();
        let ctx = RecipeContext {
            sta: &img,
            mov: &img,
            matcher: &matcher,
        };
        f(&ctx)
    }

    #[test]
    fn each_ingredient_sees_previous_output() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut recipe = Recipe::new(Affine::translation(1.0, 1.0));
        for shift in [[2.0, 0.0], [0.0, 3.0], [-1.0, 0.5]] {
            recipe.push(Recording {
                shift,
                seen: Arc::clone(&seen),
            });
        }
        assert_eq!(recipe.states(), vec![IngredientState::Pending; 3]);

        let result = with_ctx(|ctx| recipe.execute(ctx)).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], Affine::translation(1.0, 1.0));
        for i in 1..3 {
            assert_eq!(seen[i], result.ingredients[i - 1].afm);
        }
        assert_eq!(result.afm, Affine::translation(2.0, 4.5));
        assert_eq!(result.snr, vec![-1.0]);
        assert!(result
            .ingredients
            .iter()
            .all(|r| r.state == IngredientState::Done));
    }

    #[test]
    fn failure_stops_the_recipe() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recipe = Recipe::new(Affine::identity()).with(Failing).with(Recording {
            shift: [1.0, 0.0],
            seen: Arc::clone(&seen),
        });
        let result = with_ctx(|ctx| recipe.execute(ctx));
        assert!(matches!(
            result,
            Err(AlignmentError::InsufficientCorrespondence { .. })
        ));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn singular_result_fails_the_recipe() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recipe = Recipe::new(Affine::identity()).with(Singular).with(Recording {
            shift: [1.0, 0.0],
            seen: Arc::clone(&seen),
        });
        let result = with_ctx(|ctx| recipe.execute(ctx));
        assert!(matches!(
            result,
            Err(AlignmentError::DegenerateTransform { det }) if det == 0.0
        ));
        assert!(seen.lock().unwrap().is_empty());
    }
}

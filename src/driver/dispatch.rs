//! Layer job execution.
//!
//! Jobs are independent: each loads its own image pair and runs its own
//! recipe. They run on Rayon when the `parallel` feature is compiled in, the
//! runtime toggle is on and the batch is large enough; otherwise in order.
//! Load failures and panics are retried; numeric failures are not, since a
//! rerun would reproduce them.

use crate::diagnostics::timing::elapsed_ms;
use crate::error::AlignmentError;
use crate::image::ImageSource;
use crate::recipe::{build_recipe, LayerPlan, RecipeContext, RecipeResult};
use crate::swim::Matcher;
use log::warn;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

/// How layer jobs are scheduled.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchOptions {
    /// Runtime toggle for Rayon.
    pub enabled: bool,
    pub min_jobs_for_parallel: usize,
    /// Extra attempts after a load failure or a panic.
    pub retries: usize,
    /// Attempts slower than this are reported as failed and not retried.
    ///
    /// The check runs when an attempt returns. Jobs are not preempted, so a
    /// matcher that never returns still blocks its worker.
    pub deadline_ms: Option<u64>,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            enabled: cfg!(feature = "parallel"),
            min_jobs_for_parallel: 2,
            retries: 1,
            deadline_ms: None,
        }
    }
}

impl DispatchOptions {
    /// Sequential execution regardless of job count.
    pub fn sequential() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn should_parallelize(&self, job_count: usize) -> bool {
        self.enabled && job_count >= self.min_jobs_for_parallel.max(1)
    }
}

/// One (ref, base) pair to align.
#[derive(Clone, Debug)]
pub struct LayerJob {
    pub index: usize,
    /// Stationary image.
    pub ref_file: String,
    /// Moving image.
    pub base_file: String,
    pub plan: LayerPlan,
}

#[derive(Debug)]
pub struct JobOutcome {
    pub index: usize,
    pub attempts: usize,
    pub elapsed_ms: f64,
    pub result: Result<RecipeResult, AlignmentError>,
}

/// Run every job and return one outcome per job, in job order.
pub fn run_jobs(
    jobs: &[LayerJob],
    images: &dyn ImageSource,
    matcher: &dyn Matcher,
    options: &DispatchOptions,
) -> Vec<JobOutcome> {
    if jobs.is_empty() {
        return Vec::new();
    }

    if options.should_parallelize(jobs.len()) {
        #[cfg(feature = "parallel")]
        {
            return run_jobs_parallel(jobs, images, matcher, options);
        }
    }

    jobs.iter()
        .map(|job| run_with_retries(job, images, matcher, options))
        .collect()
}

#[cfg(feature = "parallel")]
fn run_jobs_parallel(
    jobs: &[LayerJob],
    images: &dyn ImageSource,
    matcher: &dyn Matcher,
    options: &DispatchOptions,
) -> Vec<JobOutcome> {
    use rayon::prelude::*;

    jobs.par_iter()
        .map(|job| run_with_retries(job, images, matcher, options))
        .collect()
}

fn run_with_retries(
    job: &LayerJob,
    images: &dyn ImageSource,
    matcher: &dyn Matcher,
    options: &DispatchOptions,
) -> JobOutcome {
    let start = Instant::now();
    let mut attempts = 0;
    let result = loop {
        attempts += 1;
        let attempt_start = Instant::now();
        let result = match catch_unwind(AssertUnwindSafe(|| run_job(job, images, matcher))) {
            Ok(result) => result,
            Err(payload) => Err(AlignmentError::JobFailed(panic_message(payload.as_ref()))),
        };
        let took = elapsed_ms(attempt_start);
        if let Some(deadline) = options.deadline_ms {
            if took > deadline as f64 {
                break Err(AlignmentError::JobFailed(format!(
                    "deadline of {deadline} ms exceeded ({took:.0} ms)"
                )));
            }
        }
        match result {
            Err(err) if is_retryable(&err) && attempts <= options.retries => {
                warn!("layer {}: attempt {attempts} failed ({err}), retrying", job.index);
            }
            other => break other,
        }
    };
    JobOutcome {
        index: job.index,
        attempts,
        elapsed_ms: elapsed_ms(start),
        result: result.map_err(|e| AlignmentError::layer(job.index, e)),
    }
}

fn run_job(
    job: &LayerJob,
    images: &dyn ImageSource,
    matcher: &dyn Matcher,
) -> Result<RecipeResult, AlignmentError> {
    let sta = images.load(&job.ref_file).map_err(AlignmentError::Image)?;
    let mov = images.load(&job.base_file).map_err(AlignmentError::Image)?;
    let recipe = build_recipe(&job.plan, sta.w, sta.h)?;
    let ctx = RecipeContext {
        sta: sta.as_ref(),
        mov: mov.as_ref(),
        matcher,
    };
    recipe.execute(&ctx)
}

fn is_retryable(err: &AlignmentError) -> bool {
    matches!(err, AlignmentError::Image(_) | AlignmentError::JobFailed(_))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

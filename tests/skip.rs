mod common;

use common::synthetic_image::{
    assert_close, centre_shift, insert_scale_images, stack_filenames, BlobField,
};
use swim_align::diagnostics::LayerStatus;
use swim_align::driver::DispatchOptions;
use swim_align::image::MemoryImageSource;
use swim_align::prelude::*;
use swim_align::swim::{MatchOutcome, MatchRequest};

const SIZE: usize = 192;
const SHIFTS: [[f64; 2]; 5] = [[0.0, 0.0], [2.0, 1.0], [40.0, -30.0], [4.0, -1.0], [5.0, 2.0]];

fn setup() -> (ProjectModel, MemoryImageSource) {
    let field = BlobField::new(SIZE as f64, SIZE as f64, 420, 11);
    let project = ProjectModel::new_stack("/raw", "/proj", &stack_filenames(5), &[1]);
    let mut images = MemoryImageSource::new();
    let renders = SHIFTS.iter().map(|&s| field.render(SIZE, SIZE, s)).collect();
    insert_scale_images(&mut images, &project, 1, renders);
    (project, images)
}

fn config() -> AlignmentConfig {
    AlignmentConfig {
        dispatch: DispatchOptions {
            retries: 0,
            ..DispatchOptions::default()
        },
        ..AlignmentConfig::default()
    }
}

#[test]
fn skipped_layer_is_bridged_and_left_identity() {
    let (mut project, images) = setup();
    project.scale_mut(1).unwrap().alignment_stack[2].skip = true;
    let config = config();

    let report = align_scale(
        &mut project,
        &AlignRequest::default(),
        &config,
        &config.matcher(),
        &images,
    )
    .unwrap();

    let stack = &project.scale(1).unwrap().alignment_stack;
    assert_eq!(
        stack[3].images.reference.filename,
        stack[1].images.base.filename
    );
    assert!(stack[2].images.reference.filename.is_empty());
    assert_eq!(
        report.layer(2).unwrap().status,
        LayerStatus::Skipped {
            reason: "skip flag set".to_string()
        }
    );
    assert_eq!(report.layer(2).unwrap().attempts, 0);
    assert_eq!(stack[2].results().affine_matrix, Some(Affine::identity()));

    let c1 = stack[1].results().cumulative_afm.unwrap();
    let c2 = stack[2].results().cumulative_afm.unwrap();
    assert_eq!(c1, c2);
    let afm3 = stack[3].results().affine_matrix.unwrap();
    assert_close(centre_shift(&afm3, SIZE, SIZE), [2.0, -2.0], 1.0, "layer 3 vs layer 1");
    let c3 = stack[3].results().cumulative_afm.unwrap();
    assert_close(centre_shift(&c3, SIZE, SIZE), SHIFTS[3], 1.0, "cumulative 3");
}

#[test]
fn failing_layer_is_marked_skip_and_batch_continues() {
    let (mut project, images) = setup();
    project.scale_mut(1).unwrap().alignment_stack[4].images.base.filename = "missing.tif".into();
    let config = config();

    let report = align_scale(
        &mut project,
        &AlignRequest::default(),
        &config,
        &config.matcher(),
        &images,
    )
    .unwrap();

    assert_eq!(report.failed_count(), 1);
    assert!(matches!(
        report.layer(4).unwrap().status,
        LayerStatus::Failed { .. }
    ));
    let layer = &project.scale(1).unwrap().alignment_stack[4];
    assert!(layer.skip);
    assert_eq!(layer.results().affine_matrix, Some(Affine::identity()));
    assert_eq!(layer.results().snr, vec![0.0]);
    assert_eq!(layer.results().snr_report.as_deref(), Some("SNR: --"));
    assert!(!project.scale(1).unwrap().alignment_stack[3].skip);
}

/// Answers every request with an affine that collapses the image onto a line.
struct CollapsingMatcher;

impl Matcher for CollapsingMatcher {
    fn match_windows(
        &self,
        _sta: &ImageF32,
        _mov: &ImageF32,
        request: &MatchRequest<'_>,
    ) -> Result<MatchOutcome, AlignmentError> {
        let collapsed = Affine::from_rows([[0.0, 0.0, 1.0], [0.0, 0.0, 1.0]]);
        Ok(MatchOutcome {
            pmov: collapsed.apply_to_points(request.psta),
            snr: vec![5.0; request.psta.len()],
            affine: collapsed,
            delta: collapsed,
        })
    }
}

#[test]
fn singular_match_result_fails_the_layer_not_the_batch() {
    let (mut project, images) = setup();
    project.scale_mut(1).unwrap().null_cafm_trends = true;
    let config = config();

    let report = align_scale(
        &mut project,
        &AlignRequest::default(),
        &config,
        &CollapsingMatcher,
        &images,
    )
    .unwrap();

    assert_eq!(report.failed_count(), 4);
    assert!(report.bias_nulled);
    let stack = &project.scale(1).unwrap().alignment_stack;
    for i in 1..5 {
        assert!(
            matches!(report.layer(i).unwrap().status, LayerStatus::Failed { .. }),
            "layer {i}"
        );
        assert!(stack[i].skip);
        assert_eq!(stack[i].results().affine_matrix, Some(Affine::identity()));
        let c = stack[i].results().cumulative_afm.unwrap();
        assert!(c.max_abs_diff(&Affine::identity()) < 1e-9);
    }
}

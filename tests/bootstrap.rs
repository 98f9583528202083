mod common;

use common::synthetic_image::{
    assert_close, centre_shift, insert_scale_images, stack_filenames, BlobField,
};
use swim_align::diagnostics::LayerStatus;
use swim_align::image::MemoryImageSource;
use swim_align::prelude::*;
use swim_align::project::evaluate_status;

const SIZE: usize = 256;
const SHIFTS: [[f64; 2]; 5] = [[0.0, 0.0], [3.0, -2.0], [5.5, 1.0], [2.0, 4.5], [-1.5, 3.25]];

fn setup() -> (ProjectModel, MemoryImageSource) {
    let field = BlobField::new(SIZE as f64, SIZE as f64, 700, 7);
    let project = ProjectModel::new_stack("/raw", "/proj", &stack_filenames(5), &[1]);
    let mut images = MemoryImageSource::new();
    let renders = SHIFTS.iter().map(|&s| field.render(SIZE, SIZE, s)).collect();
    insert_scale_images(&mut images, &project, 1, renders);
    (project, images)
}

fn affine(project: &ProjectModel, i: usize) -> (Affine, Affine) {
    let results = project.scale(1).unwrap().alignment_stack[i].results();
    (
        results.affine_matrix.expect("affine set"),
        results.cumulative_afm.expect("cumulative set"),
    )
}

#[test]
fn init_affine_recovers_pairwise_shifts() {
    let _ = env_logger::builder().is_test(true).try_init();
    let (mut project, images) = setup();
    let config = AlignmentConfig::default();

    let report = align_scale(
        &mut project,
        &AlignRequest::default(),
        &config,
        &config.matcher(),
        &images,
    )
    .unwrap();

    assert_eq!(report.scale, 1);
    assert_eq!(report.aligned_count(), 4);
    assert_eq!(report.failed_count(), 0);
    assert!(matches!(
        report.layer(0).unwrap().status,
        LayerStatus::Skipped { .. }
    ));
    assert!(!report.bias_nulled);

    let (first, first_c) = affine(&project, 0);
    assert_eq!(first, Affine::identity());
    assert_eq!(first_c, Affine::identity());
    for i in 1..5 {
        let (afm, cafm) = affine(&project, i);
        let expected = [
            SHIFTS[i][0] - SHIFTS[i - 1][0],
            SHIFTS[i][1] - SHIFTS[i - 1][1],
        ];
        assert_close(centre_shift(&afm, SIZE, SIZE), expected, 1.0, "pairwise shift");
        assert_close(centre_shift(&cafm, SIZE, SIZE), SHIFTS[i], 1.0, "cumulative shift");
        let layer = &project.scale(1).unwrap().alignment_stack[i];
        assert!(!layer.skip);
        let snr_report = layer.results().snr_report.as_deref().unwrap();
        assert!(snr_report.starts_with("SNR: ") && snr_report != "SNR: --");
        assert!(report.layer(i).unwrap().snr_mean.unwrap() > 3.0);
        assert_eq!(report.layer(i).unwrap().ingredients.len(), 4);
    }
    assert!(evaluate_status(&project).is_aligned(1));
}

#[test]
fn bias_nulling_and_bounding_rect_are_applied_when_requested() {
    let (mut project, images) = setup();
    {
        let scale = project.scale_mut(1).unwrap();
        scale.null_cafm_trends = true;
        scale.poly_order = 1;
        scale.use_bounding_rect = true;
    }
    let config = AlignmentConfig {
        dispatch: swim_align::driver::DispatchOptions::sequential(),
        ..AlignmentConfig::default()
    };
    let report = align_scale(
        &mut project,
        &AlignRequest::default(),
        &config,
        &config.matcher(),
        &images,
    )
    .unwrap();

    assert!(report.bias_nulled);
    let scale = project.scale(1).unwrap();
    assert!(scale
        .alignment_stack
        .iter()
        .all(|l| l.results().cumulative_afm.is_some()));
    let rect = scale.bounding_rect.expect("bounding rect");
    assert_eq!(rect[0], rect[1]);
    assert_eq!(rect[2], SIZE as i64 - 2 * rect[0]);
    assert_eq!(report.bounding_rect, Some(rect));
}

#[test]
fn partial_range_keeps_earlier_cumulatives() {
    let (mut project, images) = setup();
    let config = AlignmentConfig::default();
    align_scale(
        &mut project,
        &AlignRequest::default(),
        &config,
        &config.matcher(),
        &images,
    )
    .unwrap();
    let before: Vec<Affine> = (0..5).map(|i| affine(&project, i).1).collect();

    let request = AlignRequest {
        scale: Some(1),
        start_layer: 3,
        num_layers: 2,
        ..AlignRequest::default()
    };
    let report = align_scale(&mut project, &request, &config, &config.matcher(), &images).unwrap();
    assert_eq!((report.start_layer, report.end_layer), (3, 5));
    assert_eq!(report.layers.len(), 2);
    for i in 0..3 {
        assert_eq!(affine(&project, i).1, before[i]);
    }
    assert_close(
        centre_shift(&affine(&project, 4).1, SIZE, SIZE),
        SHIFTS[4],
        1.0,
        "rechained cumulative",
    );
}

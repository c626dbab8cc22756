//! Property tests for the DTW kernel, template construction and calibration.

mod support;

use motion_engine::calibrate::{calibrate, derive_windows};
use motion_engine::dtw::{dtw_distance, lb_keogh_lower_bound};
use motion_engine::pipeline::keypoints_to_features;
use motion_engine::segment::{auto_segment, SegmenterConfig};
use motion_engine::template::{build_templates, template_matrix};
use ndarray::{Array1, Array2};
use support::*;

fn wave(frames: usize, dims: usize, phase: f64) -> Array2<f64> {
    Array2::from_shape_fn((frames, dims), |(t, f)| {
        ((t as f64 * 0.21) + phase + f as f64 * 0.4).sin()
    })
}

#[test]
fn dtw_identity_is_zero() {
    let a = wave(32, 8, 0.0);
    assert!(dtw_distance(a.view(), a.view(), 6, None, None).abs() < 1e-9);
}

#[test]
fn dtw_is_symmetric_under_symmetric_weights() {
    let weights = Array1::from_vec(vec![0.3, 0.1, 0.2, 0.05, 0.15, 0.1, 0.05, 0.05]);
    for (la, lb) in [(20usize, 20usize), (18, 27), (33, 21)] {
        let a = wave(la, 8, 0.0);
        let b = wave(lb, 8, 1.3);
        let d1 = dtw_distance(a.view(), b.view(), 5, Some(weights.view()), None);
        let d2 = dtw_distance(b.view(), a.view(), 5, Some(weights.view()), None);
        assert!((d1 - d2).abs() < 1e-6, "asymmetric for ({la}, {lb})");
    }
}

#[test]
fn lb_keogh_never_exceeds_dtw() {
    for (la, lb, phase) in [
        (24usize, 24usize, 0.5),
        (16, 30, 1.9),
        (40, 22, 0.2),
        (12, 12, 3.0),
    ] {
        let a = wave(la, 8, 0.0);
        let b = wave(lb, 8, phase);
        let band = 5usize.max(la.abs_diff(lb) + 1);
        let lower = lb_keogh_lower_bound(a.view(), b.view(), band);
        let full = dtw_distance(a.view(), b.view(), band, None, None);
        assert!(lower <= full + 1e-9, "lb {lower} > dtw {full}");
    }
}

#[test]
fn templates_are_z_scored_over_time() {
    let features = keypoints_to_features(&arm_raise_frames(90, 30));
    let segments = auto_segment(features.view(), &SegmenterConfig::default());
    let templates = build_templates(&segments, features.view(), None);
    assert!(!templates.is_empty());

    for template in &templates {
        let matrix = template_matrix(template);
        for col in matrix.columns() {
            let n = col.len() as f64;
            let mean: f64 = col.iter().sum::<f64>() / n;
            let var: f64 = col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            assert!(mean.abs() < 1e-6);
            // Unit variance per column, except constant columns which are
            // floored to zero rather than blown up.
            let std = var.sqrt();
            assert!((std - 1.0).abs() < 1e-6 || std < 1e-3);
            assert!(col.iter().all(|v| v.is_finite()));
        }
    }
}

#[test]
fn calibration_always_orders_thresholds() {
    let features = keypoints_to_features(&arm_raise_frames(120, 30));
    let segments = auto_segment(features.view(), &SegmenterConfig::default());
    let templates = build_templates(&segments, features.view(), None);

    for take in [1usize, 2, templates.len()] {
        let outcome = calibrate(&templates[..take.min(templates.len())], "arm_raise");
        assert!(outcome.thresholds.thr_in > 0.0);
        assert!(outcome.thresholds.thr_in < outcome.thresholds.thr_out);
    }
}

#[test]
fn derived_windows_respect_clamps() {
    for median in [5usize, 20, 40, 80, 400] {
        let windows = derive_windows(median);
        assert!(!windows.is_empty());
        assert!(windows.len() <= 3);
        assert!(windows.iter().all(|&w| (10..=56).contains(&w)));
        assert!(windows.windows(2).all(|w| w[0] < w[1]));
    }
}

#[test]
fn mismatched_dimensions_return_sentinel() {
    let a = wave(16, 8, 0.0);
    let b = wave(16, 6, 0.0);
    assert_eq!(
        dtw_distance(a.view(), b.view(), 4, None, None),
        common::recognition::DISTANCE_SENTINEL
    );
}

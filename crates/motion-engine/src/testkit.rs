//! Synthetic keypoint streams for unit tests: an idealized arm raise with a
//! short rest between repetitions.

use common::pose::PoseFrame;

/// Base skeleton in pixel coordinates (arms down).
fn base_triples() -> Vec<[f64; 3]> {
    vec![
        [125.0, 150.0, 0.9], // nose
        [120.0, 145.0, 0.9], // left_eye
        [130.0, 145.0, 0.9], // right_eye
        [115.0, 150.0, 0.9], // left_ear
        [135.0, 150.0, 0.9], // right_ear
        [100.0, 200.0, 0.9], // left_shoulder
        [150.0, 200.0, 0.9], // right_shoulder
        [80.0, 250.0, 0.9],  // left_elbow
        [170.0, 250.0, 0.9], // right_elbow
        [60.0, 300.0, 0.9],  // left_wrist
        [190.0, 300.0, 0.9], // right_wrist
        [110.0, 350.0, 0.9], // left_hip
        [140.0, 350.0, 0.9], // right_hip
        [105.0, 400.0, 0.9], // left_knee
        [145.0, 400.0, 0.9], // right_knee
        [100.0, 450.0, 0.9], // left_ankle
        [150.0, 450.0, 0.9], // right_ankle
    ]
}

/// Raise progress for frame `t`: one low-high-low sweep over the first two
/// thirds of each period, then a rest at the bottom.
fn raise_progress(t: usize, period: usize) -> f64 {
    let active = (period * 2) / 3;
    let phase = t % period;
    if phase < active {
        (1.0 - (std::f64::consts::TAU * phase as f64 / active as f64).cos()) / 2.0
    } else {
        0.0
    }
}

/// `frames` frames of a repeated arm raise with the given period.
pub fn arm_raise_frames(frames: usize, period: usize) -> Vec<PoseFrame> {
    (0..frames)
        .map(|t| {
            let p = raise_progress(t, period);
            let mut triples = base_triples();
            // Wrists sweep from hip level to above the head, elbows follow
            // at half amplitude, with a slight outward drift.
            triples[9] = [60.0 - 20.0 * p, 300.0 - 180.0 * p, 0.9];
            triples[10] = [190.0 + 20.0 * p, 300.0 - 180.0 * p, 0.9];
            triples[7] = [80.0 - 10.0 * p, 250.0 - 90.0 * p, 0.9];
            triples[8] = [170.0 + 10.0 * p, 250.0 - 90.0 * p, 0.9];
            PoseFrame::from_triples(&triples)
        })
        .collect()
}


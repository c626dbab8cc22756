//! Synthetic keypoint streams shared by the integration tests.
#![allow(dead_code)]

use common::pose::PoseFrame;

/// Base skeleton in pixel coordinates (arms down), COCO order.
pub fn base_triples() -> Vec<[f64; 3]> {
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

/// Raise progress for frame `t`: a low-high-low sweep over the first two
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

/// One arm-raise frame at raise progress `p` in [0, 1].
pub fn arm_raise_triples(p: f64) -> Vec<[f64; 3]> {
    let mut triples = base_triples();
    triples[9] = [60.0 - 20.0 * p, 300.0 - 180.0 * p, 0.9];
    triples[10] = [190.0 + 20.0 * p, 300.0 - 180.0 * p, 0.9];
    triples[7] = [80.0 - 10.0 * p, 250.0 - 90.0 * p, 0.9];
    triples[8] = [170.0 + 10.0 * p, 250.0 - 90.0 * p, 0.9];
    triples
}

/// Idealized repeated arm raise as raw keypoint triples.
pub fn arm_raise_triples_sequence(frames: usize, period: usize) -> Vec<Vec<[f64; 3]>> {
    (0..frames)
        .map(|t| arm_raise_triples(raise_progress(t, period)))
        .collect()
}

/// Idealized repeated arm raise as pose frames.
pub fn arm_raise_frames(frames: usize, period: usize) -> Vec<PoseFrame> {
    arm_raise_triples_sequence(frames, period)
        .iter()
        .map(|t| PoseFrame::from_triples(t))
        .collect()
}

/// Identical rest-pose frames.
pub fn static_frames(frames: usize) -> Vec<PoseFrame> {
    let triples = base_triples();
    (0..frames)
        .map(|_| PoseFrame::from_triples(&triples))
        .collect()
}

/// Deterministic small-amplitude noise, stand-in for sensor jitter.
fn jitter(t: usize, k: usize, amplitude: f64) -> f64 {
    ((t * 31 + k * 17) as f64 * 12.9898).sin() * amplitude
}

/// Rest pose with per-keypoint jitter of the given pixel amplitude.
pub fn jitter_frames(frames: usize, amplitude: f64) -> Vec<PoseFrame> {
    (0..frames)
        .map(|t| {
            let mut triples = base_triples();
            for (k, kp) in triples.iter_mut().enumerate() {
                kp[0] += jitter(t, 2 * k, amplitude);
                kp[1] += jitter(t, 2 * k + 1, amplitude);
            }
            PoseFrame::from_triples(&triples)
        })
        .collect()
}

/// Arm raise with shoulder confidence dropped to 0.1 on alternate frames.
pub fn occluded_arm_raise_frames(frames: usize, period: usize) -> Vec<PoseFrame> {
    arm_raise_frames(frames, period)
        .into_iter()
        .enumerate()
        .map(|(t, mut frame)| {
            if t % 2 == 1 {
                for kp in &mut frame.keypoints {
                    if kp.name.ends_with("shoulder") {
                        kp.confidence = 0.1;
                    }
                }
            }
            frame
        })
        .collect()
}

/// A single slow repetition with a mid-motion pause at the top.
pub fn slow_rep_with_pause() -> Vec<PoseFrame> {
    let mut frames = Vec::new();
    // Rise over 20 frames.
    for t in 0..20 {
        let p = (1.0 - (std::f64::consts::PI * t as f64 / 20.0).cos()) / 2.0;
        frames.push(PoseFrame::from_triples(&arm_raise_triples(p)));
    }
    // Hold at the top for 25 frames.
    for _ in 0..25 {
        frames.push(PoseFrame::from_triples(&arm_raise_triples(1.0)));
    }
    // Lower over 20 frames.
    for t in 0..20 {
        let p = (1.0 + (std::f64::consts::PI * t as f64 / 20.0).cos()) / 2.0;
        frames.push(PoseFrame::from_triples(&arm_raise_triples(p)));
    }
    // Settle at rest.
    for _ in 0..25 {
        frames.push(PoseFrame::from_triples(&arm_raise_triples(0.0)));
    }
    frames
}

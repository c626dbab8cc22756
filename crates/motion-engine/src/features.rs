//! Frame feature engineering on top of normalized keypoints.
//!
//! Each frame becomes a fixed 32-dimensional vector: joint angles, torso
//! angles, vertical relative heights, lateral offsets and cross-body
//! distances. Sequences additionally get first-difference velocity features
//! appended (doubling the dimension) and a per-dimension z-score across time.

use crate::normalize::NormalizedPose;
use ndarray::{concatenate, Array1, Array2, ArrayView2, Axis};

/// Static per-frame feature dimension.
pub const STATIC_FEATURE_DIM: usize = 32;

/// Online feature dimension after velocity appending.
pub const ONLINE_FEATURE_DIM: usize = 2 * STATIC_FEATURE_DIM;

/// Floor applied to standard deviations before dividing.
pub const STD_FLOOR: f64 = 1e-6;

/// Clamp non-finite values into range: NaN to 0, infinities to +/-10.
pub fn nan_to_num(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else if v == f64::INFINITY {
        10.0
    } else if v == f64::NEG_INFINITY {
        -10.0
    } else {
        v
    }
}

fn is_placeholder(p: [f64; 2]) -> bool {
    p[0].abs() < 1e-8 && p[1].abs() < 1e-8
}

/// Angle ABC in degrees, in [0, 180].
fn angle_deg(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> f64 {
    let ba = [a[0] - b[0], a[1] - b[1]];
    let bc = [c[0] - b[0], c[1] - b[1]];
    let dot = ba[0] * bc[0] + ba[1] * bc[1];
    let norm = (ba[0].powi(2) + ba[1].powi(2)).sqrt() * (bc[0].powi(2) + bc[1].powi(2)).sqrt();
    let cos = (dot / (norm + 1e-6)).clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}

/// Angle with missing-point handling: any placeholder vertex yields 180
/// (a straight, "no flexion" reading).
fn safe_angle(pose: &NormalizedPose, a: &str, b: &str, c: &str) -> f64 {
    let (a, b, c) = (pose.point(a), pose.point(b), pose.point(c));
    if is_placeholder(a) || is_placeholder(b) || is_placeholder(c) {
        return 180.0;
    }
    angle_deg(a, b, c)
}

/// Signed offset of `point` relative to `reference` along one axis
/// (0 = x, 1 = y); 0 when either point is missing.
fn safe_offset(pose: &NormalizedPose, point: &str, reference: &str, axis: usize) -> f64 {
    let (p, r) = (pose.point(point), pose.point(reference));
    if is_placeholder(p) || is_placeholder(r) {
        return 0.0;
    }
    p[axis] - r[axis]
}

fn pair_distance(pose: &NormalizedPose, left: &str, right: &str) -> f64 {
    let (l, r) = (pose.point(left), pose.point(right));
    ((l[0] - r[0]).powi(2) + (l[1] - r[1]).powi(2)).sqrt()
}

/// Extract the 32-dimensional static feature vector for one frame.
pub fn frame_features(pose: &NormalizedPose) -> Array1<f64> {
    let mut features = Vec::with_capacity(STATIC_FEATURE_DIM);

    // Joint angles (8)
    features.push(safe_angle(pose, "left_elbow", "left_shoulder", "left_wrist"));
    features.push(safe_angle(pose, "left_shoulder", "left_elbow", "left_wrist"));
    features.push(safe_angle(pose, "right_elbow", "right_shoulder", "right_wrist"));
    features.push(safe_angle(pose, "right_shoulder", "right_elbow", "right_wrist"));
    features.push(safe_angle(pose, "left_knee", "left_hip", "left_ankle"));
    features.push(safe_angle(pose, "left_hip", "left_knee", "left_ankle"));
    features.push(safe_angle(pose, "right_knee", "right_hip", "right_ankle"));
    features.push(safe_angle(pose, "right_hip", "right_knee", "right_ankle"));

    // Torso angles (2)
    features.push(safe_angle(pose, "left_shoulder", "left_hip", "right_hip"));
    features.push(safe_angle(pose, "left_hip", "left_shoulder", "right_shoulder"));

    // Vertical relative heights (8)
    features.push(safe_offset(pose, "left_wrist", "left_shoulder", 1));
    features.push(safe_offset(pose, "left_elbow", "left_shoulder", 1));
    features.push(safe_offset(pose, "right_wrist", "right_shoulder", 1));
    features.push(safe_offset(pose, "right_elbow", "right_shoulder", 1));
    features.push(safe_offset(pose, "left_knee", "left_hip", 1));
    features.push(safe_offset(pose, "left_ankle", "left_hip", 1));
    features.push(safe_offset(pose, "right_knee", "right_hip", 1));
    features.push(safe_offset(pose, "right_ankle", "right_hip", 1));

    // Lateral offsets (8)
    features.push(safe_offset(pose, "left_wrist", "left_shoulder", 0));
    features.push(safe_offset(pose, "left_elbow", "left_shoulder", 0));
    features.push(safe_offset(pose, "right_wrist", "right_shoulder", 0));
    features.push(safe_offset(pose, "right_elbow", "right_shoulder", 0));
    features.push(safe_offset(pose, "left_knee", "left_hip", 0));
    features.push(safe_offset(pose, "left_ankle", "left_hip", 0));
    features.push(safe_offset(pose, "right_knee", "right_hip", 0));
    features.push(safe_offset(pose, "right_ankle", "right_hip", 0));

    // Cross-body distances (6)
    features.push(pair_distance(pose, "left_wrist", "right_wrist"));
    features.push(pair_distance(pose, "left_elbow", "right_elbow"));
    features.push(pair_distance(pose, "left_shoulder", "right_shoulder"));
    features.push(pair_distance(pose, "left_hip", "right_hip"));
    features.push(pair_distance(pose, "left_knee", "right_knee"));
    features.push(pair_distance(pose, "left_ankle", "right_ankle"));

    Array1::from_iter(features.into_iter().map(nan_to_num))
}

/// Append first-difference velocity features to a `[T, F]` sequence,
/// yielding `[T, 2F]`. The first row's velocity is zero (it is differenced
/// against itself).
pub fn add_velocity(seq: &Array2<f64>) -> Array2<f64> {
    let t = seq.nrows();
    let mut velocity = Array2::zeros(seq.raw_dim());
    for i in 1..t {
        let delta = &seq.row(i) - &seq.row(i - 1);
        velocity.row_mut(i).assign(&delta);
    }
    concatenate![Axis(1), seq.view(), velocity.view()]
}

/// Z-score each feature dimension across time, with the standard deviation
/// floored at [`STD_FLOOR`].
pub fn z_score_columns(seq: &Array2<f64>) -> Array2<f64> {
    if seq.nrows() == 0 {
        return seq.clone();
    }
    let mean = seq
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(seq.ncols()));
    let std = seq
        .std_axis(Axis(0), 0.0)
        .mapv(|s| s.max(STD_FLOOR));
    let mut out = seq.clone();
    for mut row in out.rows_mut() {
        row.zip_mut_with(&mean, |v, m| *v -= m);
        row.zip_mut_with(&std, |v, s| *v /= s);
    }
    out
}

/// Mean L2 norm of temporal differences over a `[T, F]` sequence.
pub fn motion_energy(seq: ArrayView2<'_, f64>) -> f64 {
    let t = seq.nrows();
    if t < 2 {
        return 0.0;
    }
    let mut total = 0.0;
    for i in 1..t {
        let delta = &seq.row(i) - &seq.row(i - 1);
        total += delta.mapv(|v| v * v).sum().sqrt();
    }
    total / (t - 1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{normalize_keypoints, DEFAULT_SCALE_EMA};
    use common::pose::PoseFrame;
    use ndarray::array;

    fn sample_pose() -> NormalizedPose {
        let frame = PoseFrame::from_triples(&[
            [125.0, 150.0, 0.9],
            [120.0, 145.0, 0.8],
            [130.0, 145.0, 0.8],
            [115.0, 150.0, 0.7],
            [135.0, 150.0, 0.7],
            [100.0, 200.0, 0.9],
            [150.0, 200.0, 0.9],
            [80.0, 250.0, 0.8],
            [170.0, 250.0, 0.8],
            [60.0, 300.0, 0.7],
            [190.0, 300.0, 0.7],
            [110.0, 350.0, 0.9],
            [140.0, 350.0, 0.9],
            [105.0, 400.0, 0.8],
            [145.0, 400.0, 0.8],
            [100.0, 450.0, 0.7],
            [150.0, 450.0, 0.7],
        ]);
        normalize_keypoints(&frame, None, None, None, DEFAULT_SCALE_EMA)
    }

    #[test]
    fn static_vector_has_fixed_dimension() {
        let features = frame_features(&sample_pose());
        assert_eq!(features.len(), STATIC_FEATURE_DIM);
        assert!(features.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn missing_joints_read_as_straight_angles() {
        let pose = normalize_keypoints(&PoseFrame::empty(), None, None, None, DEFAULT_SCALE_EMA);
        let features = frame_features(&pose);
        // All 10 angle features degrade to 180, everything else to 0.
        for i in 0..10 {
            assert_eq!(features[i], 180.0);
        }
        for i in 10..STATIC_FEATURE_DIM {
            assert_eq!(features[i], 0.0);
        }
    }

    #[test]
    fn velocity_doubles_dimension_and_zeroes_first_row() {
        let seq = array![[1.0, 2.0], [2.0, 4.0], [4.0, 8.0]];
        let out = add_velocity(&seq);
        assert_eq!(out.dim(), (3, 4));
        assert_eq!(out[[0, 2]], 0.0);
        assert_eq!(out[[0, 3]], 0.0);
        assert_eq!(out[[1, 2]], 1.0);
        assert_eq!(out[[2, 3]], 4.0);
    }

    #[test]
    fn z_score_centers_and_scales_columns() {
        let seq = array![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0]];
        let out = z_score_columns(&seq);
        for col in 0..2 {
            let column = out.column(col);
            let mean: f64 = column.iter().sum::<f64>() / 3.0;
            let var: f64 = column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / 3.0;
            assert!(mean.abs() < 1e-9);
            assert!((var.sqrt() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn z_score_survives_constant_columns() {
        let seq = array![[5.0, 1.0], [5.0, 2.0], [5.0, 3.0]];
        let out = z_score_columns(&seq);
        assert!(out.column(0).iter().all(|v| v.is_finite()));
    }

    #[test]
    fn motion_energy_zero_for_static_sequence() {
        let seq = array![[1.0, 1.0], [1.0, 1.0], [1.0, 1.0]];
        assert_eq!(motion_energy(seq.view()), 0.0);
        let moving = array![[0.0, 0.0], [3.0, 4.0]];
        assert!((motion_energy(moving.view()) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn nan_to_num_clamps() {
        assert_eq!(nan_to_num(f64::NAN), 0.0);
        assert_eq!(nan_to_num(f64::INFINITY), 10.0);
        assert_eq!(nan_to_num(f64::NEG_INFINITY), -10.0);
        assert_eq!(nan_to_num(1.5), 1.5);
    }
}

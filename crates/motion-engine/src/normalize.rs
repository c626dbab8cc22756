//! Adaptive keypoint normalization with body-mode detection.
//!
//! Turns a frame's raw pixel keypoints into coordinates relative to a chosen
//! root point, divided by a chosen body scale. Root and scale adapt to which
//! keypoints are actually visible; when the current frame cannot determine
//! them, the previous frame's values are carried forward (sticky
//! normalization) and the scale is EMA-smoothed across frames.

use common::pose::{coco_index, PoseBbox, PoseFrame, COCO_KEYPOINTS};
use serde::{Deserialize, Serialize};

/// Points below this confidence are treated as missing for root/scale
/// selection.
pub const CONFIDENCE_FLOOR: f64 = 0.3;

pub const SCALE_MIN: f64 = 20.0;
pub const SCALE_MAX: f64 = 500.0;
pub const FALLBACK_SCALE: f64 = 100.0;

/// Default EMA factor applied to the scale when a previous scale is known.
pub const DEFAULT_SCALE_EMA: f64 = 0.6;

/// Which part of the body the visible keypoints cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyMode {
    FullBody,
    UpperBody,
    LowerBody,
}

/// Output of [`normalize_keypoints`]: all 17 COCO points in normalized
/// coordinates (missing points stay at the origin), plus the root, scale and
/// mode that produced them.
#[derive(Debug, Clone)]
pub struct NormalizedPose {
    pub points: [[f64; 2]; 17],
    pub root: [f64; 2],
    pub scale: f64,
    pub mode: BodyMode,
}

impl NormalizedPose {
    /// Normalized coordinates of a named keypoint; `[0, 0]` for unknown
    /// names and missing points alike.
    pub fn point(&self, name: &str) -> [f64; 2] {
        coco_index(name)
            .map(|i| self.points[i])
            .unwrap_or([0.0, 0.0])
    }
}

fn visible(frame: &PoseFrame, name: &str) -> Option<[f64; 2]> {
    frame
        .get(name)
        .filter(|kp| kp.confidence > CONFIDENCE_FLOOR)
        .map(|kp| [kp.x, kp.y])
}

fn midpoint(a: [f64; 2], b: [f64; 2]) -> [f64; 2] {
    [(a[0] + b[0]) / 2.0, (a[1] + b[1]) / 2.0]
}

fn distance(a: [f64; 2], b: [f64; 2]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt()
}

fn pick_pair_root(left: Option<[f64; 2]>, right: Option<[f64; 2]>) -> Option<[f64; 2]> {
    match (left, right) {
        (Some(l), Some(r)) => Some(midpoint(l, r)),
        (Some(l), None) => Some(l),
        (None, Some(r)) => Some(r),
        (None, None) => None,
    }
}

/// Normalize a frame's keypoints: `(p - root) / scale` for every COCO name.
///
/// `last_root`/`last_scale` come from the previous frame of the same stream;
/// they make the root sticky when the current frame cannot determine one and
/// smooth the scale with factor `ema`. This never fails: in the worst case it
/// falls back to the frame center and a default scale so downstream stages
/// never see NaN.
pub fn normalize_keypoints(
    frame: &PoseFrame,
    bbox: Option<PoseBbox>,
    last_root: Option<[f64; 2]>,
    last_scale: Option<f64>,
    ema: f64,
) -> NormalizedPose {
    let left_shoulder = visible(frame, "left_shoulder");
    let right_shoulder = visible(frame, "right_shoulder");
    let left_hip = visible(frame, "left_hip");
    let right_hip = visible(frame, "right_hip");

    let has_shoulders = left_shoulder.is_some() || right_shoulder.is_some();
    let has_hips = left_hip.is_some() || right_hip.is_some();
    let has_knees = visible(frame, "left_knee").is_some() || visible(frame, "right_knee").is_some();

    let mode = if has_shoulders && has_hips && has_knees {
        BodyMode::FullBody
    } else if has_shoulders && !(has_hips && has_knees) {
        BodyMode::UpperBody
    } else if (has_hips || has_knees) && !has_shoulders {
        BodyMode::LowerBody
    } else {
        BodyMode::FullBody
    };

    // Root: hip midpoint first unless upper-body, then shoulder midpoint,
    // then bbox center, then the previous root, then the frame center.
    let mut root = None;
    if matches!(mode, BodyMode::FullBody | BodyMode::LowerBody) {
        root = pick_pair_root(left_hip, right_hip);
    }
    if root.is_none() && matches!(mode, BodyMode::FullBody | BodyMode::UpperBody) {
        root = pick_pair_root(left_shoulder, right_shoulder);
    }
    if root.is_none() {
        root = bbox.map(|b| [b.cx, b.cy]);
    }
    if root.is_none() {
        root = last_root;
    }
    let root = root.unwrap_or([0.5, 0.5]);

    // Scale: shoulder width, then hip width, then bbox height, then default.
    let mut scale = None;
    if matches!(mode, BodyMode::FullBody | BodyMode::UpperBody) {
        if let (Some(l), Some(r)) = (left_shoulder, right_shoulder) {
            scale = Some(distance(l, r));
        }
    }
    if scale.is_none() && matches!(mode, BodyMode::FullBody | BodyMode::LowerBody) {
        if let (Some(l), Some(r)) = (left_hip, right_hip) {
            scale = Some(distance(l, r));
        }
    }
    if scale.is_none() {
        scale = bbox.map(|b| b.h);
    }
    let mut scale = match scale {
        Some(s) if s >= 1e-3 => s,
        _ => FALLBACK_SCALE,
    };
    scale = scale.clamp(SCALE_MIN, SCALE_MAX);
    if let Some(last) = last_scale {
        scale = ema * last + (1.0 - ema) * scale;
    }

    let mut points = [[0.0f64; 2]; 17];
    for (i, name) in COCO_KEYPOINTS.iter().enumerate() {
        if let Some(p) = visible(frame, name) {
            points[i] = [(p[0] - root[0]) / scale, (p[1] - root[1]) / scale];
        }
    }

    NormalizedPose {
        points,
        root,
        scale,
        mode,
    }
}

//! Pose keypoint contracts shared by the learning pipeline and the live engine.
//!
//! Keypoints follow the 17-point COCO body skeleton. Coordinates are pixels in
//! the original frame coordinate system; confidences are in [0, 1].

use serde::{Deserialize, Serialize};

/// Standard COCO pose keypoint names (17 keypoints)
pub const COCO_KEYPOINTS: [&str; 17] = [
    "nose",
    "left_eye",
    "right_eye",
    "left_ear",
    "right_ear",
    "left_shoulder",
    "right_shoulder",
    "left_elbow",
    "right_elbow",
    "left_wrist",
    "right_wrist",
    "left_hip",
    "right_hip",
    "left_knee",
    "right_knee",
    "left_ankle",
    "right_ankle",
];

/// Index of a COCO keypoint name, if it is one of the 17 recognized names.
pub fn coco_index(name: &str) -> Option<usize> {
    COCO_KEYPOINTS.iter().position(|&n| n == name)
}

/// Pose keypoint with 2D coordinates and confidence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keypoint {
    /// Keypoint name (e.g., "nose", "left_shoulder")
    pub name: String,

    /// X coordinate in image space (pixels)
    pub x: f64,

    /// Y coordinate in image space (pixels)
    pub y: f64,

    /// Confidence score (0.0 to 1.0)
    pub confidence: f64,
}

/// One frame's worth of detected keypoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoseFrame {
    pub keypoints: Vec<Keypoint>,
}

impl PoseFrame {
    /// Build a frame from `[x, y, conf]` triples in COCO order. Missing
    /// trailing entries become zero-confidence placeholders; extra entries
    /// are ignored.
    pub fn from_triples(triples: &[[f64; 3]]) -> Self {
        let keypoints = COCO_KEYPOINTS
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let [x, y, conf] = triples.get(i).copied().unwrap_or([0.0, 0.0, 0.0]);
                Keypoint {
                    name: name.to_string(),
                    x,
                    y,
                    confidence: conf,
                }
            })
            .collect();
        Self { keypoints }
    }

    /// All-zero placeholder frame, used when pose detection misses so that
    /// downstream timing stays consistent.
    pub fn empty() -> Self {
        Self::from_triples(&[])
    }

    pub fn get(&self, name: &str) -> Option<&Keypoint> {
        self.keypoints.iter().find(|kp| kp.name == name)
    }
}

/// Coarse person bounding box used as a normalization fallback.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PoseBbox {
    /// Box center x (pixels)
    pub cx: f64,

    /// Box center y (pixels)
    pub cy: f64,

    /// Box height (pixels)
    pub h: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coco_table_is_complete() {
        assert_eq!(COCO_KEYPOINTS.len(), 17);
        assert_eq!(coco_index("nose"), Some(0));
        assert_eq!(coco_index("left_shoulder"), Some(5));
        assert_eq!(coco_index("right_ankle"), Some(16));
        assert_eq!(coco_index("tail"), None);
    }

    #[test]
    fn from_triples_pads_missing_points() {
        let frame = PoseFrame::from_triples(&[[10.0, 20.0, 0.9]]);
        assert_eq!(frame.keypoints.len(), 17);
        assert_eq!(frame.keypoints[0].x, 10.0);
        assert_eq!(frame.keypoints[1].confidence, 0.0);
    }

    #[test]
    fn frame_serialization_round_trips() {
        let frame = PoseFrame::from_triples(&[[1.0, 2.0, 0.5]]);
        let json = serde_json::to_string(&frame).unwrap();
        let back: PoseFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(back.keypoints.len(), 17);
        assert_eq!(back.keypoints[0].name, "nose");
    }
}

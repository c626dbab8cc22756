//! Request/response contracts for the engine HTTP surface.

use crate::artifact::{EnergyStats, Thresholds};
use crate::recognition::{ActiveThresholds, MotionState, RecognizerDebug};
use serde::{Deserialize, Serialize};

/// One demonstration recording, as per-frame `[x, y, conf]` triples in COCO
/// order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoSample {
    pub frames: Vec<Vec<[f64; 3]>>,
}

/// Body of `POST /actions/{id}/finalize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeRequest {
    pub samples: Vec<DemoSample>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeResponse {
    pub success: bool,
    pub templates_count: usize,
    pub thresholds: Thresholds,
    pub frames_processed: usize,
    pub median_len: usize,
    pub windows: Vec<usize>,
    pub energy_stats: EnergyStats,
    pub feature_weights: Vec<f64>,
}

/// Body of `POST /sessions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub action_id: String,

    /// Stop goal for this session; `target_reached` flips once `reps`
    /// reaches it.
    #[serde(default)]
    pub target_reps: Option<u64>,

    /// Reps already performed in an earlier session, carried forward.
    #[serde(default)]
    pub resume_reps: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupResponse {
    pub success: bool,
    pub session_token: String,
    pub templates_count: usize,
    pub thresholds: Thresholds,
    pub window_size: usize,
    pub windows: Vec<usize>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ThresholdUpdate {
    pub thr_in: f64,
    pub thr_out: f64,
}

/// Body of `POST /sessions/{token}/frames`. Exactly one of `keypoints`
/// (raw COCO triples) or `features` (a precomputed online feature vector)
/// must be present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameRequest {
    #[serde(default)]
    pub keypoints: Option<Vec<[f64; 3]>>,

    #[serde(default)]
    pub features: Option<Vec<f64>>,

    #[serde(default)]
    pub update_thresholds: Option<ThresholdUpdate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferResponse {
    pub success: bool,
    pub state: MotionState,
    pub reps: u64,
    pub distance: f64,
    pub thresholds: ActiveThresholds,
    pub target_reached: bool,
    pub debug: RecognizerDebug,

    /// The online feature vector extracted from this frame, when the frame
    /// arrived as raw keypoints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub initialized: bool,
    pub state: MotionState,
    pub reps: u64,
    pub templates_count: usize,
    pub window_size: usize,
    pub thresholds: ActiveThresholds,

    /// Frame index at which each rep of this session was credited.
    pub repetition_frames: Vec<u64>,

    pub target_reached: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetResponse {
    pub status: String,
}

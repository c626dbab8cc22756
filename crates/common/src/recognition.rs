//! Per-frame output contract of the online recognizer.

use serde::{Deserialize, Serialize};

/// Sentinel distance used instead of infinity/NaN so that every emitted
/// value stays JSON-representable.
pub const DISTANCE_SENTINEL: f64 = 999_999.0;

/// Hysteresis state of the recognizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotionState {
    #[serde(rename = "OUT")]
    Out,
    #[serde(rename = "IN")]
    In,
}

/// Why the state machine did (or did not) act on this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReasonCode {
    #[serde(rename = "OK")]
    Ok,
    /// Entry blocked by post-count cooldown.
    #[serde(rename = "COOLING")]
    Cooling,
    /// Entry blocked because the recognizer has not re-armed since the last
    /// count.
    #[serde(rename = "NO_REARM")]
    NoRearm,
    /// Smoothed distance above the entry threshold.
    #[serde(rename = "NO_ENTER(THR)")]
    NoEnterThreshold,
    /// A repetition was credited on this frame.
    #[serde(rename = "COUNTED")]
    Counted,
    /// Motion energy below the gate (blocked entry, or uncounted exit).
    #[serde(rename = "LOW_ENERGY")]
    LowEnergy,
}

/// The thresholds currently governing hysteresis.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ActiveThresholds {
    pub thr_in: f64,
    pub thr_out: f64,
}

/// Per-frame diagnostics emitted alongside the recognition result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizerDebug {
    pub buffer_size: usize,
    pub min_distance_raw: f64,
    pub min_distance_smoothed: f64,
    pub all_distances: Vec<f64>,
    pub frames_in_state: usize,
    pub motion_energy: f64,
    pub dist_delta: f64,
    pub avg_distance: f64,
    pub cooldown_frames: usize,
    pub rearmed_ready: bool,
    pub z: f64,
    pub reason_code: ReasonCode,
}

impl Default for RecognizerDebug {
    fn default() -> Self {
        Self {
            buffer_size: 0,
            min_distance_raw: DISTANCE_SENTINEL,
            min_distance_smoothed: DISTANCE_SENTINEL,
            all_distances: Vec::new(),
            frames_in_state: 0,
            motion_energy: 0.0,
            dist_delta: 0.0,
            avg_distance: DISTANCE_SENTINEL,
            cooldown_frames: 0,
            rearmed_ready: true,
            z: 0.0,
            reason_code: ReasonCode::Ok,
        }
    }
}

/// Result of feeding one feature frame to the recognizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameUpdate {
    pub state: MotionState,
    pub reps: u64,
    pub distance: f64,
    pub thresholds: ActiveThresholds,
    pub debug: RecognizerDebug,
}

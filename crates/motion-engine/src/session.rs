//! Engine session: binds one learned action artifact to a live frame stream.
//!
//! The session owns the realtime caches the per-frame pipeline needs
//! (previous features for velocity, sticky normalization root/scale) and the
//! online recognizer. One session per user stream; sessions never share
//! mutable state.

use crate::error::{EngineError, Result};
use crate::features::{frame_features, ONLINE_FEATURE_DIM};
use crate::normalize::{normalize_keypoints, DEFAULT_SCALE_EMA};
use crate::recognizer::{OnlineRecognizer, RecognizerConfig};
use crate::template::template_matrix;
use common::artifact::ActionArtifact;
use common::pose::PoseFrame;
use common::recognition::{ActiveThresholds, FrameUpdate, MotionState};
use ndarray::Array1;

/// Per-session options supplied at setup time.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// EMA factor for the sticky normalization scale.
    pub scale_ema: f64,

    /// Stop goal; `target_reached` flips once total reps reach it.
    pub target_reps: Option<u64>,

    /// Reps carried over from an earlier session of the same exercise.
    pub resume_reps: u64,

    pub count_on_entry: bool,
    pub smoothing_alpha: f64,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            scale_ema: DEFAULT_SCALE_EMA,
            target_reps: None,
            resume_reps: 0,
            count_on_entry: true,
            smoothing_alpha: 0.12,
        }
    }
}

/// Snapshot of a session for status endpoints.
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub action_id: String,
    pub state: MotionState,
    pub reps: u64,
    pub templates_count: usize,
    pub window_size: usize,
    pub thresholds: ActiveThresholds,
    pub repetition_frames: Vec<u64>,
    pub target_reached: bool,
}

/// Result of feeding one raw frame through the full pipeline.
#[derive(Debug, Clone)]
pub struct FrameOutcome {
    pub update: FrameUpdate,
    pub features: Vec<f64>,
    pub target_reached: bool,
}

pub struct EngineSession {
    action_id: String,
    recognizer: OnlineRecognizer,
    options: SessionOptions,

    // Realtime caches, reset whenever the artifact is (re)loaded.
    rt_prev_features: Option<Array1<f64>>,
    rt_last_root: Option<[f64; 2]>,
    rt_last_scale: Option<f64>,
}

impl EngineSession {
    /// Set up a session from a learned artifact. The artifact is read-only;
    /// its thresholds are defensively recalibrated if they sit far below
    /// the runtime distance scale.
    pub fn from_artifact(
        action_id: impl Into<String>,
        artifact: &ActionArtifact,
        options: SessionOptions,
    ) -> Result<Self> {
        let action_id = action_id.into();
        if artifact.templates.is_empty() {
            return Err(EngineError::InsufficientData(format!(
                "action '{action_id}' has no templates"
            )));
        }

        let templates = artifact.templates.iter().map(template_matrix).collect();
        let config = RecognizerConfig {
            thr_in: artifact.thresholds.thr_in,
            thr_out: artifact.thresholds.thr_out,
            windows: artifact.windows.clone(),
            band_ratio: artifact.band_ratio,
            feature_weights: Some(artifact.feature_weights.clone()),
            median_len: artifact.median_len,
            energy_p30: artifact.energy_p30,
            energy_p50: artifact.energy_p50,
            energy_p70: artifact.energy_p70,
            smoothing_alpha: options.smoothing_alpha,
            count_on_entry: options.count_on_entry,
            min_frames_in: None,
            min_frames_out: None,
        };
        let mut recognizer = OnlineRecognizer::new(templates, config)?;
        recognizer.auto_recalibrate();

        tracing::info!(
            action_id,
            templates = recognizer.templates_count(),
            window_size = recognizer.window_size(),
            motion_energy_median = recognizer.motion_energy_median(),
            "engine session ready"
        );

        Ok(Self {
            action_id,
            recognizer,
            options,
            rt_prev_features: None,
            rt_last_root: None,
            rt_last_scale: None,
        })
    }

    pub fn action_id(&self) -> &str {
        &self.action_id
    }

    fn total_reps(&self) -> u64 {
        self.options.resume_reps + self.recognizer.reps()
    }

    pub fn target_reached(&self) -> bool {
        self.options
            .target_reps
            .map(|target| self.total_reps() >= target)
            .unwrap_or(false)
    }

    /// Run one raw keypoint frame through normalize -> features -> velocity
    /// -> recognizer. A frame with no usable keypoints still advances the
    /// stream (the energy gate keeps the count unaffected).
    pub fn process_frame(&mut self, frame: &PoseFrame) -> Result<FrameOutcome> {
        let pose = normalize_keypoints(
            frame,
            None,
            self.rt_last_root,
            self.rt_last_scale,
            self.options.scale_ema,
        );
        self.rt_last_root = Some(pose.root);
        self.rt_last_scale = Some(pose.scale);

        let features = frame_features(&pose);
        let velocity = match &self.rt_prev_features {
            Some(prev) if prev.len() == features.len() => &features - prev,
            _ => Array1::zeros(features.len()),
        };
        self.rt_prev_features = Some(features.clone());

        let mut online = Vec::with_capacity(ONLINE_FEATURE_DIM);
        online.extend(features.iter().copied());
        online.extend(velocity.iter().copied());

        let update = self.process_features(&online)?;
        Ok(FrameOutcome {
            update,
            features: online,
            target_reached: self.target_reached(),
        })
    }

    /// Feed a precomputed online feature vector directly.
    pub fn process_features(&mut self, features: &[f64]) -> Result<FrameUpdate> {
        let mut update = self.recognizer.update(features)?;
        update.reps = self.options.resume_reps + update.reps;
        Ok(update)
    }

    pub fn update_thresholds(&mut self, thr_in: f64, thr_out: f64) {
        self.recognizer.update_thresholds(thr_in, thr_out);
    }

    /// Clear the recognizer and the realtime caches; the artifact binding
    /// stays.
    pub fn reset(&mut self) {
        self.recognizer.reset();
        self.rt_prev_features = None;
        self.rt_last_root = None;
        self.rt_last_scale = None;
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            action_id: self.action_id.clone(),
            state: self.recognizer.state(),
            reps: self.total_reps(),
            templates_count: self.recognizer.templates_count(),
            window_size: self.recognizer.window_size(),
            thresholds: self.recognizer.thresholds(),
            repetition_frames: self.recognizer.repetition_frames().to_vec(),
            target_reached: self.target_reached(),
        }
    }
}

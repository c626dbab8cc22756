//! Online DTW recognition and repetition counting with hysteresis.
//!
//! Every frame, the recognizer pushes the feature vector into a rolling
//! buffer, z-scores the buffer, computes multi-window banded DTW distances
//! against all templates, smooths the minimum with an EMA and tracks a
//! rolling z-score of the raw distance. An OUT/IN state machine with
//! asymmetric thresholds, motion-energy gates, post-count cooldown and a
//! rearm condition turns the distance stream into a robust rep count.
//!
//! Entry is judged on the smoothed distance (reject jitter); exit on the raw
//! distance and z-score spikes (recover fast). The lower energy gate lets
//! genuine stillness end a rep without counting; the median gate blocks
//! entries while the subject is static even if a template happens to match.

use crate::calibrate::DEFAULT_BAND_RATIO;
use crate::dtw::dtw_distance;
use crate::error::{EngineError, Result};
use crate::features::{motion_energy, STD_FLOOR};
use common::recognition::{
    ActiveThresholds, FrameUpdate, MotionState, ReasonCode, RecognizerDebug, DISTANCE_SENTINEL,
};
use ndarray::{s, Array1, Array2, Axis};
use std::collections::VecDeque;

const FAST_RISE_Z: f64 = 1.9;
const ENERGY_WINDOW: usize = 6;
const RAW_DISTANCE_HISTORY: usize = 10;

/// Construction-time parameters, typically loaded from an
/// [`common::artifact::ActionArtifact`].
#[derive(Debug, Clone)]
pub struct RecognizerConfig {
    pub thr_in: f64,
    pub thr_out: f64,
    pub windows: Vec<usize>,
    pub band_ratio: f64,
    pub feature_weights: Option<Vec<f64>>,
    pub median_len: usize,
    pub energy_p30: f64,
    pub energy_p50: f64,
    pub energy_p70: f64,
    pub smoothing_alpha: f64,
    pub count_on_entry: bool,

    /// Consecutive frames the entry condition must hold; derived from
    /// `median_len` when absent.
    pub min_frames_in: Option<usize>,

    /// Consecutive frames an exit condition must hold; derived from
    /// `median_len` when absent.
    pub min_frames_out: Option<usize>,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            thr_in: 0.5,
            thr_out: 1.0,
            windows: Vec::new(),
            band_ratio: DEFAULT_BAND_RATIO,
            feature_weights: None,
            median_len: 40,
            energy_p30: 0.2,
            energy_p50: 0.5,
            energy_p70: 1.0,
            smoothing_alpha: 0.12,
            count_on_entry: true,
            min_frames_in: None,
            min_frames_out: None,
        }
    }
}

fn clamp_round(value: f64, lo: usize, hi: usize) -> usize {
    (value.round() as usize).clamp(lo, hi)
}

/// Stateful single-action recognizer. One instance per live session; feed
/// frames in temporal order via [`OnlineRecognizer::update`].
pub struct OnlineRecognizer {
    templates: Vec<Array2<f64>>,
    max_template_len: usize,
    feature_dim: usize,
    feature_weights: Option<Array1<f64>>,

    windows: Vec<usize>,
    window_size: usize,
    band_ratio: f64,
    thr_in: f64,
    thr_out: f64,
    median_len: usize,
    energy_p30: f64,
    energy_p50: f64,
    energy_p70: f64,
    smoothing_alpha: f64,
    count_on_entry: bool,
    min_frames_in: usize,
    min_frames_out: usize,
    cooldown_after_count: usize,
    out_rearm_frames: usize,

    /// Typical template motion energy, kept for diagnostics.
    motion_energy_median: f64,

    buffer: VecDeque<Array1<f64>>,
    state: MotionState,
    reps: u64,
    frames_in_state: usize,
    smoothed_distance: f64,
    roll_values: VecDeque<f64>,
    roll_cap: usize,
    last_distances: VecDeque<f64>,
    cooldown_frames: usize,
    out_consecutive: usize,
    rearmed_ready: bool,
    prev_raw_distance: Option<f64>,
    reason: ReasonCode,
    frame_index: u64,
    repetition_frames: Vec<u64>,
}

impl OnlineRecognizer {
    /// Build a recognizer from an action's templates (raw `[T, F]`
    /// matrices). Templates are standardized in place against their global
    /// per-feature mean/std so runtime windows compare on the same scale.
    pub fn new(templates: Vec<Array2<f64>>, config: RecognizerConfig) -> Result<Self> {
        if templates.is_empty() {
            return Err(EngineError::InsufficientData(
                "recognizer needs at least one template".into(),
            ));
        }
        let feature_dim = templates[0].ncols();
        if templates.iter().any(|t| t.ncols() != feature_dim) {
            return Err(EngineError::InputShape(
                "templates disagree on feature dimension".into(),
            ));
        }
        if feature_dim == 0 || templates.iter().any(|t| t.nrows() == 0) {
            return Err(EngineError::InputShape("empty template matrix".into()));
        }

        // Global standardization across all stacked template frames.
        let total_rows: usize = templates.iter().map(|t| t.nrows()).sum();
        let mut stacked = Array2::zeros((total_rows, feature_dim));
        let mut offset = 0;
        for t in &templates {
            stacked.slice_mut(s![offset..offset + t.nrows(), ..]).assign(t);
            offset += t.nrows();
        }
        let mean = stacked
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(feature_dim));
        let std = stacked
            .std_axis(Axis(0), 0.0)
            .mapv(|v| v.max(STD_FLOOR));
        let templates: Vec<Array2<f64>> = templates
            .into_iter()
            .map(|mut t| {
                for mut row in t.rows_mut() {
                    row.zip_mut_with(&mean, |v, m| *v -= m);
                    row.zip_mut_with(&std, |v, s| *v /= s);
                }
                t
            })
            .collect();

        let energies: Vec<f64> = templates
            .iter()
            .filter(|t| t.nrows() >= 3)
            .map(|t| motion_energy(t.view()))
            .collect();
        let motion_energy_median = if energies.is_empty() {
            1.0
        } else {
            let mut sorted = energies;
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            sorted[sorted.len() / 2]
        };

        let max_template_len = templates.iter().map(|t| t.nrows()).max().unwrap_or(1);

        let mut windows: Vec<usize> = config.windows.iter().copied().filter(|&w| w > 0).collect();
        windows.sort_unstable();
        windows.dedup();
        if windows.is_empty() {
            windows.push(max_template_len.max(8));
        }
        let window_size = *windows.last().unwrap_or(&8);

        let median_len = config.median_len.max(1);
        let min_frames_in = config
            .min_frames_in
            .unwrap_or_else(|| clamp_round(0.10 * median_len as f64, 2, 10));
        let min_frames_out = config
            .min_frames_out
            .unwrap_or_else(|| clamp_round(0.05 * median_len as f64, 1, 6));
        let cooldown_after_count = clamp_round(0.40 * median_len as f64, 15, 20);
        let out_rearm_frames = clamp_round(0.40 * median_len as f64, 15, 20);

        let feature_weights = config
            .feature_weights
            .filter(|w| w.len() == feature_dim)
            .map(Array1::from_vec);

        Ok(Self {
            templates,
            max_template_len,
            feature_dim,
            feature_weights,
            windows,
            window_size,
            band_ratio: config.band_ratio,
            thr_in: config.thr_in,
            thr_out: config.thr_out,
            median_len,
            energy_p30: config.energy_p30,
            energy_p50: config.energy_p50,
            energy_p70: config.energy_p70,
            smoothing_alpha: config.smoothing_alpha,
            count_on_entry: config.count_on_entry,
            min_frames_in,
            min_frames_out,
            cooldown_after_count,
            out_rearm_frames,
            motion_energy_median,
            buffer: VecDeque::with_capacity(window_size),
            state: MotionState::Out,
            reps: 0,
            frames_in_state: 0,
            smoothed_distance: DISTANCE_SENTINEL,
            roll_values: VecDeque::new(),
            roll_cap: median_len.max(60),
            last_distances: VecDeque::with_capacity(RAW_DISTANCE_HISTORY),
            cooldown_frames: 0,
            out_consecutive: 0,
            rearmed_ready: true,
            prev_raw_distance: None,
            reason: ReasonCode::Ok,
            frame_index: 0,
            repetition_frames: Vec::new(),
        })
    }

    pub fn state(&self) -> MotionState {
        self.state
    }

    pub fn reps(&self) -> u64 {
        self.reps
    }

    pub fn templates_count(&self) -> usize {
        self.templates.len()
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn windows(&self) -> &[usize] {
        &self.windows
    }

    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    pub fn thresholds(&self) -> ActiveThresholds {
        ActiveThresholds {
            thr_in: self.thr_in,
            thr_out: self.thr_out,
        }
    }

    pub fn motion_energy_median(&self) -> f64 {
        self.motion_energy_median
    }

    /// Frame indices at which reps were credited.
    pub fn repetition_frames(&self) -> &[u64] {
        &self.repetition_frames
    }

    /// Replace the hysteresis thresholds, keeping `thr_out > thr_in`.
    pub fn update_thresholds(&mut self, thr_in: f64, thr_out: f64) {
        self.thr_in = thr_in;
        self.thr_out = thr_out.max(thr_in + 0.1);
    }

    /// Bump thresholds onto the runtime distance scale when the calibrated
    /// values are far below it, measured by pairwise template DTW.
    pub fn auto_recalibrate(&mut self) {
        if self.templates.len() < 2 {
            return;
        }
        let band = 3usize.max((self.band_ratio * self.max_template_len as f64).round() as usize);
        let mut dists = Vec::new();
        for i in 0..self.templates.len() {
            for j in (i + 1)..self.templates.len() {
                let d = dtw_distance(
                    self.templates[i].view(),
                    self.templates[j].view(),
                    band,
                    self.feature_weights.as_ref().map(Array1::view),
                    None,
                );
                if d < DISTANCE_SENTINEL {
                    dists.push(d);
                }
            }
        }
        if dists.is_empty() {
            return;
        }
        dists.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let base = dists[dists.len() / 2];
        let too_small = self.thr_in < 0.5 * base || self.thr_out < 0.6 * base;
        if too_small {
            let new_in = (0.75 * base).max(0.1);
            let new_out = (1.35 * base).max(new_in + 0.2);
            tracing::info!(
                base,
                thr_in = self.thr_in,
                thr_out = self.thr_out,
                new_in,
                new_out,
                "recalibrating thresholds to runtime distance scale"
            );
            self.update_thresholds(new_in, new_out);
        }
    }

    /// Feed one online feature vector. Frames must arrive in temporal order.
    pub fn update(&mut self, features: &[f64]) -> Result<FrameUpdate> {
        if features.len() != self.feature_dim {
            return Err(EngineError::InputShape(format!(
                "expected {} features, got {}",
                self.feature_dim,
                features.len()
            )));
        }

        self.frame_index += 1;
        if self.buffer.len() >= self.window_size {
            self.buffer.pop_front();
        }
        self.buffer.push_back(Array1::from_iter(features.iter().copied()));

        if self.buffer.len() < self.window_size / 2 {
            let debug = RecognizerDebug {
                buffer_size: self.buffer.len(),
                rearmed_ready: self.rearmed_ready,
                cooldown_frames: self.cooldown_frames,
                ..RecognizerDebug::default()
            };
            return Ok(self.output(DISTANCE_SENTINEL, debug));
        }

        // Z-score within the window only; absorbs slow drift that the
        // offline template standardization cannot see at inference time.
        let rows = self.buffer.len();
        let mut window = Array2::zeros((rows, self.feature_dim));
        for (i, frame) in self.buffer.iter().enumerate() {
            window.row_mut(i).assign(frame);
        }
        let mean = window
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(self.feature_dim));
        let std = window
            .std_axis(Axis(0), 0.0)
            .mapv(|v| v.max(STD_FLOOR));
        for mut row in window.rows_mut() {
            row.zip_mut_with(&mean, |v, m| *v -= m);
            row.zip_mut_with(&std, |v, s| *v /= s);
        }

        let energy = if rows >= 4 {
            let recent = rows.min(ENERGY_WINDOW);
            motion_energy(window.slice(s![rows - recent.., ..]))
        } else {
            0.0
        };

        // Multi-window DTW against every template; global minimum wins.
        let mut all_distances = Vec::new();
        for &w in &self.windows {
            if rows < 8.max(w / 2) {
                continue;
            }
            let take = w.min(rows);
            let seq = window.slice(s![rows - take.., ..]);
            let band = 3usize.max(
                (self.band_ratio * take.max(self.max_template_len) as f64).round() as usize,
            );
            for template in &self.templates {
                let d = dtw_distance(
                    seq,
                    template.view(),
                    band,
                    self.feature_weights.as_ref().map(Array1::view),
                    None,
                );
                all_distances.push(d);
            }
        }
        let min_dist = all_distances
            .iter()
            .copied()
            .fold(DISTANCE_SENTINEL, f64::min);

        if self.smoothed_distance >= DISTANCE_SENTINEL {
            self.smoothed_distance = min_dist;
        } else {
            self.smoothed_distance = self.smoothing_alpha * self.smoothed_distance
                + (1.0 - self.smoothing_alpha) * min_dist;
        }

        // Rolling z-score over raw distances.
        self.roll_values.push_back(min_dist);
        if self.roll_values.len() > self.roll_cap {
            self.roll_values.pop_front();
        }
        let n = self.roll_values.len() as f64;
        let mu = self.roll_values.iter().sum::<f64>() / n;
        let sigma =
            (self.roll_values.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / n).sqrt();
        let z = (min_dist - mu) / sigma.max(STD_FLOOR);

        let dist_delta = self.prev_raw_distance.map(|p| min_dist - p).unwrap_or(0.0);
        self.prev_raw_distance = Some(min_dist);
        self.last_distances.push_back(min_dist);
        if self.last_distances.len() > RAW_DISTANCE_HISTORY {
            self.last_distances.pop_front();
        }
        let avg_distance = if self.last_distances.is_empty() {
            DISTANCE_SENTINEL
        } else {
            self.last_distances.iter().sum::<f64>() / self.last_distances.len() as f64
        };

        self.step_state_machine(min_dist, self.smoothed_distance, energy, z);

        let debug = RecognizerDebug {
            buffer_size: self.buffer.len(),
            min_distance_raw: min_dist,
            min_distance_smoothed: self.smoothed_distance,
            all_distances,
            frames_in_state: self.frames_in_state,
            motion_energy: energy,
            dist_delta,
            avg_distance,
            cooldown_frames: self.cooldown_frames,
            rearmed_ready: self.rearmed_ready,
            z,
            reason_code: self.reason,
        };
        Ok(self.output(self.smoothed_distance, debug))
    }

    fn step_state_machine(&mut self, raw: f64, smooth: f64, energy: f64, z: f64) {
        if self.cooldown_frames > 0 {
            self.cooldown_frames -= 1;
        }

        match self.state {
            MotionState::Out => {
                self.out_consecutive += 1;
                if self.out_consecutive >= self.out_rearm_frames || energy >= self.energy_p70 {
                    self.rearmed_ready = true;
                }

                let rearmed = self.rearmed_ready || self.reps == 0;
                let cooling = self.cooldown_frames > 0;
                let below_threshold = smooth <= self.thr_in;
                let energy_ok = energy >= self.energy_p50;

                if !cooling && rearmed && below_threshold && energy_ok {
                    self.frames_in_state += 1;
                    self.reason = ReasonCode::Ok;
                    if self.frames_in_state >= self.min_frames_in {
                        self.state = MotionState::In;
                        self.frames_in_state = 0;
                        self.rearmed_ready = false;
                        self.out_consecutive = 0;
                        if self.count_on_entry {
                            self.credit_rep();
                        }
                    }
                } else {
                    self.frames_in_state = 0;
                    self.reason = if cooling {
                        ReasonCode::Cooling
                    } else if !rearmed {
                        ReasonCode::NoRearm
                    } else if !below_threshold {
                        ReasonCode::NoEnterThreshold
                    } else {
                        ReasonCode::LowEnergy
                    };
                }
            }
            MotionState::In => {
                self.out_consecutive = 0;
                let fast_rise = z > FAST_RISE_Z;
                let exit_counted =
                    (raw >= self.thr_out || fast_rise) && !self.count_on_entry;
                let exit_uncounted = energy < self.energy_p30 && !exit_counted;

                if exit_counted || exit_uncounted {
                    self.frames_in_state += 1;
                    self.reason = ReasonCode::Ok;
                    if self.frames_in_state >= self.min_frames_out {
                        self.state = MotionState::Out;
                        self.frames_in_state = 0;
                        if exit_counted {
                            self.credit_rep();
                        } else {
                            self.reason = ReasonCode::LowEnergy;
                        }
                    }
                } else {
                    self.frames_in_state = 0;
                    self.reason = ReasonCode::Ok;
                }
            }
        }
    }

    fn credit_rep(&mut self) {
        self.reps += 1;
        self.cooldown_frames = self.cooldown_after_count;
        self.repetition_frames.push(self.frame_index);
        self.reason = ReasonCode::Counted;
    }

    fn output(&self, distance: f64, debug: RecognizerDebug) -> FrameUpdate {
        FrameUpdate {
            state: self.state,
            reps: self.reps,
            distance,
            thresholds: self.thresholds(),
            debug,
        }
    }

    /// Clear all per-stream state; the templates and configuration stay.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.state = MotionState::Out;
        self.reps = 0;
        self.frames_in_state = 0;
        self.smoothed_distance = DISTANCE_SENTINEL;
        self.roll_values.clear();
        self.last_distances.clear();
        self.cooldown_frames = 0;
        self.out_consecutive = 0;
        self.rearmed_ready = true;
        self.prev_raw_distance = None;
        self.reason = ReasonCode::Ok;
        self.frame_index = 0;
        self.repetition_frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn wave_template(frames: usize, dims: usize, phase: f64) -> Array2<f64> {
        Array2::from_shape_fn((frames, dims), |(t, f)| {
            ((t as f64 / frames as f64) * std::f64::consts::TAU + phase + f as f64 * 0.2).sin()
        })
    }

    fn test_config() -> RecognizerConfig {
        RecognizerConfig {
            thr_in: 0.8,
            thr_out: 1.4,
            windows: vec![10, 16, 20],
            median_len: 30,
            energy_p30: 0.05,
            energy_p50: 0.1,
            energy_p70: 0.5,
            ..RecognizerConfig::default()
        }
    }

    fn build() -> OnlineRecognizer {
        let templates = vec![
            wave_template(30, 4, 0.0),
            wave_template(30, 4, 0.1),
        ];
        OnlineRecognizer::new(templates, test_config()).unwrap()
    }

    #[test]
    fn empty_templates_rejected() {
        let err = OnlineRecognizer::new(Vec::new(), test_config()).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientData(_)));
    }

    #[test]
    fn dimension_mismatch_rejected_per_frame() {
        let mut rec = build();
        let err = rec.update(&[0.0; 3]).unwrap_err();
        assert!(matches!(err, EngineError::InputShape(_)));
    }

    #[test]
    fn warmup_frames_return_sentinel() {
        let mut rec = build();
        let update = rec.update(&[0.0; 4]).unwrap();
        assert_eq!(update.distance, DISTANCE_SENTINEL);
        assert_eq!(update.state, MotionState::Out);
        assert_eq!(update.reps, 0);
    }

    #[test]
    fn reps_are_monotone_and_bounded_per_frame() {
        let mut rec = build();
        let mut last = 0;
        for t in 0..300 {
            let phase = t as f64 / 30.0 * std::f64::consts::TAU;
            let frame: Vec<f64> = (0..4).map(|f| (phase + f as f64 * 0.2).sin()).collect();
            let update = rec.update(&frame).unwrap();
            assert!(update.reps >= last);
            assert!(update.reps - last <= 1);
            last = update.reps;
        }
    }

    #[test]
    fn static_input_never_counts() {
        let mut rec = build();
        for _ in 0..200 {
            let update = rec.update(&[0.3; 4]).unwrap();
            assert_eq!(update.reps, 0);
            assert_eq!(update.state, MotionState::Out);
        }
    }

    #[test]
    fn energy_gate_blocks_entry_below_median_energy() {
        let mut rec = build();
        for t in 0..200 {
            let phase = t as f64 / 30.0 * std::f64::consts::TAU;
            let frame: Vec<f64> = (0..4).map(|f| (phase + f as f64 * 0.2).sin()).collect();
            let update = rec.update(&frame).unwrap();
            if update.state == MotionState::Out && update.debug.motion_energy < rec.energy_p50 {
                // Entry requires the median energy gate; such frames must
                // not have counted.
                assert_ne!(update.debug.reason_code, ReasonCode::Counted);
            }
        }
    }

    #[test]
    fn cooldown_separates_counts() {
        let mut rec = build();
        let mut count_frames = Vec::new();
        for t in 0..600 {
            let phase = t as f64 / 30.0 * std::f64::consts::TAU;
            let frame: Vec<f64> = (0..4).map(|f| (phase + f as f64 * 0.2).sin()).collect();
            let update = rec.update(&frame).unwrap();
            if update.debug.reason_code == ReasonCode::Counted {
                count_frames.push(t);
            }
        }
        for pair in count_frames.windows(2) {
            assert!(pair[1] - pair[0] >= rec.cooldown_after_count);
        }
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut rec = build();
        for t in 0..120 {
            let phase = t as f64 / 30.0 * std::f64::consts::TAU;
            let frame: Vec<f64> = (0..4).map(|f| (phase + f as f64 * 0.2).sin()).collect();
            rec.update(&frame).unwrap();
        }
        rec.reset();
        assert_eq!(rec.reps(), 0);
        assert_eq!(rec.state(), MotionState::Out);
        assert!(rec.repetition_frames().is_empty());
        let update = rec.update(&[0.0; 4]).unwrap();
        assert_eq!(update.distance, DISTANCE_SENTINEL);
    }

    #[test]
    fn update_thresholds_keeps_gap() {
        let mut rec = build();
        rec.update_thresholds(0.9, 0.5);
        let thresholds = rec.thresholds();
        assert!(thresholds.thr_out >= thresholds.thr_in + 0.1);
    }

    #[test]
    fn auto_recalibrate_lifts_tiny_thresholds() {
        let templates = vec![wave_template(30, 4, 0.0), wave_template(30, 4, 0.8)];
        let config = RecognizerConfig {
            thr_in: 1e-6,
            thr_out: 1e-5,
            ..test_config()
        };
        let mut rec = OnlineRecognizer::new(templates, config).unwrap();
        rec.auto_recalibrate();
        let thresholds = rec.thresholds();
        assert!(thresholds.thr_in >= 0.1);
        assert!(thresholds.thr_out > thresholds.thr_in);
    }
}

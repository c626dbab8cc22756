//! Learned action artifacts: templates, thresholds, and calibration metadata.
//!
//! An [`ActionArtifact`] is the opaque bundle the learning pipeline emits for
//! one motion and the only thing the live engine needs to recognize it.
//! Artifacts are created once at finalize time and are read-only afterwards.

use serde::{Deserialize, Serialize};

/// A time-normalized, z-scored `T x F` matrix representing one physical
/// repetition extracted from a demo sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    /// Number of rows after time normalization (shared by all templates of
    /// the same action).
    #[serde(rename = "T")]
    pub length: usize,

    /// Feature dimension per row.
    #[serde(rename = "F")]
    pub feature_dim: usize,

    /// Row-major `length x feature_dim` matrix, z-scored per feature
    /// dimension across time.
    pub data: Vec<Vec<f64>>,

    /// Segment length in frames before resampling.
    pub original_length: usize,

    /// First frame of the source segment in the demo sequence.
    pub start_frame: usize,

    /// One past the last frame of the source segment.
    pub end_frame: usize,
}

/// Hysteresis thresholds for the online recognizer. `median` and `iqr` are
/// diagnostic metadata only; behavior is governed by `thr_in`/`thr_out`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Thresholds {
    pub thr_in: f64,
    pub thr_out: f64,
    pub median: f64,
    pub iqr: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            thr_in: 0.5,
            thr_out: 1.0,
            median: 0.75,
            iqr: 0.25,
        }
    }
}

/// Motion-energy percentiles across an action's templates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EnergyStats {
    pub p30: f64,
    pub p50: f64,
    pub p70: f64,
}

impl Default for EnergyStats {
    fn default() -> Self {
        Self {
            p30: 0.2,
            p50: 0.5,
            p70: 1.0,
        }
    }
}

fn default_band_ratio() -> f64 {
    0.15
}

/// The persisted bundle for one learned motion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionArtifact {
    pub templates: Vec<Template>,

    pub thresholds: Thresholds,

    /// Median template length in frames.
    pub median_len: usize,

    /// Ascending DTW window sizes derived from `median_len`.
    pub windows: Vec<usize>,

    /// Sakoe-Chiba band as a fraction of the longer sequence.
    #[serde(default = "default_band_ratio")]
    pub band_ratio: f64,

    /// Non-negative, L1-normalized per-feature weights.
    pub feature_weights: Vec<f64>,

    pub energy_p30: f64,
    pub energy_p50: f64,
    pub energy_p70: f64,

    /// Online feature dimension (static features + velocity).
    pub feature_dim: usize,

    /// Seed used for the calibration negative proxy, derived from the action
    /// id so that calibration is reproducible.
    pub calibration_seed: u64,
}

impl ActionArtifact {
    pub fn energy_stats(&self) -> EnergyStats {
        EnergyStats {
            p30: self.energy_p30,
            p50: self.energy_p50,
            p70: self.energy_p70,
        }
    }
}

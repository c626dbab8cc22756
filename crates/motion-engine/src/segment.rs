//! Automatic repetition segmentation of a demo feature sequence.
//!
//! Two detectors run over the `[T, F]` sequence: one looks for low-velocity
//! valleys between repetitions, the other for motion-energy peaks with
//! minima between them. Their outputs are merged, short fragments dropped,
//! and leading/trailing gaps filled so the segments cover the sequence.

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Half-open `[start, end)` interval over a feature sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub start: usize,
    pub end: usize,
}

impl Segment {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmenterConfig {
    /// Minimum frames per repetition.
    #[serde(default = "default_min_segment_length")]
    pub min_segment_length: usize,

    /// Maximum frames per repetition.
    #[serde(default = "default_max_segment_length")]
    pub max_segment_length: usize,

    /// Z-score below `-velocity_threshold` marks a low-velocity boundary.
    #[serde(default = "default_velocity_threshold")]
    pub velocity_threshold: f64,

    /// Minimum z-scored energy for a peak to count as a repetition apex.
    #[serde(default = "default_energy_threshold")]
    pub energy_threshold: f64,

    /// Window for signal smoothing and windowed variance.
    #[serde(default = "default_smoothing_window")]
    pub smoothing_window: usize,
}

fn default_min_segment_length() -> usize {
    15
}

fn default_max_segment_length() -> usize {
    180
}

fn default_velocity_threshold() -> f64 {
    0.5
}

fn default_energy_threshold() -> f64 {
    0.3
}

fn default_smoothing_window() -> usize {
    5
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            min_segment_length: default_min_segment_length(),
            max_segment_length: default_max_segment_length(),
            velocity_threshold: default_velocity_threshold(),
            energy_threshold: default_energy_threshold(),
            smoothing_window: default_smoothing_window(),
        }
    }
}

/// Split a feature sequence into repetition intervals. Sequences shorter
/// than two minimum segments come back as one trivial segment.
pub fn auto_segment(seq: ArrayView2<'_, f64>, config: &SegmenterConfig) -> Vec<Segment> {
    let t = seq.nrows();
    if t == 0 {
        return Vec::new();
    }
    if t < config.min_segment_length * 2 {
        return vec![Segment { start: 0, end: t - 1 }];
    }

    let velocity_segments = segment_by_velocity(seq, config);
    let energy_segments = segment_by_energy(seq, config);

    combine_segments(
        velocity_segments,
        energy_segments,
        t,
        config.min_segment_length,
    )
}

fn row_delta_norm(seq: ArrayView2<'_, f64>, i: usize) -> f64 {
    let delta = &seq.row(i + 1) - &seq.row(i);
    delta.mapv(|v| v * v).sum().sqrt()
}

fn z_score_signal(signal: &mut [f64]) {
    let n = signal.len() as f64;
    if n == 0.0 {
        return;
    }
    let mean = signal.iter().sum::<f64>() / n;
    let var = signal.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = var.sqrt() + 1e-6;
    for v in signal.iter_mut() {
        *v = (*v - mean) / std;
    }
}

/// Savitzky-Golay smoothing, window 5, quadratic. Edges are handled by
/// replicate padding.
fn savgol5(signal: &[f64]) -> Vec<f64> {
    const KERNEL: [f64; 5] = [-3.0, 12.0, 17.0, 12.0, -3.0];
    const NORM: f64 = 35.0;
    let n = signal.len();
    if n < 5 {
        return signal.to_vec();
    }
    let at = |i: isize| -> f64 {
        let clamped = i.clamp(0, n as isize - 1) as usize;
        signal[clamped]
    };
    (0..n as isize)
        .map(|i| {
            KERNEL
                .iter()
                .enumerate()
                .map(|(k, c)| c * at(i + k as isize - 2))
                .sum::<f64>()
                / NORM
        })
        .collect()
}

fn segment_by_velocity(seq: ArrayView2<'_, f64>, config: &SegmenterConfig) -> Vec<Segment> {
    let t = seq.nrows();
    let mut velocity: Vec<f64> = (0..t - 1).map(|i| row_delta_norm(seq, i)).collect();
    if velocity.len() > config.smoothing_window {
        velocity = savgol5(&velocity);
    }
    z_score_signal(&mut velocity);

    let min_len = config.min_segment_length;
    let low_mask: Vec<bool> = velocity.iter().map(|&v| v < -config.velocity_threshold).collect();

    // Segment boundaries sit at entries into low-velocity regions.
    let mut segments = Vec::new();
    let mut in_low_region = false;
    let mut start_idx = 0usize;
    for (i, &is_low) in low_mask.iter().enumerate() {
        if is_low && !in_low_region {
            if i - start_idx >= min_len {
                segments.push(Segment { start: start_idx, end: i });
            }
            start_idx = i;
            in_low_region = true;
        } else if !is_low && in_low_region {
            start_idx = i;
            in_low_region = false;
        }
    }
    if velocity.len() - start_idx >= min_len {
        segments.push(Segment {
            start: start_idx,
            end: velocity.len(),
        });
    }

    segments.retain(|s| s.len() >= min_len && s.len() <= config.max_segment_length);
    segments
}

/// Variance of every element in `seq[start..end]`.
fn block_variance(seq: ArrayView2<'_, f64>, start: usize, end: usize) -> f64 {
    let block = seq.slice(ndarray::s![start..end, ..]);
    let n = block.len() as f64;
    if n == 0.0 {
        return 0.0;
    }
    let mean = block.sum() / n;
    block.mapv(|v| (v - mean).powi(2)).sum() / n
}

/// Local maxima at least `height` tall with at least `min_distance` frames
/// between kept peaks; taller peaks win ties.
fn find_peaks(signal: &[f64], height: f64, min_distance: usize) -> Vec<usize> {
    let n = signal.len();
    let mut candidates: Vec<usize> = (1..n.saturating_sub(1))
        .filter(|&i| signal[i] > signal[i - 1] && signal[i] >= signal[i + 1] && signal[i] >= height)
        .collect();
    candidates.sort_by(|&a, &b| {
        signal[b]
            .partial_cmp(&signal[a])
            .unwrap_or(Ordering::Equal)
    });

    let mut kept: Vec<usize> = Vec::new();
    for idx in candidates {
        if kept
            .iter()
            .all(|&k| idx.abs_diff(k) >= min_distance.max(1))
        {
            kept.push(idx);
        }
    }
    kept.sort_unstable();
    kept
}

fn min_value(signal: &[f64]) -> f64 {
    signal.iter().copied().fold(f64::INFINITY, f64::min)
}

fn argmin_first(signal: &[f64]) -> usize {
    let min = min_value(signal);
    signal.iter().position(|&v| v == min).unwrap_or(0)
}

fn argmin_last(signal: &[f64]) -> usize {
    let min = min_value(signal);
    signal.iter().rposition(|&v| v == min).unwrap_or(0)
}

fn segment_by_energy(seq: ArrayView2<'_, f64>, config: &SegmenterConfig) -> Vec<Segment> {
    let t = seq.nrows();
    let window = config.smoothing_window.max(3);
    let half = window / 2;

    let mut energy: Vec<f64> = (0..t)
        .map(|i| {
            let start = i.saturating_sub(half);
            let end = (i + half + 1).min(t);
            block_variance(seq, start, end)
        })
        .collect();
    if energy.len() > config.smoothing_window {
        energy = savgol5(&energy);
    }
    z_score_signal(&mut energy);

    let peaks = find_peaks(
        &energy,
        config.energy_threshold,
        config.min_segment_length / 2,
    );
    if peaks.len() < 2 {
        return vec![Segment {
            start: 0,
            end: energy.len() - 1,
        }];
    }

    // Boundaries sit at the energy minima between consecutive peaks. A flat
    // low-energy valley (a rest between repetitions) has many minima: the
    // segment before it ends at the first one, the segment after starts at
    // the last one, so the rest itself separates distinct repetitions
    // instead of gluing them together at the merge step.
    let mut segments = Vec::new();
    for (i, &peak) in peaks.iter().enumerate() {
        let start = if i == 0 {
            0
        } else {
            let prev = peaks[i - 1];
            prev + argmin_last(&energy[prev..peak])
        };
        let end = if i == peaks.len() - 1 {
            energy.len() - 1
        } else {
            let next = peaks[i + 1];
            peak + argmin_first(&energy[peak..next])
        };
        if end.saturating_sub(start) >= config.min_segment_length {
            segments.push(Segment { start, end });
        }
    }
    segments
}

fn combine_segments(
    velocity_segments: Vec<Segment>,
    energy_segments: Vec<Segment>,
    total_length: usize,
    min_length: usize,
) -> Vec<Segment> {
    let mut all: Vec<Segment> = velocity_segments
        .into_iter()
        .chain(energy_segments)
        .collect();
    if all.is_empty() {
        return vec![Segment {
            start: 0,
            end: total_length - 1,
        }];
    }
    all.sort_by_key(|s| s.start);

    // Merge overlapping or nearly-adjacent segments.
    let mut merged = Vec::new();
    let mut current = all[0];
    for seg in all.into_iter().skip(1) {
        if seg.start <= current.end + min_length / 2 {
            current.end = current.end.max(seg.end);
        } else {
            if current.len() >= min_length {
                merged.push(current);
            }
            current = seg;
        }
    }
    if current.len() >= min_length {
        merged.push(current);
    }

    if merged.is_empty() {
        return vec![Segment {
            start: 0,
            end: total_length - 1,
        }];
    }

    // Cover leading/trailing gaps.
    let mut final_segments = Vec::new();
    if merged[0].start > 0 {
        final_segments.push(Segment {
            start: 0,
            end: merged[0].start,
        });
    }
    final_segments.extend(merged.iter().copied());
    if let Some(last) = merged.last() {
        if last.end < total_length - 1 {
            final_segments.push(Segment {
                start: last.end,
                end: total_length - 1,
            });
        }
    }
    final_segments
}

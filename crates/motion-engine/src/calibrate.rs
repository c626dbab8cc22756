//! Threshold and parameter calibration from an action's templates.
//!
//! Builds positive (template vs template) and negative (template vs
//! time-permuted self) DTW distance distributions, picks the threshold that
//! maximizes Youden's J, and derives the hysteresis margins, window sizes,
//! feature weights and motion-energy percentiles the online recognizer
//! consumes. The negative-proxy RNG is seeded from the action id so
//! calibration is reproducible; the seed is recorded in the artifact.

use crate::dtw::dtw_distance;
use crate::features::motion_energy;
use crate::template::{median_length, template_matrix};
use common::artifact::{Template, Thresholds};
use common::recognition::DISTANCE_SENTINEL;
use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

pub const DEFAULT_BAND_RATIO: f64 = 0.15;

const DEFAULT_MEDIAN_LEN: usize = 40;

/// Everything the calibrator derives for one action (the artifact minus the
/// templates themselves).
#[derive(Debug, Clone)]
pub struct CalibrationOutcome {
    pub thresholds: Thresholds,
    pub median_len: usize,
    pub windows: Vec<usize>,
    pub feature_weights: Vec<f64>,
    pub energy_p30: f64,
    pub energy_p50: f64,
    pub energy_p70: f64,
    pub seed: u64,
}

/// Stable 64-bit seed from an action id (FNV-1a over the id bytes).
pub fn derive_seed(action_id: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in action_id.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Three ascending DTW window sizes at roughly 30/50/70% of the median
/// template length, each clamped to a practical range.
pub fn derive_windows(median_len: usize) -> Vec<usize> {
    let scaled = |ratio: f64, lo: usize, hi: usize| -> usize {
        ((ratio * median_len as f64).round() as usize).clamp(lo, hi)
    };
    let mut windows = vec![
        scaled(0.3, 10, 32),
        scaled(0.5, 16, 48),
        scaled(0.7, 20, 56),
    ];
    windows.sort_unstable();
    windows.dedup();
    windows
}

/// Linear-interpolation percentile (numpy-style) of unsorted values,
/// `q` in [0, 100].
pub fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = q.clamp(0.0, 100.0) / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] * (1.0 - frac) + sorted[hi] * frac
}

/// Discriminability-over-stability feature weights:
/// `w_f = |mu_pos - mu_neg| / (1 + var_pos)`, clamped non-negative and
/// L1-normalized. Falls back to `1 / (1 + var_pos)` without usable
/// negatives and to uniform when degenerate.
pub fn feature_weights(pos: ArrayView2<'_, f64>, neg: Option<ArrayView2<'_, f64>>) -> Vec<f64> {
    let f = pos.ncols();
    if pos.nrows() == 0 || f == 0 {
        return vec![1.0];
    }
    let mu_pos = pos
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(f));
    let var_pos = pos.var_axis(Axis(0), 0.0);

    let raw: Array1<f64> = match neg.filter(|n| n.nrows() > 0 && n.ncols() == f) {
        Some(neg) => {
            let mu_neg = neg
                .mean_axis(Axis(0))
                .unwrap_or_else(|| Array1::zeros(f));
            let disc = (&mu_pos - &mu_neg).mapv(f64::abs);
            &disc / &var_pos.mapv(|v| 1.0 + v)
        }
        None => var_pos.mapv(|v| 1.0 / (1.0 + v)),
    };

    let clamped = raw.mapv(|w| w.max(0.0));
    let sum = clamped.sum();
    if sum <= 1e-8 {
        return vec![1.0 / f as f64; f];
    }
    (clamped / sum).to_vec()
}

/// Threshold maximizing Youden's J = TPR - FPR, scanned over 200 quantiles
/// of the pooled distance distributions.
pub fn pick_threshold(dist_pos: &[f64], dist_neg: &[f64]) -> f64 {
    let pooled: Vec<f64> = dist_pos.iter().chain(dist_neg).copied().collect();
    if pooled.is_empty() {
        return 0.0;
    }
    let candidates: Vec<f64> = (0..200)
        .map(|i| percentile(&pooled, i as f64 * 100.0 / 199.0))
        .collect();

    let frac_below = |xs: &[f64], t: f64| -> f64 {
        if xs.is_empty() {
            return 0.0;
        }
        xs.iter().filter(|&&x| x <= t).count() as f64 / xs.len() as f64
    };

    let mut best = -1.0;
    let mut threshold = candidates[candidates.len() / 2];
    for &t in &candidates {
        let j = frac_below(dist_pos, t) - frac_below(dist_neg, t);
        if j > best {
            best = j;
            threshold = t;
        }
    }
    threshold
}

/// Crop the middle `w` rows of a template matrix (or all of it if shorter).
fn mid_window(matrix: &Array2<f64>, w: usize) -> ArrayView2<'_, f64> {
    let t = matrix.nrows();
    if t <= w {
        return matrix.view();
    }
    let start = t / 2 - w / 2;
    matrix.slice(s![start..start + w, ..])
}

fn pos_neg_distances(
    arrays: &[Array2<f64>],
    windows: &[usize],
    weights: &Array1<f64>,
    rng: &mut StdRng,
) -> (Vec<f64>, Vec<f64>) {
    let w = windows.iter().copied().max().unwrap_or_else(|| {
        arrays.first().map(|a| a.nrows()).unwrap_or(DEFAULT_MEDIAN_LEN)
    });
    let band = 3usize.max((DEFAULT_BAND_RATIO * w as f64).round() as usize);

    // Positive: mid-windows of distinct template pairs.
    let mut pos = Vec::new();
    for i in 0..arrays.len() {
        for j in (i + 1)..arrays.len() {
            let a = mid_window(&arrays[i], w);
            let b = mid_window(&arrays[j], w);
            let d = dtw_distance(a, b, band, Some(weights.view()), None);
            if d < DISTANCE_SENTINEL {
                pos.push(d);
            }
        }
    }

    // Negative: each template against a time-permuted copy of itself, a
    // proxy for off-motion structure.
    let mut neg = Vec::new();
    for a in arrays {
        let mut order: Vec<usize> = (0..a.nrows()).collect();
        order.shuffle(rng);
        let permuted = Array2::from_shape_fn(a.raw_dim(), |(i, j)| a[[order[i], j]]);
        let rows = a.nrows().min(w);
        let ai = a.slice(s![..rows, ..]);
        let bi = permuted.slice(s![..rows, ..]);
        let d = dtw_distance(ai, bi, band, Some(weights.view()), None);
        if d < DISTANCE_SENTINEL {
            neg.push(d);
        }
    }

    (pos, neg)
}

/// Derive the full runtime configuration for one action from its templates.
/// With fewer than two templates the thresholds fall back to defaults; the
/// artifact is still valid for inference but should be treated as unseeded.
pub fn calibrate(templates: &[Template], action_id: &str) -> CalibrationOutcome {
    let seed = derive_seed(action_id);
    let mut rng = StdRng::seed_from_u64(seed);

    let lengths: Vec<usize> = templates.iter().map(|t| t.length).collect();
    let median_len = median_length(&lengths).unwrap_or(DEFAULT_MEDIAN_LEN);
    let windows = derive_windows(median_len);

    let arrays: Vec<Array2<f64>> = templates.iter().map(template_matrix).collect();

    // Stacked positive frames; negatives are a seeded row permutation.
    let feature_dim = arrays.first().map(|a| a.ncols()).unwrap_or(0);
    let total_rows: usize = arrays.iter().map(|a| a.nrows()).sum();
    let mut pos_concat = Array2::zeros((total_rows, feature_dim));
    let mut offset = 0;
    for a in &arrays {
        pos_concat
            .slice_mut(s![offset..offset + a.nrows(), ..])
            .assign(a);
        offset += a.nrows();
    }
    let mut row_order: Vec<usize> = (0..total_rows).collect();
    row_order.shuffle(&mut rng);
    let neg_concat =
        Array2::from_shape_fn(pos_concat.raw_dim(), |(i, j)| pos_concat[[row_order[i], j]]);

    let weights = feature_weights(pos_concat.view(), Some(neg_concat.view()));
    let weights_arr = Array1::from_vec(weights.clone());

    let energies: Vec<f64> = arrays
        .iter()
        .filter(|a| a.nrows() >= 3)
        .map(|a| motion_energy(a.view()))
        .collect();
    let (energy_p30, energy_p50, energy_p70) = if energies.is_empty() {
        (0.2, 0.5, 1.0)
    } else {
        (
            percentile(&energies, 30.0),
            percentile(&energies, 50.0),
            percentile(&energies, 70.0),
        )
    };

    let thresholds = if templates.len() >= 2 {
        let (pos, neg) = pos_neg_distances(&arrays, &windows, &weights_arr, &mut rng);
        let thr = pick_threshold(&pos, &neg);
        if thr.is_finite() && thr > 0.0 {
            let pooled: Vec<f64> = pos.iter().chain(neg.iter()).copied().collect();
            let iqr = percentile(&pooled, 75.0) - percentile(&pooled, 25.0);
            Thresholds {
                thr_in: 0.75 * thr,
                thr_out: 1.35 * thr,
                median: thr,
                iqr,
            }
        } else {
            tracing::warn!(
                action_id,
                "degenerate distance distributions, using default thresholds"
            );
            Thresholds::default()
        }
    } else {
        tracing::info!(
            action_id,
            templates = templates.len(),
            "too few templates for calibration, using default thresholds"
        );
        Thresholds::default()
    };

    CalibrationOutcome {
        thresholds,
        median_len,
        windows,
        feature_weights: weights,
        energy_p30,
        energy_p50,
        energy_p70,
        seed,
    }
}

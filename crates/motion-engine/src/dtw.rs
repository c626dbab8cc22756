//! Dynamic time warping with a Sakoe-Chiba band, weighted/masked frame cost
//! and an LB_Keogh lower bound.
//!
//! Distances are normalized by the longer sequence length so different
//! window sizes stay comparable. Dimension mismatches and unreachable band
//! corners return [`DISTANCE_SENTINEL`] rather than failing.

use common::recognition::DISTANCE_SENTINEL;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// Weighted/masked Euclidean cost between two frames. `weights` must
/// already be prepared via [`prepare_weights`].
fn frame_cost(
    a: ArrayView1<'_, f64>,
    b: ArrayView1<'_, f64>,
    weights: Option<&Array1<f64>>,
    mask: Option<ArrayView1<'_, f64>>,
) -> f64 {
    let mut sum = 0.0;
    for i in 0..a.len() {
        let mut d = a[i] - b[i];
        if let Some(m) = mask {
            d *= m[i];
        }
        if let Some(w) = weights {
            d *= w[i];
        }
        sum += d * d;
    }
    sum.sqrt()
}

/// L1-normalize non-negative weights and take the square root, so squared
/// frame costs weigh each feature by `w / sum(w)`.
fn prepare_weights(weights: ArrayView1<'_, f64>) -> Array1<f64> {
    let clamped = weights.mapv(|w| w.max(0.0));
    let sum = clamped.sum();
    if sum > 0.0 {
        clamped.mapv(|w| (w / sum).sqrt())
    } else {
        clamped.mapv(f64::sqrt)
    }
}

fn dtw_pass(
    a: ArrayView2<'_, f64>,
    b: ArrayView2<'_, f64>,
    band: Option<usize>,
    weights: Option<&Array1<f64>>,
    mask: Option<ArrayView1<'_, f64>>,
) -> f64 {
    let (ta, tb) = (a.nrows(), b.nrows());
    let mut dp = Array2::from_elem((ta + 1, tb + 1), DISTANCE_SENTINEL);
    dp[[0, 0]] = 0.0;

    for i in 1..=ta {
        let (j_start, j_end) = match band {
            Some(w) => (i.saturating_sub(w).max(1), (i + w).min(tb)),
            None => (1, tb),
        };
        if j_start > j_end {
            continue;
        }
        let ai = a.row(i - 1);
        for j in j_start..=j_end {
            let cost = frame_cost(ai, b.row(j - 1), weights, mask);
            let best = dp[[i - 1, j]].min(dp[[i, j - 1]]).min(dp[[i - 1, j - 1]]);
            dp[[i, j]] = cost + best;
        }
    }
    dp[[ta, tb]]
}

/// Banded DTW distance between `[TA, F]` and `[TB, F]` sequences,
/// normalized by `max(TA, TB)`.
///
/// The band is widened to `max(band, |TA - TB| + 1, 3)` so the corner stays
/// reachable; if a numeric corner case still leaves it unreachable, a full
/// unbanded pass is used as fallback, and [`DISTANCE_SENTINEL`] is returned
/// only if that fails too (or on dimension mismatch).
pub fn dtw_distance(
    a: ArrayView2<'_, f64>,
    b: ArrayView2<'_, f64>,
    band: usize,
    weights: Option<ArrayView1<'_, f64>>,
    mask: Option<ArrayView1<'_, f64>>,
) -> f64 {
    let (ta, fa) = a.dim();
    let (tb, fb) = b.dim();
    if fa != fb || ta == 0 || tb == 0 {
        return DISTANCE_SENTINEL;
    }

    let band = band.max(3).max(ta.abs_diff(tb) + 1);
    let prepared = weights.map(prepare_weights);

    let banded = dtw_pass(a, b, Some(band), prepared.as_ref(), mask);
    let total = if banded >= DISTANCE_SENTINEL {
        dtw_pass(a, b, None, prepared.as_ref(), mask)
    } else {
        banded
    };
    if total >= DISTANCE_SENTINEL {
        return DISTANCE_SENTINEL;
    }
    total / ta.max(tb) as f64
}

/// LB_Keogh lower bound on the banded DTW distance, normalized by
/// `max(TA, TB)`. Linear time; admissible, so callers may use it to skip
/// full DTW against far-away templates.
pub fn lb_keogh_lower_bound(
    a: ArrayView2<'_, f64>,
    b: ArrayView2<'_, f64>,
    band: usize,
) -> f64 {
    let (ta, fa) = a.dim();
    let (tb, fb) = b.dim();
    if fa != fb || ta == 0 || tb == 0 {
        return 0.0;
    }

    // Per-time envelopes of B within the band window.
    let mut lower = Array2::zeros((tb, fb));
    let mut upper = Array2::zeros((tb, fb));
    for t in 0..tb {
        let j0 = t.saturating_sub(band);
        let j1 = (t + band + 1).min(tb);
        for f in 0..fb {
            let mut lo = f64::INFINITY;
            let mut hi = f64::NEG_INFINITY;
            for j in j0..j1 {
                lo = lo.min(b[[j, f]]);
                hi = hi.max(b[[j, f]]);
            }
            lower[[t, f]] = lo;
            upper[[t, f]] = hi;
        }
    }

    // Accumulate envelope violations of A mapped onto B's timeline.
    let mut bound = 0.0;
    for i in 0..ta {
        let t = if ta > 1 {
            ((i as f64) * (tb - 1) as f64 / (ta - 1) as f64).round() as usize
        } else {
            0
        };
        let mut sum = 0.0;
        for f in 0..fa {
            let v = a[[i, f]];
            let violation = (lower[[t, f]] - v).max(0.0) + (v - upper[[t, f]]).max(0.0);
            sum += violation * violation;
        }
        bound += sum.sqrt();
    }
    bound / ta.max(tb) as f64
}

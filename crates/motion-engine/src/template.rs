//! Template construction: time-normalize each segment and z-score it so
//! templates from different repetitions are frame-level comparable.

use crate::features::STD_FLOOR;
use crate::segment::Segment;
use common::artifact::Template;
use ndarray::{Array2, ArrayView2};

/// Median of a set of lengths, truncating on even counts.
pub fn median_length(lengths: &[usize]) -> Option<usize> {
    if lengths.is_empty() {
        return None;
    }
    let mut sorted = lengths.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2)
    } else {
        Some(sorted[mid])
    }
}

/// Resample a `[T, F]` block to `target` rows by per-column linear
/// interpolation over evenly spaced points.
fn resample(block: ArrayView2<'_, f64>, target: usize) -> Array2<f64> {
    let (t, f) = block.dim();
    if t == target {
        return block.to_owned();
    }
    let mut out = Array2::zeros((target, f));
    let span = (t - 1) as f64;
    let step = if target > 1 { span / (target - 1) as f64 } else { 0.0 };
    for row in 0..target {
        let pos = row as f64 * step;
        let lo = pos.floor() as usize;
        let hi = (lo + 1).min(t - 1);
        let frac = pos - lo as f64;
        for col in 0..f {
            out[[row, col]] = block[[lo, col]] * (1.0 - frac) + block[[hi, col]] * frac;
        }
    }
    out
}

fn z_score_in_place(matrix: &mut Array2<f64>) {
    let (t, f) = matrix.dim();
    if t == 0 {
        return;
    }
    for col in 0..f {
        let mut column = matrix.column_mut(col);
        let mean = column.sum() / t as f64;
        let var = column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / t as f64;
        let std = var.sqrt().max(STD_FLOOR);
        column.mapv_inplace(|v| (v - mean) / std);
    }
}

/// Convert segments of a feature sequence into standardized templates.
///
/// `target_length` defaults to the median segment length; segments shorter
/// than 3 frames are skipped.
pub fn build_templates(
    segments: &[Segment],
    seq: ArrayView2<'_, f64>,
    target_length: Option<usize>,
) -> Vec<Template> {
    let lengths: Vec<usize> = segments.iter().map(Segment::len).collect();
    let target = target_length
        .or_else(|| median_length(&lengths))
        .unwrap_or(50)
        .max(1);

    let mut templates = Vec::new();
    for segment in segments {
        let end = segment.end.min(seq.nrows());
        if end <= segment.start {
            continue;
        }
        let block = seq.slice(ndarray::s![segment.start..end, ..]);
        if block.nrows() < 3 {
            continue;
        }

        let mut normalized = resample(block, target);
        z_score_in_place(&mut normalized);

        templates.push(Template {
            length: target,
            feature_dim: normalized.ncols(),
            data: normalized.rows().into_iter().map(|r| r.to_vec()).collect(),
            original_length: block.nrows(),
            start_frame: segment.start,
            end_frame: segment.end,
        });
    }
    templates
}

/// View a template's data as an owned `[T, F]` matrix.
pub fn template_matrix(template: &Template) -> Array2<f64> {
    let t = template.data.len();
    let f = template.data.first().map(Vec::len).unwrap_or(0);
    Array2::from_shape_fn((t, f), |(i, j)| {
        template.data[i].get(j).copied().unwrap_or(0.0)
    })
}

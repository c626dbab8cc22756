//! Learning pipeline: demo keypoint sequences in, calibrated artifact out.
//!
//! For every sample: normalize frames with sticky root/scale, extract frame
//! features, append velocity, z-score across time, then segment into
//! repetitions. Templates are built against one action-wide target length
//! (the median of all segment lengths) so every template of the action
//! shares `T`, and the calibrator derives thresholds, windows, weights and
//! energy gates from the pooled template set.

use crate::calibrate::{calibrate, DEFAULT_BAND_RATIO};
use crate::error::{EngineError, Result};
use crate::features::{add_velocity, frame_features, z_score_columns, STATIC_FEATURE_DIM};
use crate::normalize::{normalize_keypoints, DEFAULT_SCALE_EMA};
use crate::segment::{auto_segment, Segment, SegmenterConfig};
use crate::template::{build_templates, median_length};
use common::artifact::ActionArtifact;
use common::pose::PoseFrame;
use ndarray::Array2;

/// Minimum demo length (about one second of video).
pub const MIN_SAMPLE_FRAMES: usize = 30;

#[derive(Debug, Clone)]
pub struct FinalizeOutcome {
    pub artifact: ActionArtifact,
    pub frames_processed: usize,
}

/// Convert one demo's keypoint frames into the offline `[T, 2F]` feature
/// sequence (velocity appended, z-scored across time).
pub fn keypoints_to_features(frames: &[PoseFrame]) -> Array2<f64> {
    let mut sequence = Array2::zeros((frames.len(), STATIC_FEATURE_DIM));
    let mut last_root = None;
    let mut last_scale = None;
    for (i, frame) in frames.iter().enumerate() {
        let pose = normalize_keypoints(frame, None, last_root, last_scale, DEFAULT_SCALE_EMA);
        last_root = Some(pose.root);
        last_scale = Some(pose.scale);
        sequence.row_mut(i).assign(&frame_features(&pose));
    }
    z_score_columns(&add_velocity(&sequence))
}

/// Learn an action from its demo samples and emit the artifact bundle.
///
/// Samples shorter than [`MIN_SAMPLE_FRAMES`] are skipped; finalize fails
/// with `InsufficientData` when nothing usable remains and with
/// `NoMotionDetected` when segmentation finds no repetition anywhere.
pub fn finalize_action(
    action_id: &str,
    samples: &[Vec<PoseFrame>],
    segmenter: &SegmenterConfig,
) -> Result<FinalizeOutcome> {
    if samples.is_empty() {
        return Err(EngineError::InsufficientData(
            "no samples provided".into(),
        ));
    }

    let mut prepared: Vec<(Array2<f64>, Vec<Segment>)> = Vec::new();
    let mut frames_processed = 0;
    for (i, frames) in samples.iter().enumerate() {
        if frames.len() < MIN_SAMPLE_FRAMES {
            tracing::warn!(
                action_id,
                sample = i,
                frames = frames.len(),
                "skipping sample shorter than {MIN_SAMPLE_FRAMES} frames"
            );
            continue;
        }
        let features = keypoints_to_features(frames);
        let segments = auto_segment(features.view(), segmenter);
        frames_processed += frames.len();
        prepared.push((features, segments));
    }

    if prepared.is_empty() {
        return Err(EngineError::InsufficientData(format!(
            "all {} samples were shorter than {MIN_SAMPLE_FRAMES} frames",
            samples.len()
        )));
    }

    // One action-wide target length so all templates share T.
    let lengths: Vec<usize> = prepared
        .iter()
        .flat_map(|(_, segments)| segments.iter().map(Segment::len))
        .collect();
    let target = median_length(&lengths);

    let mut templates = Vec::new();
    for (features, segments) in &prepared {
        templates.extend(build_templates(segments, features.view(), target));
    }
    if templates.is_empty() {
        return Err(EngineError::NoMotionDetected);
    }

    let calibration = calibrate(&templates, action_id);
    tracing::info!(
        action_id,
        templates = templates.len(),
        median_len = calibration.median_len,
        thr_in = calibration.thresholds.thr_in,
        thr_out = calibration.thresholds.thr_out,
        "action finalized"
    );

    let feature_dim = templates[0].feature_dim;
    let artifact = ActionArtifact {
        templates,
        thresholds: calibration.thresholds,
        median_len: calibration.median_len,
        windows: calibration.windows,
        band_ratio: DEFAULT_BAND_RATIO,
        feature_weights: calibration.feature_weights,
        energy_p30: calibration.energy_p30,
        energy_p50: calibration.energy_p50,
        energy_p70: calibration.energy_p70,
        feature_dim,
        calibration_seed: calibration.seed,
    };

    Ok(FinalizeOutcome {
        artifact,
        frames_processed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::ONLINE_FEATURE_DIM;
    use crate::testkit::arm_raise_frames;

    #[test]
    fn finalize_rejects_short_samples() {
        let err = finalize_action(
            "arm_raise",
            &[arm_raise_frames(10, 30)],
            &SegmenterConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientData(_)));
    }

    #[test]
    fn finalize_learns_from_clean_demo() {
        let outcome = finalize_action(
            "arm_raise",
            &[arm_raise_frames(120, 30)],
            &SegmenterConfig::default(),
        )
        .unwrap();
        let artifact = &outcome.artifact;
        assert!(artifact.templates.len() >= 2);
        assert!(artifact.thresholds.thr_in > 0.0);
        assert!(artifact.thresholds.thr_in < artifact.thresholds.thr_out);
        assert_eq!(artifact.feature_dim, ONLINE_FEATURE_DIM);
        assert!((20..=40).contains(&artifact.median_len));
        assert!(artifact.energy_p70 >= artifact.energy_p30);
        assert_eq!(outcome.frames_processed, 120);
        // All templates share the action-wide target length.
        for t in &artifact.templates {
            assert_eq!(t.length, artifact.median_len);
        }
    }

    #[test]
    fn finalize_is_deterministic() {
        let frames = arm_raise_frames(120, 30);
        let a = finalize_action("arm_raise", &[frames.clone()], &SegmenterConfig::default())
            .unwrap();
        let b =
            finalize_action("arm_raise", &[frames], &SegmenterConfig::default()).unwrap();
        assert_eq!(a.artifact.calibration_seed, b.artifact.calibration_seed);
        assert_eq!(a.artifact.thresholds.thr_in, b.artifact.thresholds.thr_in);
        assert_eq!(a.artifact.templates.len(), b.artifact.templates.len());
        for (ta, tb) in a.artifact.templates.iter().zip(&b.artifact.templates) {
            assert_eq!(ta.data, tb.data);
        }
    }

    #[test]
    fn offline_features_have_online_dimension() {
        let features = keypoints_to_features(&arm_raise_frames(40, 20));
        assert_eq!(features.dim(), (40, ONLINE_FEATURE_DIM));
    }
}

use anyhow::{anyhow, Result};
use common::api::{
    CreateSessionRequest, FinalizeRequest, FinalizeResponse, FrameRequest, InferResponse,
    SetupResponse, StatusResponse,
};
use common::artifact::ActionArtifact;
use common::pose::PoseFrame;
use common::recognition::ReasonCode;
use motion_engine::{finalize_action, EngineError, EngineSession, SegmenterConfig, SessionOptions};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

/// Shared service state: the artifact registry (one per learned action) and
/// the live sessions, each owning its recognizer exclusively.
#[derive(Clone)]
pub struct EngineServiceState {
    inner: Arc<EngineServiceStateInner>,
}

struct EngineServiceStateInner {
    node_id: String,
    artifacts: RwLock<HashMap<String, Arc<ActionArtifact>>>,
    sessions: RwLock<HashMap<String, Arc<Mutex<EngineSession>>>>,
    segmenter: SegmenterConfig,
}

impl EngineServiceState {
    pub fn new(node_id: String) -> Self {
        Self {
            inner: Arc::new(EngineServiceStateInner {
                node_id,
                artifacts: RwLock::new(HashMap::new()),
                sessions: RwLock::new(HashMap::new()),
                segmenter: SegmenterConfig::default(),
            }),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.inner.node_id
    }

    pub async fn artifact(&self, action_id: &str) -> Option<Arc<ActionArtifact>> {
        let artifacts = self.inner.artifacts.read().await;
        artifacts.get(action_id).cloned()
    }

    pub async fn session_count(&self) -> usize {
        let sessions = self.inner.sessions.read().await;
        sessions.len()
    }

    /// Run the learning pipeline on demo samples and register the artifact.
    /// A failed finalize leaves any previously learned artifact intact.
    pub async fn finalize(
        &self,
        action_id: &str,
        request: FinalizeRequest,
    ) -> Result<FinalizeResponse> {
        let start = Instant::now();
        let samples: Vec<Vec<PoseFrame>> = request
            .samples
            .iter()
            .map(|sample| {
                sample
                    .frames
                    .iter()
                    .map(|triples| PoseFrame::from_triples(triples))
                    .collect()
            })
            .collect();

        let outcome = finalize_action(action_id, &samples, &self.inner.segmenter)?;
        telemetry::metrics::ENGINE_FINALIZE_DURATION.observe(start.elapsed().as_secs_f64());

        let artifact = outcome.artifact;
        let response = FinalizeResponse {
            success: true,
            templates_count: artifact.templates.len(),
            thresholds: artifact.thresholds,
            frames_processed: outcome.frames_processed,
            median_len: artifact.median_len,
            windows: artifact.windows.clone(),
            energy_stats: artifact.energy_stats(),
            feature_weights: artifact.feature_weights.clone(),
        };

        {
            let mut artifacts = self.inner.artifacts.write().await;
            artifacts.insert(action_id.to_string(), Arc::new(artifact));
        }
        info!(
            action_id,
            templates = response.templates_count,
            frames = response.frames_processed,
            "finalized action"
        );
        Ok(response)
    }

    /// Create a live session bound to a learned action.
    pub async fn create_session(&self, request: CreateSessionRequest) -> Result<SetupResponse> {
        let artifact = self
            .artifact(&request.action_id)
            .await
            .ok_or_else(|| anyhow!(EngineError::NotInitialized))?;

        let options = SessionOptions {
            target_reps: request.target_reps,
            resume_reps: request.resume_reps.unwrap_or(0),
            ..SessionOptions::default()
        };
        let session = EngineSession::from_artifact(&request.action_id, &artifact, options)?;
        let status = session.status();

        let token = uuid::Uuid::new_v4().to_string();
        {
            let mut sessions = self.inner.sessions.write().await;
            sessions.insert(token.clone(), Arc::new(Mutex::new(session)));
            telemetry::metrics::ENGINE_ACTIVE_SESSIONS.set(sessions.len() as i64);
        }
        info!(
            action_id = %request.action_id,
            token = %token,
            templates = status.templates_count,
            "created engine session"
        );

        Ok(SetupResponse {
            success: true,
            session_token: token,
            templates_count: status.templates_count,
            thresholds: artifact.thresholds,
            window_size: status.window_size,
            windows: artifact.windows.clone(),
        })
    }

    async fn session(&self, token: &str) -> Result<Arc<Mutex<EngineSession>>> {
        let sessions = self.inner.sessions.read().await;
        sessions
            .get(token)
            .cloned()
            .ok_or_else(|| anyhow!(EngineError::NotInitialized))
    }

    /// Feed one frame (raw keypoints or a precomputed feature vector) to a
    /// session's recognizer.
    pub async fn infer(&self, token: &str, request: FrameRequest) -> Result<InferResponse> {
        let session = self.session(token).await?;
        let mut session = session.lock().await;
        let action = session.action_id().to_string();
        let start = Instant::now();

        if let Some(update) = request.update_thresholds {
            session.update_thresholds(update.thr_in, update.thr_out);
        }

        let (update, features, target_reached) = if let Some(features) = request.features {
            let update = session.process_features(&features)?;
            let reached = session.target_reached();
            (update, None, reached)
        } else if let Some(triples) = request.keypoints {
            // An empty detection still advances the stream as an all-zero
            // placeholder frame; the energy gate keeps counts unaffected.
            let frame = PoseFrame::from_triples(&triples);
            let outcome = session.process_frame(&frame)?;
            (outcome.update, Some(outcome.features), outcome.target_reached)
        } else {
            return Err(anyhow!(EngineError::InputShape(
                "frame carries neither keypoints nor features".into()
            )));
        };

        telemetry::metrics::ENGINE_INFER_LATENCY
            .with_label_values(&[&action])
            .observe(start.elapsed().as_secs_f64());
        telemetry::metrics::ENGINE_FRAMES_PROCESSED
            .with_label_values(&[&action, "success"])
            .inc();
        if update.debug.reason_code == ReasonCode::Counted {
            telemetry::metrics::ENGINE_REPS_COUNTED
                .with_label_values(&[&action])
                .inc();
        }

        Ok(InferResponse {
            success: true,
            state: update.state,
            reps: update.reps,
            distance: update.distance,
            thresholds: update.thresholds,
            target_reached,
            debug: update.debug,
            features,
        })
    }

    pub async fn reset_session(&self, token: &str) -> Result<()> {
        let session = self.session(token).await?;
        session.lock().await.reset();
        Ok(())
    }

    pub async fn session_status(&self, token: &str) -> Result<StatusResponse> {
        let session = self.session(token).await?;
        let status = session.lock().await.status();
        Ok(StatusResponse {
            initialized: true,
            state: status.state,
            reps: status.reps,
            templates_count: status.templates_count,
            window_size: status.window_size,
            thresholds: status.thresholds,
            repetition_frames: status.repetition_frames,
            target_reached: status.target_reached,
        })
    }

    pub async fn remove_session(&self, token: &str) -> Result<()> {
        let mut sessions = self.inner.sessions.write().await;
        let removed = sessions.remove(token);
        telemetry::metrics::ENGINE_ACTIVE_SESSIONS.set(sessions.len() as i64);
        match removed {
            Some(_) => Ok(()),
            None => Err(anyhow!(EngineError::NotInitialized)),
        }
    }
}

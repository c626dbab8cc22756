use crate::state::EngineServiceState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use common::api::{CreateSessionRequest, FinalizeRequest, FrameRequest, ResetResponse};
use motion_engine::EngineError;
use serde_json::json;

/// Map a state-layer failure to an HTTP status and JSON error envelope.
fn error_response(err: anyhow::Error) -> (StatusCode, Json<serde_json::Value>) {
    let status = match err.downcast_ref::<EngineError>() {
        Some(EngineError::NotInitialized) => StatusCode::NOT_FOUND,
        Some(EngineError::InputShape(_)) => StatusCode::BAD_REQUEST,
        Some(EngineError::InsufficientData(_)) | Some(EngineError::NoMotionDetected) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": err.to_string() })))
}

/// Learn an action from demo samples
pub async fn finalize_action(
    State(state): State<EngineServiceState>,
    Path(action_id): Path<String>,
    Json(request): Json<FinalizeRequest>,
) -> impl IntoResponse {
    match state.finalize(&action_id, request).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => {
            tracing::error!("Failed to finalize action {}: {}", action_id, e);
            error_response(e).into_response()
        }
    }
}

/// Create a recognition session for a learned action
pub async fn create_session(
    State(state): State<EngineServiceState>,
    Json(request): Json<CreateSessionRequest>,
) -> impl IntoResponse {
    let action_id = request.action_id.clone();
    match state.create_session(request).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => {
            tracing::error!("Failed to create session for action {}: {}", action_id, e);
            error_response(e).into_response()
        }
    }
}

/// Feed one frame to a session's recognizer
pub async fn infer(
    State(state): State<EngineServiceState>,
    Path(token): Path<String>,
    Json(request): Json<FrameRequest>,
) -> impl IntoResponse {
    match state.infer(&token, request).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

/// Reset a session's recognizer state
pub async fn reset_session(
    State(state): State<EngineServiceState>,
    Path(token): Path<String>,
) -> impl IntoResponse {
    match state.reset_session(&token).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ResetResponse {
                status: "reset".to_string(),
            }),
        )
            .into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

/// Snapshot a session
pub async fn session_status(
    State(state): State<EngineServiceState>,
    Path(token): Path<String>,
) -> impl IntoResponse {
    match state.session_status(&token).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

/// Tear down a session
pub async fn remove_session(
    State(state): State<EngineServiceState>,
    Path(token): Path<String>,
) -> impl IntoResponse {
    match state.remove_session(&token).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "removed" })),
        )
            .into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

/// Health check endpoint
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "engine-service"
        })),
    )
}

/// Readiness check endpoint
pub async fn readyz(State(state): State<EngineServiceState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ready",
            "node_id": state.node_id(),
            "active_sessions": state.session_count().await
        })),
    )
}

/// Prometheus metrics endpoint
pub async fn metrics() -> impl IntoResponse {
    match telemetry::encode_metrics() {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, String::new()).into_response()
        }
    }
}

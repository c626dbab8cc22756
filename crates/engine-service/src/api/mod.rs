pub mod routes;

use crate::state::EngineServiceState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Build the API router
pub fn router(state: EngineServiceState) -> Router {
    Router::new()
        // Health and metrics endpoints
        .route("/healthz", get(routes::healthz))
        .route("/readyz", get(routes::readyz))
        .route("/metrics", get(routes::metrics))
        // Learning endpoint
        .route("/v1/actions/:id/finalize", post(routes::finalize_action))
        // Session endpoints
        .route("/v1/sessions", post(routes::create_session))
        .route(
            "/v1/sessions/:token",
            get(routes::session_status).delete(routes::remove_session),
        )
        .route("/v1/sessions/:token/frames", post(routes::infer))
        .route("/v1/sessions/:token/reset", post(routes::reset_session))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

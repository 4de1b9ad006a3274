//! Health, readiness, and metrics endpoints

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use tracing::error;

use crate::state::AppState;

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy", "service": "maia" }))
}

/// GET /ready — 200 when the store stats probe succeeds, 503 otherwise
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.ready().await {
        Ok(_) => (StatusCode::OK, Json(json!({ "status": "ready" }))),
        Err(err) => {
            error!(error = %err, "Readiness probe failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "not ready" })),
            )
        }
    }
}

/// GET /metrics — Prometheus text exposition
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [("content-type", "text/plain; version=0.0.4")],
        state.metrics.gather(),
    )
}

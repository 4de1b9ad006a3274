//! Inference endpoints: chat completions, provider health, cache admin

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::StreamExt;
use maia_intelligence::{CachingRouter, ChatRequest, IntelligenceError};
use serde_json::json;
use tracing::warn;

use crate::errors::{ApiError, ApiResult};
use crate::state::AppState;

fn inference(state: &AppState) -> ApiResult<Arc<CachingRouter>> {
    state
        .inference
        .as_ref()
        .cloned()
        .ok_or(ApiError::InferenceDisabled)
}

/// POST /v1/inference/chat — JSON completion, or SSE when `stream` is set
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Response> {
    let inference = inference(&state)?;
    state.metrics.inference_requests_total.inc();

    if request.stream {
        let reader = inference.stream(request).await.map_err(|err| {
            state.metrics.inference_failures_total.inc();
            ApiError::from(err)
        })?;
        let stream = reader
            .map(|chunk| -> Result<Event, Infallible> {
                match chunk {
                    Ok(chunk) => Ok(Event::default()
                        .data(serde_json::to_string(&chunk).unwrap_or_default())),
                    Err(err) => {
                        warn!(error = %err, "Stream chunk failed");
                        Ok(Event::default()
                            .data(json!({ "error": err.to_string() }).to_string()))
                    }
                }
            })
            .chain(futures::stream::once(async {
                Ok(Event::default().data("[DONE]"))
            }));
        return Ok(Sse::new(stream).into_response());
    }

    let cache_before = inference.cache().stats();
    let response = inference.complete(request).await.map_err(|err| {
        state.metrics.inference_failures_total.inc();
        ApiError::from(err)
    })?;
    let cache_after = inference.cache().stats();
    state
        .metrics
        .cache_hits_total
        .inc_by(cache_after.hits.saturating_sub(cache_before.hits));
    state
        .metrics
        .cache_misses_total
        .inc_by(cache_after.misses.saturating_sub(cache_before.misses));

    Ok(Json(response).into_response())
}

/// GET /v1/inference/models
pub async fn models(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let inference = inference(&state)?;
    let models = inference.list_models().await;
    Ok(Json(json!({ "count": models.len(), "models": models })))
}

/// GET /v1/inference/health — every provider's record
pub async fn health_all(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let inference = inference(&state)?;
    let statuses = inference.router().health_checker().statuses().await;
    Ok(Json(json!({ "providers": statuses })))
}

/// GET /v1/inference/health/:name
pub async fn health_one(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let inference = inference(&state)?;
    match inference.router().health_checker().get_status(&name).await {
        Some(record) => Ok(Json(json!({ "provider": name, "health": record }))),
        None => Err(ApiError::ProviderNotFound(format!(
            "provider not found: {name}"
        ))),
    }
}

/// POST /v1/inference/health/:name — synchronous probe
pub async fn check_now(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let inference = inference(&state)?;
    match inference.router().health_checker().check_now(&name).await {
        Ok(record) => Ok(Json(json!({ "provider": name, "health": record }))),
        Err(IntelligenceError::NoProviderFound(_)) => Err(ApiError::ProviderNotFound(format!(
            "provider not found: {name}"
        ))),
        Err(err) => Err(ApiError::HealthCheckFailed(format!(
            "health check failed for {name}: {err}"
        ))),
    }
}

/// GET /v1/inference/cache/stats
pub async fn cache_stats(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let inference = inference(&state)?;
    Ok(Json(inference.cache().stats()))
}

/// POST /v1/inference/cache/clear
pub async fn cache_clear(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let inference = inference(&state)?;
    if !inference.cache().enabled() {
        return Err(ApiError::CacheDisabled);
    }
    inference.cache().clear();
    Ok(Json(json!({ "status": "cleared" })))
}

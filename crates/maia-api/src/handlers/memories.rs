//! Memory CRUD and search handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use maia_types::{MemoryCreate, MemoryUpdate, SearchQuery};
use serde_json::json;
use tracing::debug;

use crate::errors::{ApiError, ApiResult};
use crate::handlers::TenantId;
use crate::state::AppState;

/// POST /v1/memories
pub async fn create(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Json(input): Json<MemoryCreate>,
) -> ApiResult<impl IntoResponse> {
    if input.content.is_empty() {
        return Err(ApiError::invalid_input("content is required"));
    }
    if input.namespace.is_empty() {
        return Err(ApiError::invalid_input("namespace is required"));
    }
    let memory = state.store.create_memory(&tenant_id, input).await?;
    Ok((StatusCode::CREATED, Json(memory)))
}

/// GET /v1/memories/:id — the read also bumps the access time
pub async fn get(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let memory = state.store.get_memory(&tenant_id, &id).await?;
    if let Err(err) = state.store.touch_memory(&tenant_id, &id).await {
        debug!(memory_id = %id, error = %err, "Access-time bump failed");
    }
    Ok(Json(memory))
}

/// PUT /v1/memories/:id
pub async fn update(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Path(id): Path<String>,
    Json(input): Json<MemoryUpdate>,
) -> ApiResult<impl IntoResponse> {
    let memory = state.store.update_memory(&tenant_id, &id, input).await?;
    Ok(Json(memory))
}

/// DELETE /v1/memories/:id
pub async fn delete(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.store.delete_memory(&tenant_id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/memories/search
pub async fn search(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Json(mut query): Json<SearchQuery>,
) -> ApiResult<impl IntoResponse> {
    query.limit = query.limit.clamp(0, 1000);
    if query.limit == 0 {
        query.limit = 100;
    }
    let memories = state.store.search(&tenant_id, query).await?;
    Ok(Json(json!({ "count": memories.len(), "memories": memories })))
}

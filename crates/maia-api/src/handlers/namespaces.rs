//! Namespace CRUD handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use maia_types::{Namespace, NamespaceCreate, NamespaceUpdate};
use serde_json::json;

use crate::errors::{ApiError, ApiResult};
use crate::handlers::{Pagination, TenantId};
use crate::state::AppState;

/// Resolve a namespace by id, falling back to lookup by name
async fn resolve(
    state: &AppState,
    tenant_id: &str,
    id_or_name: &str,
) -> Result<Namespace, ApiError> {
    match state.store.get_namespace(tenant_id, id_or_name).await {
        Ok(namespace) => Ok(namespace),
        Err(err) if err.is_not_found() => Ok(state
            .store
            .get_namespace_by_name(tenant_id, id_or_name)
            .await?),
        Err(err) => Err(err.into()),
    }
}

/// POST /v1/namespaces
pub async fn create(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Json(input): Json<NamespaceCreate>,
) -> ApiResult<impl IntoResponse> {
    if input.name.is_empty() {
        return Err(ApiError::invalid_input("name is required"));
    }
    let namespace = state.store.create_namespace(&tenant_id, input).await?;
    Ok((StatusCode::CREATED, Json(namespace)))
}

/// GET /v1/namespaces
pub async fn list(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
) -> ApiResult<impl IntoResponse> {
    let namespaces = state.store.list_namespaces(&tenant_id).await?;
    Ok(Json(json!({ "count": namespaces.len(), "namespaces": namespaces })))
}

/// GET /v1/namespaces/:id — id first, then name
pub async fn get(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(resolve(&state, &tenant_id, &id).await?))
}

/// PUT /v1/namespaces/:id
pub async fn update(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Path(id): Path<String>,
    Json(input): Json<NamespaceUpdate>,
) -> ApiResult<impl IntoResponse> {
    let namespace = resolve(&state, &tenant_id, &id).await?;
    let updated = state
        .store
        .update_namespace(&tenant_id, &namespace.id, input)
        .await?;
    Ok(Json(updated))
}

/// DELETE /v1/namespaces/:id
pub async fn delete(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let namespace = resolve(&state, &tenant_id, &id).await?;
    state
        .store
        .delete_namespace(&tenant_id, &namespace.id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /v1/namespaces/:id/memories — id-or-name fallback, paginated
pub async fn memories(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Path(id): Path<String>,
    Query(pagination): Query<Pagination>,
) -> ApiResult<impl IntoResponse> {
    let namespace = resolve(&state, &tenant_id, &id).await?;
    let (limit, offset) = pagination.resolve();
    let memories = state
        .store
        .list_memories(&tenant_id, &namespace.name, limit, offset)
        .await?;
    Ok(Json(json!({
        "namespace": namespace.name,
        "count": memories.len(),
        "memories": memories,
    })))
}

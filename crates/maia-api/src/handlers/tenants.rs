//! Tenant administration handlers, mounted under `/admin/tenants`

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use maia_persistence::{
    ListTenantsOptions, TenantCreate, TenantPlan, TenantRegistry, TenantStatus, TenantUpdate,
    SYSTEM_TENANT_ID,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::errors::{ApiError, ApiResult};
use crate::state::AppState;

/// Query parameters for listing tenants
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
    pub plan: Option<String>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

fn guard_system(id: &str, action: &str) -> ApiResult<()> {
    if id == SYSTEM_TENANT_ID {
        return Err(ApiError::forbidden(format!(
            "cannot {action} the system tenant"
        )));
    }
    Ok(())
}

/// POST /admin/tenants
pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<TenantCreate>,
) -> ApiResult<impl IntoResponse> {
    let tenant = state.registry.create(input).await?;
    state
        .metrics
        .tenant_operations_total
        .with_label_values(&["create"])
        .inc();
    Ok((StatusCode::CREATED, Json(tenant)))
}

/// GET /admin/tenants
pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<impl IntoResponse> {
    let status = match params.status.as_deref() {
        Some(raw) => Some(
            TenantStatus::parse(raw)
                .ok_or_else(|| ApiError::invalid_input(format!("invalid status: {raw}")))?,
        ),
        None => None,
    };
    let plan = match params.plan.as_deref() {
        Some(raw) => Some(
            TenantPlan::parse(raw)
                .ok_or_else(|| ApiError::invalid_input(format!("invalid plan: {raw}")))?,
        ),
        None => None,
    };

    let tenants = state
        .registry
        .list(ListTenantsOptions {
            status,
            plan,
            offset: params.offset.unwrap_or(0),
            limit: params.limit.unwrap_or(100).clamp(1, 1000),
        })
        .await?;
    Ok(Json(json!({ "count": tenants.len(), "tenants": tenants })))
}

/// GET /admin/tenants/:id
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.registry.get(&id).await?))
}

/// PUT /admin/tenants/:id
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<TenantUpdate>,
) -> ApiResult<impl IntoResponse> {
    let tenant = state.registry.update(&id, input).await?;
    state
        .metrics
        .tenant_operations_total
        .with_label_values(&["update"])
        .inc();
    Ok(Json(tenant))
}

/// DELETE /admin/tenants/:id — cascades the tenant's data, then removes
/// the registry rows
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    guard_system(&id, "delete")?;
    // confirm existence before touching data
    state.registry.get(&id).await?;

    if let Err(err) = state.store.delete_tenant_data(&id).await {
        error!(tenant_id = %id, error = %err, "Tenant data cascade failed");
        return Err(err.into());
    }
    state.registry.delete(&id).await?;
    state
        .metrics
        .tenant_operations_total
        .with_label_values(&["delete"])
        .inc();
    info!(tenant_id = %id, "Tenant deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /admin/tenants/:id/usage
pub async fn usage(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.registry.get_usage(&id).await?))
}

/// POST /admin/tenants/:id/suspend
pub async fn suspend(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    guard_system(&id, "suspend")?;
    let tenant = state.registry.suspend(&id).await?;
    state
        .metrics
        .tenant_operations_total
        .with_label_values(&["suspend"])
        .inc();
    Ok(Json(tenant))
}

/// POST /admin/tenants/:id/activate
pub async fn activate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let tenant = state.registry.activate(&id).await?;
    state
        .metrics
        .tenant_operations_total
        .with_label_values(&["activate"])
        .inc();
    Ok(Json(tenant))
}

/// POST /admin/tenants/:id/apikeys request body
#[derive(Debug, Deserialize)]
pub struct CreateKeyRequest {
    pub name: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// POST /admin/tenants/:id/apikeys — the only response that ever carries
/// the raw key
pub async fn create_api_key(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<CreateKeyRequest>,
) -> ApiResult<impl IntoResponse> {
    if input.name.is_empty() {
        return Err(ApiError::invalid_input("name is required"));
    }
    let scopes = TenantRegistry::parse_scopes(&input.scopes)?;
    let created = state
        .registry
        .create_api_key(&id, &input.name, scopes, input.expires_at)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /admin/tenants/:id/apikeys
pub async fn list_api_keys(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let keys = state.registry.list_api_keys(&id).await?;
    Ok(Json(json!({ "count": keys.len(), "keys": keys })))
}

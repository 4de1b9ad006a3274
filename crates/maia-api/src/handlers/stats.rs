//! Tenant statistics endpoint

use axum::{extract::State, response::IntoResponse, Json};

use crate::errors::ApiResult;
use crate::handlers::TenantId;
use crate::state::AppState;

/// GET /v1/stats
pub async fn stats(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
) -> ApiResult<impl IntoResponse> {
    let stats = state.store.stats(&tenant_id).await?;
    Ok(Json(stats))
}

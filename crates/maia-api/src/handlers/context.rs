//! Bounded context assembly
//!
//! Searches the tenant's memories and packs the best matches into a
//! context block capped by a token budget (estimated at four characters
//! per token). Retrieval specifics beyond this are out of scope; this is
//! the boundary handlers and clients agree on.

use axum::{extract::State, response::IntoResponse, Json};
use maia_types::SearchQuery;
use serde::Deserialize;
use serde_json::json;

use crate::errors::{ApiError, ApiResult};
use crate::handlers::{MaybeTenant, TenantId};
use crate::state::AppState;

const CHARS_PER_TOKEN: usize = 4;
const DEFAULT_TOKEN_BUDGET: u32 = 4_000;

/// POST /v1/context request body
#[derive(Debug, Deserialize)]
pub struct ContextRequest {
    pub query: String,
    #[serde(default)]
    pub namespace: Option<String>,
    /// Overrides the tenant's default budget
    #[serde(default)]
    pub token_budget: Option<u32>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// POST /v1/context
pub async fn assemble(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    MaybeTenant(tenant): MaybeTenant,
    Json(request): Json<ContextRequest>,
) -> ApiResult<impl IntoResponse> {
    if request.query.is_empty() {
        return Err(ApiError::invalid_input("query is required"));
    }

    let budget = request
        .token_budget
        .or_else(|| tenant.as_ref().map(|t| t.config.default_token_budget))
        .filter(|b| *b > 0)
        .unwrap_or(DEFAULT_TOKEN_BUDGET) as usize;
    let char_budget = budget * CHARS_PER_TOKEN;

    let hits = state
        .store
        .search(
            &tenant_id,
            SearchQuery {
                query: request.query.clone(),
                namespace: request.namespace.clone(),
                limit: request.limit.unwrap_or(100).clamp(1, 1000),
                offset: 0,
                metadata_filters: Default::default(),
            },
        )
        .await?;

    let mut context = String::new();
    let mut included = Vec::new();
    for memory in hits {
        if context.len() + memory.content.len() + 1 > char_budget {
            break;
        }
        if !context.is_empty() {
            context.push('\n');
        }
        context.push_str(&memory.content);
        included.push(memory);
    }

    let token_count = context.len() / CHARS_PER_TOKEN;
    Ok(Json(json!({
        "context": context,
        "token_count": token_count,
        "token_budget": budget,
        "memory_count": included.len(),
        "memories": included,
    })))
}

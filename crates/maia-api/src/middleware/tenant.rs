//! Tenant identification
//!
//! Resolves the tenant entity visible to handlers: `X-MAIA-Tenant-ID`
//! header first, then the API-key manager when a key is present, then the
//! configured default tenant. Suspended and pending-deletion tenants are
//! refused at this boundary.

use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use maia_persistence::{ApiKey, PersistenceError, Tenant, TenantStatus};
use tracing::{debug, warn};

use crate::errors::ApiError;
use crate::middleware::auth::RawApiKey;
use crate::state::AppState;

/// Tenant resolved for this request
#[derive(Debug, Clone)]
pub struct RequestTenant(pub Tenant);

/// Registry-backed API-key record resolved during identification; used by
/// scope enforcement
#[derive(Debug, Clone)]
pub struct KeyRecord(pub ApiKey);

fn check_status(tenant: &Tenant) -> Result<(), ApiError> {
    match tenant.status {
        TenantStatus::Active => Ok(()),
        TenantStatus::Suspended => Err(ApiError::forbidden("tenant is suspended")),
        TenantStatus::PendingDeletion => Err(ApiError::forbidden("tenant is pending deletion")),
    }
}

/// Tenant identification middleware
pub async fn tenant_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.config.tenant.enabled {
        return Ok(next.run(request).await);
    }

    let header_tenant = request
        .headers()
        .get("x-maia-tenant-id")
        .and_then(|h| h.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let raw_key = request.extensions().get::<RawApiKey>().map(|k| k.0.clone());

    let mut key_record = None;
    let tenant = if let Some(id) = header_tenant {
        match state.registry.get(&id).await {
            Ok(tenant) => Some(tenant),
            Err(PersistenceError::TenantNotFound(_)) => {
                warn!(tenant_id = %id, "Unknown tenant in header");
                return Err(ApiError::Unauthorized("invalid tenant".to_string()));
            }
            Err(err) => return Err(err.into()),
        }
    } else if state.config.tenant.lookup_by_api_key && raw_key.is_some() {
        let raw = raw_key.clone().unwrap_or_default();
        match state.registry.get_tenant_by_api_key(&raw).await {
            Ok(tenant) => {
                if let Ok(record) = state.registry.get_api_key(&raw).await {
                    key_record = Some(record);
                }
                // refresh last_used_at off the request path
                let registry = state.registry.clone();
                tokio::spawn(async move {
                    if let Err(err) = registry.update_api_key_last_used(&raw).await {
                        debug!(error = %err, "last_used_at refresh failed");
                    }
                });
                Some(tenant)
            }
            Err(PersistenceError::ApiKeyNotFound) => None,
            Err(PersistenceError::ApiKeyExpired) => {
                return Err(ApiError::Unauthorized("api key expired".to_string()));
            }
            Err(err) => return Err(err.into()),
        }
    } else {
        None
    };

    let tenant = match tenant {
        Some(tenant) => Some(tenant),
        None => match &state.config.tenant.default_tenant_id {
            Some(default_id) => match state.registry.get(default_id).await {
                Ok(tenant) => Some(tenant),
                Err(PersistenceError::TenantNotFound(_)) => {
                    return Err(ApiError::Unauthorized("invalid tenant".to_string()));
                }
                Err(err) => return Err(err.into()),
            },
            None => None,
        },
    };

    match tenant {
        Some(tenant) => {
            check_status(&tenant)?;
            debug!(tenant_id = %tenant.id, "Tenant identified");
            if let Some(record) = key_record {
                request.extensions_mut().insert(KeyRecord(record));
            }
            request.extensions_mut().insert(RequestTenant(tenant));
            Ok(next.run(request).await)
        }
        None if state.config.tenant.require_tenant => {
            Err(ApiError::Unauthorized("tenant is required".to_string()))
        }
        None => Ok(next.run(request).await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use maia_persistence::{TenantConfig, TenantPlan, TenantQuotas};
    use std::collections::HashMap;

    fn tenant(status: TenantStatus) -> Tenant {
        Tenant {
            id: "t".to_string(),
            name: "t".to_string(),
            plan: TenantPlan::Free,
            status,
            config: TenantConfig::default_for_plan(TenantPlan::Free),
            quotas: TenantQuotas::default_for_plan(TenantPlan::Free),
            metadata: HashMap::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn status_gate() {
        assert!(check_status(&tenant(TenantStatus::Active)).is_ok());
        assert!(check_status(&tenant(TenantStatus::Suspended)).is_err());
        assert!(check_status(&tenant(TenantStatus::PendingDeletion)).is_err());
    }
}

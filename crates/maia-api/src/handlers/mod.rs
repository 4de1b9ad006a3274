//! HTTP handlers

pub mod context;
pub mod health;
pub mod inference;
pub mod memories;
pub mod namespaces;
pub mod stats;
pub mod tenants;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use maia_persistence::{Tenant, SYSTEM_TENANT_ID};
use serde::Deserialize;

use crate::middleware::tenant::RequestTenant;

/// Pagination query parameters: `limit` defaults to 100 and is capped at
/// 1000, `offset` defaults to 0
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pagination {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Pagination {
    pub fn resolve(&self) -> (usize, usize) {
        let limit = self.limit.unwrap_or(100).clamp(1, 1000);
        (limit, self.offset.unwrap_or(0))
    }
}

/// The tenant id for this request; the system tenant when identification
/// is disabled or resolved nothing
pub struct TenantId(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for TenantId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .extensions
                .get::<RequestTenant>()
                .map(|t| t.0.id.clone())
                .unwrap_or_else(|| SYSTEM_TENANT_ID.to_string()),
        ))
    }
}

/// The full tenant entity when identification resolved one
pub struct MaybeTenant(pub Option<Tenant>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeTenant
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts.extensions.get::<RequestTenant>().map(|t| t.0.clone()),
        ))
    }
}

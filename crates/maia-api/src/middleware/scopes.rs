//! Route-keyed scope enforcement
//!
//! Each `"METHOD /path"` prefix maps to the scopes that may invoke it;
//! the longest matching prefix wins. Requests without a registry-backed
//! key record pass through, as do unmapped routes. `*` always satisfies.

use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use maia_persistence::{apikey::scopes_allow, Scope};
use tracing::warn;

use crate::errors::ApiError;
use crate::middleware::tenant::KeyRecord;
use crate::state::AppState;

/// The route → scopes table; longest-prefix matched against
/// `"METHOD /path"`
fn scope_routes() -> &'static [(&'static str, &'static [Scope])] {
    &[
        ("POST /v1/memories/search", &[Scope::Read, Scope::Search]),
        ("POST /v1/memories", &[Scope::Write]),
        ("GET /v1/memories", &[Scope::Read]),
        ("PUT /v1/memories", &[Scope::Write]),
        ("DELETE /v1/memories", &[Scope::Delete]),
        ("POST /v1/namespaces", &[Scope::Write]),
        ("GET /v1/namespaces", &[Scope::Read]),
        ("PUT /v1/namespaces", &[Scope::Write]),
        ("DELETE /v1/namespaces", &[Scope::Delete]),
        ("POST /v1/context", &[Scope::Context, Scope::Read]),
        ("GET /v1/stats", &[Scope::Stats]),
        ("POST /v1/inference/chat", &[Scope::Inference]),
        ("GET /admin", &[Scope::Admin]),
        ("POST /admin", &[Scope::Admin]),
        ("PUT /admin", &[Scope::Admin]),
        ("DELETE /admin", &[Scope::Admin]),
    ]
}

/// Resolve the scopes required for a request, if any
fn required_scopes(method: &str, path: &str) -> Option<&'static [Scope]> {
    let key = format!("{method} {path}");
    scope_routes()
        .iter()
        .filter(|(prefix, _)| key.starts_with(prefix))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, scopes)| *scopes)
}

/// Scope enforcement middleware
pub async fn scope_middleware(
    State(_state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(KeyRecord(key)) = request.extensions().get::<KeyRecord>() else {
        return Ok(next.run(request).await);
    };

    let method = request.method().as_str();
    let path = request.uri().path();
    let Some(required) = required_scopes(method, path) else {
        return Ok(next.run(request).await);
    };

    if required.iter().any(|scope| scopes_allow(&key.scopes, *scope)) {
        return Ok(next.run(request).await);
    }

    warn!(
        key_name = %key.name,
        method = %method,
        path = %path,
        "Insufficient scope"
    );
    Err(ApiError::InsufficientScope(format!(
        "insufficient scope for {method} {path}"
    )))
}

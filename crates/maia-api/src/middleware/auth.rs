//! API-key authentication
//!
//! Enabled whenever at least one valid key is configured. The raw key is
//! extracted in priority order (`X-API-Key`, `Authorization: Bearer`,
//! `api_key` query parameter) and stashed in request extensions for the
//! downstream authorization, tenant, and scope middlewares even when
//! authentication itself is disabled.

use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use crate::errors::ApiError;
use crate::state::AppState;

/// Raw API key presented on the request
#[derive(Debug, Clone)]
pub struct RawApiKey(pub String);

/// Extract the API key following the configured priority order
pub fn extract_api_key(request: &Request<Body>) -> Option<String> {
    if let Some(key) = request
        .headers()
        .get("x-api-key")
        .and_then(|h| h.to_str().ok())
        .filter(|s| !s.is_empty())
    {
        return Some(key.to_string());
    }
    if let Some(auth_header) = request
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok())
    {
        if let Some(token) = auth_header.strip_prefix("Bearer ") {
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }
    if let Some(query) = request.uri().query() {
        for pair in query.split('&') {
            if let Some((name, value)) = pair.split_once('=') {
                if name == "api_key" && !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

/// Best-effort client address for logging
pub fn client_ip(request: &Request<Body>) -> String {
    if let Some(forwarded) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            return first.trim().to_string();
        }
    }
    request
        .headers()
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

fn path_is_skipped(state: &AppState, path: &str) -> bool {
    state
        .config
        .auth
        .skip_paths
        .iter()
        .any(|p| path == p || path.starts_with(p.as_str()))
}

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let path = request.uri().path().to_string();

    if path_is_skipped(&state, &path) {
        return Ok(next.run(request).await);
    }

    let api_key = extract_api_key(&request);
    if let Some(key) = &api_key {
        request.extensions_mut().insert(RawApiKey(key.clone()));
    }

    if !state.config.auth.auth_enabled() {
        return Ok(next.run(request).await);
    }

    let Some(key) = api_key else {
        state.metrics.auth_failures_total.inc();
        warn!(client_ip = %client_ip(&request), path = %path, "Missing API key");
        return Err(ApiError::Unauthorized("API key is required".to_string()));
    };

    // configured keys first, then registry-minted credentials
    let valid = state.config.auth.api_keys.iter().any(|k| k == &key)
        || (state.config.tenant.lookup_by_api_key
            && state.registry.get_api_key(&key).await.is_ok());

    if !valid {
        state.metrics.auth_failures_total.inc();
        warn!(client_ip = %client_ip(&request), path = %path, "Invalid API key");
        return Err(ApiError::Unauthorized("invalid API key".to_string()));
    }

    debug!(path = %path, "Authentication successful");
    Ok(next.run(request).await)
}

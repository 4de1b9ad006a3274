//! Namespace-scoped authorization
//!
//! Permission sets are computed per key at startup. The target namespace
//! is extracted by priority: URL path segment, `X-MAIA-Namespace` header,
//! `namespace` query parameter, and for POST/PUT the top-level
//! `namespace` field of the JSON body. The body is drained into a buffer
//! and replaced with a replayable reader so handlers see the original
//! bytes.

use std::collections::{HashMap, HashSet};

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use crate::config::{AuthConfig, DefaultPolicy};
use crate::errors::ApiError;
use crate::middleware::auth::RawApiKey;
use crate::state::AppState;

/// Body-peek cap; larger bodies skip namespace extraction rather than
/// buffering unbounded input
const BODY_PEEK_LIMIT: usize = 4 * 1024 * 1024;

/// Per-key allowed-namespace sets
pub struct NamespacePermissions {
    by_key: HashMap<String, HashSet<String>>,
}

impl NamespacePermissions {
    /// Precompute sets from configuration
    pub fn from_config(config: &AuthConfig) -> Self {
        let by_key = config
            .key_namespaces
            .iter()
            .map(|(key, namespaces)| {
                (
                    key.clone(),
                    namespaces.iter().cloned().collect::<HashSet<_>>(),
                )
            })
            .collect();
        Self { by_key }
    }

    /// Decide access for a key/namespace pair. Universal `*` passes, then
    /// exact match, then hierarchical prefix (`allowed + "/"`).
    pub fn allows(&self, key: Option<&str>, namespace: &str, default: DefaultPolicy) -> bool {
        let Some(allowed) = key.and_then(|k| self.by_key.get(k)) else {
            return default == DefaultPolicy::Allow;
        };
        if allowed.contains("*") {
            return true;
        }
        if allowed.contains(namespace) {
            return true;
        }
        allowed
            .iter()
            .any(|a| namespace.starts_with(&format!("{a}/")))
    }
}

/// Pull the target namespace out of the request path, if any
fn namespace_from_path(path: &str) -> Option<String> {
    let rest = path.strip_prefix("/v1/namespaces/")?;
    let rest = rest.strip_suffix("/memories").unwrap_or(rest);
    if rest.is_empty() {
        None
    } else {
        Some(rest.to_string())
    }
}

fn namespace_from_query(request: &Request<Body>) -> Option<String> {
    let query = request.uri().query()?;
    for pair in query.split('&') {
        if let Some((name, value)) = pair.split_once('=') {
            if name == "namespace" && !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Namespace authorization middleware
pub async fn namespace_authz_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.config.auth.authz_enabled {
        return Ok(next.run(request).await);
    }

    let path = request.uri().path().to_string();
    let method = request.method().clone();

    let mut namespace = namespace_from_path(&path)
        .or_else(|| {
            request
                .headers()
                .get("x-maia-namespace")
                .and_then(|h| h.to_str().ok())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
        .or_else(|| namespace_from_query(&request));

    // peek the JSON body last, restoring a replayable reader either way
    let request = if namespace.is_none()
        && (method == axum::http::Method::POST || method == axum::http::Method::PUT)
    {
        let (parts, body) = request.into_parts();
        let bytes = to_bytes(body, BODY_PEEK_LIMIT)
            .await
            .map_err(|e| ApiError::invalid_input(format!("failed to read body: {e}")))?;
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&bytes) {
            namespace = value
                .get("namespace")
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string);
        }
        Request::from_parts(parts, Body::from(bytes))
    } else {
        request
    };

    let Some(namespace) = namespace else {
        return Ok(next.run(request).await);
    };

    let key = request.extensions().get::<RawApiKey>().map(|k| k.0.clone());
    if state
        .permissions
        .allows(key.as_deref(), &namespace, state.config.auth.default_policy)
    {
        debug!(namespace = %namespace, "Namespace access granted");
        return Ok(next.run(request).await);
    }

    warn!(namespace = %namespace, path = %path, "Namespace access denied");
    Err(ApiError::forbidden(format!(
        "access denied for namespace: {namespace}"
    )))
}

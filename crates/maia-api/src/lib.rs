//! MAIA API service library
//!
//! Wires the tenant-aware store, tenant registry, and inference router
//! into an axum application with the full middleware chain. The binary in
//! `main.rs` drives this; integration tests drive [`build_app`] directly.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{Request, State},
    middleware::{from_fn, from_fn_with_state, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub mod config;
pub mod errors;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod state;

use maia_intelligence::{
    CacheConfig, CachingRouter, HealthCheckConfig, HealthChecker, ResponseCache,
    Router as InferenceRouter, RouterConfig,
};
use maia_persistence::{
    InMemoryKv, KvBackedStore, PersistenceConfig, TenantAwareStore, TenantRegistry,
};
use maia_types::MemoryStore;

pub use config::ApiConfig;
pub use errors::{ApiError, ApiResult};
pub use state::AppState;

/// Record request counters and latency around the rest of the pipeline
async fn track_metrics(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    state
        .metrics
        .http_requests_total
        .with_label_values(&[&method, &path, response.status().as_str()])
        .inc();
    state
        .metrics
        .http_request_duration
        .observe(started.elapsed().as_secs_f64());
    response
}

fn cors_layer(config: &ApiConfig) -> CorsLayer {
    if config.cors_origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }
    let origins: Vec<_> = config
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build the axum application with the full middleware chain
pub fn build_app(state: AppState) -> Router {
    let mut app = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .route("/metrics", get(handlers::health::metrics))
        .route("/v1/memories", post(handlers::memories::create))
        .route("/v1/memories/search", post(handlers::memories::search))
        .route(
            "/v1/memories/:id",
            get(handlers::memories::get)
                .put(handlers::memories::update)
                .delete(handlers::memories::delete),
        )
        .route(
            "/v1/namespaces",
            get(handlers::namespaces::list).post(handlers::namespaces::create),
        )
        .route(
            "/v1/namespaces/:id",
            get(handlers::namespaces::get)
                .put(handlers::namespaces::update)
                .delete(handlers::namespaces::delete),
        )
        .route("/v1/namespaces/:id/memories", get(handlers::namespaces::memories))
        .route("/v1/context", post(handlers::context::assemble))
        .route("/v1/stats", get(handlers::stats::stats))
        .route("/v1/inference/chat", post(handlers::inference::chat))
        .route("/v1/inference/models", get(handlers::inference::models))
        .route("/v1/inference/health", get(handlers::inference::health_all))
        .route(
            "/v1/inference/health/:name",
            get(handlers::inference::health_one).post(handlers::inference::check_now),
        )
        .route("/v1/inference/cache/stats", get(handlers::inference::cache_stats))
        .route("/v1/inference/cache/clear", post(handlers::inference::cache_clear));

    if state.config.admin_enabled {
        app = app
            .route(
                "/admin/tenants",
                get(handlers::tenants::list).post(handlers::tenants::create),
            )
            .route(
                "/admin/tenants/:id",
                get(handlers::tenants::get)
                    .put(handlers::tenants::update)
                    .delete(handlers::tenants::delete),
            )
            .route("/admin/tenants/:id/usage", get(handlers::tenants::usage))
            .route("/admin/tenants/:id/suspend", post(handlers::tenants::suspend))
            .route("/admin/tenants/:id/activate", post(handlers::tenants::activate))
            .route(
                "/admin/tenants/:id/apikeys",
                get(handlers::tenants::list_api_keys).post(handlers::tenants::create_api_key),
            );
    }

    app.layer(from_fn_with_state(state.clone(), middleware::scope_middleware))
        .layer(from_fn_with_state(state.clone(), middleware::tenant_middleware))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::namespace_authz_middleware,
        ))
        .layer(from_fn_with_state(state.clone(), middleware::auth_middleware))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::rate_limit_middleware,
        ))
        .layer(cors_layer(&state.config))
        .layer(from_fn(middleware::request_id_middleware))
        .layer(from_fn(middleware::security_headers_middleware))
        .layer(from_fn_with_state(state.clone(), track_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Assemble the service: embedded KV engines, registry with the system
/// tenant, tenant-aware store, and the inference stack. Background tasks
/// (health loop, rate-limit GC) are started here.
pub async fn bootstrap(config: ApiConfig) -> anyhow::Result<AppState> {
    let registry = Arc::new(TenantRegistry::new(InMemoryKv::shared()));
    registry.ensure_system_tenant().await?;

    let shared: Arc<dyn MemoryStore> = Arc::new(KvBackedStore::in_memory());
    let store = Arc::new(TenantAwareStore::new(
        shared,
        registry.clone(),
        PersistenceConfig::from_env(),
    ));

    let inference = if config.inference.enabled {
        let checker = Arc::new(HealthChecker::new(HealthCheckConfig::default()));
        let router = Arc::new(InferenceRouter::with_health_checker(
            RouterConfig {
                default_provider: config.inference.default_provider.clone(),
                failover_enabled: config.inference.failover_enabled,
            },
            checker.clone(),
        ));
        checker.start().await;
        let cache = Arc::new(ResponseCache::new(CacheConfig {
            enabled: config.inference.cache_enabled,
            max_entries: config.inference.cache_max_entries,
            ttl: config.inference.cache_ttl,
        }));
        Some(Arc::new(CachingRouter::new(router, cache)))
    } else {
        None
    };

    let state = AppState::new(config, store, registry, inference)?;
    state.rate_limiter.start_gc().await;

    info!("MAIA service assembled");
    Ok(state)
}

/// Stop background tasks and close shared resources
pub async fn shutdown(state: &AppState) {
    state.rate_limiter.stop().await;
    if let Some(inference) = &state.inference {
        if let Err(err) = inference.close().await {
            tracing::warn!(error = %err, "Inference close reported errors");
        }
    }
    if let Err(err) = state.store.close().await {
        tracing::warn!(error = %err, "Store close reported errors");
    }
    info!("MAIA service stopped");
}

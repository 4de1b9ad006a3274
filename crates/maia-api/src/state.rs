//! Shared application state

use std::sync::Arc;

use maia_intelligence::CachingRouter;
use maia_persistence::{TenantAwareStore, TenantRegistry};

use crate::config::ApiConfig;
use crate::metrics::Metrics;
use crate::middleware::authz::NamespacePermissions;
use crate::middleware::rate_limit::ClientRateLimiter;

/// State shared across every request handler and middleware
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub store: Arc<TenantAwareStore>,
    pub registry: Arc<TenantRegistry>,
    /// Inference routing; `None` when no providers are configured
    pub inference: Option<Arc<CachingRouter>>,
    pub rate_limiter: Arc<ClientRateLimiter>,
    pub permissions: Arc<NamespacePermissions>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// Assemble state from the configured collaborators
    pub fn new(
        config: ApiConfig,
        store: Arc<TenantAwareStore>,
        registry: Arc<TenantRegistry>,
        inference: Option<Arc<CachingRouter>>,
    ) -> anyhow::Result<Self> {
        let rate_limiter = Arc::new(ClientRateLimiter::new(config.rate_limit.clone()));
        let permissions = Arc::new(NamespacePermissions::from_config(&config.auth));
        let metrics = Arc::new(Metrics::new()?);
        Ok(Self {
            config: Arc::new(config),
            store,
            registry,
            inference,
            rate_limiter,
            permissions,
            metrics,
        })
    }
}

//! Pattern-based provider routing with health-driven failover
//!
//! The router keeps a registry of providers in registration order plus an
//! ordered routing table of model patterns. Resolution prefers an exact
//! pattern, then the first matching wildcard, then the default provider;
//! when failover is enabled an unavailable target is replaced by another
//! registered provider that supports the model.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::health::HealthChecker;
use crate::provider::{ChatRequest, ChatResponse, ModelInfo, Provider, StreamReader};
use crate::{IntelligenceError, Result};

/// Match a model id against a routing pattern. Four wildcard shapes are
/// supported: `*`, `prefix*`, `*suffix`, `*middle*`. No regex.
pub fn pattern_matches(pattern: &str, model_id: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(middle) = pattern
        .strip_prefix('*')
        .and_then(|p| p.strip_suffix('*'))
    {
        return model_id.contains(middle);
    }
    if let Some(suffix) = pattern.strip_prefix('*') {
        return model_id.ends_with(suffix);
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return model_id.starts_with(prefix);
    }
    pattern == model_id
}

/// Router configuration
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Fallback provider when no pattern matches
    pub default_provider: Option<String>,
    /// When enabled, unavailable targets are routed around
    pub failover_enabled: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_provider: None,
            failover_enabled: true,
        }
    }
}

/// Registry + routing table + failover resolution
pub struct Router {
    config: RouterConfig,
    /// Providers in registration order; order breaks routing ties
    providers: RwLock<Vec<(String, Arc<dyn Provider>)>>,
    /// Ordered `(pattern, provider name)` routing table
    routes: RwLock<Vec<(String, String)>>,
    health: Arc<HealthChecker>,
}

impl Router {
    /// Build a router with its own health checker
    pub fn new(config: RouterConfig) -> Self {
        Self::with_health_checker(config, Arc::new(HealthChecker::default()))
    }

    /// Build a router around an externally constructed health checker.
    /// The checker is created first and injected so providers reference
    /// neither the router nor the checker.
    pub fn with_health_checker(config: RouterConfig, health: Arc<HealthChecker>) -> Self {
        Self {
            config,
            providers: RwLock::new(Vec::new()),
            routes: RwLock::new(Vec::new()),
            health,
        }
    }

    /// The health checker collaborating with this router
    pub fn health_checker(&self) -> Arc<HealthChecker> {
        self.health.clone()
    }

    /// Register a provider and hand it to the health checker
    pub async fn register_provider(
        &self,
        name: impl Into<String>,
        provider: Arc<dyn Provider>,
    ) -> Result<()> {
        let name = name.into();
        {
            let mut providers = self.providers.write().await;
            if providers.iter().any(|(n, _)| n == &name) {
                return Err(IntelligenceError::Configuration(format!(
                    "provider already registered: {name}"
                )));
            }
            providers.push((name.clone(), provider.clone()));
        }
        self.health.register(name.clone(), provider).await;
        info!(provider = %name, "Registered provider");
        Ok(())
    }

    /// Append a routing entry; earlier entries win on wildcard ties
    pub async fn add_route(&self, pattern: impl Into<String>, provider: impl Into<String>) {
        let pattern = pattern.into();
        let provider = provider.into();
        debug!(pattern = %pattern, provider = %provider, "Added model route");
        self.routes.write().await.push((pattern, provider));
    }

    async fn get_provider(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers
            .read()
            .await
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, p)| p.clone())
    }

    async fn is_available(&self, name: &str) -> bool {
        !self.config.failover_enabled || self.health.is_healthy(name).await
    }

    /// Resolve the provider name mapped to a model id: exact pattern
    /// first, then the first matching wildcard, then the default
    async fn mapped_provider(&self, model_id: &str) -> Option<String> {
        let routes = self.routes.read().await;
        if let Some((_, name)) = routes
            .iter()
            .find(|(pattern, _)| pattern == model_id)
        {
            return Some(name.clone());
        }
        if let Some((_, name)) = routes
            .iter()
            .find(|(pattern, _)| pattern_matches(pattern, model_id))
        {
            return Some(name.clone());
        }
        self.config.default_provider.clone()
    }

    /// Core routing decision for a model id with an optional explicit
    /// provider override
    pub async fn route(
        &self,
        model_id: &str,
        explicit: Option<&str>,
    ) -> Result<Arc<dyn Provider>> {
        // explicit override: honored or refused, never rerouted
        if let Some(name) = explicit.filter(|n| !n.is_empty()) {
            return match self.get_provider(name).await {
                Some(provider) => {
                    if self.config.failover_enabled && !self.health.is_healthy(name).await {
                        Err(IntelligenceError::ProviderUnhealthy(name.to_string()))
                    } else {
                        Ok(provider)
                    }
                }
                None => Err(IntelligenceError::NoProviderFound(name.to_string())),
            };
        }

        let mapped = self.mapped_provider(model_id).await;
        if let Some(name) = &mapped {
            if let Some(provider) = self.get_provider(name).await {
                if self.is_available(name).await {
                    return Ok(provider);
                }
                debug!(provider = %name, model = %model_id, "Mapped provider unavailable");
            }
        }

        let providers = self.providers.read().await.clone();

        // failover: another registered provider that supports the model
        // and is available
        if self.config.failover_enabled {
            for (name, provider) in &providers {
                if Some(name) == mapped.as_ref() {
                    continue;
                }
                if provider.supports_model(model_id) && self.health.is_healthy(name).await {
                    warn!(from = ?mapped, to = %name, model = %model_id, "Failing over");
                    return Ok(provider.clone());
                }
            }
        }

        // any supporter, even unhealthy, beats failing outright
        if let Some((name, provider)) = providers
            .iter()
            .find(|(_, p)| p.supports_model(model_id))
        {
            debug!(provider = %name, model = %model_id, "Falling back to unhealthy supporter");
            return Ok(provider.clone());
        }

        if let Some(default) = &self.config.default_provider {
            if let Some(provider) = self.get_provider(default).await {
                return Ok(provider);
            }
        }

        match providers.first() {
            Some((_, provider)) => Ok(provider.clone()),
            None => Err(IntelligenceError::NoProviderFound(model_id.to_string())),
        }
    }

    /// Route, then run the completion
    pub async fn complete(&self, request: ChatRequest) -> Result<ChatResponse> {
        let provider = self
            .route(&request.model, request.provider.as_deref())
            .await?;
        provider.complete(request).await
    }

    /// Route, then open a stream
    pub async fn stream(&self, request: ChatRequest) -> Result<StreamReader> {
        let provider = self
            .route(&request.model, request.provider.as_deref())
            .await?;
        provider.stream(request).await
    }

    /// Union of every provider's models; individual failures are skipped
    pub async fn list_models(&self) -> Vec<ModelInfo> {
        let providers = self.providers.read().await.clone();
        let mut models = Vec::new();
        for (name, provider) in providers {
            match provider.list_models().await {
                Ok(mut m) => models.append(&mut m),
                Err(err) => {
                    debug!(provider = %name, error = %err, "Skipping models from failing provider");
                }
            }
        }
        models
    }

    /// Registered provider names in registration order
    pub async fn provider_names(&self) -> Vec<String> {
        self.providers
            .read()
            .await
            .iter()
            .map(|(n, _)| n.clone())
            .collect()
    }

    /// Stop the health loop, close every provider, and clear the
    /// registry; errors are aggregated into one
    pub async fn close(&self) -> Result<()> {
        self.health.stop().await;
        let providers = {
            let mut guard = self.providers.write().await;
            std::mem::take(&mut *guard)
        };
        self.routes.write().await.clear();

        let mut failures = Vec::new();
        for (name, provider) in providers {
            if let Err(err) = provider.close().await {
                warn!(provider = %name, error = %err, "Provider close failed");
                failures.push(format!("{name}: {err}"));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(IntelligenceError::Provider(failures.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_shapes() {
        assert!(pattern_matches("*", "anything"));
        assert!(pattern_matches("gpt-*", "gpt-4"));
        assert!(!pattern_matches("gpt-*", "claude-3"));
        assert!(pattern_matches("*-mini", "o4-mini"));
        assert!(!pattern_matches("*-mini", "o4-large"));
        assert!(pattern_matches("*sonnet*", "claude-sonnet-4"));
        assert!(!pattern_matches("*sonnet*", "claude-opus-4"));
        assert!(pattern_matches("exact", "exact"));
        assert!(!pattern_matches("exact", "exactly"));
    }
}

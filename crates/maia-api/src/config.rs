//! API service configuration
//!
//! Everything is driven by environment variables so deployments configure
//! the service without a file.

use std::collections::HashMap;
use std::time::Duration;

/// Default namespace-authorization policy for requests without a known key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultPolicy {
    Allow,
    Deny,
}

/// Authentication and namespace-authorization settings
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Valid API keys; authentication is enabled when non-empty
    pub api_keys: Vec<String>,
    /// Paths that bypass authentication (exact or prefix match)
    pub skip_paths: Vec<String>,
    /// Namespace authorization toggle, independent of authentication
    pub authz_enabled: bool,
    /// Per-key allowed namespaces; `*` grants universal access
    pub key_namespaces: HashMap<String, Vec<String>>,
    /// Policy for requests without a known API key
    pub default_policy: DefaultPolicy,
}

impl AuthConfig {
    pub fn auth_enabled(&self) -> bool {
        !self.api_keys.is_empty()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            skip_paths: vec![
                "/health".to_string(),
                "/ready".to_string(),
                "/metrics".to_string(),
            ],
            authz_enabled: false,
            key_namespaces: HashMap::new(),
            default_policy: DefaultPolicy::Deny,
        }
    }
}

/// Rate limiting settings
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests_per_second: f64,
    pub burst: f64,
}

impl RateLimitConfig {
    /// Burst defaults to twice the refill rate
    pub fn with_rps(rps: f64) -> Self {
        Self {
            enabled: true,
            requests_per_second: rps,
            burst: rps * 2.0,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            requests_per_second: 50.0,
            burst: 100.0,
        }
    }
}

/// Tenant identification settings
#[derive(Debug, Clone, Default)]
pub struct TenantIdentConfig {
    pub enabled: bool,
    /// Resolve the tenant through the API-key manager when a key is present
    pub lookup_by_api_key: bool,
    /// Fallback tenant id when neither header nor key resolves one
    pub default_tenant_id: Option<String>,
    /// When set, a request that resolves no tenant is refused
    pub require_tenant: bool,
}

/// Inference settings
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub enabled: bool,
    pub cache_enabled: bool,
    pub cache_max_entries: usize,
    pub cache_ttl: Duration,
    pub default_provider: Option<String>,
    pub failover_enabled: bool,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_enabled: true,
            cache_max_entries: 1000,
            cache_ttl: Duration::from_secs(24 * 60 * 60),
            default_provider: None,
            failover_enabled: true,
        }
    }
}

/// Top-level service configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind: String,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub tenant: TenantIdentConfig,
    pub inference: InferenceConfig,
    /// Mount `/admin/tenants` routes
    pub admin_enabled: bool,
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            auth: AuthConfig::default(),
            rate_limit: RateLimitConfig::default(),
            tenant: TenantIdentConfig::default(),
            inference: InferenceConfig::default(),
            admin_enabled: true,
            cors_origins: Vec::new(),
        }
    }
}

fn env_list(name: &str) -> Vec<String> {
    std::env::var(name)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Parse `key=ns1|ns2,key2=*` into the per-key namespace map
fn parse_key_namespaces(raw: &str) -> HashMap<String, Vec<String>> {
    let mut map = HashMap::new();
    for pair in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if let Some((key, namespaces)) = pair.split_once('=') {
            let list = namespaces
                .split('|')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            map.insert(key.trim().to_string(), list);
        }
    }
    map
}

impl ApiConfig {
    /// Read configuration from `MAIA_*` environment variables
    pub fn from_env() -> Self {
        let api_keys = env_list("MAIA_API_KEYS");
        let rps = env_parse("MAIA_RATE_LIMIT_RPS", 50.0_f64);
        let burst = env_parse("MAIA_RATE_LIMIT_BURST", rps * 2.0);

        Self {
            bind: std::env::var("MAIA_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            auth: AuthConfig {
                api_keys,
                skip_paths: AuthConfig::default().skip_paths,
                authz_enabled: env_bool("MAIA_AUTHZ_ENABLED", false),
                key_namespaces: parse_key_namespaces(
                    &std::env::var("MAIA_KEY_NAMESPACES").unwrap_or_default(),
                ),
                default_policy: match std::env::var("MAIA_AUTHZ_DEFAULT_POLICY").as_deref() {
                    Ok("allow") => DefaultPolicy::Allow,
                    _ => DefaultPolicy::Deny,
                },
            },
            rate_limit: RateLimitConfig {
                enabled: env_bool("MAIA_RATE_LIMIT_ENABLED", false),
                requests_per_second: rps,
                burst,
            },
            tenant: TenantIdentConfig {
                enabled: env_bool("MAIA_TENANT_ENABLED", false),
                lookup_by_api_key: env_bool("MAIA_TENANT_LOOKUP_BY_KEY", true),
                default_tenant_id: std::env::var("MAIA_DEFAULT_TENANT_ID")
                    .ok()
                    .filter(|s| !s.is_empty()),
                require_tenant: env_bool("MAIA_REQUIRE_TENANT", false),
            },
            inference: InferenceConfig {
                enabled: env_bool("MAIA_INFERENCE_ENABLED", true),
                cache_enabled: env_bool("MAIA_CACHE_ENABLED", true),
                cache_max_entries: env_parse("MAIA_CACHE_MAX_ENTRIES", 1000_usize),
                cache_ttl: Duration::from_secs(env_parse("MAIA_CACHE_TTL_SECS", 86_400_u64)),
                default_provider: std::env::var("MAIA_DEFAULT_PROVIDER")
                    .ok()
                    .filter(|s| !s.is_empty()),
                failover_enabled: env_bool("MAIA_FAILOVER_ENABLED", true),
            },
            admin_enabled: env_bool("MAIA_ADMIN_ENABLED", true),
            cors_origins: env_list("MAIA_CORS_ORIGINS"),
        }
    }
}

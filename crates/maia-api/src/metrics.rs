//! Prometheus metrics for the API service
//!
//! One registry owns every series. The replication/migration counters are
//! reserved observability surface: registered so dashboards can bind to
//! them, never incremented by core logic.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Metric handles shared across the service
pub struct Metrics {
    registry: Registry,
    pub http_requests_total: IntCounterVec,
    pub http_request_duration: Histogram,
    pub rate_limit_denials_total: IntCounter,
    pub auth_failures_total: IntCounter,
    pub inference_requests_total: IntCounter,
    pub inference_failures_total: IntCounter,
    pub cache_hits_total: IntCounter,
    pub cache_misses_total: IntCounter,
    pub tenant_operations_total: IntCounterVec,
    /// Reserved: replication surface, no replication logic behind it
    pub replication_events_total: IntCounter,
    /// Reserved: tenant migration surface
    pub tenant_migrations_total: IntCounter,
}

impl Metrics {
    /// Build and register every series
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("maia_http_requests_total", "HTTP requests by method/path/status"),
            &["method", "path", "status"],
        )?;
        let http_request_duration = Histogram::with_opts(HistogramOpts::new(
            "maia_http_request_duration_seconds",
            "HTTP request latency",
        ))?;
        let rate_limit_denials_total = IntCounter::new(
            "maia_rate_limit_denials_total",
            "Requests denied by the rate limiter",
        )?;
        let auth_failures_total = IntCounter::new(
            "maia_auth_failures_total",
            "Requests refused by authentication",
        )?;
        let inference_requests_total = IntCounter::new(
            "maia_inference_requests_total",
            "Chat completion requests received",
        )?;
        let inference_failures_total = IntCounter::new(
            "maia_inference_failures_total",
            "Chat completion requests that failed",
        )?;
        let cache_hits_total =
            IntCounter::new("maia_cache_hits_total", "Response cache hits")?;
        let cache_misses_total =
            IntCounter::new("maia_cache_misses_total", "Response cache misses")?;
        let tenant_operations_total = IntCounterVec::new(
            Opts::new("maia_tenant_operations_total", "Tenant admin operations"),
            &["operation"],
        )?;
        let replication_events_total = IntCounter::new(
            "maia_replication_events_total",
            "Reserved replication event counter",
        )?;
        let tenant_migrations_total = IntCounter::new(
            "maia_tenant_migrations_total",
            "Reserved tenant migration counter",
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration.clone()))?;
        registry.register(Box::new(rate_limit_denials_total.clone()))?;
        registry.register(Box::new(auth_failures_total.clone()))?;
        registry.register(Box::new(inference_requests_total.clone()))?;
        registry.register(Box::new(inference_failures_total.clone()))?;
        registry.register(Box::new(cache_hits_total.clone()))?;
        registry.register(Box::new(cache_misses_total.clone()))?;
        registry.register(Box::new(tenant_operations_total.clone()))?;
        registry.register(Box::new(replication_events_total.clone()))?;
        registry.register(Box::new(tenant_migrations_total.clone()))?;

        Ok(Self {
            registry,
            http_requests_total,
            http_request_duration,
            rate_limit_denials_total,
            auth_failures_total,
            inference_requests_total,
            inference_failures_total,
            cache_hits_total,
            cache_misses_total,
            tenant_operations_total,
            replication_events_total,
            tenant_migrations_total,
        })
    }

    /// Render the Prometheus text exposition
    pub fn gather(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if encoder.encode(&metric_families, &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

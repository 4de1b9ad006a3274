//! Per-client token-bucket rate limiting
//!
//! Each client gets a bucket refilled at `rps` tokens per second up to
//! `burst`. Buckets live in a concurrent map; a background task evicts
//! buckets idle for more than five minutes once a minute and is stopped
//! on shutdown.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::RateLimitConfig;
use crate::middleware::auth::client_ip;
use crate::state::AppState;

const GC_INTERVAL: Duration = Duration::from_secs(60);
const BUCKET_IDLE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
    last_request: Instant,
}

/// Token-bucket limiter keyed by client id
pub struct ClientRateLimiter {
    config: RateLimitConfig,
    buckets: DashMap<String, Bucket>,
    gc_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl ClientRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: DashMap::new(),
            gc_handle: Mutex::new(None),
        }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Refill and take one token; `false` means the request is denied
    pub fn allow(&self, client_id: &str) -> bool {
        if !self.config.enabled {
            return true;
        }
        let now = Instant::now();
        let mut entry = self
            .buckets
            .entry(client_id.to_string())
            .or_insert_with(|| Bucket {
                tokens: self.config.burst,
                last_refill: now,
                last_request: now,
            });
        let bucket = entry.value_mut();

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens =
            (bucket.tokens + elapsed * self.config.requests_per_second).min(self.config.burst);
        bucket.last_refill = now;
        bucket.last_request = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Number of tracked clients
    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }

    /// Launch the minute GC ticker; idempotent
    pub async fn start_gc(self: &Arc<Self>) {
        let mut handle = self.gc_handle.lock().await;
        if handle.is_some() {
            return;
        }
        let limiter = Arc::clone(self);
        *handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(GC_INTERVAL);
            loop {
                ticker.tick().await;
                let now = Instant::now();
                let before = limiter.buckets.len();
                limiter
                    .buckets
                    .retain(|_, bucket| now.duration_since(bucket.last_request) < BUCKET_IDLE_TTL);
                let evicted = before.saturating_sub(limiter.buckets.len());
                if evicted > 0 {
                    debug!(evicted, remaining = limiter.buckets.len(), "Evicted idle rate-limit buckets");
                }
            }
        }));
    }

    /// Stop the GC task
    pub async fn stop(&self) {
        if let Some(handle) = self.gc_handle.lock().await.take() {
            handle.abort();
        }
    }
}

/// Rate limiting middleware; denial is 429 with a fixed body
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.rate_limiter.enabled() {
        return next.run(request).await;
    }

    let ip = client_ip(&request);
    if state.rate_limiter.allow(&ip) {
        return next.run(request).await;
    }

    state.metrics.rate_limit_denials_total.inc();
    warn!(client_ip = %ip, path = %request.uri().path(), "Rate limit exceeded");
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(serde_json::json!({ "error": "rate_limit_exceeded" })),
    )
        .into_response()
}

//! Deterministic response cache and the caching router wrapper
//!
//! Keys are SHA-256 over a canonical fingerprint of the request, so two
//! semantically equal requests always map to the same entry. The cache is
//! an in-memory LRU with TTL behind one coarse mutex; every mutation is
//! serialized.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::provider::{ChatRequest, ChatResponse, ModelInfo, StreamReader};
use crate::router::Router;
use crate::{IntelligenceError, Result};

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: usize,
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 1000,
            ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// One cached response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub response: ChatResponse,
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub hit_count: u64,
    pub last_access: DateTime<Utc>,
}

/// Counters exposed through the cache admin surface
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub entries: usize,
    pub max_entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    /// LRU order, most recent first
    order: Vec<String>,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

impl CacheInner {
    fn promote(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            let k = self.order.remove(pos);
            self.order.insert(0, k);
        }
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.entries.remove(key)
    }
}

/// Canonical fingerprint of a request: a `|`-join of the routing-relevant
/// fields in fixed order. Optional fields appear only when set; the stop
/// list is sorted so ordering differences cannot split the key space.
pub fn fingerprint(request: &ChatRequest) -> String {
    let mut parts = Vec::with_capacity(request.messages.len() + 5);
    parts.push(format!("model:{}", request.model));
    for (i, message) in request.messages.iter().enumerate() {
        parts.push(format!("msg{i}:{}:{}", message.role.as_str(), message.content));
    }
    if let Some(temperature) = request.temperature {
        parts.push(format!("temp:{temperature:.2}"));
    }
    if let Some(top_p) = request.top_p {
        parts.push(format!("top_p:{top_p:.2}"));
    }
    if let Some(max_tokens) = request.max_tokens {
        parts.push(format!("max_tokens:{max_tokens}"));
    }
    if let Some(stop) = &request.stop {
        if !stop.is_empty() {
            let mut sorted = stop.clone();
            sorted.sort();
            parts.push(format!("stop:{}", sorted.join(",")));
        }
    }
    parts.join("|")
}

/// SHA-256 hex of the canonical fingerprint
pub fn cache_key(request: &ChatRequest) -> String {
    let mut hasher = Sha256::new();
    hasher.update(fingerprint(request).as_bytes());
    hex::encode(hasher.finalize())
}

/// In-memory LRU response cache with TTL
pub struct ResponseCache {
    config: CacheConfig,
    inner: Mutex<CacheInner>,
}

impl ResponseCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Look up a response; expired entries are dropped and counted as
    /// misses
    pub fn get(&self, request: &ChatRequest) -> Option<ChatResponse> {
        if !self.config.enabled {
            return None;
        }
        let key = cache_key(request);
        let mut inner = self.inner.lock();
        let now = Utc::now();

        let expired = matches!(inner.entries.get(&key), Some(entry) if entry.expires_at < now);
        if expired {
            inner.remove(&key);
            inner.expirations += 1;
            inner.misses += 1;
            return None;
        }
        let found = match inner.entries.get_mut(&key) {
            Some(entry) => {
                entry.hit_count += 1;
                entry.last_access = now;
                Some(entry.response.clone())
            }
            None => None,
        };
        match found {
            Some(response) => {
                inner.promote(&key);
                inner.hits += 1;
                Some(response)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Store a response. Streamed requests, empty responses, and a
    /// disabled cache are all skipped; the LRU tail is evicted at
    /// capacity.
    pub fn set(&self, request: &ChatRequest, response: &ChatResponse) {
        if !self.config.enabled || request.stream || response.choices.is_empty() {
            return;
        }
        let key = cache_key(request);
        let now = Utc::now();
        let mut inner = self.inner.lock();

        while inner.entries.len() >= self.config.max_entries
            && !inner.entries.contains_key(&key)
        {
            match inner.order.pop() {
                Some(oldest) => {
                    inner.entries.remove(&oldest);
                    inner.evictions += 1;
                }
                None => break,
            }
        }

        if inner.entries.contains_key(&key) {
            inner.promote(&key);
        } else {
            inner.order.insert(0, key.clone());
        }
        let ttl = chrono::Duration::from_std(self.config.ttl)
            .unwrap_or_else(|_| chrono::Duration::hours(24));
        inner.entries.insert(
            key.clone(),
            CacheEntry {
                response: response.clone(),
                key,
                created_at: now,
                expires_at: now + ttl,
                hit_count: 0,
                last_access: now,
            },
        );
    }

    /// Drop the entry for a request
    pub fn invalidate(&self, request: &ChatRequest) {
        let key = cache_key(request);
        self.inner.lock().remove(&key);
    }

    /// Drop every entry
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        let dropped = inner.entries.len();
        inner.entries.clear();
        inner.order.clear();
        info!(dropped, "Cleared response cache");
    }

    /// Current counters
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            enabled: self.config.enabled,
            entries: inner.entries.len(),
            max_entries: self.config.max_entries,
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            expirations: inner.expirations,
        }
    }

    /// Serialize every entry to JSON
    pub fn export(&self) -> Result<String> {
        let inner = self.inner.lock();
        let entries: Vec<&CacheEntry> = inner.order.iter().filter_map(|k| inner.entries.get(k)).collect();
        serde_json::to_string(&entries)
            .map_err(|e| IntelligenceError::Configuration(format!("cache export failed: {e}")))
    }

    /// Load entries from a JSON export, dropping anything already expired
    /// against the current wall clock
    pub fn import(&self, payload: &str) -> Result<usize> {
        let entries: Vec<CacheEntry> = serde_json::from_str(payload)
            .map_err(|e| IntelligenceError::Configuration(format!("cache import failed: {e}")))?;
        let now = Utc::now();
        let mut inner = self.inner.lock();
        let mut imported = 0;
        for entry in entries {
            if entry.expires_at < now {
                continue;
            }
            if inner.entries.len() >= self.config.max_entries {
                break;
            }
            if !inner.entries.contains_key(&entry.key) {
                inner.order.push(entry.key.clone());
            }
            inner.entries.insert(entry.key.clone(), entry);
            imported += 1;
        }
        debug!(imported, "Imported cache entries");
        Ok(imported)
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

/// Router wrapper that consults the cache on `complete` and stores
/// non-stream successes. `stream` bypasses the cache entirely.
pub struct CachingRouter {
    router: Arc<Router>,
    cache: Arc<ResponseCache>,
}

impl CachingRouter {
    pub fn new(router: Arc<Router>, cache: Arc<ResponseCache>) -> Self {
        Self { router, cache }
    }

    pub fn router(&self) -> Arc<Router> {
        self.router.clone()
    }

    pub fn cache(&self) -> Arc<ResponseCache> {
        self.cache.clone()
    }

    /// Cache-aware completion
    pub async fn complete(&self, request: ChatRequest) -> Result<ChatResponse> {
        if let Some(response) = self.cache.get(&request) {
            debug!(model = %request.model, "Response cache hit");
            return Ok(response);
        }
        let response = self.router.complete(request.clone()).await?;
        self.cache.set(&request, &response);
        Ok(response)
    }

    /// Streaming is never cached
    pub async fn stream(&self, request: ChatRequest) -> Result<StreamReader> {
        self.router.stream(request).await
    }

    /// Delegated model listing
    pub async fn list_models(&self) -> Vec<ModelInfo> {
        self.router.list_models().await
    }

    /// Close the wrapped router
    pub async fn close(&self) -> Result<()> {
        self.router.close().await
    }
}

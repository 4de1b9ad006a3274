//! Provider health checking with hysteresis
//!
//! Each provider carries a record driven by consecutive success/failure
//! counts: `unhealthy_threshold` failures flip a provider down,
//! `healthy_threshold` successes bring it back. `Unknown` (never probed)
//! is treated as available so fresh providers are not blackholed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::provider::Provider;
use crate::{IntelligenceError, Result};

/// Health checker configuration
#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    pub interval: Duration,
    pub timeout: Duration,
    /// Consecutive failures before a provider is marked unhealthy
    pub unhealthy_threshold: u32,
    /// Consecutive successes before an unhealthy provider recovers
    pub healthy_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(5),
            unhealthy_threshold: 3,
            healthy_threshold: 2,
        }
    }
}

/// Observed health state of a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderHealth {
    Healthy,
    Unhealthy,
    Unknown,
}

/// Per-provider health record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthRecord {
    pub status: ProviderHealth,
    pub consecutive_errors: u32,
    pub consecutive_ok: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_check: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Default for HealthRecord {
    fn default() -> Self {
        Self {
            status: ProviderHealth::Unknown,
            consecutive_errors: 0,
            consecutive_ok: 0,
            last_check: None,
            last_error: None,
        }
    }
}

/// Periodic health checker over the registered providers
pub struct HealthChecker {
    config: HealthCheckConfig,
    providers: RwLock<HashMap<String, Arc<dyn Provider>>>,
    records: RwLock<HashMap<String, HealthRecord>>,
    stop_tx: watch::Sender<bool>,
    loop_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl HealthChecker {
    /// Create a checker; the background loop starts on [`Self::start`]
    pub fn new(config: HealthCheckConfig) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            config,
            providers: RwLock::new(HashMap::new()),
            records: RwLock::new(HashMap::new()),
            stop_tx,
            loop_handle: Mutex::new(None),
        }
    }

    /// Track a provider, starting from `Unknown`
    pub async fn register(&self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        let name = name.into();
        self.providers.write().await.insert(name.clone(), provider);
        self.records
            .write()
            .await
            .entry(name.clone())
            .or_default();
        debug!(provider = %name, "Registered provider for health checking");
    }

    /// Stop tracking a provider
    pub async fn unregister(&self, name: &str) {
        self.providers.write().await.remove(name);
        self.records.write().await.remove(name);
    }

    /// True unless the provider has been marked unhealthy; `Unknown` and
    /// untracked providers count as available
    pub async fn is_healthy(&self, name: &str) -> bool {
        self.records
            .read()
            .await
            .get(name)
            .map(|r| r.status != ProviderHealth::Unhealthy)
            .unwrap_or(true)
    }

    /// Current record for one provider
    pub async fn get_status(&self, name: &str) -> Option<HealthRecord> {
        self.records.read().await.get(name).cloned()
    }

    /// Snapshot of every record
    pub async fn statuses(&self) -> HashMap<String, HealthRecord> {
        self.records.read().await.clone()
    }

    /// Run one probe synchronously and fold the result into the record
    pub async fn check_now(&self, name: &str) -> Result<HealthRecord> {
        let provider = self
            .providers
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| IntelligenceError::NoProviderFound(name.to_string()))?;

        let outcome = match tokio::time::timeout(self.config.timeout, provider.health()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err.to_string()),
            Err(_) => Err(format!(
                "health probe timed out after {}ms",
                self.config.timeout.as_millis()
            )),
        };
        self.record_outcome(name, outcome).await;
        Ok(self
            .records
            .read()
            .await
            .get(name)
            .cloned()
            .unwrap_or_default())
    }

    async fn record_outcome(&self, name: &str, outcome: std::result::Result<(), String>) {
        let mut records = self.records.write().await;
        let record = records.entry(name.to_string()).or_default();
        record.last_check = Some(Utc::now());

        match outcome {
            Ok(()) => {
                record.consecutive_errors = 0;
                record.last_error = None;
                if record.status != ProviderHealth::Healthy {
                    record.consecutive_ok += 1;
                    if record.consecutive_ok >= self.config.healthy_threshold {
                        info!(provider = %name, "Provider is healthy");
                        record.status = ProviderHealth::Healthy;
                    }
                }
            }
            Err(message) => {
                record.consecutive_ok = 0;
                record.last_error = Some(message.clone());
                if record.status != ProviderHealth::Unhealthy {
                    record.consecutive_errors += 1;
                    if record.consecutive_errors >= self.config.unhealthy_threshold {
                        warn!(provider = %name, error = %message, "Provider marked unhealthy");
                        record.status = ProviderHealth::Unhealthy;
                    }
                }
            }
        }
    }

    /// Launch the background loop; idempotent
    pub async fn start(self: &Arc<Self>) {
        let mut handle = self.loop_handle.lock().await;
        if handle.is_some() {
            return;
        }
        let checker = Arc::clone(self);
        let mut stop_rx = self.stop_tx.subscribe();
        *handle = Some(tokio::spawn(async move {
            let mut ticker = interval(checker.config.interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let names: Vec<String> =
                            checker.providers.read().await.keys().cloned().collect();
                        for name in names {
                            if let Err(err) = checker.check_now(&name).await {
                                debug!(provider = %name, error = %err, "Health probe skipped");
                            }
                        }
                    }
                    _ = stop_rx.changed() => {
                        if *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        }));
        info!(interval_secs = self.config.interval.as_secs(), "Health check loop started");
    }

    /// Stop the loop, waiting for any in-flight probe to finish
    pub async fn stop(&self) {
        let _ = self.stop_tx.send(true);
        if let Some(handle) = self.loop_handle.lock().await.take() {
            let _ = handle.await;
        }
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new(HealthCheckConfig::default())
    }
}

//! Tenant registry
//!
//! Durable tenant records, the name uniqueness index, and per-tenant usage
//! counters, all kept in the transactional KV under three key families:
//! `tenant:{id}`, `tenant_name:{name}`, `tenant_usage:{id}`. Every
//! operation runs inside a single write transaction; cross-operation
//! atomicity is not promised.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::{PersistenceError, PersistenceResult};
use crate::kv::{decode, encode, KvStore};

/// The built-in tenant that owns unprefixed data. Never deleted or
/// suspended.
pub const SYSTEM_TENANT_ID: &str = "system";

pub(crate) fn tenant_key(id: &str) -> Vec<u8> {
    format!("tenant:{id}").into_bytes()
}

pub(crate) fn tenant_name_key(name: &str) -> Vec<u8> {
    format!("tenant_name:{name}").into_bytes()
}

pub(crate) fn tenant_usage_key(id: &str) -> Vec<u8> {
    format!("tenant_usage:{id}").into_bytes()
}

/// Subscription plan; drives default config and quotas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantPlan {
    Free,
    Standard,
    Premium,
}

impl TenantPlan {
    /// Parse a plan name from the API boundary
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "free" => Some(Self::Free),
            "standard" => Some(Self::Standard),
            "premium" => Some(Self::Premium),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Standard => "standard",
            Self::Premium => "premium",
        }
    }
}

/// Lifecycle status of a tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    Active,
    Suspended,
    PendingDeletion,
}

impl TenantStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "suspended" => Some(Self::Suspended),
            "pending_deletion" => Some(Self::PendingDeletion),
            _ => None,
        }
    }
}

/// Per-tenant configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    pub embedding_model: String,
    pub default_token_budget: u32,
    /// 0 = unlimited
    pub max_namespaces: u32,
    /// 0 = keep forever
    pub retention_days: u32,
    pub dedicated_storage: bool,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl TenantConfig {
    /// Plan defaults applied when a create request omits the config
    pub fn default_for_plan(plan: TenantPlan) -> Self {
        match plan {
            TenantPlan::Free => Self {
                embedding_model: "text-embedding-3-small".to_string(),
                default_token_budget: 4_000,
                max_namespaces: 10,
                retention_days: 90,
                dedicated_storage: false,
                cors_origins: Vec::new(),
            },
            TenantPlan::Standard => Self {
                embedding_model: "text-embedding-3-small".to_string(),
                default_token_budget: 8_000,
                max_namespaces: 100,
                retention_days: 365,
                dedicated_storage: false,
                cors_origins: Vec::new(),
            },
            TenantPlan::Premium => Self {
                embedding_model: "text-embedding-3-large".to_string(),
                default_token_budget: 16_000,
                max_namespaces: 0,
                retention_days: 0,
                dedicated_storage: true,
                cors_origins: Vec::new(),
            },
        }
    }
}

/// Per-tenant quotas; 0 disables the axis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantQuotas {
    pub max_memories: u64,
    pub max_storage_bytes: u64,
    pub requests_per_minute: u32,
    pub requests_per_day: u32,
}

impl TenantQuotas {
    /// Plan defaults applied when a create request omits the quotas
    pub fn default_for_plan(plan: TenantPlan) -> Self {
        match plan {
            TenantPlan::Free => Self {
                max_memories: 10_000,
                max_storage_bytes: 100 * 1024 * 1024,
                requests_per_minute: 60,
                requests_per_day: 10_000,
            },
            TenantPlan::Standard => Self {
                max_memories: 100_000,
                max_storage_bytes: 1024 * 1024 * 1024,
                requests_per_minute: 300,
                requests_per_day: 100_000,
            },
            TenantPlan::Premium => Self::unlimited(),
        }
    }

    /// All axes disabled
    pub fn unlimited() -> Self {
        Self {
            max_memories: 0,
            max_storage_bytes: 0,
            requests_per_minute: 0,
            requests_per_day: 0,
        }
    }
}

/// A tenant identity record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub plan: TenantPlan,
    pub status: TenantStatus,
    pub config: TenantConfig,
    pub quotas: TenantQuotas,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Usage counters, one row per tenant, zeroed at creation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenantUsage {
    pub memory_count: i64,
    pub storage_bytes: i64,
    pub namespace_count: i64,
    pub requests_today: i64,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Input for creating a tenant
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenantCreate {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<TenantPlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<TenantConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quotas: Option<TenantQuotas>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Partial update; absent fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenantUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<TenantPlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TenantStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<TenantConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quotas: Option<TenantQuotas>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

/// Filters and pagination for listing tenants
#[derive(Debug, Clone, Default)]
pub struct ListTenantsOptions {
    pub status: Option<TenantStatus>,
    pub plan: Option<TenantPlan>,
    pub offset: usize,
    /// 0 falls back to the default of 100
    pub limit: usize,
}

/// Registry of tenants, usage counters, and API keys over the KV seam
pub struct TenantRegistry {
    pub(crate) kv: Arc<dyn KvStore>,
}

impl TenantRegistry {
    /// Create a registry over the given engine
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Create a tenant: record, name index, and zeroed usage row in one
    /// atomic batch
    pub async fn create(&self, input: TenantCreate) -> PersistenceResult<Tenant> {
        if input.name.trim().is_empty() {
            return Err(PersistenceError::invalid_input("tenant name is required"));
        }

        let plan = input.plan.unwrap_or(TenantPlan::Free);
        let now = Utc::now();
        let tenant = Tenant {
            id: Uuid::new_v4().to_string(),
            name: input.name,
            plan,
            status: TenantStatus::Active,
            config: input
                .config
                .unwrap_or_else(|| TenantConfig::default_for_plan(plan)),
            quotas: input
                .quotas
                .unwrap_or_else(|| TenantQuotas::default_for_plan(plan)),
            metadata: input.metadata,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.kv.begin_write()?;
        if tx.get(&tenant_name_key(&tenant.name))?.is_some() {
            return Err(PersistenceError::TenantExists(tenant.name));
        }
        tx.put(&tenant_key(&tenant.id), encode(&tenant)?);
        tx.put(
            &tenant_name_key(&tenant.name),
            tenant.id.clone().into_bytes(),
        );
        tx.put(
            &tenant_usage_key(&tenant.id),
            encode(&TenantUsage::default())?,
        );
        tx.commit()?;

        info!(tenant_id = %tenant.id, name = %tenant.name, plan = plan.as_str(), "Created tenant");
        Ok(tenant)
    }

    /// Fetch a tenant by id
    pub async fn get(&self, id: &str) -> PersistenceResult<Tenant> {
        match self.kv.get(&tenant_key(id))? {
            Some(bytes) => Ok(decode(&bytes)?),
            None => Err(PersistenceError::TenantNotFound(id.to_string())),
        }
    }

    /// Fetch a tenant through the name index
    pub async fn get_by_name(&self, name: &str) -> PersistenceResult<Tenant> {
        let id = match self.kv.get(&tenant_name_key(name))? {
            Some(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            None => return Err(PersistenceError::TenantNotFound(name.to_string())),
        };
        self.get(&id).await
    }

    /// Read-modify-write under one transaction. A name change verifies the
    /// new name is free and re-points the index; any failed check aborts
    /// the whole transaction.
    pub async fn update(&self, id: &str, update: TenantUpdate) -> PersistenceResult<Tenant> {
        let mut tx = self.kv.begin_write()?;
        let mut tenant: Tenant = match tx.get(&tenant_key(id))? {
            Some(bytes) => decode(&bytes)?,
            None => return Err(PersistenceError::TenantNotFound(id.to_string())),
        };

        if let Some(new_name) = update.name {
            if new_name.trim().is_empty() {
                return Err(PersistenceError::invalid_input("tenant name is required"));
            }
            if new_name != tenant.name {
                if tx.get(&tenant_name_key(&new_name))?.is_some() {
                    return Err(PersistenceError::TenantExists(new_name));
                }
                tx.delete(&tenant_name_key(&tenant.name));
                tx.put(&tenant_name_key(&new_name), tenant.id.clone().into_bytes());
                tenant.name = new_name;
            }
        }
        if let Some(plan) = update.plan {
            tenant.plan = plan;
        }
        if let Some(status) = update.status {
            tenant.status = status;
        }
        if let Some(config) = update.config {
            tenant.config = config;
        }
        if let Some(quotas) = update.quotas {
            tenant.quotas = quotas;
        }
        if let Some(metadata) = update.metadata {
            tenant.metadata = metadata;
        }
        tenant.updated_at = Utc::now();

        tx.put(&tenant_key(id), encode(&tenant)?);
        tx.commit()?;

        debug!(tenant_id = %id, "Updated tenant");
        Ok(tenant)
    }

    /// Hard delete: tenant record, name index, and usage row in one
    /// transaction. Callers are responsible for refusing the system tenant.
    pub async fn delete(&self, id: &str) -> PersistenceResult<()> {
        let mut tx = self.kv.begin_write()?;
        let tenant: Tenant = match tx.get(&tenant_key(id))? {
            Some(bytes) => decode(&bytes)?,
            None => return Err(PersistenceError::TenantNotFound(id.to_string())),
        };
        tx.delete(&tenant_key(id));
        tx.delete(&tenant_name_key(&tenant.name));
        tx.delete(&tenant_usage_key(id));
        tx.commit()?;

        info!(tenant_id = %id, name = %tenant.name, "Deleted tenant");
        Ok(())
    }

    /// Prefix scan with decode-then-filter; offset counts against matching
    /// items only
    pub async fn list(&self, opts: ListTenantsOptions) -> PersistenceResult<Vec<Tenant>> {
        let limit = if opts.limit == 0 { 100 } else { opts.limit };
        let mut matched = 0usize;
        let mut out = Vec::new();

        for (_, bytes) in self.kv.scan_prefix(b"tenant:")? {
            let tenant: Tenant = decode(&bytes)?;
            if let Some(status) = opts.status {
                if tenant.status != status {
                    continue;
                }
            }
            if let Some(plan) = opts.plan {
                if tenant.plan != plan {
                    continue;
                }
            }
            if matched < opts.offset {
                matched += 1;
                continue;
            }
            matched += 1;
            out.push(tenant);
            if out.len() >= limit {
                break;
            }
        }
        Ok(out)
    }

    /// Set status to suspended
    pub async fn suspend(&self, id: &str) -> PersistenceResult<Tenant> {
        self.update(
            id,
            TenantUpdate {
                status: Some(TenantStatus::Suspended),
                ..Default::default()
            },
        )
        .await
    }

    /// Set status back to active
    pub async fn activate(&self, id: &str) -> PersistenceResult<Tenant> {
        self.update(
            id,
            TenantUpdate {
                status: Some(TenantStatus::Active),
                ..Default::default()
            },
        )
        .await
    }

    /// Fetch the usage row for a tenant
    pub async fn get_usage(&self, id: &str) -> PersistenceResult<TenantUsage> {
        match self.kv.get(&tenant_usage_key(id))? {
            Some(bytes) => Ok(decode(&bytes)?),
            None => Err(PersistenceError::UsageNotFound(id.to_string())),
        }
    }

    /// Transactional read-add-write of the usage row; deltas may be
    /// negative
    pub async fn increment_usage(
        &self,
        id: &str,
        memories: i64,
        bytes: i64,
    ) -> PersistenceResult<TenantUsage> {
        let mut tx = self.kv.begin_write()?;
        let mut usage: TenantUsage = match tx.get(&tenant_usage_key(id))? {
            Some(raw) => decode(&raw)?,
            None => return Err(PersistenceError::UsageNotFound(id.to_string())),
        };
        usage.memory_count = (usage.memory_count + memories).max(0);
        usage.storage_bytes = (usage.storage_bytes + bytes).max(0);
        usage.last_updated = Some(Utc::now());
        tx.put(&tenant_usage_key(id), encode(&usage)?);
        tx.commit()?;
        Ok(usage)
    }

    /// Adjust the namespace counter on the usage row, best-effort semantics
    /// owned by the caller
    pub async fn increment_namespaces(&self, id: &str, delta: i64) -> PersistenceResult<()> {
        let mut tx = self.kv.begin_write()?;
        let mut usage: TenantUsage = match tx.get(&tenant_usage_key(id))? {
            Some(raw) => decode(&raw)?,
            None => return Err(PersistenceError::UsageNotFound(id.to_string())),
        };
        usage.namespace_count = (usage.namespace_count + delta).max(0);
        usage.last_updated = Some(Utc::now());
        tx.put(&tenant_usage_key(id), encode(&usage)?);
        tx.commit()?;
        Ok(())
    }

    /// Idempotent creation of the `"system"` tenant: premium plan, active,
    /// unlimited quotas. The existence check is repeated inside the write
    /// transaction so concurrent callers race safely.
    pub async fn ensure_system_tenant(&self) -> PersistenceResult<Tenant> {
        if let Some(bytes) = self.kv.get(&tenant_key(SYSTEM_TENANT_ID))? {
            return Ok(decode(&bytes)?);
        }

        let now = Utc::now();
        let tenant = Tenant {
            id: SYSTEM_TENANT_ID.to_string(),
            name: SYSTEM_TENANT_ID.to_string(),
            plan: TenantPlan::Premium,
            status: TenantStatus::Active,
            config: TenantConfig::default_for_plan(TenantPlan::Premium),
            quotas: TenantQuotas::unlimited(),
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.kv.begin_write()?;
        if let Some(bytes) = tx.get(&tenant_key(SYSTEM_TENANT_ID))? {
            return Ok(decode(&bytes)?);
        }
        tx.put(&tenant_key(SYSTEM_TENANT_ID), encode(&tenant)?);
        tx.put(
            &tenant_name_key(SYSTEM_TENANT_ID),
            SYSTEM_TENANT_ID.as_bytes().to_vec(),
        );
        tx.put(
            &tenant_usage_key(SYSTEM_TENANT_ID),
            encode(&TenantUsage::default())?,
        );
        tx.commit()?;

        info!("Created system tenant");
        Ok(tenant)
    }

    pub(crate) fn warn_usage_failure(&self, tenant_id: &str, err: &PersistenceError) {
        warn!(tenant_id = %tenant_id, error = %err, "Usage accounting failed; continuing");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::InMemoryKv;

    fn registry() -> TenantRegistry {
        TenantRegistry::new(InMemoryKv::shared())
    }

    fn create_input(name: &str) -> TenantCreate {
        TenantCreate {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_and_get_roundtrip() {
        let reg = registry();
        let t = reg.create(create_input("acme")).await.unwrap();
        assert_eq!(t.plan, TenantPlan::Free);
        assert_eq!(t.status, TenantStatus::Active);

        let fetched = reg.get(&t.id).await.unwrap();
        assert_eq!(fetched.name, "acme");

        let by_name = reg.get_by_name("acme").await.unwrap();
        assert_eq!(by_name.id, t.id);

        let usage = reg.get_usage(&t.id).await.unwrap();
        assert_eq!(usage.memory_count, 0);
    }

    #[tokio::test]
    async fn duplicate_name_rejected() {
        let reg = registry();
        reg.create(create_input("acme")).await.unwrap();
        let err = reg.create(create_input("acme")).await.unwrap_err();
        assert!(matches!(err, PersistenceError::TenantExists(_)));
    }

    #[tokio::test]
    async fn empty_name_rejected() {
        let reg = registry();
        let err = reg.create(create_input("  ")).await.unwrap_err();
        assert!(matches!(err, PersistenceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn rename_moves_name_index() {
        let reg = registry();
        let t = reg.create(create_input("old")).await.unwrap();
        reg.update(
            &t.id,
            TenantUpdate {
                name: Some("new".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert!(reg.get_by_name("old").await.is_err());
        assert_eq!(reg.get_by_name("new").await.unwrap().id, t.id);

        // old name is free again
        reg.create(create_input("old")).await.unwrap();
    }

    #[tokio::test]
    async fn rename_to_taken_name_aborts() {
        let reg = registry();
        let a = reg.create(create_input("a")).await.unwrap();
        reg.create(create_input("b")).await.unwrap();

        let err = reg
            .update(
                &a.id,
                TenantUpdate {
                    name: Some("b".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PersistenceError::TenantExists(_)));
        // original record untouched
        assert_eq!(reg.get(&a.id).await.unwrap().name, "a");
    }

    #[tokio::test]
    async fn delete_removes_all_rows() {
        let reg = registry();
        let t = reg.create(create_input("gone")).await.unwrap();
        reg.delete(&t.id).await.unwrap();

        assert!(reg.get(&t.id).await.is_err());
        assert!(reg.get_by_name("gone").await.is_err());
        assert!(matches!(
            reg.get_usage(&t.id).await.unwrap_err(),
            PersistenceError::UsageNotFound(_)
        ));
    }

    #[tokio::test]
    async fn list_filters_and_paginates() {
        let reg = registry();
        for i in 0..5 {
            reg.create(create_input(&format!("t{i}"))).await.unwrap();
        }
        let t = reg.get_by_name("t0").await.unwrap();
        reg.suspend(&t.id).await.unwrap();

        let active = reg
            .list(ListTenantsOptions {
                status: Some(TenantStatus::Active),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(active.len(), 4);

        let page = reg
            .list(ListTenantsOptions {
                status: Some(TenantStatus::Active),
                offset: 2,
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
    }

    #[tokio::test]
    async fn usage_increments_and_clamps() {
        let reg = registry();
        let t = reg.create(create_input("u")).await.unwrap();
        let usage = reg.increment_usage(&t.id, 2, 1000).await.unwrap();
        assert_eq!(usage.memory_count, 2);
        assert_eq!(usage.storage_bytes, 1000);

        let usage = reg.increment_usage(&t.id, -5, -5000).await.unwrap();
        assert_eq!(usage.memory_count, 0);
        assert_eq!(usage.storage_bytes, 0);

        let err = reg.increment_usage("missing", 1, 1).await.unwrap_err();
        assert!(matches!(err, PersistenceError::UsageNotFound(_)));
    }

    #[tokio::test]
    async fn system_tenant_is_idempotent() {
        let reg = registry();
        let a = reg.ensure_system_tenant().await.unwrap();
        let b = reg.ensure_system_tenant().await.unwrap();
        assert_eq!(a.id, SYSTEM_TENANT_ID);
        assert_eq!(a.created_at, b.created_at);
        assert_eq!(a.quotas.max_memories, 0);
        assert_eq!(a.plan, TenantPlan::Premium);
    }
}

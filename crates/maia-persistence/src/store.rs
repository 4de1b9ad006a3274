//! Tenant-aware store
//!
//! Mediates every data operation against a tenant id: logical namespace
//! prefixing (`tenant::name`), ownership validation that masks cross-tenant
//! records as not-found, lazy dedicated-store routing for premium tenants,
//! quota pre-checks, and best-effort usage accounting.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use maia_types::{
    Memory, MemoryCreate, MemoryStore, MemoryUpdate, Namespace, NamespaceCreate, NamespaceUpdate,
    SearchQuery, StoreError, StoreResult, StoreStats,
};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::PersistenceConfig;
use crate::kv_store::KvBackedStore;
use crate::tenant::{TenantRegistry, SYSTEM_TENANT_ID};

/// Reserved separator between the tenant id and the external namespace
/// name; client-supplied names must never contain it.
pub const TENANT_SEPARATOR: &str = "::";

/// Fixed accounting overhead added to each memory's content length when
/// estimating storage bytes. Not a wire-size estimate.
const MEMORY_OVERHEAD_BYTES: i64 = 500;

/// Opens a `MemoryStore` at a path; the seam for dedicated tenant storage
pub trait StoreOpener: Send + Sync {
    fn open(&self, path: &Path) -> StoreResult<Arc<dyn MemoryStore>>;
}

/// Default opener: creates the directory and hands back a fresh
/// KV-backed store rooted there.
pub struct KvStoreOpener;

impl StoreOpener for KvStoreOpener {
    fn open(&self, path: &Path) -> StoreResult<Arc<dyn MemoryStore>> {
        std::fs::create_dir_all(path)?;
        Ok(Arc::new(KvBackedStore::in_memory()))
    }
}

/// Tenant-isolating wrapper around a shared `MemoryStore`
pub struct TenantAwareStore {
    shared: Arc<dyn MemoryStore>,
    registry: Arc<TenantRegistry>,
    config: PersistenceConfig,
    opener: Arc<dyn StoreOpener>,
    dedicated: RwLock<HashMap<String, Arc<dyn MemoryStore>>>,
}

fn is_system(tenant_id: &str) -> bool {
    tenant_id.is_empty() || tenant_id == SYSTEM_TENANT_ID
}

/// Apply the tenant prefix to an external namespace name
pub fn prefix_namespace(tenant_id: &str, namespace: &str) -> String {
    if is_system(tenant_id) {
        namespace.to_string()
    } else {
        format!("{tenant_id}{TENANT_SEPARATOR}{namespace}")
    }
}

/// Restore the external form of an underlying namespace name
pub fn unprefix_namespace(tenant_id: &str, namespace: &str) -> String {
    if is_system(tenant_id) {
        return namespace.to_string();
    }
    let prefix = format!("{tenant_id}{TENANT_SEPARATOR}");
    namespace
        .strip_prefix(&prefix)
        .unwrap_or(namespace)
        .to_string()
}

fn owned_by(tenant_id: &str, underlying_namespace: &str) -> bool {
    if is_system(tenant_id) {
        return true;
    }
    underlying_namespace.starts_with(&format!("{tenant_id}{TENANT_SEPARATOR}"))
}

fn validate_external_name(name: &str) -> StoreResult<()> {
    if name.contains(TENANT_SEPARATOR) {
        return Err(StoreError::invalid_input(format!(
            "name must not contain '{TENANT_SEPARATOR}'"
        )));
    }
    Ok(())
}

fn estimate_bytes(content: &str) -> i64 {
    content.len() as i64 + MEMORY_OVERHEAD_BYTES
}

impl TenantAwareStore {
    /// Wrap a shared store
    pub fn new(
        shared: Arc<dyn MemoryStore>,
        registry: Arc<TenantRegistry>,
        config: PersistenceConfig,
    ) -> Self {
        Self {
            shared,
            registry,
            config,
            opener: Arc::new(KvStoreOpener),
            dedicated: RwLock::new(HashMap::new()),
        }
    }

    /// Override the dedicated-store opener (tests, alternative engines)
    pub fn with_opener(mut self, opener: Arc<dyn StoreOpener>) -> Self {
        self.opener = opener;
        self
    }

    /// Resolve the store serving a tenant. Premium tenants with the
    /// dedicated-storage flag get a lazily opened sub-store at
    /// `{base}/{tenant_id}`; lookup under the read lock, create under the
    /// write lock with a second lookup so racing callers never double-open.
    async fn store_for(&self, tenant_id: &str) -> StoreResult<Arc<dyn MemoryStore>> {
        if is_system(tenant_id) {
            return Ok(self.shared.clone());
        }
        let tenant = self.registry.get(tenant_id).await.map_err(StoreError::from)?;
        if !tenant.config.dedicated_storage {
            return Ok(self.shared.clone());
        }
        let Some(base) = self.config.dedicated_base_dir.clone() else {
            // no base directory configured: shared store, silently
            return Ok(self.shared.clone());
        };

        if let Some(store) = self.dedicated.read().await.get(tenant_id) {
            return Ok(store.clone());
        }

        let mut map = self.dedicated.write().await;
        if let Some(store) = map.get(tenant_id) {
            return Ok(store.clone());
        }
        let path: PathBuf = base.join(tenant_id);
        let store = self.opener.open(&path)?;
        map.insert(tenant_id.to_string(), store.clone());
        info!(tenant_id = %tenant_id, path = %path.display(), "Opened dedicated store");
        Ok(store)
    }

    /// Quota pre-check for memory creation. Counts and bytes are compared
    /// against the tenant's quotas before any write; a request that alone
    /// exceeds the storage quota is rejected outright.
    async fn check_memory_quota(&self, tenant_id: &str, count: i64, bytes: i64) -> StoreResult<()> {
        if is_system(tenant_id) {
            return Ok(());
        }
        let tenant = self.registry.get(tenant_id).await.map_err(StoreError::from)?;
        let usage = self
            .registry
            .get_usage(tenant_id)
            .await
            .map_err(StoreError::from)?;

        if tenant.quotas.max_memories > 0
            && (usage.memory_count + count) as u64 > tenant.quotas.max_memories
        {
            return Err(StoreError::quota_exceeded(
                "memories",
                tenant.quotas.max_memories,
                usage.memory_count.max(0) as u64,
            ));
        }
        if tenant.quotas.max_storage_bytes > 0
            && (usage.storage_bytes + bytes) as u64 > tenant.quotas.max_storage_bytes
        {
            return Err(StoreError::quota_exceeded(
                "storage_bytes",
                tenant.quotas.max_storage_bytes,
                usage.storage_bytes.max(0) as u64,
            ));
        }
        Ok(())
    }

    /// Best-effort usage update; failures are logged and swallowed
    async fn record_usage(&self, tenant_id: &str, memories: i64, bytes: i64) {
        if is_system(tenant_id) {
            return;
        }
        if let Err(err) = self.registry.increment_usage(tenant_id, memories, bytes).await {
            self.registry.warn_usage_failure(tenant_id, &err);
        }
    }

    async fn record_namespace_delta(&self, tenant_id: &str, delta: i64) {
        if is_system(tenant_id) {
            return;
        }
        if let Err(err) = self.registry.increment_namespaces(tenant_id, delta).await {
            self.registry.warn_usage_failure(tenant_id, &err);
        }
    }

    /// Fetch a memory and verify the caller's tenant owns it; mismatches
    /// surface as not-found so cross-tenant existence never leaks
    async fn get_owned_memory(&self, tenant_id: &str, id: &str) -> StoreResult<Memory> {
        let store = self.store_for(tenant_id).await?;
        let memory = store.get_memory(id).await?;
        if !owned_by(tenant_id, &memory.namespace) {
            debug!(tenant_id = %tenant_id, memory_id = %id, "Masking cross-tenant memory as not found");
            return Err(StoreError::not_found(format!("memory {id}")));
        }
        Ok(memory)
    }

    async fn get_owned_namespace(&self, tenant_id: &str, id: &str) -> StoreResult<Namespace> {
        let store = self.store_for(tenant_id).await?;
        let namespace = store.get_namespace(id).await?;
        if !owned_by(tenant_id, &namespace.name) {
            debug!(tenant_id = %tenant_id, namespace_id = %id, "Masking cross-tenant namespace as not found");
            return Err(StoreError::not_found(format!("namespace {id}")));
        }
        Ok(namespace)
    }

    fn externalize_memory(tenant_id: &str, mut memory: Memory) -> Memory {
        memory.namespace = unprefix_namespace(tenant_id, &memory.namespace);
        memory
    }

    fn externalize_namespace(tenant_id: &str, mut namespace: Namespace) -> Namespace {
        namespace.name = unprefix_namespace(tenant_id, &namespace.name);
        if let Some(parent) = namespace.parent.take() {
            namespace.parent = Some(unprefix_namespace(tenant_id, &parent));
        }
        namespace
    }

    /// Create a memory in the tenant's namespace
    pub async fn create_memory(
        &self,
        tenant_id: &str,
        mut input: MemoryCreate,
    ) -> StoreResult<Memory> {
        validate_external_name(&input.namespace)?;
        let bytes = estimate_bytes(&input.content);
        self.check_memory_quota(tenant_id, 1, bytes).await?;

        input.namespace = prefix_namespace(tenant_id, &input.namespace);
        let store = self.store_for(tenant_id).await?;
        let memory = store.create_memory(input).await?;
        self.record_usage(tenant_id, 1, bytes).await;
        Ok(Self::externalize_memory(tenant_id, memory))
    }

    /// Fetch a memory owned by the tenant
    pub async fn get_memory(&self, tenant_id: &str, id: &str) -> StoreResult<Memory> {
        let memory = self.get_owned_memory(tenant_id, id).await?;
        Ok(Self::externalize_memory(tenant_id, memory))
    }

    /// Partial update; ownership is validated before the write
    pub async fn update_memory(
        &self,
        tenant_id: &str,
        id: &str,
        mut update: MemoryUpdate,
    ) -> StoreResult<Memory> {
        self.get_owned_memory(tenant_id, id).await?;
        if let Some(ns) = update.namespace.take() {
            validate_external_name(&ns)?;
            update.namespace = Some(prefix_namespace(tenant_id, &ns));
        }
        let store = self.store_for(tenant_id).await?;
        let memory = store.update_memory(id, update).await?;
        Ok(Self::externalize_memory(tenant_id, memory))
    }

    /// Delete a memory owned by the tenant
    pub async fn delete_memory(&self, tenant_id: &str, id: &str) -> StoreResult<()> {
        let memory = self.get_owned_memory(tenant_id, id).await?;
        let store = self.store_for(tenant_id).await?;
        store.delete_memory(id).await?;
        self.record_usage(tenant_id, -1, -estimate_bytes(&memory.content))
            .await;
        Ok(())
    }

    /// Batch create; quota-checked as a whole, accounted as a whole
    pub async fn batch_create_memories(
        &self,
        tenant_id: &str,
        mut inputs: Vec<MemoryCreate>,
    ) -> StoreResult<Vec<Memory>> {
        for input in &inputs {
            validate_external_name(&input.namespace)?;
        }
        let total_bytes: i64 = inputs.iter().map(|i| estimate_bytes(&i.content)).sum();
        self.check_memory_quota(tenant_id, inputs.len() as i64, total_bytes)
            .await?;

        for input in &mut inputs {
            input.namespace = prefix_namespace(tenant_id, &input.namespace);
        }
        let store = self.store_for(tenant_id).await?;
        let memories = store.batch_create_memories(inputs).await?;
        self.record_usage(tenant_id, memories.len() as i64, total_bytes)
            .await;
        Ok(memories
            .into_iter()
            .map(|m| Self::externalize_memory(tenant_id, m))
            .collect())
    }

    /// Batch delete; ids not owned by the tenant are skipped silently
    pub async fn batch_delete_memories(
        &self,
        tenant_id: &str,
        ids: Vec<String>,
    ) -> StoreResult<usize> {
        let store = self.store_for(tenant_id).await?;
        let mut owned = Vec::new();
        let mut bytes = 0i64;
        for id in ids {
            match self.get_owned_memory(tenant_id, &id).await {
                Ok(memory) => {
                    bytes += estimate_bytes(&memory.content);
                    owned.push(id);
                }
                Err(StoreError::NotFound(_)) => continue,
                Err(err) => return Err(err),
            }
        }
        let removed = store.batch_delete_memories(owned).await?;
        self.record_usage(tenant_id, -(removed as i64), -bytes).await;
        Ok(removed)
    }

    /// List memories in one of the tenant's namespaces
    pub async fn list_memories(
        &self,
        tenant_id: &str,
        namespace: &str,
        limit: usize,
        offset: usize,
    ) -> StoreResult<Vec<Memory>> {
        let store = self.store_for(tenant_id).await?;
        let underlying = prefix_namespace(tenant_id, namespace);
        let memories = store.list_memories(&underlying, limit, offset).await?;
        Ok(memories
            .into_iter()
            .map(|m| Self::externalize_memory(tenant_id, m))
            .collect())
    }

    /// Search within the tenant's slice of the store
    pub async fn search(&self, tenant_id: &str, mut query: SearchQuery) -> StoreResult<Vec<Memory>> {
        let store = self.store_for(tenant_id).await?;
        let limit = if query.limit == 0 { 100 } else { query.limit };
        let offset = query.offset;

        if let Some(ns) = query.namespace.take() {
            validate_external_name(&ns)?;
            query.namespace = Some(prefix_namespace(tenant_id, &ns));
            query.limit = limit;
            let hits = store.search(query).await?;
            return Ok(hits
                .into_iter()
                .map(|m| Self::externalize_memory(tenant_id, m))
                .collect());
        }

        // no namespace filter: over-fetch and scope to the tenant here
        query.limit = usize::MAX;
        query.offset = 0;
        let hits = store.search(query).await?;
        Ok(hits
            .into_iter()
            .filter(|m| owned_by(tenant_id, &m.namespace))
            .skip(offset)
            .take(limit)
            .map(|m| Self::externalize_memory(tenant_id, m))
            .collect())
    }

    /// Bump access time on a memory owned by the tenant
    pub async fn touch_memory(&self, tenant_id: &str, id: &str) -> StoreResult<()> {
        self.get_owned_memory(tenant_id, id).await?;
        let store = self.store_for(tenant_id).await?;
        store.touch_memory(id).await
    }

    /// Create a namespace for the tenant, honoring the max-namespaces
    /// config (0 = unlimited)
    pub async fn create_namespace(
        &self,
        tenant_id: &str,
        mut input: NamespaceCreate,
    ) -> StoreResult<Namespace> {
        validate_external_name(&input.name)?;
        if let Some(parent) = &input.parent {
            validate_external_name(parent)?;
        }

        if !is_system(tenant_id) {
            let tenant = self.registry.get(tenant_id).await.map_err(StoreError::from)?;
            if tenant.config.max_namespaces > 0 {
                let usage = self
                    .registry
                    .get_usage(tenant_id)
                    .await
                    .map_err(StoreError::from)?;
                if usage.namespace_count as u64 >= tenant.config.max_namespaces as u64 {
                    return Err(StoreError::quota_exceeded(
                        "namespaces",
                        tenant.config.max_namespaces as u64,
                        usage.namespace_count.max(0) as u64,
                    ));
                }
            }
        }

        input.name = prefix_namespace(tenant_id, &input.name);
        if let Some(parent) = input.parent.take() {
            input.parent = Some(prefix_namespace(tenant_id, &parent));
        }
        let store = self.store_for(tenant_id).await?;
        let namespace = store.create_namespace(input).await?;
        self.record_namespace_delta(tenant_id, 1).await;
        Ok(Self::externalize_namespace(tenant_id, namespace))
    }

    /// Fetch a namespace owned by the tenant
    pub async fn get_namespace(&self, tenant_id: &str, id: &str) -> StoreResult<Namespace> {
        let namespace = self.get_owned_namespace(tenant_id, id).await?;
        Ok(Self::externalize_namespace(tenant_id, namespace))
    }

    /// Fetch a namespace by its external name
    pub async fn get_namespace_by_name(
        &self,
        tenant_id: &str,
        name: &str,
    ) -> StoreResult<Namespace> {
        validate_external_name(name)?;
        let store = self.store_for(tenant_id).await?;
        let namespace = store
            .get_namespace_by_name(&prefix_namespace(tenant_id, name))
            .await?;
        Ok(Self::externalize_namespace(tenant_id, namespace))
    }

    /// Partial update on a namespace owned by the tenant
    pub async fn update_namespace(
        &self,
        tenant_id: &str,
        id: &str,
        mut update: NamespaceUpdate,
    ) -> StoreResult<Namespace> {
        self.get_owned_namespace(tenant_id, id).await?;
        if let Some(name) = update.name.take() {
            validate_external_name(&name)?;
            update.name = Some(prefix_namespace(tenant_id, &name));
        }
        if let Some(parent) = update.parent.take() {
            validate_external_name(&parent)?;
            update.parent = Some(prefix_namespace(tenant_id, &parent));
        }
        let store = self.store_for(tenant_id).await?;
        let namespace = store.update_namespace(id, update).await?;
        Ok(Self::externalize_namespace(tenant_id, namespace))
    }

    /// Delete a namespace owned by the tenant
    pub async fn delete_namespace(&self, tenant_id: &str, id: &str) -> StoreResult<()> {
        self.get_owned_namespace(tenant_id, id).await?;
        let store = self.store_for(tenant_id).await?;
        store.delete_namespace(id).await?;
        self.record_namespace_delta(tenant_id, -1).await;
        Ok(())
    }

    /// List the tenant's namespaces with external names
    pub async fn list_namespaces(&self, tenant_id: &str) -> StoreResult<Vec<Namespace>> {
        let store = self.store_for(tenant_id).await?;
        let all = store.list_namespaces().await?;
        Ok(all
            .into_iter()
            .filter(|ns| owned_by(tenant_id, &ns.name))
            .map(|ns| Self::externalize_namespace(tenant_id, ns))
            .collect())
    }

    /// Live usage for the tenant, or the global stats for system callers
    pub async fn stats(&self, tenant_id: &str) -> StoreResult<StoreStats> {
        if is_system(tenant_id) {
            return self.shared.stats().await;
        }
        let usage = self
            .registry
            .get_usage(tenant_id)
            .await
            .map_err(StoreError::from)?;
        Ok(StoreStats {
            memory_count: usage.memory_count.max(0) as u64,
            namespace_count: usage.namespace_count.max(0) as u64,
            storage_bytes: usage.storage_bytes.max(0) as u64,
        })
    }

    /// Readiness probe against the shared store
    pub async fn ready(&self) -> StoreResult<StoreStats> {
        self.shared.stats().await
    }

    /// Explicit cascade: remove every namespace and memory belonging to
    /// the tenant. Called by the admin delete path; registry deletion does
    /// not cascade on its own.
    pub async fn delete_tenant_data(&self, tenant_id: &str) -> StoreResult<()> {
        if is_system(tenant_id) {
            return Err(StoreError::invalid_input(
                "refusing to delete system tenant data",
            ));
        }
        let store = self.store_for(tenant_id).await?;

        // memories first (covers namespaces that lost their record)
        let hits = store
            .search(SearchQuery {
                query: String::new(),
                namespace: None,
                limit: usize::MAX,
                offset: 0,
                metadata_filters: HashMap::new(),
            })
            .await?;
        let ids: Vec<String> = hits
            .into_iter()
            .filter(|m| owned_by(tenant_id, &m.namespace))
            .map(|m| m.id)
            .collect();
        let removed = store.batch_delete_memories(ids).await?;

        let namespaces = store.list_namespaces().await?;
        let mut ns_removed = 0usize;
        for ns in namespaces {
            if owned_by(tenant_id, &ns.name) {
                store.delete_namespace(&ns.id).await?;
                ns_removed += 1;
            }
        }

        info!(
            tenant_id = %tenant_id,
            memories = removed,
            namespaces = ns_removed,
            "Deleted tenant data"
        );
        Ok(())
    }

    /// Close every dedicated store, then the shared one; the last error
    /// wins
    pub async fn close(&self) -> StoreResult<()> {
        let mut last_err = None;
        let dedicated = {
            let mut map = self.dedicated.write().await;
            std::mem::take(&mut *map)
        };
        for (tenant_id, store) in dedicated {
            if let Err(err) = store.close().await {
                warn!(tenant_id = %tenant_id, error = %err, "Failed to close dedicated store");
                last_err = Some(err);
            }
        }
        if let Err(err) = self.shared.close().await {
            last_err = Some(err);
        }
        match last_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

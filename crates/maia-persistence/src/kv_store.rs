//! Reference `MemoryStore` over the KV seam
//!
//! Key families: `memory:{id}`, `memory_ns:{namespace}:{id}` (namespace
//! index), `namespace:{id}`, `namespace_name:{name}` (name index). Records
//! are JSON. Search is a naive case-insensitive substring scan with
//! metadata equality filters; good enough for the reference engine, the
//! port is the seam for anything smarter.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use maia_types::{
    Memory, MemoryCreate, MemoryStore, MemoryUpdate, Namespace, NamespaceCreate, NamespaceUpdate,
    SearchQuery, StoreError, StoreResult, StoreStats,
};
use tracing::debug;

use crate::kv::{decode, encode, InMemoryKv, KvStore};

fn memory_key(id: &str) -> Vec<u8> {
    format!("memory:{id}").into_bytes()
}

fn memory_ns_key(namespace: &str, id: &str) -> Vec<u8> {
    format!("memory_ns:{namespace}:{id}").into_bytes()
}

fn memory_ns_prefix(namespace: &str) -> Vec<u8> {
    format!("memory_ns:{namespace}:").into_bytes()
}

fn namespace_key(id: &str) -> Vec<u8> {
    format!("namespace:{id}").into_bytes()
}

fn namespace_name_key(name: &str) -> Vec<u8> {
    format!("namespace_name:{name}").into_bytes()
}

/// `MemoryStore` implementation over any [`KvStore`] engine
pub struct KvBackedStore {
    kv: Arc<dyn KvStore>,
    closed: AtomicBool,
}

impl KvBackedStore {
    /// Wrap an existing engine
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            closed: AtomicBool::new(false),
        }
    }

    /// Fresh store over the embedded in-memory engine
    pub fn in_memory() -> Self {
        Self::new(InMemoryKv::shared())
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    fn matches_filters(memory: &Memory, query: &SearchQuery) -> bool {
        if let Some(ns) = &query.namespace {
            if &memory.namespace != ns {
                return false;
            }
        }
        if !query.query.is_empty()
            && !memory
                .content
                .to_lowercase()
                .contains(&query.query.to_lowercase())
        {
            return false;
        }
        query
            .metadata_filters
            .iter()
            .all(|(k, v)| memory.metadata.get(k) == Some(v))
    }
}

#[async_trait]
impl MemoryStore for KvBackedStore {
    async fn create_memory(&self, input: MemoryCreate) -> StoreResult<Memory> {
        self.ensure_open()?;
        if input.namespace.is_empty() {
            return Err(StoreError::invalid_input("namespace is required"));
        }
        let memory = Memory::from_create(input);
        let mut tx = self.kv.begin_write()?;
        tx.put(&memory_key(&memory.id), encode(&memory)?);
        tx.put(
            &memory_ns_key(&memory.namespace, &memory.id),
            memory.id.clone().into_bytes(),
        );
        tx.commit()?;
        Ok(memory)
    }

    async fn get_memory(&self, id: &str) -> StoreResult<Memory> {
        self.ensure_open()?;
        match self.kv.get(&memory_key(id))? {
            Some(bytes) => Ok(decode(&bytes)?),
            None => Err(StoreError::not_found(format!("memory {id}"))),
        }
    }

    async fn update_memory(&self, id: &str, update: MemoryUpdate) -> StoreResult<Memory> {
        self.ensure_open()?;
        let mut tx = self.kv.begin_write()?;
        let mut memory: Memory = match tx.get(&memory_key(id))? {
            Some(bytes) => decode(&bytes)?,
            None => return Err(StoreError::not_found(format!("memory {id}"))),
        };
        let old_namespace = memory.namespace.clone();
        memory.apply_update(update);
        if memory.namespace != old_namespace {
            tx.delete(&memory_ns_key(&old_namespace, id));
            tx.put(
                &memory_ns_key(&memory.namespace, id),
                memory.id.clone().into_bytes(),
            );
        }
        tx.put(&memory_key(id), encode(&memory)?);
        tx.commit()?;
        Ok(memory)
    }

    async fn delete_memory(&self, id: &str) -> StoreResult<()> {
        self.ensure_open()?;
        let mut tx = self.kv.begin_write()?;
        let memory: Memory = match tx.get(&memory_key(id))? {
            Some(bytes) => decode(&bytes)?,
            None => return Err(StoreError::not_found(format!("memory {id}"))),
        };
        tx.delete(&memory_key(id));
        tx.delete(&memory_ns_key(&memory.namespace, id));
        tx.commit()?;
        Ok(())
    }

    async fn batch_create_memories(&self, inputs: Vec<MemoryCreate>) -> StoreResult<Vec<Memory>> {
        self.ensure_open()?;
        if inputs.iter().any(|i| i.namespace.is_empty()) {
            return Err(StoreError::invalid_input("namespace is required"));
        }
        let memories: Vec<Memory> = inputs.into_iter().map(Memory::from_create).collect();
        let mut tx = self.kv.begin_write()?;
        for memory in &memories {
            tx.put(&memory_key(&memory.id), encode(memory)?);
            tx.put(
                &memory_ns_key(&memory.namespace, &memory.id),
                memory.id.clone().into_bytes(),
            );
        }
        tx.commit()?;
        Ok(memories)
    }

    async fn batch_delete_memories(&self, ids: Vec<String>) -> StoreResult<usize> {
        self.ensure_open()?;
        let mut tx = self.kv.begin_write()?;
        let mut removed = 0;
        for id in &ids {
            if let Some(bytes) = tx.get(&memory_key(id))? {
                let memory: Memory = decode(&bytes)?;
                tx.delete(&memory_key(id));
                tx.delete(&memory_ns_key(&memory.namespace, id));
                removed += 1;
            }
        }
        tx.commit()?;
        Ok(removed)
    }

    async fn list_memories(
        &self,
        namespace: &str,
        limit: usize,
        offset: usize,
    ) -> StoreResult<Vec<Memory>> {
        self.ensure_open()?;
        let mut memories = Vec::new();
        for (_, id_bytes) in self.kv.scan_prefix(&memory_ns_prefix(namespace))? {
            let id = String::from_utf8_lossy(&id_bytes).into_owned();
            if let Some(bytes) = self.kv.get(&memory_key(&id))? {
                memories.push(decode::<Memory>(&bytes)?);
            }
        }
        memories.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(memories.into_iter().skip(offset).take(limit).collect())
    }

    async fn search(&self, query: SearchQuery) -> StoreResult<Vec<Memory>> {
        self.ensure_open()?;
        let mut hits = Vec::new();
        for (_, bytes) in self.kv.scan_prefix(b"memory:")? {
            let memory: Memory = decode(&bytes)?;
            if Self::matches_filters(&memory, &query) {
                hits.push(memory);
            }
        }
        hits.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let limit = if query.limit == 0 { 100 } else { query.limit };
        Ok(hits.into_iter().skip(query.offset).take(limit).collect())
    }

    async fn touch_memory(&self, id: &str) -> StoreResult<()> {
        self.ensure_open()?;
        let mut tx = self.kv.begin_write()?;
        let mut memory: Memory = match tx.get(&memory_key(id))? {
            Some(bytes) => decode(&bytes)?,
            None => return Err(StoreError::not_found(format!("memory {id}"))),
        };
        memory.accessed_at = Utc::now();
        memory.access_count += 1;
        tx.put(&memory_key(id), encode(&memory)?);
        tx.commit()?;
        Ok(())
    }

    async fn create_namespace(&self, input: NamespaceCreate) -> StoreResult<Namespace> {
        self.ensure_open()?;
        if input.name.is_empty() {
            return Err(StoreError::invalid_input("namespace name is required"));
        }
        let namespace = Namespace::from_create(input);
        let mut tx = self.kv.begin_write()?;
        if tx.get(&namespace_name_key(&namespace.name))?.is_some() {
            return Err(StoreError::already_exists(format!(
                "namespace {}",
                namespace.name
            )));
        }
        tx.put(&namespace_key(&namespace.id), encode(&namespace)?);
        tx.put(
            &namespace_name_key(&namespace.name),
            namespace.id.clone().into_bytes(),
        );
        tx.commit()?;
        Ok(namespace)
    }

    async fn get_namespace(&self, id: &str) -> StoreResult<Namespace> {
        self.ensure_open()?;
        match self.kv.get(&namespace_key(id))? {
            Some(bytes) => Ok(decode(&bytes)?),
            None => Err(StoreError::not_found(format!("namespace {id}"))),
        }
    }

    async fn get_namespace_by_name(&self, name: &str) -> StoreResult<Namespace> {
        self.ensure_open()?;
        let id = match self.kv.get(&namespace_name_key(name))? {
            Some(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            None => return Err(StoreError::not_found(format!("namespace {name}"))),
        };
        self.get_namespace(&id).await
    }

    async fn update_namespace(&self, id: &str, update: NamespaceUpdate) -> StoreResult<Namespace> {
        self.ensure_open()?;
        let mut tx = self.kv.begin_write()?;
        let mut namespace: Namespace = match tx.get(&namespace_key(id))? {
            Some(bytes) => decode(&bytes)?,
            None => return Err(StoreError::not_found(format!("namespace {id}"))),
        };
        if let Some(new_name) = update.name {
            if new_name != namespace.name {
                if tx.get(&namespace_name_key(&new_name))?.is_some() {
                    return Err(StoreError::already_exists(format!("namespace {new_name}")));
                }
                tx.delete(&namespace_name_key(&namespace.name));
                tx.put(
                    &namespace_name_key(&new_name),
                    namespace.id.clone().into_bytes(),
                );
                namespace.name = new_name;
            }
        }
        if let Some(parent) = update.parent {
            namespace.parent = Some(parent);
        }
        if let Some(description) = update.description {
            namespace.description = description;
        }
        if let Some(metadata) = update.metadata {
            namespace.metadata = metadata;
        }
        namespace.updated_at = Utc::now();
        tx.put(&namespace_key(id), encode(&namespace)?);
        tx.commit()?;
        Ok(namespace)
    }

    async fn delete_namespace(&self, id: &str) -> StoreResult<()> {
        self.ensure_open()?;
        let mut tx = self.kv.begin_write()?;
        let namespace: Namespace = match tx.get(&namespace_key(id))? {
            Some(bytes) => decode(&bytes)?,
            None => return Err(StoreError::not_found(format!("namespace {id}"))),
        };
        // cascade the namespace's memories in the same transaction
        let mut removed = 0usize;
        for (key, id_bytes) in tx.scan_prefix(&memory_ns_prefix(&namespace.name))? {
            let mem_id = String::from_utf8_lossy(&id_bytes).into_owned();
            tx.delete(&memory_key(&mem_id));
            tx.delete(&key);
            removed += 1;
        }
        tx.delete(&namespace_key(id));
        tx.delete(&namespace_name_key(&namespace.name));
        tx.commit()?;
        debug!(namespace = %namespace.name, memories = removed, "Deleted namespace");
        Ok(())
    }

    async fn list_namespaces(&self) -> StoreResult<Vec<Namespace>> {
        self.ensure_open()?;
        let mut namespaces = Vec::new();
        for (_, bytes) in self.kv.scan_prefix(b"namespace:")? {
            namespaces.push(decode::<Namespace>(&bytes)?);
        }
        namespaces.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(namespaces)
    }

    async fn stats(&self) -> StoreResult<StoreStats> {
        self.ensure_open()?;
        let mut stats = StoreStats::default();
        for (_, bytes) in self.kv.scan_prefix(b"memory:")? {
            let memory: Memory = decode(&bytes)?;
            stats.memory_count += 1;
            stats.storage_bytes += memory.content.len() as u64;
        }
        stats.namespace_count = self.kv.scan_prefix(b"namespace:")?.len() as u64;
        Ok(stats)
    }

    async fn close(&self) -> StoreResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn create(ns: &str, content: &str) -> MemoryCreate {
        MemoryCreate {
            namespace: ns.to_string(),
            content: content.to_string(),
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn memory_crud_roundtrip() {
        let store = KvBackedStore::in_memory();
        let m = store.create_memory(create("ns", "hello world")).await.unwrap();
        assert_eq!(store.get_memory(&m.id).await.unwrap().content, "hello world");

        let updated = store
            .update_memory(
                &m.id,
                MemoryUpdate {
                    content: Some("changed".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.content, "changed");

        store.delete_memory(&m.id).await.unwrap();
        assert!(store.get_memory(&m.id).await.is_err());
    }

    #[tokio::test]
    async fn list_is_namespace_scoped() {
        let store = KvBackedStore::in_memory();
        store.create_memory(create("a", "1")).await.unwrap();
        store.create_memory(create("a", "2")).await.unwrap();
        store.create_memory(create("b", "3")).await.unwrap();

        assert_eq!(store.list_memories("a", 100, 0).await.unwrap().len(), 2);
        assert_eq!(store.list_memories("b", 100, 0).await.unwrap().len(), 1);
        assert!(store.list_memories("c", 100, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn search_matches_substring_and_metadata() {
        let store = KvBackedStore::in_memory();
        let mut tagged = create("ns", "the quick brown fox");
        tagged
            .metadata
            .insert("kind".to_string(), serde_json::json!("animal"));
        store.create_memory(tagged).await.unwrap();
        store.create_memory(create("ns", "slow turtle")).await.unwrap();

        let hits = store
            .search(SearchQuery {
                query: "QUICK".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        let mut filters = HashMap::new();
        filters.insert("kind".to_string(), serde_json::json!("animal"));
        let hits = store
            .search(SearchQuery {
                query: String::new(),
                metadata_filters: filters,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn touch_bumps_access() {
        let store = KvBackedStore::in_memory();
        let m = store.create_memory(create("ns", "x")).await.unwrap();
        store.touch_memory(&m.id).await.unwrap();
        let fetched = store.get_memory(&m.id).await.unwrap();
        assert_eq!(fetched.access_count, 1);
        assert!(fetched.accessed_at >= m.accessed_at);
    }

    #[tokio::test]
    async fn namespace_lifecycle_and_cascade() {
        let store = KvBackedStore::in_memory();
        let ns = store
            .create_namespace(NamespaceCreate {
                name: "proj".to_string(),
                parent: None,
                description: String::new(),
                metadata: HashMap::new(),
            })
            .await
            .unwrap();
        assert_eq!(store.get_namespace_by_name("proj").await.unwrap().id, ns.id);

        let m = store.create_memory(create("proj", "data")).await.unwrap();
        store.delete_namespace(&ns.id).await.unwrap();

        assert!(store.get_namespace(&ns.id).await.is_err());
        assert!(store.get_memory(&m.id).await.is_err());
    }

    #[tokio::test]
    async fn duplicate_namespace_name_rejected() {
        let store = KvBackedStore::in_memory();
        let input = NamespaceCreate {
            name: "dup".to_string(),
            parent: None,
            description: String::new(),
            metadata: HashMap::new(),
        };
        store.create_namespace(input.clone()).await.unwrap();
        assert!(matches!(
            store.create_namespace(input).await.unwrap_err(),
            StoreError::AlreadyExists(_)
        ));
    }

    #[tokio::test]
    async fn closed_store_refuses_operations() {
        let store = KvBackedStore::in_memory();
        store.close().await.unwrap();
        assert!(matches!(
            store.create_memory(create("ns", "x")).await.unwrap_err(),
            StoreError::Closed
        ));
    }

    #[tokio::test]
    async fn stats_probe_counts() {
        let store = KvBackedStore::in_memory();
        store.create_memory(create("a", "12345")).await.unwrap();
        store.create_memory(create("a", "678")).await.unwrap();
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.memory_count, 2);
        assert_eq!(stats.storage_bytes, 8);
    }
}

//! The `MemoryStore` port
//!
//! Every data operation in MAIA goes through this trait. The tenant-aware
//! layer wraps one implementation (or several, for dedicated tenant
//! storage); the engine behind it is interchangeable.

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::memory::{
    Memory, MemoryCreate, MemoryUpdate, Namespace, NamespaceCreate, NamespaceUpdate, SearchQuery,
    StoreStats,
};

/// Storage port for memories and namespaces
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Create a memory and return the stored record
    async fn create_memory(&self, input: MemoryCreate) -> StoreResult<Memory>;

    /// Fetch a memory by id
    async fn get_memory(&self, id: &str) -> StoreResult<Memory>;

    /// Apply a partial update to a memory
    async fn update_memory(&self, id: &str, update: MemoryUpdate) -> StoreResult<Memory>;

    /// Delete a memory by id
    async fn delete_memory(&self, id: &str) -> StoreResult<()>;

    /// Create several memories; all-or-nothing per batch
    async fn batch_create_memories(&self, inputs: Vec<MemoryCreate>) -> StoreResult<Vec<Memory>>;

    /// Delete several memories, returning the number removed
    async fn batch_delete_memories(&self, ids: Vec<String>) -> StoreResult<usize>;

    /// List memories in a namespace, newest first
    async fn list_memories(
        &self,
        namespace: &str,
        limit: usize,
        offset: usize,
    ) -> StoreResult<Vec<Memory>>;

    /// Search memories with optional namespace and metadata filters
    async fn search(&self, query: SearchQuery) -> StoreResult<Vec<Memory>>;

    /// Bump a memory's access time and count
    async fn touch_memory(&self, id: &str) -> StoreResult<()>;

    /// Create a namespace
    async fn create_namespace(&self, input: NamespaceCreate) -> StoreResult<Namespace>;

    /// Fetch a namespace by id
    async fn get_namespace(&self, id: &str) -> StoreResult<Namespace>;

    /// Fetch a namespace by its name
    async fn get_namespace_by_name(&self, name: &str) -> StoreResult<Namespace>;

    /// Apply a partial update to a namespace
    async fn update_namespace(&self, id: &str, update: NamespaceUpdate) -> StoreResult<Namespace>;

    /// Delete a namespace by id
    async fn delete_namespace(&self, id: &str) -> StoreResult<()>;

    /// List all namespaces
    async fn list_namespaces(&self) -> StoreResult<Vec<Namespace>>;

    /// Aggregate statistics probe; also used by readiness checks
    async fn stats(&self) -> StoreResult<StoreStats>;

    /// Flush and release resources; subsequent calls return `Closed`
    async fn close(&self) -> StoreResult<()>;
}

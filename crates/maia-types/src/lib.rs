//! MAIA shared types
//!
//! Leaf crate holding the domain records (memories, namespaces, search
//! types) and the `MemoryStore` port that the tenant-aware layer and the
//! HTTP surface are written against. Engine implementations live in
//! `maia-persistence`.

pub mod error;
pub mod memory;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use memory::{
    Memory, MemoryCreate, MemoryUpdate, Namespace, NamespaceCreate, NamespaceUpdate, SearchQuery,
    StoreStats,
};
pub use store::MemoryStore;

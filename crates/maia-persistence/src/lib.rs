//! MAIA persistence layer
//!
//! Three pieces live here:
//!
//! - a transactional key-value seam ([`kv`]) with an embedded in-memory
//!   engine, consumed by the registry and the reference store
//! - the tenant registry ([`tenant`], [`apikey`]): durable tenant records,
//!   usage counters, and scoped API credentials
//! - the tenant-aware store ([`store`]): namespace prefixing, ownership
//!   validation, dedicated-storage routing, and quota accounting on top of
//!   any [`maia_types::MemoryStore`]

pub mod apikey;
pub mod config;
pub mod errors;
pub mod kv;
pub mod kv_store;
pub mod store;
pub mod tenant;

pub use apikey::{ApiKey, CreatedApiKey, Scope};
pub use config::PersistenceConfig;
pub use errors::{PersistenceError, PersistenceResult};
pub use kv::{InMemoryKv, KvStore, KvTransaction};
pub use kv_store::KvBackedStore;
pub use store::{StoreOpener, TenantAwareStore};
pub use tenant::{
    ListTenantsOptions, Tenant, TenantConfig, TenantCreate, TenantPlan, TenantQuotas,
    TenantRegistry, TenantStatus, TenantUpdate, TenantUsage, SYSTEM_TENANT_ID,
};

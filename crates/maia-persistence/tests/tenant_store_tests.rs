//! Integration tests for the tenant-aware store

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use maia_persistence::{
    InMemoryKv, KvBackedStore, PersistenceConfig, StoreOpener, TenantAwareStore, TenantConfig,
    TenantCreate, TenantPlan, TenantQuotas, TenantRegistry,
};
use maia_types::{MemoryCreate, MemoryStore, NamespaceCreate, SearchQuery, StoreError};

fn memory(ns: &str, content: &str) -> MemoryCreate {
    MemoryCreate {
        namespace: ns.to_string(),
        content: content.to_string(),
        metadata: HashMap::new(),
    }
}

fn namespace(name: &str) -> NamespaceCreate {
    NamespaceCreate {
        name: name.to_string(),
        parent: None,
        description: String::new(),
        metadata: HashMap::new(),
    }
}

struct Fixture {
    registry: Arc<TenantRegistry>,
    store: TenantAwareStore,
}

async fn fixture() -> Fixture {
    let registry = Arc::new(TenantRegistry::new(InMemoryKv::shared()));
    registry.ensure_system_tenant().await.unwrap();
    let shared: Arc<dyn MemoryStore> = Arc::new(KvBackedStore::in_memory());
    let store = TenantAwareStore::new(shared, registry.clone(), PersistenceConfig::default());
    Fixture { registry, store }
}

async fn make_tenant(fx: &Fixture, name: &str) -> String {
    fx.registry
        .create(TenantCreate {
            name: name.to_string(),
            ..Default::default()
        })
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn namespace_roundtrip_is_externally_stable() {
    let fx = fixture().await;
    let t1 = make_tenant(&fx, "tenant1").await;

    let created = fx
        .store
        .create_memory(&t1, memory("default", "s1"))
        .await
        .unwrap();
    assert_eq!(created.namespace, "default");

    let fetched = fx.store.get_memory(&t1, &created.id).await.unwrap();
    assert_eq!(fetched.namespace, "default");
    assert_eq!(fetched.content, "s1");
}

#[tokio::test]
async fn cross_tenant_read_is_masked_as_not_found() {
    let fx = fixture().await;
    let t1 = make_tenant(&fx, "tenant1").await;
    let t2 = make_tenant(&fx, "tenant2").await;

    let m = fx
        .store
        .create_memory(&t1, memory("default", "s1"))
        .await
        .unwrap();

    let err = fx.store.get_memory(&t2, &m.id).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));

    let err = fx.store.delete_memory(&t2, &m.id).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));

    let err = fx.store.touch_memory(&t2, &m.id).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));

    // owner still sees it
    assert_eq!(fx.store.get_memory(&t1, &m.id).await.unwrap().content, "s1");
}

#[tokio::test]
async fn system_tenant_sees_raw_namespaces() {
    let fx = fixture().await;
    let t1 = make_tenant(&fx, "tenant1").await;
    fx.store
        .create_memory(&t1, memory("default", "x"))
        .await
        .unwrap();

    let hits = fx
        .store
        .search(
            "system",
            SearchQuery {
                query: String::new(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].namespace.contains("::"));
}

#[tokio::test]
async fn search_without_namespace_stays_in_tenant() {
    let fx = fixture().await;
    let t1 = make_tenant(&fx, "tenant1").await;
    let t2 = make_tenant(&fx, "tenant2").await;

    fx.store.create_memory(&t1, memory("a", "shared term")).await.unwrap();
    fx.store.create_memory(&t2, memory("b", "shared term")).await.unwrap();

    let hits = fx
        .store
        .search(
            &t1,
            SearchQuery {
                query: "shared".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].namespace, "a");
}

#[tokio::test]
async fn usage_accounting_tracks_create_and_delete() {
    let fx = fixture().await;
    let t1 = make_tenant(&fx, "tenant1").await;

    let m = fx
        .store
        .create_memory(&t1, memory("default", "12345"))
        .await
        .unwrap();
    let usage = fx.registry.get_usage(&t1).await.unwrap();
    assert_eq!(usage.memory_count, 1);
    assert_eq!(usage.storage_bytes, 5 + 500);

    fx.store.delete_memory(&t1, &m.id).await.unwrap();
    let usage = fx.registry.get_usage(&t1).await.unwrap();
    assert_eq!(usage.memory_count, 0);
    assert_eq!(usage.storage_bytes, 0);
}

#[tokio::test]
async fn memory_quota_is_enforced_pre_write() {
    let fx = fixture().await;
    let tenant = fx
        .registry
        .create(TenantCreate {
            name: "small".to_string(),
            quotas: Some(TenantQuotas {
                max_memories: 2,
                max_storage_bytes: 0,
                requests_per_minute: 0,
                requests_per_day: 0,
            }),
            ..Default::default()
        })
        .await
        .unwrap();

    fx.store.create_memory(&tenant.id, memory("ns", "1")).await.unwrap();
    fx.store.create_memory(&tenant.id, memory("ns", "2")).await.unwrap();
    let err = fx
        .store
        .create_memory(&tenant.id, memory("ns", "3"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::QuotaExceeded { .. }));
}

#[tokio::test]
async fn oversized_single_write_rejected() {
    let fx = fixture().await;
    let tenant = fx
        .registry
        .create(TenantCreate {
            name: "tiny".to_string(),
            quotas: Some(TenantQuotas {
                max_memories: 0,
                max_storage_bytes: 600,
                requests_per_minute: 0,
                requests_per_day: 0,
            }),
            ..Default::default()
        })
        .await
        .unwrap();

    // 200 bytes of content + 500 overhead exceeds the 600-byte quota alone
    let err = fx
        .store
        .create_memory(&tenant.id, memory("ns", &"x".repeat(200)))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::QuotaExceeded { .. }));
}

#[tokio::test]
async fn namespace_listing_strips_prefix() {
    let fx = fixture().await;
    let t1 = make_tenant(&fx, "tenant1").await;
    let t2 = make_tenant(&fx, "tenant2").await;

    fx.store.create_namespace(&t1, namespace("alpha")).await.unwrap();
    fx.store.create_namespace(&t1, namespace("beta")).await.unwrap();
    fx.store.create_namespace(&t2, namespace("gamma")).await.unwrap();

    let names: Vec<String> = fx
        .store
        .list_namespaces(&t1)
        .await
        .unwrap()
        .into_iter()
        .map(|ns| ns.name)
        .collect();
    assert_eq!(names, vec!["alpha".to_string(), "beta".to_string()]);
}

#[tokio::test]
async fn separator_in_client_names_rejected() {
    let fx = fixture().await;
    let t1 = make_tenant(&fx, "tenant1").await;

    let err = fx
        .store
        .create_memory(&t1, memory("a::b", "x"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidInput(_)));

    let err = fx
        .store
        .create_namespace(&t1, namespace("a::b"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidInput(_)));
}

#[tokio::test]
async fn batch_delete_skips_foreign_memories() {
    let fx = fixture().await;
    let t1 = make_tenant(&fx, "tenant1").await;
    let t2 = make_tenant(&fx, "tenant2").await;

    let mine = fx.store.create_memory(&t1, memory("ns", "mine")).await.unwrap();
    let theirs = fx.store.create_memory(&t2, memory("ns", "theirs")).await.unwrap();

    let removed = fx
        .store
        .batch_delete_memories(&t1, vec![mine.id.clone(), theirs.id.clone()])
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert!(fx.store.get_memory(&t2, &theirs.id).await.is_ok());
}

#[tokio::test]
async fn stats_reports_usage_for_tenant_and_global_for_system() {
    let fx = fixture().await;
    let t1 = make_tenant(&fx, "tenant1").await;
    fx.store.create_memory(&t1, memory("ns", "abc")).await.unwrap();

    let tenant_stats = fx.store.stats(&t1).await.unwrap();
    assert_eq!(tenant_stats.memory_count, 1);
    assert_eq!(tenant_stats.storage_bytes, 3 + 500);

    let global = fx.store.stats("system").await.unwrap();
    assert_eq!(global.memory_count, 1);
}

#[tokio::test]
async fn delete_tenant_data_cascades() {
    let fx = fixture().await;
    let t1 = make_tenant(&fx, "tenant1").await;
    let t2 = make_tenant(&fx, "tenant2").await;

    fx.store.create_namespace(&t1, namespace("keep")).await.unwrap();
    let m1 = fx.store.create_memory(&t1, memory("keep", "1")).await.unwrap();
    let m2 = fx.store.create_memory(&t2, memory("other", "2")).await.unwrap();

    fx.store.delete_tenant_data(&t1).await.unwrap();

    assert!(fx.store.get_memory(&t1, &m1.id).await.is_err());
    assert!(fx.store.list_namespaces(&t1).await.unwrap().is_empty());
    // the other tenant is untouched
    assert!(fx.store.get_memory(&t2, &m2.id).await.is_ok());
}

struct CountingOpener {
    opens: AtomicUsize,
}

impl StoreOpener for CountingOpener {
    fn open(&self, _path: &Path) -> Result<Arc<dyn MemoryStore>, StoreError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(KvBackedStore::in_memory()))
    }
}

#[tokio::test]
async fn dedicated_store_opens_once_and_isolates_data() {
    let registry = Arc::new(TenantRegistry::new(InMemoryKv::shared()));
    let premium = registry
        .create(TenantCreate {
            name: "prem".to_string(),
            plan: Some(TenantPlan::Premium),
            config: Some(TenantConfig {
                dedicated_storage: true,
                ..TenantConfig::default_for_plan(TenantPlan::Premium)
            }),
            ..Default::default()
        })
        .await
        .unwrap();

    let opener = Arc::new(CountingOpener {
        opens: AtomicUsize::new(0),
    });
    let shared: Arc<dyn MemoryStore> = Arc::new(KvBackedStore::in_memory());
    let tmp = tempfile::tempdir().unwrap();
    let store = TenantAwareStore::new(
        shared.clone(),
        registry.clone(),
        PersistenceConfig {
            dedicated_base_dir: Some(tmp.path().to_path_buf()),
        },
    )
    .with_opener(opener.clone());

    let m = store
        .create_memory(&premium.id, memory("ns", "private"))
        .await
        .unwrap();
    store.get_memory(&premium.id, &m.id).await.unwrap();
    store
        .list_memories(&premium.id, "ns", 100, 0)
        .await
        .unwrap();

    // one lazy open despite several operations
    assert_eq!(opener.opens.load(Ordering::SeqCst), 1);
    // nothing landed in the shared store
    assert_eq!(shared.stats().await.unwrap().memory_count, 0);
}

#[tokio::test]
async fn dedicated_flag_without_base_dir_falls_back_to_shared() {
    let registry = Arc::new(TenantRegistry::new(InMemoryKv::shared()));
    let premium = registry
        .create(TenantCreate {
            name: "prem".to_string(),
            plan: Some(TenantPlan::Premium),
            config: Some(TenantConfig {
                dedicated_storage: true,
                ..TenantConfig::default_for_plan(TenantPlan::Premium)
            }),
            ..Default::default()
        })
        .await
        .unwrap();

    let shared: Arc<dyn MemoryStore> = Arc::new(KvBackedStore::in_memory());
    let store = TenantAwareStore::new(shared.clone(), registry, PersistenceConfig::default());

    store
        .create_memory(&premium.id, memory("ns", "data"))
        .await
        .unwrap();
    assert_eq!(shared.stats().await.unwrap().memory_count, 1);
}

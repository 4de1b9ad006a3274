//! Integration tests for routing, failover, and the caching router

use std::sync::Arc;
use std::time::Duration;

use maia_intelligence::{
    CacheConfig, CachingRouter, ChatMessage, ChatRequest, HealthCheckConfig, HealthChecker,
    IntelligenceError, MockProvider, Provider, ResponseCache, Router, RouterConfig,
};

fn request(model: &str) -> ChatRequest {
    ChatRequest::new(model, vec![ChatMessage::user("hello")])
}

fn fast_checker() -> Arc<HealthChecker> {
    Arc::new(HealthChecker::new(HealthCheckConfig {
        interval: Duration::from_millis(10),
        timeout: Duration::from_millis(200),
        unhealthy_threshold: 1,
        healthy_threshold: 1,
    }))
}

async fn routed_name(router: &Router, model: &str) -> String {
    router.route(model, None).await.unwrap().name().to_string()
}

#[tokio::test]
async fn failover_and_recovery() {
    let checker = fast_checker();
    let router = Router::with_health_checker(RouterConfig::default(), checker.clone());

    let primary = Arc::new(MockProvider::with_name("primary").with_patterns(vec!["test*"]));
    let backup = Arc::new(MockProvider::with_name("backup").with_patterns(vec!["test*"]));
    router.register_provider("primary", primary.clone()).await.unwrap();
    router.register_provider("backup", backup.clone()).await.unwrap();
    router.add_route("test*", "primary").await;

    assert_eq!(routed_name(&router, "test-model").await, "primary");

    // primary goes down: route fails over to the healthy supporter
    primary.set_healthy(false);
    checker.check_now("primary").await.unwrap();
    assert_eq!(routed_name(&router, "test-model").await, "backup");

    // primary recovers: route returns home
    primary.set_healthy(true);
    checker.check_now("primary").await.unwrap();
    assert_eq!(routed_name(&router, "test-model").await, "primary");
}

#[tokio::test]
async fn unhealthy_supporter_still_beats_no_provider() {
    let checker = fast_checker();
    let router = Router::with_health_checker(RouterConfig::default(), checker.clone());

    let only = Arc::new(MockProvider::with_name("only").with_patterns(vec!["test*"]));
    router.register_provider("only", only.clone()).await.unwrap();
    router.add_route("test*", "only").await;

    only.set_healthy(false);
    checker.check_now("only").await.unwrap();

    // no healthy supporter exists, but routing still returns the supporter
    assert_eq!(routed_name(&router, "test-model").await, "only");
}

#[tokio::test]
async fn explicit_provider_is_honored_or_refused() {
    let checker = fast_checker();
    let router = Router::with_health_checker(RouterConfig::default(), checker.clone());

    let a = Arc::new(MockProvider::with_name("a"));
    let b = Arc::new(MockProvider::with_name("b"));
    router.register_provider("a", a.clone()).await.unwrap();
    router.register_provider("b", b).await.unwrap();

    let routed = router.route("any", Some("a")).await.unwrap();
    assert_eq!(routed.name(), "a");

    // unknown explicit provider is never rerouted
    let err = router.route("any", Some("missing")).await.unwrap_err();
    assert!(matches!(err, IntelligenceError::NoProviderFound(_)));

    // unhealthy explicit provider is refused while failover is on
    a.set_healthy(false);
    checker.check_now("a").await.unwrap();
    let err = router.route("any", Some("a")).await.unwrap_err();
    assert!(matches!(err, IntelligenceError::ProviderUnhealthy(_)));
}

#[tokio::test]
async fn exact_pattern_beats_wildcard() {
    let router = Router::new(RouterConfig::default());
    let wild = Arc::new(MockProvider::with_name("wild"));
    let exact = Arc::new(MockProvider::with_name("exact"));
    router.register_provider("wild", wild).await.unwrap();
    router.register_provider("exact", exact).await.unwrap();

    router.add_route("gpt-*", "wild").await;
    router.add_route("gpt-4", "exact").await;

    assert_eq!(routed_name(&router, "gpt-4").await, "exact");
    assert_eq!(routed_name(&router, "gpt-3.5").await, "wild");
}

#[tokio::test]
async fn default_provider_catches_unmapped_models() {
    let router = Router::new(RouterConfig {
        default_provider: Some("fallback".to_string()),
        failover_enabled: true,
    });
    let fallback = Arc::new(MockProvider::with_name("fallback"));
    router.register_provider("fallback", fallback).await.unwrap();

    assert_eq!(routed_name(&router, "anything-at-all").await, "fallback");
}

#[tokio::test]
async fn empty_registry_fails_routing() {
    let router = Router::new(RouterConfig::default());
    let err = router.route("model", None).await.unwrap_err();
    assert!(matches!(err, IntelligenceError::NoProviderFound(_)));
}

#[tokio::test]
async fn failover_disabled_routes_to_unhealthy_target() {
    let checker = fast_checker();
    let router = Router::with_health_checker(
        RouterConfig {
            default_provider: None,
            failover_enabled: false,
        },
        checker.clone(),
    );
    let primary = Arc::new(MockProvider::with_name("primary").with_patterns(vec!["m*"]));
    let backup = Arc::new(MockProvider::with_name("backup").with_patterns(vec!["m*"]));
    router.register_provider("primary", primary.clone()).await.unwrap();
    router.register_provider("backup", backup).await.unwrap();
    router.add_route("m*", "primary").await;

    primary.set_healthy(false);
    checker.check_now("primary").await.unwrap();

    // health is ignored when failover is off
    assert_eq!(routed_name(&router, "m1").await, "primary");
}

#[tokio::test]
async fn list_models_unions_and_skips_failures() {
    let router = Router::new(RouterConfig::default());
    let a = Arc::new(MockProvider::with_name("a").with_patterns(vec!["a-*"]));
    let b = Arc::new(MockProvider::with_name("b").with_patterns(vec!["b-*"]));
    router.register_provider("a", a).await.unwrap();
    router.register_provider("b", b.clone()).await.unwrap();

    // a closed provider fails list_models; the union skips it
    b.close().await.unwrap();

    let models = router.list_models().await;
    assert_eq!(models.len(), 1);
    assert_eq!(models[0].provider, "a");
}

#[tokio::test]
async fn caching_router_serves_cached_response() {
    let router = Arc::new(Router::new(RouterConfig::default()));
    let provider = Arc::new(MockProvider::with_name("mock"));
    provider.set_responses(vec!["A"]);
    router.register_provider("mock", provider.clone()).await.unwrap();

    let cache = Arc::new(ResponseCache::new(CacheConfig::default()));
    let caching = CachingRouter::new(router, cache.clone());

    let first = caching.complete(request("m")).await.unwrap();
    assert_eq!(first.choices[0].message.content, "A");

    // provider now answers differently, but the cache does not
    provider.set_responses(vec!["B"]);
    let second = caching.complete(request("m")).await.unwrap();
    assert_eq!(second.choices[0].message.content, "A");

    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(provider.request_count(), 1);
}

#[tokio::test]
async fn streaming_bypasses_the_cache() {
    let router = Arc::new(Router::new(RouterConfig::default()));
    let provider = Arc::new(MockProvider::with_name("mock"));
    router.register_provider("mock", provider).await.unwrap();

    let cache = Arc::new(ResponseCache::new(CacheConfig::default()));
    let caching = CachingRouter::new(router, cache.clone());

    let mut req = request("m");
    req.stream = true;
    let _reader = caching.stream(req).await.unwrap();

    assert_eq!(cache.stats().entries, 0);
}

#[tokio::test]
async fn close_clears_registry_and_closes_providers() {
    let router = Router::new(RouterConfig::default());
    let provider = Arc::new(MockProvider::with_name("p"));
    router.register_provider("p", provider.clone()).await.unwrap();

    router.close().await.unwrap();
    assert!(router.provider_names().await.is_empty());

    let err = provider.complete(request("m")).await.unwrap_err();
    assert!(matches!(err, IntelligenceError::ProviderClosed));
}

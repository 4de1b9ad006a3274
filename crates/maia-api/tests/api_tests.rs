//! End-to-end API tests over the full middleware chain

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use maia_api::{bootstrap, build_app, ApiConfig, AppState};
use maia_intelligence::MockProvider;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

async fn state_with(configure: impl FnOnce(&mut ApiConfig)) -> AppState {
    let mut config = ApiConfig::default();
    configure(&mut config);
    bootstrap(config).await.unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn create_tenant(state: &AppState, name: &str) -> String {
    state
        .registry
        .create(maia_persistence::TenantCreate {
            name: name.to_string(),
            ..Default::default()
        })
        .await
        .unwrap()
        .id
}

fn with_tenant(mut request: Request<Body>, tenant_id: &str) -> Request<Body> {
    request.headers_mut().insert(
        "x-maia-tenant-id",
        tenant_id.parse().expect("header value"),
    );
    request
}

#[tokio::test]
async fn health_and_ready() {
    let state = state_with(|_| {}).await;
    let app = build_app(state);

    let (status, body) = send(&app, get_request("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "maia");

    let (status, _) = send(&app, get_request("/ready")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn security_headers_and_request_id_on_every_response() {
    let state = state_with(|_| {}).await;
    let app = build_app(state);

    let response = app
        .clone()
        .oneshot(get_request("/health"))
        .await
        .unwrap();
    let headers = response.headers();
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert_eq!(headers["x-xss-protection"], "1; mode=block");
    assert_eq!(
        headers["referrer-policy"],
        "strict-origin-when-cross-origin"
    );
    assert!(headers.contains_key("x-request-id"));

    // a supplied request id is echoed back
    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "test-id-42")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "test-id-42");
}

#[tokio::test]
async fn memory_crud_roundtrip() {
    let state = state_with(|_| {}).await;
    let app = build_app(state);

    let (status, created) = send(
        &app,
        json_request(
            "POST",
            "/v1/memories",
            json!({ "namespace": "default", "content": "hello" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().unwrap().to_string();

    let (status, fetched) = send(&app, get_request(&format!("/v1/memories/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["content"], "hello");
    assert_eq!(fetched["namespace"], "default");

    let (status, updated) = send(
        &app,
        json_request(
            "PUT",
            &format!("/v1/memories/{id}"),
            json!({ "content": "changed" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["content"], "changed");

    let (status, _) = send(
        &app,
        Request::builder()
            .method("DELETE")
            .uri(format!("/v1/memories/{id}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, get_request(&format!("/v1/memories/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn tenant_isolation_on_read() {
    let state = state_with(|c| {
        c.tenant.enabled = true;
    })
    .await;
    let t1 = create_tenant(&state, "tenant1").await;
    let t2 = create_tenant(&state, "tenant2").await;
    let app = build_app(state);

    let (status, created) = send(
        &app,
        with_tenant(
            json_request(
                "POST",
                "/v1/memories",
                json!({ "namespace": "default", "content": "s1" }),
            ),
            &t1,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().unwrap().to_string();

    // the other tenant sees not-found, never forbidden
    let (status, body) = send(
        &app,
        with_tenant(get_request(&format!("/v1/memories/{id}")), &t2),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    // the owner reads it back with the external namespace
    let (status, body) = send(
        &app,
        with_tenant(get_request(&format!("/v1/memories/{id}")), &t1),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["namespace"], "default");
    assert_eq!(body["content"], "s1");
}

#[tokio::test]
async fn unknown_tenant_header_is_refused() {
    let state = state_with(|c| {
        c.tenant.enabled = true;
    })
    .await;
    let app = build_app(state);

    let (status, _) = send(
        &app,
        with_tenant(get_request("/v1/stats"), "no-such-tenant"),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn suspended_tenant_is_forbidden() {
    let state = state_with(|c| {
        c.tenant.enabled = true;
    })
    .await;
    let t1 = create_tenant(&state, "tenant1").await;
    state.registry.suspend(&t1).await.unwrap();
    let app = build_app(state);

    let (status, _) = send(&app, with_tenant(get_request("/v1/stats"), &t1)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn namespace_id_or_name_fallback() {
    let state = state_with(|_| {}).await;
    let app = build_app(state);

    let (status, created) = send(
        &app,
        json_request("POST", "/v1/namespaces", json!({ "name": "proj" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().unwrap().to_string();

    let (status, by_id) = send(&app, get_request(&format!("/v1/namespaces/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, by_name) = send(&app, get_request("/v1/namespaces/proj")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(by_id["id"], by_name["id"]);
}

#[tokio::test]
async fn search_and_pagination_cap() {
    let state = state_with(|_| {}).await;
    let app = build_app(state);

    for i in 0..3 {
        send(
            &app,
            json_request(
                "POST",
                "/v1/memories",
                json!({ "namespace": "ns", "content": format!("note {i}") }),
            ),
        )
        .await;
    }

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/v1/memories/search",
            json!({ "query": "note", "limit": 2 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
}

#[tokio::test]
async fn context_assembly_respects_budget() {
    let state = state_with(|_| {}).await;
    let app = build_app(state);

    for i in 0..5 {
        send(
            &app,
            json_request(
                "POST",
                "/v1/memories",
                json!({ "namespace": "ns", "content": format!("fact number {i} about maia") }),
            ),
        )
        .await;
    }

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/v1/context",
            json!({ "query": "fact", "token_budget": 10 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    // a 10-token budget fits a single fact
    assert_eq!(body["memory_count"], 1);
    assert!(body["token_count"].as_u64().unwrap() <= 10);
}

#[tokio::test]
async fn stats_endpoint_reports_counts() {
    let state = state_with(|_| {}).await;
    let app = build_app(state);

    send(
        &app,
        json_request(
            "POST",
            "/v1/memories",
            json!({ "namespace": "ns", "content": "x" }),
        ),
    )
    .await;
    let (status, body) = send(&app, get_request("/v1/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["memory_count"], 1);
}

#[tokio::test]
async fn admin_tenant_lifecycle() {
    let state = state_with(|_| {}).await;
    let app = build_app(state.clone());

    let (status, tenant) = send(
        &app,
        json_request("POST", "/admin/tenants", json!({ "name": "acme" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = tenant["id"].as_str().unwrap().to_string();
    assert_eq!(tenant["plan"], "free");
    assert_eq!(tenant["status"], "active");

    let (status, body) = send(
        &app,
        json_request("POST", "/admin/tenants", json!({ "name": "acme" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "ALREADY_EXISTS");

    let (status, _) = send(
        &app,
        json_request("POST", &format!("/admin/tenants/{id}/suspend"), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, usage) = send(&app, get_request(&format!("/admin/tenants/{id}/usage"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(usage["memory_count"], 0);

    let (status, _) = send(
        &app,
        Request::builder()
            .method("DELETE")
            .uri(format!("/admin/tenants/{id}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, get_request(&format!("/admin/tenants/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn system_tenant_cannot_be_deleted_or_suspended() {
    let state = state_with(|_| {}).await;
    let app = build_app(state);

    let (status, _) = send(
        &app,
        Request::builder()
            .method("DELETE")
            .uri("/admin/tenants/system")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        json_request("POST", "/admin/tenants/system/suspend", json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn api_key_creation_over_http() {
    let state = state_with(|_| {}).await;
    let t1 = create_tenant(&state, "tenant1").await;
    let app = build_app(state);

    let (status, created) = send(
        &app,
        json_request(
            "POST",
            &format!("/admin/tenants/{t1}/apikeys"),
            json!({ "name": "ci", "scopes": ["read", "write"] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let raw = created["raw_key"].as_str().unwrap();
    assert!(raw.starts_with("maia_"));
    assert_eq!(raw.len(), 5 + 64);
    assert_eq!(created["key_hash"].as_str().unwrap().len(), 64);

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            &format!("/admin/tenants/{t1}/apikeys"),
            json!({ "name": "bad", "scopes": ["root"] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_INPUT");

    let (status, listed) = send(&app, get_request(&format!("/admin/tenants/{t1}/apikeys"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["count"], 1);
    // stored records never expose the raw key
    assert!(listed["keys"][0]["raw_key"].is_null());
}

#[tokio::test]
async fn chat_completion_with_cache_hit() {
    let state = state_with(|_| {}).await;
    let inference = state.inference.clone().unwrap();
    let provider = Arc::new(MockProvider::with_name("mock"));
    provider.set_responses(vec!["A"]);
    inference
        .router()
        .register_provider("mock", provider.clone())
        .await
        .unwrap();
    let app = build_app(state);

    let request_body = json!({
        "model": "any-model",
        "messages": [{ "role": "user", "content": "hello" }]
    });

    let (status, first) = send(
        &app,
        json_request("POST", "/v1/inference/chat", request_body.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["choices"][0]["message"]["content"], "A");

    // the provider changes its answer; the cache does not
    provider.set_responses(vec!["B"]);
    let (status, second) = send(
        &app,
        json_request("POST", "/v1/inference/chat", request_body),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["choices"][0]["message"]["content"], "A");

    let (_, stats) = send(&app, get_request("/v1/inference/cache/stats")).await;
    assert_eq!(stats["hits"], 1);
    assert_eq!(stats["misses"], 1);
}

#[tokio::test]
async fn inference_health_endpoints() {
    let state = state_with(|_| {}).await;
    let inference = state.inference.clone().unwrap();
    inference
        .router()
        .register_provider("mock", Arc::new(MockProvider::with_name("mock")))
        .await
        .unwrap();
    let app = build_app(state);

    let (status, body) = send(&app, get_request("/v1/inference/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["providers"]["mock"]["status"], "unknown");

    let (status, body) = send(
        &app,
        json_request("POST", "/v1/inference/health/mock", json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["health"]["consecutive_ok"], 1);

    let (status, body) = send(&app, get_request("/v1/inference/health/ghost")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "PROVIDER_NOT_FOUND");
}

#[tokio::test]
async fn inference_disabled_reports_code() {
    let state = state_with(|c| {
        c.inference.enabled = false;
    })
    .await;
    let app = build_app(state);

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/v1/inference/chat",
            json!({ "model": "m", "messages": [{ "role": "user", "content": "x" }] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "INFERENCE_DISABLED");
}

#[tokio::test]
async fn metrics_endpoint_exposes_series() {
    let state = state_with(|_| {}).await;
    let app = build_app(state);

    send(&app, get_request("/health")).await;
    let response = app.oneshot(get_request("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("maia_http_requests_total"));
    assert!(text.contains("maia_replication_events_total"));
}

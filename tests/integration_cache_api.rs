use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tiercache::router::init_router;
use tiercache::state::AppState;
use tiercache_cache::CacheService;
use tiercache_config::{CacheConfig, CorsConfig, ResponseCacheConfig};
use tower::ServiceExt;

fn setup_test_app() -> axum::Router {
    let state = AppState::new(
        CacheService::memory_only(&CacheConfig::default()),
        ResponseCacheConfig::default(),
        CorsConfig::default(),
    );
    init_router(state)
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let body = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, body)
}

/// GET `uri` and return the status, the `x-cache` header and the JSON body.
async fn read(app: &axum::Router, uri: &str) -> (StatusCode, Option<String>, Value) {
    let response = app.clone().oneshot(get(uri)).await.unwrap();
    let status = response.status();
    let x_cache = response
        .headers()
        .get("x-cache")
        .map(|v| v.to_str().unwrap().to_string());
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let body = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, x_cache, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn put_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

#[tokio::test]
async fn test_health_reports_memory_backend() {
    let app = setup_test_app();

    let (status, body) = send(&app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok", "backend": "memory"}));
}

#[tokio::test]
async fn test_put_then_get_entry() {
    let app = setup_test_app();

    let (status, _) = send(
        &app,
        put_json(
            "/api/cache/entries/user:42:profile",
            json!({"value": {"name": "Ana"}, "ttl_seconds": 60}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, get("/api/cache/entries/user:42:profile")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["key"], "user:42:profile");
    assert_eq!(body["value"], json!({"name": "Ana"}));
}

#[tokio::test]
async fn test_missing_entry_is_404() {
    let app = setup_test_app();

    let (status, body) = send(&app, get("/api/cache/entries/nope")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("nope"));
}

#[tokio::test]
async fn test_tenants_do_not_share_keys() {
    let app = setup_test_app();

    send(
        &app,
        put_json(
            "/api/cache/entries/settings",
            json!({"value": "acme settings", "tenant_id": "acme"}),
        ),
    )
    .await;

    let (status, body) = send(&app, get("/api/cache/entries/settings?tenant_id=acme")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["value"], "acme settings");
    assert_eq!(body["tenant_id"], "acme");

    let (status, _) = send(&app, get("/api/cache/entries/settings?tenant_id=globex")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, get("/api/cache/entries/settings")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_entry() {
    let app = setup_test_app();
    send(&app, put_json("/api/cache/entries/a", json!({"value": 1}))).await;

    let (status, _) = send(&app, delete("/api/cache/entries/a")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, get("/api/cache/entries/a")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalidate_tag_removes_only_tagged_entries() {
    let app = setup_test_app();
    send(
        &app,
        put_json(
            "/api/cache/entries/user:42:profile",
            json!({"value": {"name": "Ana"}, "tags": ["user:42"]}),
        ),
    )
    .await;
    send(
        &app,
        put_json(
            "/api/cache/entries/user:42:orders",
            json!({"value": [1, 2], "tags": ["user:42"]}),
        ),
    )
    .await;
    send(
        &app,
        put_json("/api/cache/entries/user:7:profile", json!({"value": {"name": "Bo"}})),
    )
    .await;

    let (status, _) = send(&app, delete("/api/cache/tags/user:42")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, get("/api/cache/entries/user:42:profile")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, get("/api/cache/entries/user:42:orders")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, get("/api/cache/entries/user:7:profile")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_clear_then_stats() {
    let app = setup_test_app();
    for key in ["a", "b", "c"] {
        send(
            &app,
            put_json(&format!("/api/cache/entries/{key}"), json!({"value": key})),
        )
        .await;
    }

    let (_, stats) = send(&app, get("/api/cache/stats")).await;
    assert_eq!(stats["entry_count"], 3);
    assert_eq!(stats["max_entries"], 1000);
    assert_eq!(stats["active_backend"], "memory");

    let (status, _) = send(&app, delete("/api/cache")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, get("/api/cache/entries/a")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, stats) = send(&app, get("/api/cache/stats")).await;
    assert_eq!(stats["entry_count"], 0);
    assert_eq!(stats["fallbacks"], 0);
}

#[tokio::test]
async fn test_invalid_ttl_is_422() {
    let app = setup_test_app();

    let (status, body) = send(
        &app,
        put_json("/api/cache/entries/a", json!({"value": 1, "ttl_seconds": 0})),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("ttl_seconds"));
}

#[tokio::test]
async fn test_missing_value_is_400() {
    let app = setup_test_app();

    let (status, body) = send(
        &app,
        put_json("/api/cache/entries/a", json!({"ttl_seconds": 10})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "value is required");
}

#[tokio::test]
async fn test_entry_reads_go_through_response_cache() {
    let app = setup_test_app();
    send(&app, put_json("/api/cache/entries/a", json!({"value": 1}))).await;

    let (status, x_cache, body) = read(&app, "/api/cache/entries/a").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(x_cache.as_deref(), Some("MISS"));
    assert_eq!(body["value"], 1);

    let (status, x_cache, body) = read(&app, "/api/cache/entries/a").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(x_cache.as_deref(), Some("HIT"));
    assert_eq!(body["value"], 1);

    let (_, x_cache, _) = read(&app, "/api/cache/stats").await;
    assert_eq!(x_cache, None);
}

#[tokio::test]
async fn test_writes_drop_cached_entry_responses() {
    let app = setup_test_app();
    send(&app, put_json("/api/cache/entries/a", json!({"value": 1}))).await;
    read(&app, "/api/cache/entries/a").await;

    send(&app, put_json("/api/cache/entries/a", json!({"value": 2}))).await;
    let (_, x_cache, body) = read(&app, "/api/cache/entries/a").await;
    assert_eq!(x_cache.as_deref(), Some("MISS"));
    assert_eq!(body["value"], 2);

    send(&app, delete("/api/cache/entries/a")).await;
    let (status, x_cache, _) = read(&app, "/api/cache/entries/a").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(x_cache.as_deref(), Some("MISS"));
}

#[tokio::test]
async fn test_missing_entry_responses_are_not_stored() {
    let app = setup_test_app();

    for _ in 0..2 {
        let (status, x_cache, _) = read(&app, "/api/cache/entries/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(x_cache.as_deref(), Some("MISS"));
    }
}

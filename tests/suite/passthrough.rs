//! Non-chat traffic, health, and upstream failures.

use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shrinkwrap_config::ProxyConfig;
use shrinkwrap_proxy::{BAD_GATEWAY_DETAIL, ProxyState};

use crate::common::{config_for, only_request, spawn_proxy, start, upstream_config};

#[tokio::test]
async fn health_reports_upstream_target() {
    let (upstream, proxy) = start(None).await;

    let response = proxy.client.get(proxy.url("/health")).send().await.unwrap();

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(
        body,
        json!({"status": "healthy", "proxy_target": format!("{}/v1", upstream.uri())})
    );
    assert!(upstream.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn get_requests_keep_path_query_and_headers() {
    let (upstream, proxy) = start(Some(0.5)).await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .and(query_param("limit", "2"))
        .and(header("x-custom", "kept"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"data": [{"id": "gpt-4o"}]}))
                .insert_header("x-request-id", "req_123"),
        )
        .expect(1)
        .mount(&upstream)
        .await;

    let response = proxy
        .client
        .get(proxy.url("/v1/models?limit=2"))
        .header("x-custom", "kept")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["x-request-id"], "req_123");
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"][0]["id"], "gpt-4o");

    let received = only_request(&upstream).await;
    let host = received.headers.get("host").unwrap().to_str().unwrap();
    assert_ne!(host, proxy.addr.to_string());
}

#[tokio::test]
async fn upstream_errors_are_relayed_unchanged() {
    let (upstream, proxy) = start(Some(0.5)).await;
    let error = json!({"error": {"message": "Rate limit reached", "type": "requests"}});
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(error.clone()))
        .mount(&upstream)
        .await;

    let response = proxy
        .client
        .post(proxy.url("/v1/chat/completions"))
        .json(&json!({"messages": []}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 429);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body, error);
}

#[tokio::test]
async fn delete_is_forwarded_without_a_body() {
    let (upstream, proxy) = start(None).await;
    Mock::given(method("DELETE"))
        .and(path("/v1/files/file-abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"deleted": true})))
        .mount(&upstream)
        .await;

    let response = proxy
        .client
        .delete(proxy.url("/v1/files/file-abc"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert!(only_request(&upstream).await.body.is_empty());
}

#[tokio::test]
async fn unreachable_upstream_is_a_bad_gateway() {
    // Nothing listens on port 1.
    let proxy = spawn_proxy(upstream_config("http://127.0.0.1:1/v1", Some(0.5))).await;

    let response = proxy
        .client
        .post(proxy.url("/v1/chat/completions"))
        .json(&json!({"messages": [{"role": "user", "content": "hello"}]}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 502);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body, json!({"detail": BAD_GATEWAY_DETAIL}));
}

#[tokio::test]
async fn oversized_bodies_are_rejected() {
    let upstream = MockServer::start().await;
    let mut config = config_for(&upstream, None);
    config.server.max_body_bytes = 1024;
    let proxy = spawn_proxy(config).await;

    let response = proxy
        .client
        .post(proxy.url("/v1/chat/completions"))
        .body(vec![b'x'; 4096])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 413);
    assert!(upstream.received_requests().await.unwrap().is_empty());
}

#[test]
fn state_builds_from_default_config() {
    let state = ProxyState::new(ProxyConfig::default()).unwrap();
    assert_eq!(state.config().upstream.base_url, "https://api.openai.com/v1");
}

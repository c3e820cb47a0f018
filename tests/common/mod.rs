//! Shared test utilities and fixtures
//!
//! Each test starts a `wiremock` upstream and a proxy bound to an ephemeral
//! port that forwards to it.

#![allow(dead_code)]

use std::net::SocketAddr;

use shrinkwrap_compress::SeedSource;
use shrinkwrap_config::ProxyConfig;
use shrinkwrap_types::Retention;
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

pub const CHAT_PATH: &str = "/v1/chat/completions";

/// A running proxy and a client pointed at it.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub client: reqwest::Client,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }
}

/// Config forwarding to `upstream`'s `/v1` with a fixed sampler seed.
pub fn config_for(upstream: &MockServer, keep: Option<f64>) -> ProxyConfig {
    upstream_config(&format!("{}/v1", upstream.uri()), keep)
}

pub fn upstream_config(base_url: &str, keep: Option<f64>) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.server.host = "127.0.0.1".to_string();
    config.upstream.base_url = base_url.to_string();
    config.compression.seed = SeedSource::Fixed(1234);
    if let Some(keep) = keep {
        config.compression.retention = Retention::from_fraction(keep).unwrap();
    }
    config
}

pub async fn spawn_proxy(config: ProxyConfig) -> TestProxy {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(shrinkwrap_proxy::serve_on(
        listener,
        config,
        std::future::pending(),
    ));
    TestProxy {
        addr,
        client: reqwest::Client::new(),
    }
}

/// Upstream mock plus a proxy that compresses at `keep` (or not at all).
pub async fn start(keep: Option<f64>) -> (MockServer, TestProxy) {
    let upstream = MockServer::start().await;
    let proxy = spawn_proxy(config_for(&upstream, keep)).await;
    (upstream, proxy)
}

/// Mount a plain chat-completion response.
pub async fn mount_chat_response(server: &MockServer, response_content: &str) {
    let body = serde_json::json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": "gpt-4o",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": response_content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 20, "total_tokens": 30}
    });

    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Mount a streaming chat-completion response made of `deltas`.
pub async fn mount_streaming_response(server: &MockServer, deltas: &[&str]) -> String {
    let mut sse_body = String::new();
    for delta in deltas {
        let chunk = serde_json::json!({
            "object": "chat.completion.chunk",
            "choices": [{"index": 0, "delta": {"content": delta}}]
        });
        sse_body.push_str(&format!("data: {chunk}\n\n"));
    }
    sse_body.push_str("data: [DONE]\n\n");

    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(sse_body.clone())
                .insert_header("content-type", "text/event-stream"),
        )
        .mount(server)
        .await;

    sse_body
}

/// The single request the upstream received.
pub async fn only_request(server: &MockServer) -> Request {
    let mut requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1, "expected exactly one upstream request");
    requests.remove(0)
}

pub fn json_body(request: &Request) -> serde_json::Value {
    serde_json::from_slice(&request.body).unwrap()
}

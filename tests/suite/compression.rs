//! Chat-completion bodies rewritten in flight.

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{
    CHAT_PATH, config_for, json_body, mount_chat_response, only_request, spawn_proxy, start,
};

const LONG_PROMPT: &str = "Please read the following quarterly report carefully and then \
    summarize the key revenue figures, the biggest risks called out by management, and any \
    guidance changes for the next two quarters in a short bulleted list.";

const MULTIBYTE_PROMPT: &str = "请总结这份季度报告 📊，列出收入数字 💰、管理层提到的风险 ⚠️ \
    以及下两个季度的指引变化 📈。Merci d'être bref, s'il vous plaît 🙏.";

#[tokio::test]
async fn user_text_is_compressed_and_everything_else_kept() {
    let (upstream, proxy) = start(Some(0.5)).await;
    mount_chat_response(&upstream, "ok").await;

    let request = json!({
        "model": "gpt-4o",
        "messages": [
            {"role": "system", "content": "You are a terse analyst."},
            {"role": "user", "content": LONG_PROMPT},
            {"role": "assistant", "content": "Send the report."}
        ],
        "temperature": 0.1,
        "stream": false
    });

    let response = proxy
        .client
        .post(proxy.url(CHAT_PATH))
        .bearer_auth("sk-test")
        .json(&request)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let reply: serde_json::Value = response.json().await.unwrap();
    assert_eq!(reply["choices"][0]["message"]["content"], "ok");

    let received = only_request(&upstream).await;
    let body = json_body(&received);
    assert_eq!(body["model"], "gpt-4o");
    assert_eq!(body["temperature"], 0.1);
    assert_eq!(body["stream"], false);
    assert_eq!(body["messages"][0], request["messages"][0]);
    assert_eq!(body["messages"][2], request["messages"][2]);
    assert_eq!(body["messages"][1]["role"], "user");

    let compressed = body["messages"][1]["content"].as_str().unwrap();
    assert!(!compressed.trim().is_empty());
    assert!(compressed.len() < LONG_PROMPT.len());

    let keys: Vec<&str> = body.as_object().unwrap().keys().map(String::as_str).collect();
    assert_eq!(keys, ["model", "messages", "temperature", "stream"]);

    assert_eq!(
        received.headers.get("authorization").unwrap(),
        "Bearer sk-test"
    );
}

#[tokio::test]
async fn disabled_compression_forwards_exact_bytes() {
    let (upstream, proxy) = start(None).await;
    mount_chat_response(&upstream, "ok").await;
    let raw = "{ \"messages\" : [ {\"role\":\"user\",\"content\":\"hello   there\"} ],\n \"model\":\"m\" }";

    let response = proxy
        .client
        .post(proxy.url(CHAT_PATH))
        .header("content-type", "application/json")
        .body(raw)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(only_request(&upstream).await.body, raw.as_bytes());
}

#[tokio::test]
async fn malformed_json_is_forwarded_verbatim() {
    let (upstream, proxy) = start(Some(0.5)).await;
    mount_chat_response(&upstream, "ok").await;
    let raw = "{\"messages\": [ this is not json";

    let response = proxy
        .client
        .post(proxy.url(CHAT_PATH))
        .header("content-type", "application/json")
        .body(raw)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(only_request(&upstream).await.body, raw.as_bytes());
}

#[tokio::test]
async fn payload_without_user_text_is_not_reserialized() {
    let (upstream, proxy) = start(Some(0.5)).await;
    mount_chat_response(&upstream, "ok").await;
    let raw = r#"{"model":"m",   "messages":[{"role":"system","content":"rules"},{"role":"user","content":[{"type":"text","text":"hi"}]}]}"#;

    proxy
        .client
        .post(proxy.url(CHAT_PATH))
        .body(raw)
        .send()
        .await
        .unwrap();

    assert_eq!(only_request(&upstream).await.body, raw.as_bytes());
}

#[tokio::test]
async fn other_endpoints_are_never_rewritten() {
    let upstream = MockServer::start().await;
    let proxy = spawn_proxy(config_for(&upstream, Some(0.2))).await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&upstream)
        .await;
    let request = json!({"model": "m", "messages": [{"role": "user", "content": LONG_PROMPT}]});

    proxy
        .client
        .post(proxy.url("/v1/embeddings"))
        .json(&request)
        .send()
        .await
        .unwrap();

    assert_eq!(json_body(&only_request(&upstream).await), request);
}

#[tokio::test]
async fn non_ascii_text_is_sent_unescaped() {
    let (upstream, proxy) = start(Some(0.5)).await;
    mount_chat_response(&upstream, "ok").await;
    let request = json!({
        "messages": [
            {"role": "system", "content": "Réponds en français."},
            {"role": "user", "content": LONG_PROMPT},
            {"role": "user", "content": MULTIBYTE_PROMPT}
        ]
    });

    proxy
        .client
        .post(proxy.url(CHAT_PATH))
        .json(&request)
        .send()
        .await
        .unwrap();

    let received = only_request(&upstream).await;
    let raw = String::from_utf8(received.body.clone()).unwrap();
    assert!(raw.contains("Réponds en français."));
    assert!(!raw.contains("\\u00e9"));

    let body = json_body(&received);
    let compressed = body["messages"][2]["content"].as_str().unwrap();
    assert_ne!(compressed, MULTIBYTE_PROMPT);
    assert!(!compressed.trim().is_empty());
}

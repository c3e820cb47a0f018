//! The catch-all forwarding handler.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, Method, Uri, header};
use axum::response::Response;
use futures_util::StreamExt;

use shrinkwrap_compress::{BpeTokenizer, Compressor, Rewriter};
use shrinkwrap_config::{ProxyConfig, UpstreamSettings};
use shrinkwrap_types::ChatPayload;

use crate::error::ProxyError;
use crate::traffic::{self, ChunkAudit};

const CONNECT_TIMEOUT_SECS: u64 = 30;
const TCP_KEEPALIVE_SECS: u64 = 60;
const POOL_MAX_IDLE_PER_HOST: usize = 100;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;

/// Path suffix of the endpoint whose request bodies are rewritten.
pub const CHAT_COMPLETIONS_SUFFIX: &str = "chat/completions";

/// Connection-scoped headers that must not cross the proxy.
fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// Shared, immutable state for every request.
#[derive(Debug)]
pub struct ProxyState {
    config: ProxyConfig,
    rewriter: Rewriter<BpeTokenizer>,
    client: reqwest::Client,
}

impl ProxyState {
    pub fn new(config: ProxyConfig) -> Result<Self, ProxyError> {
        let tokenizer = BpeTokenizer::new(config.compression.encoding)?;
        let rewriter =
            Rewriter::new(Compressor::new(tokenizer).with_seed(config.compression.seed));
        let client = upstream_client(&config.upstream)
            .build()
            .map_err(ProxyError::Client)?;
        Ok(Self {
            config,
            rewriter,
            client,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    fn upstream_url(&self, uri: &Uri) -> String {
        let path = uri.path().trim_start_matches('/');
        match uri.query() {
            Some(query) => format!("{}/{path}?{query}", self.config.upstream.base_url),
            None => format!("{}/{path}", self.config.upstream.base_url),
        }
    }

    /// Rewritten body bytes, or `None` to forward the original.
    fn compress_body(&self, body: &[u8]) -> Option<Vec<u8>> {
        let mut payload = match ChatPayload::from_slice(body) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "Request body is not a chat payload, forwarding unchanged");
                return None;
            }
        };

        let stats = self
            .rewriter
            .rewrite_payload(&mut payload, self.config.compression.retention);
        if !stats.changed() {
            return None;
        }

        match payload.to_vec() {
            Ok(bytes) => {
                tracing::debug!(
                    original_bytes = body.len(),
                    rewritten_bytes = bytes.len(),
                    "Rewrote chat payload"
                );
                Some(bytes)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize rewritten payload, forwarding unchanged");
                None
            }
        }
    }
}

fn upstream_client(upstream: &UpstreamSettings) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .read_timeout(upstream.timeout)
        .redirect(reqwest::redirect::Policy::none())
        .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .pool_idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)))
}

/// Only these methods have their body read and forwarded.
#[must_use]
pub fn carries_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

#[must_use]
pub fn is_chat_completions(path: &str) -> bool {
    path.ends_with(CHAT_COMPLETIONS_SUFFIX)
}

#[must_use]
pub fn is_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.trim_start().starts_with("text/event-stream"))
}

/// Copy `headers`, leaving out hop-by-hop headers and anything in `extra`.
#[must_use]
pub fn filter_headers(headers: &HeaderMap, extra: &[HeaderName]) -> HeaderMap {
    let mut filtered = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_by_hop(name) || extra.contains(name) {
            continue;
        }
        filtered.append(name.clone(), value.clone());
    }
    filtered
}

pub async fn forward(
    State(state): State<Arc<ProxyState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ProxyError> {
    let url = state.upstream_url(&uri);
    let log_traffic = state.config.logging.traffic;

    let body = if carries_body(&method) {
        body
    } else {
        Bytes::new()
    };

    let should_compress = !body.is_empty()
        && is_chat_completions(uri.path())
        && !state.config.compression.retention.is_full();

    let body = if should_compress {
        let worker = Arc::clone(&state);
        let original = body.clone();
        let rewritten = tokio::task::spawn_blocking(move || worker.compress_body(&original))
            .await
            .map_err(|e| ProxyError::Internal(format!("compression task failed: {e}")))?;
        rewritten.map_or(body, Bytes::from)
    } else {
        body
    };

    let outgoing = filter_headers(&headers, &[header::HOST, header::CONTENT_LENGTH]);
    if log_traffic {
        traffic::log_request(&method, &url, &outgoing, &body);
    }

    let mut request = state.client.request(method.clone(), &url).headers(outgoing);
    if carries_body(&method) {
        request = request.body(body);
    }
    let upstream = request.send().await.map_err(ProxyError::Upstream)?;

    let status = upstream.status();
    let response_headers = filter_headers(upstream.headers(), &[header::CONTENT_LENGTH]);

    let body = if is_event_stream(upstream.headers()) {
        if log_traffic {
            traffic::log_response(status, &response_headers, None);
        }
        let mut audit = ChunkAudit::new(log_traffic);
        let stream = upstream.bytes_stream().inspect(move |item| match item {
            Ok(chunk) => audit.observe(chunk),
            Err(e) => tracing::warn!(error = %e, "Upstream stream failed mid-response"),
        });
        Body::from_stream(stream)
    } else {
        let bytes = upstream.bytes().await.map_err(ProxyError::Upstream)?;
        if log_traffic {
            traffic::log_response(status, &response_headers, Some(&bytes));
        }
        Body::from(bytes)
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    Ok(response)
}

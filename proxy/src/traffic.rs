//! Request/response audit records.
//!
//! Everything here logs on [`TRAFFIC_TARGET`] and only when traffic logging is
//! enabled in the config. Credentials never reach the log: `authorization` and
//! any header whose name contains `api-key` are omitted.

use axum::body::Bytes;
use axum::http::{HeaderMap, Method, StatusCode};

pub const TRAFFIC_TARGET: &str = "shrinkwrap::traffic";

/// Bodies at or above this size are summarized by length only.
pub const MAX_LOGGED_BODY_BYTES: usize = 10_000;

/// Streamed chunks logged verbatim before switching to counting.
pub const LOGGED_STREAM_CHUNKS: usize = 5;

fn is_secret(name: &str) -> bool {
    name.eq_ignore_ascii_case("authorization") || name.to_ascii_lowercase().contains("api-key")
}

/// `name: value` lines for every non-secret header.
#[must_use]
pub fn visible_headers(headers: &HeaderMap) -> String {
    headers
        .iter()
        .filter(|(name, _)| !is_secret(name.as_str()))
        .map(|(name, value)| format!("{}: {}", name, String::from_utf8_lossy(value.as_bytes())))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The body as text when it is small enough and valid UTF-8.
#[must_use]
pub fn body_preview(body: &[u8]) -> Option<&str> {
    if body.len() >= MAX_LOGGED_BODY_BYTES {
        return None;
    }
    std::str::from_utf8(body).ok()
}

pub fn log_request(method: &Method, url: &str, headers: &HeaderMap, body: &[u8]) {
    tracing::info!(
        target: TRAFFIC_TARGET,
        %method,
        url,
        headers = %visible_headers(headers),
        body_bytes = body.len(),
        body = body_preview(body).unwrap_or("<omitted>"),
        "Request"
    );
}

pub fn log_response(status: StatusCode, headers: &HeaderMap, body: Option<&[u8]>) {
    match body {
        Some(body) => tracing::info!(
            target: TRAFFIC_TARGET,
            status = status.as_u16(),
            headers = %visible_headers(headers),
            body_bytes = body.len(),
            body = body_preview(body).unwrap_or("<omitted>"),
            "Response"
        ),
        None => tracing::info!(
            target: TRAFFIC_TARGET,
            status = status.as_u16(),
            headers = %visible_headers(headers),
            "Response (streaming)"
        ),
    }
}

/// Watches a relayed stream. Logs the first few chunks, and the total once the
/// stream is dropped, whether it finished or the client went away.
#[derive(Debug)]
pub struct ChunkAudit {
    enabled: bool,
    chunks: usize,
    bytes: usize,
}

impl ChunkAudit {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            chunks: 0,
            bytes: 0,
        }
    }

    pub fn observe(&mut self, chunk: &Bytes) {
        self.chunks += 1;
        self.bytes += chunk.len();
        if self.enabled && self.chunks <= LOGGED_STREAM_CHUNKS {
            tracing::info!(
                target: TRAFFIC_TARGET,
                chunk = self.chunks,
                data = %String::from_utf8_lossy(chunk),
                "Stream chunk"
            );
        }
    }

    #[must_use]
    pub fn chunks(&self) -> usize {
        self.chunks
    }
}

impl Drop for ChunkAudit {
    fn drop(&mut self) {
        if self.enabled {
            tracing::info!(
                target: TRAFFIC_TARGET,
                chunks = self.chunks,
                bytes = self.bytes,
                "Stream finished after {} chunks",
                self.chunks
            );
        }
    }
}

use std::io;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use shrinkwrap_compress::TokenizerError;

pub const BAD_GATEWAY_DETAIL: &str = "Bad Gateway - Failed to connect to upstream API";
pub const INTERNAL_ERROR_DETAIL: &str = "Internal Server Error";

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("tokenizer unavailable: {0}")]
    Tokenizer(#[from] TokenizerError),
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("server error: {0}")]
    Serve(#[source] io::Error),
    /// Connecting to, sending to, or reading from the upstream failed.
    #[error("upstream request failed: {0}")]
    Upstream(#[source] reqwest::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = if status == StatusCode::BAD_GATEWAY {
            tracing::error!(error = %self, "Upstream request failed");
            BAD_GATEWAY_DETAIL
        } else {
            tracing::error!(error = %self, "Unexpected proxy error");
            INTERNAL_ERROR_DETAIL
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

//! HTTP surface of the shrinkwrap proxy.
//!
//! Every request except `GET /health` is relayed to the configured upstream.
//! `POST .../chat/completions` bodies pass through the compression rewriter
//! first when compression is enabled; everything else is byte-for-byte.
//!
//! ```text
//! client ──▶ router ──┬─▶ /health
//!                     └─▶ forward ──▶ rewrite (chat only) ──▶ upstream
//!                                 ◀── buffered or SSE relay ◀──┘
//! ```

mod error;
mod forward;
mod traffic;

use std::future::Future;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, State};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;

use shrinkwrap_config::ProxyConfig;

pub use error::{BAD_GATEWAY_DETAIL, INTERNAL_ERROR_DETAIL, ProxyError};
pub use forward::{
    CHAT_COMPLETIONS_SUFFIX, ProxyState, carries_body, filter_headers, is_chat_completions,
    is_event_stream,
};
pub use traffic::{LOGGED_STREAM_CHUNKS, MAX_LOGGED_BODY_BYTES, TRAFFIC_TARGET};

/// Build the router around shared state.
pub fn router(state: Arc<ProxyState>) -> Router {
    let body_limit = state.config().server.max_body_bytes;
    Router::new()
        .route("/health", get(health).fallback(forward::forward))
        .fallback(forward::forward)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

async fn health(State(state): State<Arc<ProxyState>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "proxy_target": state.config().upstream.base_url,
    }))
}

/// Bind the configured address and serve until `shutdown` resolves.
pub async fn serve(
    config: ProxyConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ProxyError> {
    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ProxyError::Bind { addr, source })?;
    serve_on(listener, config, shutdown).await
}

/// Serve on an already-bound listener.
pub async fn serve_on(
    listener: TcpListener,
    config: ProxyConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ProxyError> {
    let state = Arc::new(ProxyState::new(config)?);
    log_startup(&listener, state.config());

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(ProxyError::Serve)
}

fn log_startup(listener: &TcpListener, config: &ProxyConfig) {
    match listener.local_addr() {
        Ok(addr) => tracing::info!(%addr, "Proxy listening"),
        Err(e) => tracing::warn!(error = %e, "Proxy listening on unknown address"),
    }
    tracing::info!(upstream = %config.upstream.base_url, "Forwarding requests upstream");

    let compression = &config.compression;
    if compression.enabled() {
        let retention = compression.retention;
        tracing::info!(
            fraction = retention.fraction(),
            encoding = %compression.encoding,
            "Compression enabled with fraction {:.2} (removes ~{:.0}% of tokens)",
            retention.fraction(),
            retention.removed_percent()
        );
    } else {
        tracing::info!("Compression disabled");
    }
    if config.logging.traffic {
        tracing::info!(target: TRAFFIC_TARGET, "Traffic logging enabled");
    }
}

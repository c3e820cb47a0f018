//! shrinkwrap - binary entry point.
//!
//! ```text
//! main() -> Cli::parse() ─┬─ serve   -> ProxyConfig::load() -> init_tracing() -> proxy::serve()
//!                         └─ preview -> read prompt -> compress per level -> stdout
//! ```
//!
//! Configuration is resolved once, before the listener is bound; any
//! validation error aborts startup.

mod preview;

use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use shrinkwrap_config::ProxyConfig;

use crate::preview::PreviewArgs;

/// Reverse proxy that compresses chat-completion prompts before forwarding
/// them upstream.
#[derive(Debug, Parser)]
#[command(name = "shrinkwrap", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the proxy (default).
    Serve,
    /// Print a prompt compressed at one or more retention levels.
    Preview(PreviewArgs),
}

fn init_tracing(default_directive: &str, log_file: Option<&Path>) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let mut warnings = Vec::new();
    let file_layer = log_file.and_then(|path| match open_log_file(path) {
        Ok(file) => Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file))),
        Err(e) => {
            warnings.push(format!("Failed to open log file {}: {e}", path.display()));
            None
        }
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .init();

    if let Some(path) = log_file.filter(|_| warnings.is_empty()) {
        tracing::info!(path = %path.display(), "Logging to file");
    }
    for warning in warnings {
        tracing::warn!("{warning}");
    }
}

fn open_log_file(path: &Path) -> io::Result<fs::File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for ctrl-c, running until killed");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

async fn serve() -> Result<()> {
    let config = ProxyConfig::load().context("invalid configuration")?;
    init_tracing("info", config.logging.file.as_deref());

    shrinkwrap_proxy::serve(config, shutdown_signal()).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve().await,
        Command::Preview(args) => {
            init_tracing("warn", None);
            preview::run(args)
        }
    }
}

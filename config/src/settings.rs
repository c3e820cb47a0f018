//! Raw file config and the resolved settings built from it.
//!
//! Raw TOML structs (all `Option`) stay private to this module. Resolution
//! applies environment overrides, validates every value, and produces a
//! [`ProxyConfig`] that the rest of the program treats as immutable.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use shrinkwrap_compress::{Encoding, SeedSource};
use shrinkwrap_types::Retention;

use crate::ConfigError;
use crate::env::{EnvSource, expand_env_vars};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_UPSTREAM_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct FileConfig {
    server: Option<RawServer>,
    upstream: Option<RawUpstream>,
    compression: Option<RawCompression>,
    logging: Option<RawLogging>,
}

#[derive(Debug, Default, Deserialize)]
struct RawServer {
    host: Option<String>,
    port: Option<u16>,
    max_body_bytes: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct RawUpstream {
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCompression {
    tokens_to_keep: Option<f64>,
    compression_ratio: Option<f64>,
    encoding: Option<String>,
    seed: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLogging {
    #[serde(default)]
    traffic: bool,
    file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamSettings {
    /// Base URL without a trailing slash, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressionSettings {
    pub retention: Retention,
    pub encoding: Encoding,
    pub seed: SeedSource,
}

impl CompressionSettings {
    #[must_use]
    pub fn enabled(&self) -> bool {
        !self.retention.is_full()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Emit request/response audit events.
    pub traffic: bool,
    /// Append logs to this file in addition to stderr.
    pub file: Option<PathBuf>,
}

/// Fully resolved proxy configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyConfig {
    pub server: ServerSettings,
    pub upstream: UpstreamSettings,
    pub compression: CompressionSettings,
    pub logging: LoggingSettings,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: DEFAULT_HOST.to_string(),
                port: DEFAULT_PORT,
                max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            },
            upstream: UpstreamSettings {
                base_url: DEFAULT_UPSTREAM_BASE_URL.to_string(),
                timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
            },
            compression: CompressionSettings {
                retention: Retention::FULL,
                encoding: Encoding::default(),
                seed: SeedSource::Entropy,
            },
            logging: LoggingSettings::default(),
        }
    }
}

impl ProxyConfig {
    /// `host:port` for the listener.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub(crate) fn resolve(file: FileConfig, env: &impl EnvSource) -> Result<Self, ConfigError> {
        let server = file.server.unwrap_or_default();
        let upstream = file.upstream.unwrap_or_default();
        let compression = file.compression.unwrap_or_default();
        let logging = file.logging.unwrap_or_default();

        let host = env_string(env, "HOST")
            .or_else(|| server.host.map(|h| expand_env_vars(&h, env)))
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = parse_env(env, "PORT")?
            .or(server.port)
            .unwrap_or(DEFAULT_PORT);
        let max_body_bytes = server.max_body_bytes.unwrap_or(DEFAULT_MAX_BODY_BYTES);

        let base_url = env_string(env, "UPSTREAM_BASE_URL")
            .or_else(|| upstream.base_url.map(|u| expand_env_vars(&u, env)))
            .unwrap_or_else(|| DEFAULT_UPSTREAM_BASE_URL.to_string());
        let base_url = validate_base_url(&base_url)?;
        let timeout = Duration::from_secs(
            upstream
                .timeout_secs
                .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_SECS),
        );

        let fraction = parse_env::<f64>(env, "TOKENS_TO_KEEP_RATIO")?.or(compression.tokens_to_keep);
        let ratio = parse_env::<f64>(env, "COMPRESSION_RATIO")?.or(compression.compression_ratio);
        let retention = resolve_retention(fraction, ratio)?;

        let encoding = match env_string(env, "SHRINKWRAP_ENCODING").or(compression.encoding) {
            Some(raw) => Encoding::parse(&raw).ok_or(ConfigError::UnknownEncoding(raw))?,
            None => Encoding::default(),
        };
        let seed = parse_env(env, "SHRINKWRAP_SEED")?
            .or(compression.seed)
            .map_or(SeedSource::Entropy, SeedSource::Fixed);

        let traffic = match env_string(env, "SHRINKWRAP_LOG_TRAFFIC") {
            Some(raw) => parse_flag("SHRINKWRAP_LOG_TRAFFIC", &raw)?,
            None => logging.traffic,
        };
        let log_file = env_string(env, "SHRINKWRAP_LOG_FILE")
            .or_else(|| logging.file.map(|f| expand_env_vars(&f, env)))
            .filter(|f| !f.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            server: ServerSettings {
                host,
                port,
                max_body_bytes,
            },
            upstream: UpstreamSettings { base_url, timeout },
            compression: CompressionSettings {
                retention,
                encoding,
                seed,
            },
            logging: LoggingSettings {
                traffic,
                file: log_file,
            },
        })
    }
}

/// A keep fraction, when present, takes precedence over a legacy ratio.
fn resolve_retention(fraction: Option<f64>, ratio: Option<f64>) -> Result<Retention, ConfigError> {
    match (fraction, ratio) {
        (Some(fraction), _) => {
            Retention::from_fraction(fraction).map_err(|source| ConfigError::Retention {
                key: "tokens_to_keep",
                source,
            })
        }
        (None, Some(ratio)) => {
            Retention::from_ratio(ratio).map_err(|source| ConfigError::Retention {
                key: "compression_ratio",
                source,
            })
        }
        (None, None) => Ok(Retention::FULL),
    }
}

/// An environment value, treating blank as unset.
fn env_string(env: &impl EnvSource, key: &str) -> Option<String> {
    env.var(key).filter(|value| !value.trim().is_empty())
}

fn parse_env<T: FromStr>(env: &impl EnvSource, key: &'static str) -> Result<Option<T>, ConfigError> {
    let Some(raw) = env_string(env, key) else {
        return Ok(None);
    };
    raw.trim()
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::InvalidValue { key, value: raw })
}

fn parse_flag(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
        }),
    }
}

fn validate_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let has_host = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .is_some_and(|rest| !rest.is_empty());
    if has_host {
        Ok(trimmed.to_string())
    } else {
        Err(ConfigError::InvalidBaseUrl(raw.to_string()))
    }
}

//! Configuration for the shrinkwrap proxy.
//!
//! Values come from an optional TOML file, overridden by environment
//! variables:
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8000
//!
//! [upstream]
//! base_url = "https://api.openai.com/v1"
//! timeout_secs = 300
//!
//! [compression]
//! tokens_to_keep = 0.5      # or compression_ratio = 2.0
//! encoding = "cl100k_base"
//! seed = 1234               # omit for a fresh random sample per message
//!
//! [logging]
//! traffic = false
//! file = "${HOME}/.shrinkwrap/proxy.log"
//! ```

mod env;
mod settings;

use std::path::{Path, PathBuf};

use thiserror::Error;

use shrinkwrap_types::RetentionError;

pub use env::{EnvSource, ProcessEnv, expand_env_vars};
use settings::FileConfig;
pub use settings::{
    CompressionSettings, DEFAULT_HOST, DEFAULT_MAX_BODY_BYTES, DEFAULT_PORT,
    DEFAULT_UPSTREAM_BASE_URL, DEFAULT_UPSTREAM_TIMEOUT_SECS, LoggingSettings, ProxyConfig,
    ServerSettings, UpstreamSettings,
};

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "SHRINKWRAP_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
    #[error("invalid {key}: {source}")]
    Retention {
        key: &'static str,
        #[source]
        source: RetentionError,
    },
    #[error("unknown tokenizer encoding {0:?} (expected cl100k_base or o200k_base)")]
    UnknownEncoding(String),
    #[error("upstream base URL must start with http:// or https://, got {0:?}")]
    InvalidBaseUrl(String),
}

/// Where to look for the config file, and whether it was named explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigPath {
    Explicit(PathBuf),
    Default(PathBuf),
}

impl ConfigPath {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            ConfigPath::Explicit(path) | ConfigPath::Default(path) => path,
        }
    }
}

/// `$SHRINKWRAP_CONFIG`, else `~/.shrinkwrap/config.toml`.
#[must_use]
pub fn config_path(env: &impl EnvSource) -> Option<ConfigPath> {
    if let Some(explicit) = env.var(CONFIG_PATH_ENV).filter(|p| !p.trim().is_empty()) {
        return Some(ConfigPath::Explicit(PathBuf::from(explicit)));
    }
    dirs::home_dir().map(|home| ConfigPath::Default(home.join(".shrinkwrap").join("config.toml")))
}

impl ProxyConfig {
    /// Load from the default locations and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let env = ProcessEnv;
        Self::load_from(config_path(&env).as_ref(), &env)
    }

    /// Load from `path` (if any), applying overrides from `env`.
    ///
    /// A missing default file is not an error; a missing explicit one is.
    pub fn load_from(path: Option<&ConfigPath>, env: &impl EnvSource) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => read_file(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(file, env)
    }
}

fn read_file(path: &ConfigPath) -> Result<FileConfig, ConfigError> {
    let location = path.path();
    let content = match std::fs::read_to_string(location) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && matches!(path, ConfigPath::Default(_)) => {
            tracing::debug!(path = %location.display(), "No config file, using defaults");
            return Ok(FileConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: location.to_path_buf(),
                source,
            });
        }
    };
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: location.to_path_buf(),
        source,
    })
}

//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! API keys come from the STABILITY_KEYS env var (comma-separated) or a
//! keys_file, never from the TOML directly to avoid leaking secrets.

use keypool::ApiKey;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration and startup errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("no API keys found — set STABILITY_KEYS or upstream.keys_file")]
    NoKeys,
}

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub artifacts: ArtifactConfig,
    /// Resolved at load time from STABILITY_KEYS or keys_file.
    #[serde(skip)]
    pub keys: Vec<ApiKey>,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Stability API settings
#[derive(Debug, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Path to a file with one API key per line (alternative to STABILITY_KEYS)
    #[serde(default)]
    pub keys_file: Option<PathBuf>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            model: default_model(),
            timeout_secs: default_timeout(),
            keys_file: None,
        }
    }
}

/// Where generated images land
#[derive(Debug, Deserialize)]
pub struct ArtifactConfig {
    #[serde(default = "default_artifact_dir")]
    pub dir: PathBuf,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            dir: default_artifact_dir(),
        }
    }
}

fn default_url() -> String {
    "https://api.stability.ai/v2beta/stable-image/generate/sd3".to_string()
}

fn default_model() -> String {
    "sd3.5-flash".to_string()
}

fn default_timeout() -> u64 {
    60
}

fn default_max_connections() -> usize {
    1000
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("static")
}

impl Config {
    /// Load configuration from a TOML file, then resolve API keys.
    ///
    /// Key resolution order:
    /// 1. STABILITY_KEYS env var (comma-separated, entries trimmed)
    /// 2. keys_file path from config (one key per line)
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Config = toml::from_str(&contents)?;

        if !config.upstream.url.starts_with("http://")
            && !config.upstream.url.starts_with("https://")
        {
            return Err(ConfigError::Invalid(format!(
                "upstream.url must start with http:// or https://, got: {}",
                config.upstream.url
            )));
        }

        if config.upstream.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "upstream.timeout_secs must be greater than 0".into(),
            ));
        }

        if config.server.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "server.max_connections must be greater than 0".into(),
            ));
        }

        config.keys = resolve_keys(config.upstream.keys_file.as_deref())?;
        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("stability-art-proxy.toml")
    }
}

/// Parse keys from the environment or a file. Empty entries are dropped;
/// an empty final list is a startup error.
fn resolve_keys(keys_file: Option<&Path>) -> Result<Vec<ApiKey>, ConfigError> {
    let raw = match std::env::var("STABILITY_KEYS") {
        Ok(value) => value,
        Err(_) => match keys_file {
            Some(file) => std::fs::read_to_string(file).map_err(|source| ConfigError::Read {
                path: file.to_path_buf(),
                source,
            })?,
            None => return Err(ConfigError::NoKeys),
        },
    };

    let keys: Vec<ApiKey> = raw
        .split([',', '\n'])
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(ApiKey::new)
        .collect();

    if keys.is_empty() {
        return Err(ConfigError::NoKeys);
    }
    Ok(keys)
}

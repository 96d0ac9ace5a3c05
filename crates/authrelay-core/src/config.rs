use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial call.
    pub max_attempts: u32,
    /// Delay in seconds before the first retry (e.g. 1.0 = 1s).
    pub base_delay_secs: f64,
    /// Growth factor applied to the delay after each retry.
    pub multiplier: f64,
    /// Maximum single backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 1.0,
            multiplier: 1.5,
            max_delay_secs: 30,
        }
    }
}

/// Client configuration loaded from `~/.config/authrelay/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the REST backend; request paths are joined onto it.
    pub base_url: String,
    /// Path of the session refresh endpoint (POST).
    pub refresh_path: String,
    /// Deadline for one refresh call; expiry counts as a network failure.
    pub refresh_timeout_secs: u64,
    /// Connect timeout for every transport request.
    pub connect_timeout_secs: u64,
    /// Whole-request timeout for every transport request.
    pub request_timeout_secs: u64,
    /// Body marker that identifies a 403 caused by missing admin scope.
    pub admin_scope_marker: String,
    /// Navigation paths that count as admin-restricted areas.
    #[serde(default)]
    pub admin_path_prefixes: Vec<String>,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080/".to_string(),
            refresh_path: "auth/refresh".to_string(),
            refresh_timeout_secs: 10,
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
            admin_scope_marker: crate::classify::DEFAULT_ADMIN_SCOPE_MARKER.to_string(),
            admin_path_prefixes: vec!["/admin".to_string()],
            retry: None,
        }
    }
}

impl ClientConfig {
    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_secs.max(1))
    }

    /// Retry section, or the built-in defaults.
    pub fn retry_or_default(&self) -> RetryConfig {
        self.retry.clone().unwrap_or_default()
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("authrelay")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<ClientConfig> {
    load_or_init_at(&config_path()?)
}

/// Like [`load_or_init`] but at an explicit path.
pub fn load_or_init_at(path: &Path) -> Result<ClientConfig> {
    if !path.exists() {
        let default_cfg = ClientConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml).with_context(|| format!("write {}", path.display()))?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ClientConfig =
        toml::from_str(&data).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}

// src/config.rs

//! Engine settings: built-in defaults, then an optional TOML file, then
//! `VANGUARD_*` environment overrides.

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::logging::{get_config_dir, get_data_dir};

lazy_static! {
    pub static ref CONFIG_FILE: String = "config.toml".to_string();
    static ref ENV_FETCH_TIMEOUT: String = "VANGUARD_FETCH_TIMEOUT_SECS".to_string();
    static ref ENV_MAX_REDIRECTS: String = "VANGUARD_MAX_REDIRECTS".to_string();
    static ref ENV_TRANSPORT_TIMEOUT: String = "VANGUARD_TRANSPORT_TIMEOUT_SECS".to_string();
    static ref ENV_ARTIFACT_MAX_BYTES: String = "VANGUARD_ARTIFACT_MAX_BYTES".to_string();
    static ref ENV_DATA_DIR: String = "VANGUARD_DATA_DIR".to_string();
}

/// Name of the JSON snapshot holding owners and scans inside `data_dir`.
pub const STORE_FILE: &str = "scans.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Hard limit on the header fetch, redirects included.
    pub fetch_timeout_secs: u64,
    pub max_redirects: usize,
    pub user_agent: String,
    /// Hard limit on each TLS connection the transport checker opens.
    pub transport_timeout_secs: u64,
    pub certificate_expiry_warning_days: i64,
    pub artifact_max_bytes: usize,
    pub artifact_content_type: String,
    pub data_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 10,
            max_redirects: 5,
            user_agent: format!("VanguardRS/{}", env!("CARGO_PKG_VERSION")),
            transport_timeout_secs: 10,
            certificate_expiry_warning_days: 30,
            artifact_max_bytes: 10 * 1024 * 1024,
            artifact_content_type: "application/pdf".to_string(),
            data_dir: get_data_dir(),
        }
    }
}

impl EngineConfig {
    /// Loads the configuration from `path`, or from the per-user config
    /// directory when no path is given. A missing default file is not an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = get_config_dir().join(CONFIG_FILE.as_str());
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    debug!(path = %default_path.display(), "No config file, using defaults.");
                    Self::default()
                }
            }
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        info!(data_dir = %config.data_dir.display(), "Configuration loaded.");
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Applies environment overrides. `lookup` is injected so tests do not
    /// have to touch the process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(&ENV_FETCH_TIMEOUT) {
            self.fetch_timeout_secs = parse_env(&ENV_FETCH_TIMEOUT, &v)?;
        }
        if let Some(v) = lookup(&ENV_MAX_REDIRECTS) {
            self.max_redirects = parse_env(&ENV_MAX_REDIRECTS, &v)?;
        }
        if let Some(v) = lookup(&ENV_TRANSPORT_TIMEOUT) {
            self.transport_timeout_secs = parse_env(&ENV_TRANSPORT_TIMEOUT, &v)?;
        }
        if let Some(v) = lookup(&ENV_ARTIFACT_MAX_BYTES) {
            self.artifact_max_bytes = parse_env(&ENV_ARTIFACT_MAX_BYTES, &v)?;
        }
        if let Some(v) = lookup(&ENV_DATA_DIR) {
            if v.trim().is_empty() {
                return Err(ConfigError::Env { var: ENV_DATA_DIR.clone(), value: v });
            }
            self.data_dir = PathBuf::from(v);
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn transport_timeout(&self) -> Duration {
        Duration::from_secs(self.transport_timeout_secs)
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(STORE_FILE)
    }
}

fn parse_env<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        var: var.to_string(),
        value: value.to_string(),
    })
}

//! Daemon configuration.
//!
//! Read from `$XDG_CONFIG_HOME/fairsight/config.toml` when present. Every
//! field is optional; `FAIRSIGHT_SOCKET` and `FAIRSIGHT_BACKEND_SOCKET`
//! override the socket paths after the file is read.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::lifecycle::LifecycleConfig;

pub const DEFAULT_SOCKET_PATH: &str = "/tmp/fairsight.sock";
pub const DEFAULT_BACKEND_SOCKET: &str = "/tmp/fairsight-backend.sock";

pub const SOCKET_ENV: &str = "FAIRSIGHT_SOCKET";
pub const BACKEND_SOCKET_ENV: &str = "FAIRSIGHT_BACKEND_SOCKET";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    /// Socket UI clients connect to.
    pub socket_path: PathBuf,
    /// Socket of the capture backend.
    pub backend_socket: PathBuf,
    pub discovery_interval_secs: u64,
    pub poll_interval_ms: u64,
    pub backend_timeout_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            backend_socket: PathBuf::from(DEFAULT_BACKEND_SOCKET),
            discovery_interval_secs: 15,
            poll_interval_ms: 2000,
            backend_timeout_ms: 5000,
        }
    }
}

impl DaemonConfig {
    /// Default location of the config file, if a config directory exists.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("fairsight").join("config.toml"))
    }

    /// Loads the config from `path`, or from the default location when
    /// `path` is `None`. A missing default file yields the defaults; a
    /// missing explicit file is an error. Environment overrides are applied
    /// afterwards.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => {
                    debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Applies environment overrides using `lookup` to read variables.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup(SOCKET_ENV).filter(|v| !v.trim().is_empty()) {
            self.socket_path = PathBuf::from(path);
        }
        if let Some(path) = lookup(BACKEND_SOCKET_ENV).filter(|v| !v.trim().is_empty()) {
            self.backend_socket = PathBuf::from(path);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = |field: &'static str, value: u64| {
            if value == 0 {
                Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be greater than zero".to_string(),
                })
            } else {
                Ok(())
            }
        };
        positive("discovery_interval_secs", self.discovery_interval_secs)?;
        positive("poll_interval_ms", self.poll_interval_ms)?;
        positive("backend_timeout_ms", self.backend_timeout_ms)?;

        if self.socket_path == self.backend_socket {
            return Err(ConfigError::InvalidValue {
                field: "socket_path",
                reason: "must differ from backend_socket".to_string(),
            });
        }
        Ok(())
    }

    pub fn lifecycle(&self) -> LifecycleConfig {
        LifecycleConfig {
            discovery_interval: Duration::from_secs(self.discovery_interval_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.backend_timeout_ms)
    }
}

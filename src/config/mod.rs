//! Dashboard service configuration
//!
//! ## Loading Order
//!
//! 1. `RPA_DASHBOARD_CONFIG` environment variable (path to TOML file)
//! 2. `dashboard.toml` in the current working directory
//! 3. Built-in defaults
//!
//! Environment variables then override individual fields, and CLI flags
//! override those (applied by the binary).

pub mod defaults;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use defaults::{
    CONFIG_FILE_NAME, CONFIG_PATH_ENV, DEFAULT_BIND_ADDRESS, DEFAULT_MAX_CONNECTIONS,
    DEFAULT_PBKDF2_ITERATIONS, DEFAULT_SESSION_TTL_SECS, MIN_PBKDF2_ITERATIONS,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid value for {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "pretty" | "text" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Environment value that could not be parsed and was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoredEnv {
    pub var: &'static str,
    pub value: String,
}

/// What happened while loading. Kept until the subscriber is installed,
/// since the log format itself comes from the configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// File the configuration was read from; `None` means defaults
    pub source: Option<PathBuf>,
    pub ignored_env: Vec<IgnoredEnv>,
}

impl LoadReport {
    pub fn log(&self) {
        match &self.source {
            Some(path) => info!(path = %path.display(), "Loaded config file"),
            None => info!("No config file found, using defaults"),
        }
        for ignored in &self.ignored_env {
            warn!(var = ignored.var, value = %ignored.value, "Ignoring invalid environment value");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Address the HTTP server binds to
    pub bind_address: String,
    /// PostgreSQL connection URL; empty means none configured
    pub database_url: String,
    pub max_connections: u32,
    /// Session inactivity timeout in seconds
    pub session_ttl_secs: u64,
    /// Allowed CORS origins; empty means same-origin only
    pub cors_origins: Vec<String>,
    pub log_format: LogFormat,
    /// Offer only robots whose agency has reporting rows
    pub restrict_to_reported_agencies: bool,
    pub pbkdf2_iterations: u32,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            database_url: String::new(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            cors_origins: Vec::new(),
            log_format: LogFormat::Pretty,
            restrict_to_reported_agencies: false,
            pbkdf2_iterations: DEFAULT_PBKDF2_ITERATIONS,
        }
    }
}

impl DashboardConfig {
    /// Load following the documented order, then apply environment overrides.
    /// Nothing is logged here; call [`LoadReport::log`] once tracing is up.
    pub fn load() -> Result<(Self, LoadReport), ConfigError> {
        let path = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Some(PathBuf::from(path)),
            Err(_) => Some(PathBuf::from(CONFIG_FILE_NAME)).filter(|p| p.exists()),
        };
        let mut config = match &path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let ignored_env = config.apply_env(|key| std::env::var(key).ok());
        Ok((
            config,
            LoadReport {
                source: path,
                ignored_env,
            },
        ))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Override fields from environment variables read through `lookup`.
    /// Unparseable values are skipped and returned.
    pub fn apply_env<F>(&mut self, lookup: F) -> Vec<IgnoredEnv>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut ignored = Vec::new();
        if let Some(v) = lookup("DATABASE_URL") {
            self.database_url = v;
        }
        if let Some(v) = lookup("RPA_BIND_ADDRESS") {
            self.bind_address = v;
        }
        if let Some(v) = lookup("RPA_SESSION_TTL_SECS") {
            match v.trim().parse() {
                Ok(n) => self.session_ttl_secs = n,
                Err(_) => ignored.push(IgnoredEnv {
                    var: "RPA_SESSION_TTL_SECS",
                    value: v,
                }),
            }
        }
        if let Some(v) = lookup("RPA_CORS_ORIGINS") {
            self.cors_origins = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = lookup("RPA_LOG_FORMAT") {
            match LogFormat::parse(&v) {
                Some(format) => self.log_format = format,
                None => ignored.push(IgnoredEnv {
                    var: "RPA_LOG_FORMAT",
                    value: v,
                }),
            }
        }
        ignored
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_address.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "bind_address",
                message: "must not be empty".into(),
            });
        }
        if self.session_ttl_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "session_ttl_secs",
                message: "must be greater than 0".into(),
            });
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid {
                field: "max_connections",
                message: "must be greater than 0".into(),
            });
        }
        if self.pbkdf2_iterations < MIN_PBKDF2_ITERATIONS {
            return Err(ConfigError::Invalid {
                field: "pbkdf2_iterations",
                message: format!("must be at least {MIN_PBKDF2_ITERATIONS}"),
            });
        }
        Ok(())
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}

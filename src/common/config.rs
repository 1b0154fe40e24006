//! Configuration file handling
//!
//! Settings come from `chutney.toml` in the working directory, or the
//! platform config directory, and are then overridden by `CHUTNEY_*`
//! environment variables. Configuration is read once per session.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::paths::{config_path, LOCAL_CONFIG_FILE};
use super::{Error, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Discovery and orchestration settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Report and environment locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Remote execution backend settings
    #[serde(default)]
    pub backend: BackendConfig,
}

/// Discovery and orchestration settings
#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    /// Whether steps become directly executable test nodes
    #[serde(default = "default_step_as_test")]
    pub step_as_test: bool,

    /// Number of scenarios allowed to run at once inside one class-scope
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_as_test: default_step_as_test(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_step_as_test() -> bool {
    true
}
fn default_concurrency() -> usize {
    1
}

/// Report and environment locations
#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    /// Root directory for JSON execution reports
    #[serde(default = "default_report_root")]
    pub report_root: PathBuf,

    /// Directory holding `<NAME>.json` environment descriptors
    #[serde(default = "default_environment_root")]
    pub environment_root: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            report_root: default_report_root(),
            environment_root: default_environment_root(),
        }
    }
}

fn default_report_root() -> PathBuf {
    PathBuf::from(".chutney/report")
}
fn default_environment_root() -> PathBuf {
    PathBuf::from(".chutney/environments")
}

/// Remote execution backend settings
#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    /// Base URL of the execution server
    #[serde(default = "default_backend_url")]
    pub url: String,

    /// Timeout for submission and environment requests
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_backend_url() -> String {
    "http://localhost:8443".to_string()
}
fn default_request_timeout() -> u64 {
    30
}

impl Config {
    /// Load configuration from the local or user config file, then apply
    /// environment overrides
    ///
    /// Returns default configuration if no file exists
    pub fn load() -> Result<Self> {
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        let path = if local.exists() {
            Some(local)
        } else {
            config_path().filter(|p| p.exists())
        };

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a configuration file without applying overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| Error::ConfigParse(e.to_string()))
    }

    /// Apply `CHUTNEY_*` overrides read through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("CHUTNEY_STEP_AS_TEST") {
            self.engine.step_as_test = parse_bool(&value).ok_or_else(|| {
                Error::Config(format!("CHUTNEY_STEP_AS_TEST must be a boolean, got '{}'", value))
            })?;
        }
        if let Some(value) = lookup("CHUTNEY_CONCURRENCY") {
            self.engine.concurrency = value.trim().parse().map_err(|_| {
                Error::Config(format!("CHUTNEY_CONCURRENCY must be an integer, got '{}'", value))
            })?;
        }
        if let Some(value) = lookup("CHUTNEY_REPORT_ROOT") {
            self.paths.report_root = PathBuf::from(value);
        }
        if let Some(value) = lookup("CHUTNEY_ENVIRONMENT_ROOT") {
            self.paths.environment_root = PathBuf::from(value);
        }
        if let Some(value) = lookup("CHUTNEY_BACKEND_URL") {
            self.backend.url = value;
        }

        if self.engine.concurrency == 0 {
            return Err(Error::Config(
                "engine.concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

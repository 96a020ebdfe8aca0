//! Configuration management for elastictest
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. Environment variables (ESTEST_<SECTION>__<KEY>, highest precedence)
//! 2. elastictest.local.toml (gitignored, local overrides)
//! 3. elastictest.toml (git-tracked, project config)
//! 4. ~/.config/elastictest/config.toml (user defaults)
//! 5. Built-in defaults (lowest precedence)
//!
//! The server distribution itself is located separately through
//! [`HarnessConfig::install_path`], which falls back to the `ES_PATH`
//! environment variable.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Environment variable consulted when no install path is configured.
pub const DEFAULT_INSTALL_ENV: &str = "ES_PATH";

/// Main harness configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub cluster: ClusterSection,
    pub startup: StartupSection,
    pub distribution: DistributionSection,
}

/// Shape of every cluster the harness builds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSection {
    /// Local address every node binds to.
    pub host: String,
    /// Number of nodes.
    pub size: usize,
    /// Fixed ports, one pair per node. Empty means "let the OS choose".
    pub ports: Vec<PortPair>,
}

impl Default for ClusterSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            size: 1,
            ports: Vec::new(),
        }
    }
}

/// Client port and inter-node transport port of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortPair {
    pub client: u16,
    pub transport: u16,
}

impl PortPair {
    pub fn new(client: u16, transport: u16) -> Self {
        Self { client, transport }
    }
}

impl From<(u16, u16)> for PortPair {
    fn from((client, transport): (u16, u16)) -> Self {
        Self::new(client, transport)
    }
}

/// Readiness polling knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StartupSection {
    pub timeout_secs: u64,
    pub settle_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for StartupSection {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            settle_delay_ms: 2_000,
            poll_interval_ms: 500,
            request_timeout_ms: 2_000,
        }
    }
}

impl StartupSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Where the server distribution lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributionSection {
    /// Explicit install path; wins over the environment variable.
    pub install_path: Option<PathBuf>,
    /// Environment variable to read when `install_path` is unset.
    pub install_env: String,
}

impl Default for DistributionSection {
    fn default() -> Self {
        Self {
            install_path: None,
            install_env: DEFAULT_INSTALL_ENV.to_string(),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from specific project directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Resolve the server distribution directory.
    ///
    /// An explicit `distribution.install_path` wins; otherwise the variable
    /// named by `distribution.install_env` is read. Either way the result
    /// must be an existing directory.
    pub fn install_path(&self) -> Result<PathBuf, ConfigError> {
        let path = match &self.distribution.install_path {
            Some(path) => path.clone(),
            None => match env::var_os(&self.distribution.install_env) {
                Some(value) if !value.is_empty() => PathBuf::from(value),
                _ => {
                    return Err(ConfigError::InstallPathUnset {
                        var: self.distribution.install_env.clone(),
                    });
                }
            },
        };

        if !path.is_dir() {
            return Err(ConfigError::InstallPathInvalid { path });
        }
        Ok(path)
    }

    /// Check cross-field constraints that serde defaults cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cluster.size == 0 {
            return Err(ConfigError::ValidationError(
                "cluster.size must be >= 1".to_string(),
            ));
        }
        if !self.cluster.ports.is_empty() && self.cluster.ports.len() != self.cluster.size {
            return Err(ConfigError::ValidationError(format!(
                "cluster.ports lists {} pairs but cluster.size is {}",
                self.cluster.ports.len(),
                self.cluster.size
            )));
        }
        if self.startup.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "startup.poll_interval_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Render as TOML, in the shape `elastictest.toml` expects.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write this configuration as the project file in `project_dir`.
    pub fn save_project_file(&self, project_dir: impl AsRef<Path>) -> Result<PathBuf> {
        let path = Paths::project_config_file(&project_dir);
        std::fs::write(&path, self.to_toml_string()?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    /// Resolve relative paths to absolute
    pub fn resolve_paths(&mut self, base_dir: impl AsRef<Path>) {
        if let Some(path) = &self.distribution.install_path {
            if path.is_relative() {
                self.distribution.install_path = Some(base_dir.as_ref().join(path));
            }
        }
    }
}

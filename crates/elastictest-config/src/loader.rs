//! Configuration loader with multi-source merging

use crate::{HarnessConfig, Paths};
use anyhow::{Context, Result};
use config::FileFormat;
use std::env;
use std::path::{Path, PathBuf};

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
    include_user_config: bool,
}

impl ConfigLoader {
    /// Create a new config loader with default project directory (current dir)
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "ESTEST".to_string(),
            include_user_config: true,
        }
    }

    /// Set the project directory
    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the environment variable prefix (default: "ESTEST")
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Skip ~/.config/elastictest/config.toml
    pub fn without_user_config(mut self) -> Self {
        self.include_user_config = false;
        self
    }

    /// Merges defaults, the TOML files from [`ConfigLoader::config_files`]
    /// and prefixed environment variables, later sources winning.
    /// Relative paths are resolved against the project directory.
    pub fn load(self) -> Result<HarnessConfig> {
        let defaults = config::Config::try_from(&HarnessConfig::default())
            .context("Failed to encode built-in defaults")?;

        let builder = self
            .config_files()
            .into_iter()
            .fold(config::Config::builder().add_source(defaults), |builder, file| {
                builder.add_source(config::File::from(file).format(FileFormat::Toml))
            })
            .add_source(self.environment());

        let mut harness_config: HarnessConfig = builder
            .build()
            .and_then(|merged| merged.try_deserialize())
            .context("Failed to read elastictest configuration")?;

        harness_config.resolve_paths(&self.project_dir);
        harness_config
            .validate()
            .context("Invalid elastictest configuration")?;
        Ok(harness_config)
    }

    /// Config files that exist, lowest precedence first: user, project, then
    /// the gitignored local override.
    pub fn config_files(&self) -> Vec<PathBuf> {
        let user = self
            .include_user_config
            .then(|| Paths::new().user_config_file().ok())
            .flatten();

        user.into_iter()
            .chain([
                Paths::project_config_file(&self.project_dir),
                Paths::local_config_file(&self.project_dir),
            ])
            .filter(|file| file.is_file())
            .collect()
    }

    /// `ESTEST_STARTUP__TIMEOUT_SECS=60` sets `startup.timeout_secs`.
    fn environment(&self) -> config::Environment {
        config::Environment::with_prefix(&self.env_prefix)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} environment variable must point to a server distribution directory")]
    InstallPathUnset { var: String },

    #[error("install path {} is not a directory", path.display())]
    InstallPathInvalid { path: PathBuf },

    #[error("install path {} is not a server distribution, missing: {}", path.display(), missing.join(", "))]
    InstallPathIncomplete { path: PathBuf, missing: Vec<String> },

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("XDG directory error: {0}")]
    XdgError(String),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

//! Error types for cluster management.

use elastictest_client::ClientError;
use elastictest_config::ConfigError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Cluster management errors.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Filesystem error with the path that caused it.
    #[error("failed to {action} {}: {source}", path.display())]
    Fs {
        action: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Install path missing or invalid.
    #[error(transparent)]
    InstallPath(#[from] ConfigError),

    /// Invalid node count.
    #[error("Invalid node count: {0} (must be >= 1)")]
    InvalidNodeCount(usize),

    /// Explicit port pairs do not match the cluster size.
    #[error("The specified ports didn't match the size: {actual} pairs for {expected} nodes")]
    PortCountMismatch { expected: usize, actual: usize },

    /// No free port could be found.
    #[error("Failed to allocate a free port on {host}: {reason}")]
    Allocation { host: String, reason: String },

    /// Process spawn error.
    #[error("Failed to spawn node {node}: {source}")]
    Spawn {
        node: String,
        source: std::io::Error,
    },

    /// Node already running.
    #[error("Node {0} is already running")]
    NodeAlreadyRunning(String),

    /// Node not found.
    #[error("Node {0} not found")]
    NodeNotFound(usize),

    /// Node exited while the cluster was coming up.
    #[error("Node {node} failed to start: {detail}")]
    NodeStartFailed { node: String, detail: String },

    /// Cluster did not become ready in time.
    #[error("Couldn't start cluster {cluster} within {timeout:?}: {last_observation}")]
    StartupTimeout {
        cluster: String,
        timeout: Duration,
        last_observation: String,
    },

    /// Operation needs a started cluster.
    #[error("Cluster {0} is not started")]
    NotStarted(String),

    /// Cluster was terminated and cannot be reused.
    #[error("Cluster {0} has been terminated")]
    Terminated(String),

    /// Request against the cluster failed.
    #[error("Cluster request failed: {0}")]
    Client(#[from] ClientError),

    /// Isolation teardown could not restore the cluster.
    #[error("Failed to {action} during isolation teardown: {source}")]
    Isolation {
        action: String,
        source: ClientError,
    },
}

impl Error {
    pub(crate) fn fs(action: &'static str, path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Fs {
            action,
            path,
            source,
        }
    }
}

/// Result type for cluster operations.
pub type Result<T> = std::result::Result<T, Error>;

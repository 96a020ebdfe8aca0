//! Cluster settings and the server distribution they point at.

use crate::{Error, PortPair, Result};
use elastictest_config::{ConfigError, ConfigLoader, HarnessConfig, StartupSection};
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// An unpacked server distribution (`bin/`, `lib/`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Distribution {
    install_path: PathBuf,
}

impl Distribution {
    /// Launcher executable inside `bin/`.
    pub const EXECUTABLE: &'static str = "elasticsearch";

    /// Environment script the launcher sources, inside `bin/`.
    pub const INCLUDE_SCRIPT: &'static str = "elasticsearch.in.sh";

    /// Uses the distribution at `install_path`.
    ///
    /// The directory must hold the launcher and include script under
    /// `bin/` and a `lib/` directory; anything less is rejected here rather
    /// than when the first node starts.
    pub fn new(install_path: impl Into<PathBuf>) -> Result<Self> {
        let install_path = install_path.into();
        if !install_path.is_dir() {
            return Err(ConfigError::InstallPathInvalid { path: install_path }.into());
        }

        let distribution = Self { install_path };
        let missing = distribution.missing_entries();
        if !missing.is_empty() {
            return Err(ConfigError::InstallPathIncomplete {
                path: distribution.install_path,
                missing,
            }
            .into());
        }
        Ok(distribution)
    }

    /// Uses the distribution named by the `ES_PATH` environment variable.
    pub fn from_env() -> Result<Self> {
        Self::new(HarnessConfig::default().install_path()?)
    }

    fn missing_entries(&self) -> Vec<String> {
        let bin = self.bin_dir();
        let mut missing = Vec::new();
        for script in [Self::EXECUTABLE, Self::INCLUDE_SCRIPT] {
            if !bin.join(script).is_file() {
                missing.push(format!("bin/{script}"));
            }
        }
        if !self.lib_dir().is_dir() {
            missing.push("lib/".to_string());
        }
        missing
    }

    pub fn install_path(&self) -> &Path {
        &self.install_path
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.install_path.join("bin")
    }

    pub fn lib_dir(&self) -> PathBuf {
        self.install_path.join("lib")
    }

    /// Class path that puts this distribution's jars ahead of anything the
    /// caller's environment already lists.
    pub fn classpath(&self) -> OsString {
        let lib = self.lib_dir();
        let lib = lib.display();
        let mut classpath = OsString::from(format!(
            "{lib}/elasticsearch-*:{lib}/*:{lib}/sigar/*"
        ));
        if let Some(existing) = env::var_os("ES_CLASSPATH") {
            if !existing.is_empty() {
                classpath.push(":");
                classpath.push(existing);
            }
        }
        classpath
    }
}

/// How long and how often to poll a starting cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartupPolicy {
    /// Overall readiness budget, counted after the settle delay.
    pub timeout: Duration,
    /// Pause before the first health poll.
    pub settle_delay: Duration,
    /// Fixed pause between polls.
    pub poll_interval: Duration,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
}

impl Default for StartupPolicy {
    fn default() -> Self {
        Self::from(&StartupSection::default())
    }
}

impl From<&StartupSection> for StartupPolicy {
    fn from(section: &StartupSection) -> Self {
        Self {
            timeout: section.timeout(),
            settle_delay: section.settle_delay(),
            poll_interval: section.poll_interval(),
            request_timeout: section.request_timeout(),
        }
    }
}

/// Everything needed to build a [`crate::Cluster`].
#[derive(Debug, Clone)]
pub struct ClusterSettings {
    pub distribution: Distribution,
    pub host: String,
    pub size: usize,
    /// Fixed port pairs; `None` lets the OS choose.
    pub ports: Option<Vec<PortPair>>,
    pub startup: StartupPolicy,
}

impl ClusterSettings {
    /// A single-node cluster on 127.0.0.1 with OS-chosen ports.
    pub fn new(distribution: Distribution) -> Self {
        Self {
            distribution,
            host: "127.0.0.1".to_string(),
            size: 1,
            ports: None,
            startup: StartupPolicy::default(),
        }
    }

    /// Loads `elastictest.toml` / `ESTEST_*` settings and resolves the
    /// distribution from them.
    pub fn from_env() -> Result<Self> {
        let config = ConfigLoader::new()
            .load()
            .map_err(|e| Error::Config(format!("{e:#}")))?;
        Self::from_config(&config)
    }

    pub fn from_config(config: &HarnessConfig) -> Result<Self> {
        let distribution = Distribution::new(config.install_path()?)?;
        let ports = (!config.cluster.ports.is_empty()).then(|| config.cluster.ports.clone());

        Ok(Self {
            distribution,
            host: config.cluster.host.clone(),
            size: config.cluster.size,
            ports,
            startup: StartupPolicy::from(&config.startup),
        })
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_ports<I, P>(mut self, ports: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PortPair>,
    {
        self.ports = Some(ports.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_startup(mut self, startup: StartupPolicy) -> Self {
        self.startup = startup;
        self
    }
}

/// Writes a minimal distribution under `root/dist` whose launcher is the
/// shell script `launcher`.
#[cfg(test)]
pub(crate) fn fake_install(root: &Path, launcher: &str) -> PathBuf {
    use std::fs;

    let install = root.join("dist");
    fs::create_dir_all(install.join("bin")).unwrap();
    fs::create_dir_all(install.join("lib")).unwrap();

    let executable = install.join("bin").join(Distribution::EXECUTABLE);
    fs::write(&executable, launcher).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&executable, fs::Permissions::from_mode(0o755)).unwrap();
    }
    fs::write(install.join("bin").join(Distribution::INCLUDE_SCRIPT), "# include\n").unwrap();
    install
}

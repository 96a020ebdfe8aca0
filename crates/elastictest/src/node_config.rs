//! Per-node working directories and server configuration files.
//!
//! Each node gets its own directory under the cluster's working root:
//!
//! ```text
//! <root>/<cluster>_<ordinal>/
//! ├── bin/      launcher + include script copied from the distribution
//! ├── config/   elasticsearch.yml, logging.yml
//! ├── data/
//! └── logs/     server logs and the captured stderr of the process
//! ```

use crate::{Distribution, Error, PortPair, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Static logging configuration, identical for every node. The server
/// expands `${path.logs}` and `${cluster.name}` itself.
const LOGGING_CONFIG: &str = r#"rootLogger: INFO, console, file

logger:
  action: DEBUG

appender:
  console:
    type: console
    layout:
      type: consolePattern
      conversionPattern: "[%d{ISO8601}][%-5p][%-25c] %m%n"

  file:
    type: dailyRollingFile
    file: ${path.logs}/${cluster.name}.log
    datePattern: "'.'yyyy-MM-dd"
    layout:
      type: pattern
      conversionPattern: "[%d{ISO8601}][%-5p][%-25c] %m%n"
"#;

/// Identity, addresses and peers of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Name shared by every node of the cluster.
    pub cluster_name: String,

    /// Position of this node in the cluster (0-indexed).
    pub ordinal: usize,

    /// Address to bind to.
    pub host: String,

    /// Client and transport ports.
    pub ports: PortPair,

    /// Working directory of this node.
    pub working_dir: PathBuf,

    /// Transport addresses of every cluster member, this node included.
    pub peers: Vec<String>,
}

impl NodeConfig {
    /// Node name: `<cluster>_<ordinal>`.
    pub fn node_name(&self) -> String {
        format!("{}_{}", self.cluster_name, self.ordinal)
    }

    /// Client-facing URL.
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.ports.client)
    }

    /// Inter-node transport address.
    pub fn transport_address(&self) -> String {
        format!("{}:{}", self.host, self.ports.transport)
    }
}

/// Paths inside one node's working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeLayout {
    pub root: PathBuf,
    pub bin_dir: PathBuf,
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl NodeLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            bin_dir: root.join("bin"),
            config_dir: root.join("config"),
            data_dir: root.join("data"),
            log_dir: root.join("logs"),
            root,
        }
    }

    pub fn executable(&self) -> PathBuf {
        self.bin_dir.join(Distribution::EXECUTABLE)
    }

    pub fn include_script(&self) -> PathBuf {
        self.bin_dir.join(Distribution::INCLUDE_SCRIPT)
    }

    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("elasticsearch.yml")
    }

    pub fn logging_file(&self) -> PathBuf {
        self.config_dir.join("logging.yml")
    }

    /// Where the node process's stderr is redirected.
    pub fn stderr_log(&self) -> PathBuf {
        self.log_dir.join("stderr.log")
    }
}

/// Materializes node directories from a distribution.
#[derive(Debug, Clone, Copy)]
pub struct NodeConfigWriter<'a> {
    distribution: &'a Distribution,
}

impl<'a> NodeConfigWriter<'a> {
    pub fn new(distribution: &'a Distribution) -> Self {
        Self { distribution }
    }

    /// Creates the directory tree, copies the launcher scripts and writes
    /// both configuration files. Starts nothing.
    pub fn write(&self, node: &NodeConfig) -> Result<NodeLayout> {
        let layout = NodeLayout::new(&node.working_dir);

        for dir in [
            &layout.root,
            &layout.bin_dir,
            &layout.config_dir,
            &layout.data_dir,
            &layout.log_dir,
        ] {
            fs::create_dir_all(dir).map_err(Error::fs("create directory", dir))?;
        }

        let source_bin = self.distribution.bin_dir();
        for script in [Distribution::EXECUTABLE, Distribution::INCLUDE_SCRIPT] {
            copy_file(&source_bin.join(script), &layout.bin_dir.join(script))?;
        }

        let settings_file = layout.settings_file();
        fs::write(&settings_file, render_settings(node, &layout))
            .map_err(Error::fs("write", &settings_file))?;

        let logging_file = layout.logging_file();
        fs::write(&logging_file, LOGGING_CONFIG).map_err(Error::fs("write", &logging_file))?;

        Ok(layout)
    }
}

fn copy_file(from: &Path, to: &Path) -> Result<()> {
    // fs::copy keeps the executable bit on unix
    fs::copy(from, to).map_err(Error::fs("copy", from))?;
    Ok(())
}

/// Renders `elasticsearch.yml`.
///
/// Strings and lists are emitted as JSON scalars/arrays, which YAML reads
/// verbatim, so paths with spaces or colons survive.
fn render_settings(node: &NodeConfig, layout: &NodeLayout) -> String {
    let quote = |value: &str| serde_json::Value::from(value).to_string();
    let path = |value: &Path| quote(&value.display().to_string());
    let peers = serde_json::Value::from(node.peers.clone()).to_string();

    let lines = [
        format!("cluster.name: {}", quote(&node.cluster_name)),
        format!("node.name: {}", quote(&node.node_name())),
        "index.number_of_shards: 1".to_string(),
        "index.number_of_replicas: 0".to_string(),
        format!("network.host: {}", quote(&node.host)),
        format!("http.port: {}", node.ports.client),
        format!("transport.tcp.port: {}", node.ports.transport),
        "discovery.zen.ping.multicast.enabled: false".to_string(),
        format!("discovery.zen.ping.unicast.hosts: {peers}"),
        format!("path.conf: {}", path(&layout.config_dir)),
        format!("path.work: {}", path(&layout.root)),
        format!("path.plugins: {}", path(&layout.root)),
        format!("path.data: {}", path(&layout.data_dir)),
        format!("path.logs: {}", path(&layout.log_dir)),
    ];

    let mut rendered = lines.join("\n");
    rendered.push('\n');
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::fake_install;
    use tempfile::TempDir;

    fn fake_distribution(temp: &TempDir) -> Distribution {
        Distribution::new(fake_install(temp.path(), "#!/bin/sh\nexit 0\n")).unwrap()
    }

    fn test_node_config(temp: &TempDir) -> NodeConfig {
        NodeConfig {
            cluster_name: "c0ffee".to_string(),
            ordinal: 1,
            host: "127.0.0.1".to_string(),
            ports: PortPair::new(9201, 9301),
            working_dir: temp.path().join("root").join("c0ffee_1"),
            peers: vec!["127.0.0.1:9300".to_string(), "127.0.0.1:9301".to_string()],
        }
    }

    #[test]
    fn test_node_identity() {
        let temp = TempDir::new().unwrap();
        let node = test_node_config(&temp);

        assert_eq!(node.node_name(), "c0ffee_1");
        assert_eq!(node.url(), "http://127.0.0.1:9201");
        assert_eq!(node.transport_address(), "127.0.0.1:9301");
    }

    #[test]
    fn test_write_creates_tree() {
        let temp = TempDir::new().unwrap();
        let distribution = fake_distribution(&temp);
        let node = test_node_config(&temp);

        let layout = NodeConfigWriter::new(&distribution).write(&node).unwrap();

        assert!(layout.data_dir.is_dir());
        assert!(layout.log_dir.is_dir());
        assert!(layout.executable().is_file());
        assert!(layout.include_script().is_file());
        assert!(layout.settings_file().is_file());
        assert_eq!(
            fs::read_to_string(layout.logging_file()).unwrap(),
            LOGGING_CONFIG
        );
    }

    #[test]
    fn test_settings_bind_identity_ports_and_paths() {
        let temp = TempDir::new().unwrap();
        let distribution = fake_distribution(&temp);
        let node = test_node_config(&temp);

        let layout = NodeConfigWriter::new(&distribution).write(&node).unwrap();
        let settings = fs::read_to_string(layout.settings_file()).unwrap();

        assert!(settings.contains("cluster.name: \"c0ffee\"\n"));
        assert!(settings.contains("node.name: \"c0ffee_1\"\n"));
        assert!(settings.contains("index.number_of_shards: 1\n"));
        assert!(settings.contains("index.number_of_replicas: 0\n"));
        assert!(settings.contains("http.port: 9201\n"));
        assert!(settings.contains("transport.tcp.port: 9301\n"));
        assert!(settings.contains("discovery.zen.ping.multicast.enabled: false\n"));
        assert!(settings.contains(
            "discovery.zen.ping.unicast.hosts: [\"127.0.0.1:9300\",\"127.0.0.1:9301\"]\n"
        ));
        assert!(settings.contains(&format!(
            "path.data: \"{}\"\n",
            layout.data_dir.display()
        )));
        assert!(settings.contains(&format!("path.logs: \"{}\"\n", layout.log_dir.display())));
    }

    #[test]
    fn test_write_is_repeatable() {
        let temp = TempDir::new().unwrap();
        let distribution = fake_distribution(&temp);
        let node = test_node_config(&temp);
        let writer = NodeConfigWriter::new(&distribution);

        let first = writer.write(&node).unwrap();
        let second = writer.write(&node).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_launcher_is_fs_error() {
        let temp = TempDir::new().unwrap();
        let distribution = fake_distribution(&temp);
        let install = distribution.install_path().to_path_buf();
        // Removed after validation, e.g. by a concurrent cleanup
        fs::remove_file(install.join("bin").join("elasticsearch")).unwrap();
        let node = test_node_config(&temp);

        let result = NodeConfigWriter::new(&distribution).write(&node);
        match result {
            Err(Error::Fs { action, path, .. }) => {
                assert_eq!(action, "copy");
                assert_eq!(path, install.join("bin").join("elasticsearch"));
            }
            other => panic!("expected Fs error, got {other:?}"),
        }
    }
}

//! Node process management.

use crate::cluster::ClusterContext;
use crate::node_config::{NodeConfig, NodeConfigWriter, NodeLayout};
use crate::{Error, PortPair, Result};
use std::fs::{self, File};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Lines of captured stderr attached to start failures.
const STDERR_TAIL_LINES: usize = 20;

/// Lifecycle state of a node process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Never started.
    Created,

    /// Writing configuration and spawning.
    Starting,

    /// Process spawned. Not necessarily joined or healthy yet.
    Running,

    /// Termination requested, waiting for exit.
    Stopping,

    /// Process has exited.
    Stopped,
}

/// One supervised server process.
///
/// Holds a shared handle on the cluster-wide settings (name, host,
/// distribution, peers); the node's own directory lives under the
/// cluster's working root and is removed by the cluster, not the node.
pub struct NodeProcess {
    config: NodeConfig,
    context: Arc<ClusterContext>,
    layout: NodeLayout,
    process: Option<Child>,
    exit_status: Option<ExitStatus>,
    state: NodeState,
}

impl NodeProcess {
    /// Creates node `ordinal` of the cluster (not started).
    pub fn new(context: Arc<ClusterContext>, ordinal: usize, ports: PortPair, working_root: &Path) -> Self {
        let config = NodeConfig {
            cluster_name: context.name().to_string(),
            ordinal,
            host: context.host().to_string(),
            ports,
            working_dir: working_root.join(format!("{}_{ordinal}", context.name())),
            peers: context.peers().to_vec(),
        };
        let layout = NodeLayout::new(&config.working_dir);

        Self {
            config,
            context,
            layout,
            process: None,
            exit_status: None,
            state: NodeState::Created,
        }
    }

    /// Writes the node's configuration and spawns the server.
    ///
    /// Returns as soon as the process exists; whether it joins the cluster
    /// is checked by the cluster's readiness poll. Must be called from
    /// within a Tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        if self.is_alive() {
            return Err(Error::NodeAlreadyRunning(self.name()));
        }

        self.state = NodeState::Starting;
        match self.spawn() {
            Ok(child) => {
                info!(
                    node = %self.name(),
                    pid = child.id(),
                    port = self.config.ports.client,
                    transport_port = self.config.ports.transport,
                    "node process spawned"
                );
                self.process = Some(child);
                self.exit_status = None;
                self.state = NodeState::Running;
                Ok(())
            }
            Err(e) => {
                self.state = NodeState::Stopped;
                Err(e)
            }
        }
    }

    fn spawn(&self) -> Result<Child> {
        let layout = NodeConfigWriter::new(self.context.distribution()).write(&self.config)?;

        let stderr_log = layout.stderr_log();
        let stderr = File::create(&stderr_log).map_err(Error::fs("create", &stderr_log))?;

        // ES_INCLUDE and ES_CLASSPATH keep the launcher away from any
        // system-wide installation.
        Command::new(layout.executable())
            .arg("-f")
            .arg(format!("-Des.config={}", layout.settings_file().display()))
            .env("ES_INCLUDE", layout.include_script())
            .env("ES_CLASSPATH", self.context.distribution().classpath())
            .current_dir(&layout.root)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| Error::Spawn {
                node: self.name(),
                source,
            })
    }

    /// Requests graceful termination and waits for the process to exit.
    ///
    /// A no-op when the node was never started or has already stopped.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(mut child) = self.process.take() else {
            if self.state != NodeState::Created {
                self.state = NodeState::Stopped;
            }
            return Ok(());
        };

        self.state = NodeState::Stopping;
        if matches!(child.try_wait(), Ok(None)) {
            request_termination(&mut child, &self.name());
        }

        let result = child.wait().await;
        self.state = NodeState::Stopped;
        match result {
            Ok(status) => {
                info!(node = %self.name(), %status, "node stopped");
                self.exit_status = Some(status);
                Ok(())
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Kills the process without a graceful shutdown and reaps it.
    pub async fn kill(&mut self) -> Result<()> {
        let Some(mut child) = self.process.take() else {
            return Ok(());
        };

        self.state = NodeState::Stopping;
        if let Err(e) = child.kill().await {
            debug!(node = %self.name(), error = %e, "kill on exited process");
        }
        self.exit_status = child.try_wait().ok().flatten();
        self.state = NodeState::Stopped;
        warn!(node = %self.name(), "node killed");
        Ok(())
    }

    /// Checks if the node process is alive.
    pub fn is_alive(&mut self) -> bool {
        let Some(child) = &mut self.process else {
            return false;
        };

        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                self.exit_status = Some(status);
                false
            }
            Err(_) => false,
        }
    }

    /// True between a successful `start()` and `stop()`.
    pub fn is_running(&self) -> bool {
        self.state == NodeState::Running
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn ordinal(&self) -> usize {
        self.config.ordinal
    }

    /// Node name: `<cluster>_<ordinal>`.
    pub fn name(&self) -> String {
        self.config.node_name()
    }

    pub fn ports(&self) -> PortPair {
        self.config.ports
    }

    pub fn url(&self) -> String {
        self.config.url()
    }

    pub fn transport_address(&self) -> String {
        self.config.transport_address()
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(Child::id)
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn layout(&self) -> &NodeLayout {
        &self.layout
    }

    /// Exit status, once the process has been observed to exit.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    /// Last lines the process wrote to stderr.
    pub fn stderr_tail(&self) -> String {
        let content = fs::read_to_string(self.layout.stderr_log()).unwrap_or_default();
        let lines: Vec<&str> = content.lines().collect();
        let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
        lines[start..].join("\n")
    }

    /// Human-readable reason the process is gone, for start failures.
    pub(crate) fn exit_detail(&self) -> String {
        let status = self
            .exit_status
            .map_or_else(|| "exited".to_string(), |status| format!("exited with {status}"));
        let stderr = self.stderr_tail();
        if stderr.is_empty() {
            status
        } else {
            format!("{status}; stderr:\n{stderr}")
        }
    }
}

impl std::fmt::Debug for NodeProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeProcess")
            .field("name", &self.name())
            .field("ports", &self.config.ports)
            .field("pid", &self.pid())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(unix)]
fn request_termination(child: &mut Child, name: &str) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    // ESRCH just means it beat us to it
    if let Err(e) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
        debug!(node = %name, error = %e, "SIGTERM not delivered");
    }
}

#[cfg(not(unix))]
fn request_termination(child: &mut Child, name: &str) {
    if let Err(e) = child.start_kill() {
        debug!(node = %name, error = %e, "terminate not delivered");
    }
}

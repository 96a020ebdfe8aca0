//! A named group of local node processes with one readiness gate.

use crate::{ClusterSettings, Distribution, Error, NodeProcess, PortAllocator, PortPair, Result, StartupPolicy};
use elastictest_client::{Client, Health, HealthQuery, HealthStatus};
use std::ops::{Index, IndexMut};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Settings every node of a cluster shares.
#[derive(Debug)]
pub struct ClusterContext {
    name: String,
    host: String,
    distribution: Distribution,
    peers: Vec<String>,
}

impl ClusterContext {
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        distribution: Distribution,
        peers: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            distribution,
            peers,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn distribution(&self) -> &Distribution {
        &self.distribution
    }

    /// Transport addresses of every node.
    pub fn peers(&self) -> &[String] {
        &self.peers
    }
}

/// Lifecycle of a [`Cluster`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterState {
    /// Ports resolved, nothing running.
    Created,

    /// Every node joined and the cluster reported green.
    Started,

    /// Processes stopped and working root removed. Final.
    Terminated,
}

/// Outcome of one readiness poll.
#[derive(Debug)]
pub enum Readiness {
    /// Green, right name, every node joined.
    Ready,

    /// Worth polling again; carries what was observed.
    NotReady(String),

    /// Polling again cannot help.
    Fatal(Error),
}

impl Readiness {
    /// Compares a health snapshot against the expected identity and size.
    pub fn assess(health: &Health, expected_name: &str, expected_nodes: usize) -> Self {
        if health.cluster_name != expected_name {
            return Self::NotReady(format!(
                "answered by cluster {} instead of {expected_name}",
                health.cluster_name
            ));
        }
        if health.number_of_nodes != expected_nodes {
            return Self::NotReady(format!(
                "{}/{expected_nodes} nodes joined",
                health.number_of_nodes
            ));
        }
        if health.status != HealthStatus::Green {
            return Self::NotReady(format!("status is {}", health.status));
        }
        Self::Ready
    }
}

/// An isolated cluster of `size` local nodes.
///
/// The cluster name is a random token, so concurrently running clusters on
/// one host never discover each other. Every node lives under one temporary
/// working root that [`Cluster::terminate`] deletes.
///
/// Dropping a cluster without terminating it still kills its processes and
/// removes the working root, but does not wait for the processes to exit.
pub struct Cluster {
    context: std::sync::Arc<ClusterContext>,
    size: usize,
    ports: Vec<PortPair>,
    startup: StartupPolicy,
    // Declared before `temp_dir`: children are killed before the root goes.
    nodes: Vec<NodeProcess>,
    client: Option<Client>,
    working_root: PathBuf,
    temp_dir: Option<TempDir>,
    state: ClusterState,
}

impl Cluster {
    /// Resolves ports and creates the working root. Starts nothing.
    pub fn new(settings: ClusterSettings) -> Result<Self> {
        let ClusterSettings {
            distribution,
            host,
            size,
            ports,
            startup,
        } = settings;

        let ports = PortAllocator::new(&host).resolve(size, ports.as_deref())?;
        let name = Uuid::new_v4().simple().to_string();
        let peers = ports
            .iter()
            .map(|pair| format!("{host}:{}", pair.transport))
            .collect();

        let temp_dir = tempfile::Builder::new()
            .prefix("elastictest-")
            .tempdir()
            .map_err(Error::fs("create", std::env::temp_dir()))?;
        let working_root = temp_dir.path().to_path_buf();

        debug!(cluster = %name, size, root = %working_root.display(), "cluster created");

        Ok(Self {
            context: std::sync::Arc::new(ClusterContext::new(name, host, distribution, peers)),
            size,
            ports,
            startup,
            nodes: Vec::with_capacity(size),
            client: None,
            working_root,
            temp_dir: Some(temp_dir),
            state: ClusterState::Created,
        })
    }

    /// Starts every node and waits until the cluster reports itself green
    /// with all `size` members under the expected name.
    ///
    /// On timeout the spawned processes keep running; call
    /// [`Cluster::terminate`] to reclaim them. Starting a started cluster
    /// is a no-op.
    pub async fn start(&mut self, timeout: Duration) -> Result<()> {
        match self.state {
            ClusterState::Terminated => return Err(Error::Terminated(self.name().to_string())),
            ClusterState::Started => return Ok(()),
            ClusterState::Created => {}
        }

        if self.nodes.is_empty() {
            for (ordinal, ports) in self.ports.iter().enumerate() {
                self.nodes.push(NodeProcess::new(
                    std::sync::Arc::clone(&self.context),
                    ordinal,
                    *ports,
                    &self.working_root,
                ));
            }
        }

        for node in &mut self.nodes {
            if !node.is_alive() {
                node.start()?;
            }
        }

        // One retry per node lets a request route around members still booting.
        let client = Client::new(self.urls())
            .with_max_retries(self.size)
            .with_timeout(self.startup.request_timeout);
        self.client = Some(client.clone());

        self.wait_until_ready(&client, timeout).await?;

        self.state = ClusterState::Started;
        info!(cluster = %self.name(), size = self.size, urls = %self.connection_string(), "cluster ready");
        Ok(())
    }

    async fn wait_until_ready(&mut self, client: &Client, timeout: Duration) -> Result<()> {
        sleep(self.startup.settle_delay).await;

        let deadline = Instant::now() + timeout;

        loop {
            match self.poll_readiness(client).await {
                Readiness::Ready => return Ok(()),
                Readiness::NotReady(observation) if Instant::now() >= deadline => {
                    return Err(Error::StartupTimeout {
                        cluster: self.name().to_string(),
                        timeout,
                        last_observation: observation,
                    });
                }
                Readiness::NotReady(observation) => {
                    debug!(cluster = %self.name(), %observation, "cluster not ready yet");
                }
                Readiness::Fatal(e) => return Err(e),
            }
            sleep(self.startup.poll_interval).await;
        }
    }

    async fn poll_readiness(&mut self, client: &Client) -> Readiness {
        // A node that already exited will never join.
        for node in &mut self.nodes {
            if !node.is_alive() {
                return Readiness::Fatal(Error::NodeStartFailed {
                    node: node.name(),
                    detail: node.exit_detail(),
                });
            }
        }

        let client = client.clone();
        let health =
            tokio::task::spawn_blocking(move || client.health(&HealthQuery::default())).await;

        match health {
            Ok(Ok(health)) => Readiness::assess(&health, self.name(), self.size),
            Ok(Err(e)) if e.is_transient() => Readiness::NotReady(e.to_string()),
            Ok(Err(e)) => Readiness::Fatal(Error::Client(e)),
            Err(e) => Readiness::NotReady(format!("health check task failed: {e}")),
        }
    }

    /// Stops every node. Nodes that never started or already exited are
    /// skipped.
    pub async fn stop(&mut self) -> Result<()> {
        for node in &mut self.nodes {
            if let Err(e) = node.stop().await {
                warn!(node = %node.name(), error = %e, "failed to stop node");
            }
        }

        if self.state == ClusterState::Started {
            self.state = ClusterState::Created;
        }
        Ok(())
    }

    /// Stops every node and deletes the working root. Best-effort; the
    /// cluster cannot be started again afterwards.
    pub async fn terminate(&mut self) -> Result<()> {
        self.stop().await?;
        self.client = None;

        if let Some(temp_dir) = self.temp_dir.take() {
            if let Err(e) = temp_dir.close() {
                warn!(root = %self.working_root.display(), error = %e, "failed to remove working root");
            }
        }
        if self.working_root.exists() {
            // close() gives up on the first error; sweep what is left
            let _ = std::fs::remove_dir_all(&self.working_root);
        }

        self.state = ClusterState::Terminated;
        info!(cluster = %self.name(), "cluster terminated");
        Ok(())
    }

    /// Deletes every index, keeping the processes running. Blocking.
    pub fn reset(&self) -> Result<()> {
        if let Some(client) = &self.client {
            client.delete_all_indexes()?;
        }
        Ok(())
    }

    /// Random name shared by every node.
    pub fn name(&self) -> &str {
        self.context.name()
    }

    pub fn host(&self) -> &str {
        self.context.host()
    }

    /// Configured number of nodes.
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn state(&self) -> ClusterState {
        self.state
    }

    pub fn is_started(&self) -> bool {
        self.state == ClusterState::Started
    }

    pub fn is_terminated(&self) -> bool {
        self.state == ClusterState::Terminated
    }

    pub fn ports(&self) -> &[PortPair] {
        &self.ports
    }

    /// Client URLs, one per node.
    pub fn urls(&self) -> Vec<String> {
        self.ports
            .iter()
            .map(|pair| format!("http://{}:{}", self.host(), pair.client))
            .collect()
    }

    /// All client URLs joined with commas.
    pub fn connection_string(&self) -> String {
        self.urls().join(",")
    }

    /// Transport addresses every node uses for discovery.
    pub fn hosts(&self) -> &[String] {
        self.context.peers()
    }

    pub fn working_root(&self) -> &Path {
        &self.working_root
    }

    /// Client bound to every node; `None` before `start()` and after
    /// `terminate()`.
    pub fn client(&self) -> Option<&Client> {
        self.client.as_ref()
    }

    pub fn startup(&self) -> &StartupPolicy {
        &self.startup
    }

    /// Nodes created so far; empty until the first `start()`.
    pub fn nodes(&self) -> &[NodeProcess] {
        &self.nodes
    }

    pub fn node(&self, ordinal: usize) -> Option<&NodeProcess> {
        self.nodes.get(ordinal)
    }

    pub fn node_mut(&mut self, ordinal: usize) -> Result<&mut NodeProcess> {
        self.nodes
            .get_mut(ordinal)
            .ok_or(Error::NodeNotFound(ordinal))
    }
}

impl Index<usize> for Cluster {
    type Output = NodeProcess;

    fn index(&self, ordinal: usize) -> &NodeProcess {
        &self.nodes[ordinal]
    }
}

impl IndexMut<usize> for Cluster {
    fn index_mut(&mut self, ordinal: usize) -> &mut NodeProcess {
        &mut self.nodes[ordinal]
    }
}

impl std::fmt::Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cluster")
            .field("name", &self.name())
            .field("size", &self.size)
            .field("ports", &self.ports)
            .field("state", &self.state)
            .field("working_root", &self.working_root)
            .finish_non_exhaustive()
    }
}

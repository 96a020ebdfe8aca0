//! Ephemeral, isolated search-server clusters for integration tests.
//!
//! Spins up N local server processes from an unpacked distribution, gives
//! them a random cluster name and their own ports so concurrent runs never
//! see each other, waits until the cluster reports green, and removes every
//! trace on teardown:
//! - [`PortAllocator`]: free client and transport ports from the OS
//! - [`NodeConfigWriter`]: per-node directory tree and configuration
//! - [`NodeProcess`]: one supervised server process
//! - [`Cluster`]: N nodes behind one readiness gate
//! - [`SharedCluster`]: one lazily started cluster reused by a whole test run
//! - [`IsolationScope`]: undoes templates and data created by one test
//!
//! ```ignore
//! use elastictest::{Cluster, ClusterSettings, isolated};
//!
//! let mut cluster = Cluster::new(ClusterSettings::from_env()?.with_size(3))?;
//! cluster.start(std::time::Duration::from_secs(30)).await?;
//!
//! isolated(&cluster, |client| {
//!     client.create_index("books")?;
//!     Ok::<_, elastictest::ClientError>(())
//! })??;
//!
//! cluster.terminate().await?;
//! ```

pub mod cluster;
pub mod config;
pub mod error;
pub mod isolation;
pub mod node;
pub mod node_config;
pub mod port;
pub mod shared;

pub use cluster::{Cluster, ClusterContext, ClusterState, Readiness};
pub use config::{ClusterSettings, Distribution, StartupPolicy};
pub use error::{Error, Result};
pub use isolation::{IsolationScope, TemplateSet, isolated};
pub use node::{NodeProcess, NodeState};
pub use node_config::{NodeConfig, NodeConfigWriter, NodeLayout};
pub use port::{PortAllocator, PortPair};
pub use shared::SharedCluster;

pub use elastictest_client::{Client, ClientError, Health, HealthQuery, HealthStatus};

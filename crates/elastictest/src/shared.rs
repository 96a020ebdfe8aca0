//! A lazily provisioned cluster shared by every test of one run.

use crate::{Cluster, ClusterSettings, Error, Result};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// Owns at most one default cluster, started on first demand.
///
/// Build one at the test-run entry point and hand out references. Fetching
/// it repeatedly never provisions a second cluster. Teardown happens through
/// [`SharedCluster::shutdown`], or when the handle is dropped. Statics are
/// never dropped, so a handle kept in one must be shut down explicitly.
#[derive(Debug)]
pub struct SharedCluster {
    settings: ClusterSettings,
    cell: OnceCell<Arc<Cluster>>,
}

impl SharedCluster {
    pub fn new(settings: ClusterSettings) -> Self {
        Self {
            settings,
            cell: OnceCell::new(),
        }
    }

    /// Uses the layered harness configuration (`elastictest.toml`,
    /// `ESTEST_*`, `ES_PATH`).
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(ClusterSettings::from_env()?))
    }

    /// Returns the shared cluster, creating and starting it on first use.
    ///
    /// Concurrent first calls wait for the same provisioning. A failed
    /// provisioning is not cached; the next call tries again.
    pub async fn get(&self) -> Result<Arc<Cluster>> {
        let cluster = self
            .cell
            .get_or_try_init(|| async {
                let mut cluster = Cluster::new(self.settings.clone())?;
                if let Err(e) = cluster.start(self.settings.startup.timeout).await {
                    // Reclaim whatever did spawn before reporting
                    let _ = cluster.terminate().await;
                    return Err(e);
                }
                info!(cluster = %cluster.name(), "shared cluster provisioned");
                Ok::<_, Error>(Arc::new(cluster))
            })
            .await?;
        Ok(Arc::clone(cluster))
    }

    pub fn is_provisioned(&self) -> bool {
        self.cell.initialized()
    }

    /// Terminates the shared cluster if one was provisioned.
    ///
    /// When callers still hold references the cluster cannot be terminated
    /// in place; its processes and directory go when the last reference
    /// drops.
    pub async fn shutdown(self) -> Result<()> {
        let Some(cluster) = self.cell.into_inner() else {
            return Ok(());
        };

        match Arc::try_unwrap(cluster) {
            Ok(mut cluster) => cluster.terminate().await,
            Err(cluster) => {
                warn!(
                    cluster = %cluster.name(),
                    references = Arc::strong_count(&cluster),
                    "shared cluster still referenced at shutdown"
                );
                Ok(())
            }
        }
    }
}

//! Shared cluster provisioning against fake node processes.

#![cfg(unix)]

mod support;

use elastictest::SharedCluster;
use std::sync::Arc;
use std::time::Duration;
use support::{
    FakeSearchServer, fake_distribution, init_test_tracing, settings_copying_launcher,
    settings_fronted_by,
};
use tempfile::TempDir;

#[tokio::test]
async fn get_starts_one_cluster_and_shutdown_removes_it() {
    init_test_tracing();
    let temp = TempDir::new().unwrap();
    let server = FakeSearchServer::start();

    // The cluster name is only known once the node writes its settings
    let copy = temp.path().join("node-settings.yml");
    server.with_state(|state| {
        state.name_from_settings = Some(copy.clone());
        state.status = "green".to_string();
        state.number_of_nodes = 1;
    });
    let launcher = settings_copying_launcher(&copy);
    let settings =
        settings_fronted_by(fake_distribution(&temp, &launcher), &server, 1, Duration::from_secs(5));
    let shared = SharedCluster::new(settings);
    assert!(!shared.is_provisioned());

    let first = shared.get().await.unwrap();
    assert!(first.is_started());
    let pid = first.node(0).unwrap().pid();
    assert!(pid.is_some());

    let second = shared.get().await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.node(0).unwrap().pid(), pid);
    assert!(shared.is_provisioned());

    let root = first.working_root().to_path_buf();
    assert!(root.is_dir());

    drop((first, second));
    shared.shutdown().await.unwrap();
    assert!(!root.exists());
}

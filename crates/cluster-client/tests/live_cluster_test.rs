//! Integration tests for the cluster client
//!
//! These tests require a reachable OpenShift cluster.
//! Set KUBECONFIG (and optionally TEST_NODE) to run them.

use cluster_client::{ClusterClient, ClusterClientTrait};

#[tokio::test]
#[ignore] // Requires a live cluster
async fn test_client_creation_and_node_listing() {
    let client = ClusterClient::try_default()
        .await
        .expect("Failed to create client");

    let nodes = client
        .list_nodes("node-role.kubernetes.io/worker")
        .await
        .expect("Failed to list worker nodes");

    println!("Found {} worker nodes", nodes.len());
}

#[tokio::test]
#[ignore]
async fn test_node_snapshot_has_boot_id() {
    let client = ClusterClient::try_default()
        .await
        .expect("Failed to create client");
    let name = std::env::var("TEST_NODE").expect("TEST_NODE environment variable must be set");

    let node = client.get_node(&name).await.expect("Failed to get node");

    assert!(!node.boot_id.is_empty(), "kubelet should report a boot id");
}

#[tokio::test]
#[ignore]
async fn test_missing_machine_config_is_not_found() {
    let client = ClusterClient::try_default()
        .await
        .expect("Failed to create client");

    let err = client
        .get_machine_config("kmm-e2e-does-not-exist")
        .await
        .unwrap_err();

    assert!(err.is_not_found());
}

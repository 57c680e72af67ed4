//! ClusterClient trait for mocking
//!
//! This trait abstracts every cluster API call the BMC e2e engine makes.
//! The concrete ClusterClient implements it over kube; tests use the mock.

use crate::error::ClusterError;
use crate::models::*;
use crds::{BootModuleConfig, MachineConfig, MachineConfigPool};

/// Trait for cluster API operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ClusterClientTrait: Send + Sync {
    // Nodes
    async fn get_node(&self, name: &str) -> Result<NodeSnapshot, ClusterError>;
    async fn list_nodes(&self, label_selector: &str) -> Result<Vec<NodeSnapshot>, ClusterError>;

    // Pods
    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<PodSnapshot>, ClusterError>;
    async fn exec(&self, namespace: &str, pod: &str, container: &str, command: &[String]) -> Result<ExecOutput, ClusterError>;

    // Machine Config Operator
    async fn get_machine_config(&self, name: &str) -> Result<MachineConfig, ClusterError>;
    async fn delete_machine_config(&self, name: &str) -> Result<(), ClusterError>;
    async fn get_machine_config_pool(&self, name: &str) -> Result<MachineConfigPool, ClusterError>;

    // Kernel Module Management
    async fn create_boot_module_config(&self, bmc: &BootModuleConfig) -> Result<BootModuleConfig, ClusterError>;
    async fn get_boot_module_config(&self, namespace: &str, name: &str) -> Result<BootModuleConfig, ClusterError>;
    async fn delete_boot_module_config(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;
}

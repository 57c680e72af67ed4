//! Cluster API client
//!
//! Implements [`ClusterClientTrait`] over a `kube::Client`. Objects are
//! flattened into the snapshot models on the way out so callers never see raw
//! API types.

use crate::error::ClusterError;
use crate::models::*;
use crate::cluster_trait::ClusterClientTrait;
use crds::{BootModuleConfig, MachineConfig, MachineConfigPool};
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{Api, AttachParams, DeleteParams, ListParams, PostParams};
use kube::Client;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

/// Cluster API client
#[derive(Clone)]
pub struct ClusterClient {
    client: Client,
}

impl std::fmt::Debug for ClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterClient").finish_non_exhaustive()
    }
}

impl ClusterClient {
    /// Wrap an existing kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the ambient kubeconfig or in-cluster service account
    pub async fn try_default() -> Result<Self, ClusterError> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }

    fn nodes(&self) -> Api<Node> {
        Api::all(self.client.clone())
    }

    fn machine_configs(&self) -> Api<MachineConfig> {
        Api::all(self.client.clone())
    }

    fn boot_module_configs(&self, namespace: &str) -> Api<BootModuleConfig> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

async fn drain<R: AsyncRead + Unpin>(reader: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        reader.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

#[async_trait::async_trait]
impl ClusterClientTrait for ClusterClient {
    async fn get_node(&self, name: &str) -> Result<NodeSnapshot, ClusterError> {
        self.nodes()
            .get_opt(name)
            .await?
            .map(|node| NodeSnapshot::from(&node))
            .ok_or_else(|| ClusterError::not_found("Node", name))
    }

    async fn list_nodes(&self, label_selector: &str) -> Result<Vec<NodeSnapshot>, ClusterError> {
        let nodes = self
            .nodes()
            .list(&ListParams::default().labels(label_selector))
            .await?;
        Ok(nodes.items.iter().map(NodeSnapshot::from).collect())
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<PodSnapshot>, ClusterError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = pods
            .list(&ListParams::default().labels(label_selector))
            .await?;
        Ok(list.items.iter().map(PodSnapshot::from).collect())
    }

    async fn exec(&self, namespace: &str, pod: &str, container: &str, command: &[String]) -> Result<ExecOutput, ClusterError> {
        debug!(namespace, pod, container, ?command, "Executing command in pod");

        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = AttachParams::default()
            .container(container)
            .stdin(false)
            .stdout(true)
            .stderr(true);

        let mut attached = pods.exec(pod, command.to_vec(), &params).await?;

        let stdout = attached.stdout();
        let stderr = attached.stderr();
        let status = attached.take_status();

        // Both streams must be drained together or a chatty stderr can stall stdout
        let (stdout, stderr) = tokio::try_join!(drain(stdout), drain(stderr))
            .map_err(|e| ClusterError::Exec(format!("reading exec output from {}: {}", pod, e)))?;

        let status = match status {
            Some(status) => status.await,
            None => None,
        };

        attached
            .join()
            .await
            .map_err(|e| ClusterError::Exec(format!("closing exec session on {}: {}", pod, e)))?;

        Ok(ExecOutput {
            stdout,
            stderr,
            status: ExecStatus::from(status),
        })
    }

    async fn get_machine_config(&self, name: &str) -> Result<MachineConfig, ClusterError> {
        self.machine_configs()
            .get_opt(name)
            .await?
            .ok_or_else(|| ClusterError::not_found("MachineConfig", name))
    }

    async fn delete_machine_config(&self, name: &str) -> Result<(), ClusterError> {
        self.machine_configs()
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| delete_error(e, "MachineConfig", name))?;
        Ok(())
    }

    async fn get_machine_config_pool(&self, name: &str) -> Result<MachineConfigPool, ClusterError> {
        let api: Api<MachineConfigPool> = Api::all(self.client.clone());
        api.get_opt(name)
            .await?
            .ok_or_else(|| ClusterError::not_found("MachineConfigPool", name))
    }

    async fn create_boot_module_config(&self, bmc: &BootModuleConfig) -> Result<BootModuleConfig, ClusterError> {
        let namespace = bmc.metadata.namespace.as_deref().unwrap_or("default");
        let created = self
            .boot_module_configs(namespace)
            .create(&PostParams::default(), bmc)
            .await?;
        Ok(created)
    }

    async fn get_boot_module_config(&self, namespace: &str, name: &str) -> Result<BootModuleConfig, ClusterError> {
        self.boot_module_configs(namespace)
            .get_opt(name)
            .await?
            .ok_or_else(|| ClusterError::not_found("BootModuleConfig", format!("{}/{}", namespace, name)))
    }

    async fn delete_boot_module_config(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        self.boot_module_configs(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| delete_error(e, "BootModuleConfig", format!("{}/{}", namespace, name)))?;
        Ok(())
    }
}

/// A delete that raced another deleter reports the object as missing.
fn delete_error(err: kube::Error, kind: &'static str, name: impl Into<String>) -> ClusterError {
    match err {
        kube::Error::Api(ae) if ae.code == 404 => ClusterError::not_found(kind, name),
        other => ClusterError::Kube(other),
    }
}

//! Mock ClusterClient for unit testing
//!
//! This module provides an in-memory implementation of ClusterClientTrait so
//! the engine can be exercised without a cluster.
//!
//! - Node and pool reads can be scripted as sequences: each read consumes one
//!   entry and the last entry sticks, which is how tests model an MCO rollout
//!   or a reboot over time.
//! - Exec calls are recorded and answered by a test-provided handler. The
//!   handler may itself mutate the mock (e.g. bump the boot id on reboot).
//! - `helpers.rs` - fixture builders for nodes, pods, pools and MachineConfigs

pub mod helpers;

use crate::error::ClusterError;
use crate::models::*;
use crate::cluster_trait::ClusterClientTrait;
use crds::{BootModuleConfig, MachineConfig, MachineConfigPool};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One recorded call to `exec`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecCall {
    pub namespace: String,
    pub pod: String,
    pub container: String,
    pub command: Vec<String>,
}

impl ExecCall {
    /// The command joined with spaces
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }
}

type ExecHandler = Arc<dyn Fn(&ExecCall) -> Result<ExecOutput, ClusterError> + Send + Sync>;

/// Mock ClusterClient for testing
#[derive(Clone, Default)]
pub struct MockClusterClient {
    // `None` entries answer with a transient `Unavailable` error
    pub(crate) nodes: Arc<Mutex<HashMap<String, VecDeque<Option<NodeSnapshot>>>>>,
    pub(crate) node_reads: Arc<Mutex<HashMap<String, usize>>>,
    pub(crate) pods: Arc<Mutex<Vec<(PodSnapshot, BTreeMap<String, String>)>>>,
    pub(crate) exec_handler: Arc<Mutex<Option<ExecHandler>>>,
    pub(crate) exec_calls: Arc<Mutex<Vec<ExecCall>>>,
    // Time every exec spends before its handler answers
    pub(crate) exec_delay: Arc<Mutex<Option<Duration>>>,
    pub(crate) machine_configs: Arc<Mutex<HashMap<String, MachineConfig>>>,
    // MachineConfigs that appear when a BMC naming them is created
    pub(crate) pending_renders: Arc<Mutex<HashMap<String, MachineConfig>>>,
    pub(crate) pools: Arc<Mutex<HashMap<String, VecDeque<MachineConfigPool>>>>,
    pub(crate) boot_module_configs: Arc<Mutex<HashMap<(String, String), BootModuleConfig>>>,
    // Deleting a BMC also deletes the MachineConfig it names
    pub(crate) cascade_deletes: Arc<AtomicBool>,
}

impl std::fmt::Debug for MockClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockClusterClient").finish_non_exhaustive()
    }
}

impl MockClusterClient {
    /// Create an empty mock cluster
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the node's read sequence with a single, sticky snapshot
    pub fn set_node(&self, node: NodeSnapshot) {
        self.nodes
            .lock()
            .unwrap()
            .insert(node.name.clone(), VecDeque::from([Some(node)]));
    }

    /// Script successive reads of a node; `None` is a transient fetch failure
    pub fn script_node(&self, name: &str, reads: Vec<Option<NodeSnapshot>>) {
        self.nodes
            .lock()
            .unwrap()
            .insert(name.to_string(), reads.into());
    }

    /// Remove a node entirely (subsequent reads are `NotFound`)
    pub fn remove_node(&self, name: &str) {
        self.nodes.lock().unwrap().remove(name);
    }

    /// Number of `get_node` calls made for the node
    pub fn node_reads(&self, name: &str) -> usize {
        self.node_reads.lock().unwrap().get(name).copied().unwrap_or(0)
    }

    /// Add a pod carrying the given labels
    pub fn add_pod(&self, pod: PodSnapshot, labels: &[(&str, &str)]) {
        let labels = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.pods.lock().unwrap().push((pod, labels));
    }

    /// Drop every pod
    pub fn clear_pods(&self) {
        self.pods.lock().unwrap().clear();
    }

    /// Answer every exec call with `handler`
    pub fn on_exec<F>(&self, handler: F)
    where
        F: Fn(&ExecCall) -> Result<ExecOutput, ClusterError> + Send + Sync + 'static,
    {
        *self.exec_handler.lock().unwrap() = Some(Arc::new(handler));
    }

    /// Hold every exec for `delay` before the handler answers
    pub fn delay_exec(&self, delay: Duration) {
        *self.exec_delay.lock().unwrap() = Some(delay);
    }

    /// All exec calls so far, in order
    pub fn exec_calls(&self) -> Vec<ExecCall> {
        self.exec_calls.lock().unwrap().clone()
    }

    /// Add a MachineConfig that already exists
    pub fn add_machine_config(&self, mc: MachineConfig) {
        let name = mc.metadata.name.clone().unwrap_or_default();
        self.machine_configs.lock().unwrap().insert(name, mc);
    }

    /// Make `mc` appear once a BMC whose `machineConfigName` matches is created
    pub fn render_on_create(&self, mc: MachineConfig) {
        let name = mc.metadata.name.clone().unwrap_or_default();
        self.pending_renders.lock().unwrap().insert(name, mc);
    }

    pub fn has_machine_config(&self, name: &str) -> bool {
        self.machine_configs.lock().unwrap().contains_key(name)
    }

    /// Replace the pool's read sequence with a single, sticky object
    pub fn set_pool(&self, pool: MachineConfigPool) {
        let name = pool.metadata.name.clone().unwrap_or_default();
        self.pools
            .lock()
            .unwrap()
            .insert(name, VecDeque::from([pool]));
    }

    /// Script successive reads of a pool
    pub fn script_pool(&self, name: &str, reads: Vec<MachineConfigPool>) {
        self.pools
            .lock()
            .unwrap()
            .insert(name.to_string(), reads.into());
    }

    /// Make BMC deletion take the BMC's MachineConfig with it
    pub fn cascade_bmc_delete(&self) {
        self.cascade_deletes.store(true, Ordering::SeqCst);
    }

    pub fn boot_module_config(&self, namespace: &str, name: &str) -> Option<BootModuleConfig> {
        self.boot_module_configs
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }
}

/// Consume one scripted entry, keeping the last one in place
fn next_read<T: Clone>(reads: &mut VecDeque<T>) -> Option<T> {
    if reads.len() > 1 {
        reads.pop_front()
    } else {
        reads.front().cloned()
    }
}

#[async_trait::async_trait]
impl ClusterClientTrait for MockClusterClient {
    async fn get_node(&self, name: &str) -> Result<NodeSnapshot, ClusterError> {
        *self
            .node_reads
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default() += 1;

        let mut nodes = self.nodes.lock().unwrap();
        match nodes.get_mut(name).and_then(next_read) {
            Some(Some(node)) => Ok(node),
            Some(None) => Err(ClusterError::Unavailable(format!(
                "node {} did not answer",
                name
            ))),
            None => Err(ClusterError::not_found("Node", name)),
        }
    }

    async fn list_nodes(&self, label_selector: &str) -> Result<Vec<NodeSnapshot>, ClusterError> {
        let nodes = self.nodes.lock().unwrap();
        let mut matching: Vec<NodeSnapshot> = nodes
            .values()
            .filter_map(|reads| reads.front().cloned().flatten())
            .filter(|node| helpers::selector_matches(label_selector, &node.labels))
            .collect();
        matching.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(matching)
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<PodSnapshot>, ClusterError> {
        Ok(self
            .pods
            .lock()
            .unwrap()
            .iter()
            .filter(|(pod, labels)| {
                pod.namespace == namespace && helpers::selector_matches(label_selector, labels)
            })
            .map(|(pod, _)| pod.clone())
            .collect())
    }

    async fn exec(&self, namespace: &str, pod: &str, container: &str, command: &[String]) -> Result<ExecOutput, ClusterError> {
        let call = ExecCall {
            namespace: namespace.to_string(),
            pod: pod.to_string(),
            container: container.to_string(),
            command: command.to_vec(),
        };
        self.exec_calls.lock().unwrap().push(call.clone());

        let delay = *self.exec_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        // Release the lock before calling out: handlers may mutate the mock
        let handler = self.exec_handler.lock().unwrap().clone();
        match handler {
            Some(handler) => handler(&call),
            None => Ok(ExecOutput::success(Vec::new())),
        }
    }

    async fn get_machine_config(&self, name: &str) -> Result<MachineConfig, ClusterError> {
        self.machine_configs
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| ClusterError::not_found("MachineConfig", name))
    }

    async fn delete_machine_config(&self, name: &str) -> Result<(), ClusterError> {
        self.machine_configs
            .lock()
            .unwrap()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ClusterError::not_found("MachineConfig", name))
    }

    async fn get_machine_config_pool(&self, name: &str) -> Result<MachineConfigPool, ClusterError> {
        self.pools
            .lock()
            .unwrap()
            .get_mut(name)
            .and_then(next_read)
            .ok_or_else(|| ClusterError::not_found("MachineConfigPool", name))
    }

    async fn create_boot_module_config(&self, bmc: &BootModuleConfig) -> Result<BootModuleConfig, ClusterError> {
        let namespace = bmc.metadata.namespace.clone().unwrap_or_else(|| "default".to_string());
        let name = bmc.metadata.name.clone().unwrap_or_default();

        let mut bmcs = self.boot_module_configs.lock().unwrap();
        if bmcs.contains_key(&(namespace.clone(), name.clone())) {
            return Err(ClusterError::Unavailable(format!(
                "BootModuleConfig {}/{} already exists",
                namespace, name
            )));
        }
        bmcs.insert((namespace, name), bmc.clone());
        drop(bmcs);

        let rendered = self
            .pending_renders
            .lock()
            .unwrap()
            .remove(&bmc.spec.machine_config_name);
        if let Some(mc) = rendered {
            self.add_machine_config(mc);
        }

        Ok(bmc.clone())
    }

    async fn get_boot_module_config(&self, namespace: &str, name: &str) -> Result<BootModuleConfig, ClusterError> {
        self.boot_module_config(namespace, name)
            .ok_or_else(|| ClusterError::not_found("BootModuleConfig", format!("{}/{}", namespace, name)))
    }

    async fn delete_boot_module_config(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        let removed = self
            .boot_module_configs
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| ClusterError::not_found("BootModuleConfig", format!("{}/{}", namespace, name)))?;

        // Unless cascading, the MachineConfig the BMC caused stays
        if self.cascade_deletes.load(Ordering::SeqCst) {
            self.machine_configs
                .lock()
                .unwrap()
                .remove(&removed.spec.machine_config_name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::helpers::*;
    use super::*;

    #[tokio::test]
    async fn test_scripted_node_reads_stick_on_last() {
        let mock = MockClusterClient::new();
        mock.script_node(
            "worker-0",
            vec![None, Some(ready_node("worker-0", "b"))],
        );

        assert!(matches!(
            mock.get_node("worker-0").await,
            Err(ClusterError::Unavailable(_))
        ));
        assert_eq!(mock.get_node("worker-0").await.unwrap().boot_id, "b");
        assert_eq!(mock.get_node("worker-0").await.unwrap().boot_id, "b");
        assert_eq!(mock.node_reads("worker-0"), 3);
        assert!(mock.get_node("missing").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_bmc_create_renders_machine_config_and_delete_keeps_it() {
        let mock = MockClusterClient::new();
        mock.render_on_create(machine_config("10-kmod", "KERNEL_MODULE=simple-kmod"));

        let mut bmc = BootModuleConfig::new(
            "bmc",
            crds::BootModuleConfigSpec {
                machine_config_name: "10-kmod".to_string(),
                ..Default::default()
            },
        );
        bmc.metadata.namespace = Some("openshift-kmm".to_string());

        assert!(!mock.has_machine_config("10-kmod"));
        mock.create_boot_module_config(&bmc).await.unwrap();
        assert!(mock.has_machine_config("10-kmod"));

        mock.delete_boot_module_config("openshift-kmm", "bmc").await.unwrap();
        assert!(mock.has_machine_config("10-kmod"));
        assert!(
            mock.delete_boot_module_config("openshift-kmm", "bmc")
                .await
                .unwrap_err()
                .is_not_found()
        );
    }

    #[tokio::test]
    async fn test_cascading_bmc_delete_removes_machine_config() {
        let mock = MockClusterClient::new();
        mock.cascade_bmc_delete();
        mock.add_machine_config(machine_config("10-kmod", ""));
        mock.add_machine_config(machine_config("99-other", ""));

        let mut bmc = BootModuleConfig::new(
            "bmc",
            crds::BootModuleConfigSpec {
                machine_config_name: "10-kmod".to_string(),
                ..Default::default()
            },
        );
        bmc.metadata.namespace = Some("openshift-kmm".to_string());
        mock.create_boot_module_config(&bmc).await.unwrap();

        mock.delete_boot_module_config("openshift-kmm", "bmc").await.unwrap();

        assert!(!mock.has_machine_config("10-kmod"));
        assert!(mock.has_machine_config("99-other"));
    }

    #[tokio::test]
    async fn test_exec_records_calls_and_uses_handler() {
        let mock = MockClusterClient::new();
        mock.on_exec(|call| Ok(ExecOutput::success(call.command_line())));

        let output = mock
            .exec("ns", "pod", "test", &["echo".to_string(), "hi".to_string()])
            .await
            .unwrap();

        assert_eq!(output.stdout, b"echo hi".to_vec());
        assert_eq!(mock.exec_calls().len(), 1);
        assert_eq!(mock.exec_calls()[0].container, "test");
    }

    #[tokio::test]
    async fn test_list_pods_filters_namespace_and_labels() {
        let mock = MockClusterClient::new();
        mock.add_pod(helper_pod("a", "helpers", "worker-0"), &[("app", "kmm-e2e-helper")]);
        mock.add_pod(helper_pod("b", "other", "worker-0"), &[("app", "kmm-e2e-helper")]);
        mock.add_pod(helper_pod("c", "helpers", "worker-0"), &[("app", "unrelated")]);

        let pods = mock.list_pods("helpers", "app=kmm-e2e-helper").await.unwrap();
        assert_eq!(pods.len(), 1);
        assert_eq!(pods[0].name, "a");
    }
}

//! Shared fixtures for the engine's unit tests

use crate::executor::CommandExecutor;
use crate::node_state::NodeStateReader;
use crate::reboot::{RebootPrimitive, RebootTimeouts, REBOOT_COMMAND};
use cluster_client::mock::helpers::{helper_pod, machine_config, not_ready, ready_node, with_mco};
use cluster_client::{ClusterError, ExecOutput, MockClusterClient, NodeSnapshot};
use crds::{BootModuleConfigSpec, MachineConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const HELPER_NAMESPACE: &str = "kmm-e2e-helpers";
pub const HELPER_LABELS: &[(&str, &str)] = &[("app", "kmm-e2e-helper")];

pub const RENDERED_OLD: &str = "rendered-worker-1111";
pub const RENDERED_NEW: &str = "rendered-worker-2222";

/// Add a usable helper pod on `node`
pub fn add_helper(mock: &MockClusterClient, name: &str, node: &str) {
    mock.add_pod(helper_pod(name, HELPER_NAMESPACE, node), HELPER_LABELS);
}

fn is_reboot(command: &[String]) -> bool {
    command.iter().map(String::as_str).eq(REBOOT_COMMAND)
}

/// On `chroot /host reboot`, replace the node's reads with `after` and fail the
/// exec the way a severed session does. Every other command succeeds silently.
pub fn reboot_on_exec(mock: &MockClusterClient, node: &str, after: Vec<Option<NodeSnapshot>>) {
    let handle = mock.clone();
    let node = node.to_string();
    mock.on_exec(move |call| {
        if is_reboot(&call.command) {
            handle.script_node(&node, after.clone());
            return Err(ClusterError::Exec("websocket closed".to_string()));
        }
        Ok(ExecOutput::success(Vec::new()))
    });
}

pub fn reboot_primitive(mock: &MockClusterClient) -> RebootPrimitive {
    let client = Arc::new(mock.clone());
    RebootPrimitive::new(
        NodeStateReader::new(client.clone()),
        CommandExecutor::new(client, HELPER_NAMESPACE),
        RebootTimeouts::default(),
    )
}

pub fn lsmod_output(modules: &[&str]) -> String {
    let mut out = String::from("Module                  Size  Used by\n");
    for module in modules {
        out.push_str(&format!("{:<24}16384  0\n", module));
    }
    out
}

/// BMC spec for `simple-kmod` rendered into `10-kmod` on the worker pool
pub fn simple_kmod_spec() -> BootModuleConfigSpec {
    BootModuleConfigSpec {
        kernel_module_image: "quay.io/kmm/simple-kmod:$KERNEL_FULL_VERSION".to_string(),
        kernel_module_name: "simple-kmod".to_string(),
        machine_config_name: "10-kmod".to_string(),
        machine_config_pool_name: "worker".to_string(),
        ..Default::default()
    }
}

/// The MachineConfig KMM would render for `spec`
pub fn rendered_machine_config(spec: &BootModuleConfigSpec) -> MachineConfig {
    let worker = spec
        .worker_image
        .clone()
        .unwrap_or_else(|| "registry.redhat.io/kmm/worker:v2.4".to_string());

    let mut unit = format!(
        "[Service]\n\
         Environment=\"KERNEL_MODULE_IMAGE={}\"\n\
         Environment=\"KERNEL_MODULE={}\"\n\
         Environment=\"WORKER_IMAGE={}\"\n",
        spec.kernel_module_image, spec.kernel_module_name, worker
    );
    if !spec.in_tree_modules().is_empty() {
        unit.push_str(&format!(
            "Environment=\"IN_TREE_MODULES_TO_REMOVE={}\"\n",
            spec.in_tree_modules().join(",")
        ));
    }
    if let Some(path) = &spec.firmware_files_path {
        unit.push_str(&format!("Environment=\"FIRMWARE_FILES_PATH={}\"\n", path));
    }

    machine_config(&spec.machine_config_name, &unit)
}

/// How a simulated node looks on either side of its reboot
#[derive(Debug, Clone, Default)]
pub struct SimulatedNode {
    pub modules_before: Vec<&'static str>,
    pub modules_after: Vec<&'static str>,
    pub dmesg_after: &'static str,
}

/// Wire `mock` so `node` is PENDING-READY, has a helper pod, and comes back
/// on a new boot id with `sim`'s post-reboot modules and dmesg once rebooted.
pub fn simulate_node(mock: &MockClusterClient, node: &str, sim: SimulatedNode) {
    mock.set_node(with_mco(ready_node(node, "boot-a"), RENDERED_OLD, RENDERED_NEW, "Done"));
    add_helper(mock, &format!("helper-{}", node), node);

    let rebooted = Arc::new(AtomicBool::new(false));
    let handle = mock.clone();
    let node = node.to_string();
    mock.on_exec(move |call| {
        if is_reboot(&call.command) {
            let after = ready_node(&node, "boot-b");
            handle.script_node(
                &node,
                vec![
                    None,
                    Some(not_ready(with_mco(after.clone(), RENDERED_NEW, RENDERED_NEW, "Done"))),
                    Some(with_mco(after, RENDERED_NEW, RENDERED_NEW, "Done")),
                ],
            );
            rebooted.store(true, Ordering::SeqCst);
            return Err(ClusterError::Exec("websocket closed".to_string()));
        }

        let after = rebooted.load(Ordering::SeqCst);
        match call.command_line().as_str() {
            "lsmod" => {
                let modules = if after { &sim.modules_after } else { &sim.modules_before };
                Ok(ExecOutput::success(lsmod_output(modules)))
            }
            "dmesg" => Ok(ExecOutput::success(if after { sim.dmesg_after } else { "" })),
            _ => Ok(ExecOutput::success(Vec::new())),
        }
    });
}

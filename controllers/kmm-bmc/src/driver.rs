//! BootModuleConfig lifecycle driver.
//!
//! Runs one BMC end to end: create the BMC, wait for KMM to render its
//! MachineConfig, check the rendered environment, wait for the target node to
//! be PENDING-READY, reboot it, then assert the module outcome on the fresh
//! boot. Teardown deletes the BMC (the MachineConfig must survive it), deletes
//! the MachineConfig and follows the resulting pool rollout back to stable.
//!
//! Every step is fatal. When a step before teardown fails, the BMC and the
//! MachineConfig are deleted best-effort and the original error is returned.

use crate::error::EngineError;
use crate::executor::CommandExecutor;
use crate::kmod::KernelModuleInspector;
use crate::machine_config::verify_env;
use crate::node_state::{McoTuple, NodeStateReader};
use crate::reboot::{RebootPrimitive, RebootReport, RebootTimeouts};
use crate::transition::TransitionWaiter;
use cluster_client::ClusterClientTrait;
use crds::{BootModuleConfig, BootModuleConfigSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Default dmesg line emitted by the firmware test module
pub const DEFAULT_FIRMWARE_MARKER: &str = "ALL GOOD WITH FIRMWARE";

const MINUTE: Duration = Duration::from_secs(60);

/// Deadlines for each driver step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverTimeouts {
    pub machine_config_present: Duration,
    pub pending_ready: Duration,
    pub reboot: RebootTimeouts,
    pub helper_after_reboot: Duration,
    pub module_unload: Duration,
    pub module_load: Duration,
    pub dmesg: Duration,
    pub machine_config_absent: Duration,
    /// Window the pool must stay stable for; teardown expects this to fail
    pub pool_stable_for: Duration,
    /// How long teardown waits for the pool to go unstable
    pub pool_unstable_within: Duration,
    pub pool_restabilize: Duration,
    pub applied: Duration,
}

impl Default for DriverTimeouts {
    fn default() -> Self {
        Self {
            machine_config_present: 3 * MINUTE,
            pending_ready: 10 * MINUTE,
            reboot: RebootTimeouts::default(),
            helper_after_reboot: 5 * MINUTE,
            module_unload: MINUTE,
            module_load: MINUTE,
            dmesg: MINUTE,
            machine_config_absent: MINUTE,
            pool_stable_for: MINUTE,
            pool_unstable_within: 2 * MINUTE,
            pool_restabilize: 30 * MINUTE,
            applied: 10 * MINUTE,
        }
    }
}

/// One BMC to drive through its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BmcScenario {
    pub name: String,
    pub namespace: String,
    pub spec: BootModuleConfigSpec,
    /// Node to reboot; the first node of the pool when unset
    pub target_node: Option<String>,
    pub firmware_marker: String,
}

impl BmcScenario {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, spec: BootModuleConfigSpec) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            spec,
            target_node: None,
            firmware_marker: DEFAULT_FIRMWARE_MARKER.to_string(),
        }
    }

    pub fn on_node(mut self, node: impl Into<String>) -> Self {
        self.target_node = Some(node.into());
        self
    }

    fn pool(&self) -> &str {
        &self.spec.machine_config_pool_name
    }

    fn machine_config(&self) -> &str {
        &self.spec.machine_config_name
    }

    fn resource(&self) -> BootModuleConfig {
        BootModuleConfig {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                ..Default::default()
            },
            spec: self.spec.clone(),
        }
    }
}

/// What a successful run observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioReport {
    pub bmc: String,
    pub node: String,
    pub machine_config: String,
    /// MCO tuple seen when the node became reboot-ready
    pub pending: McoTuple,
    pub reboot: RebootReport,
    pub elapsed: Duration,
}

/// Drives a BootModuleConfig from creation to teardown.
pub struct BmcLifecycleDriver {
    client: Arc<dyn ClusterClientTrait>,
    nodes: NodeStateReader,
    executor: CommandExecutor,
    inspector: KernelModuleInspector,
    waiter: TransitionWaiter,
    reboot: RebootPrimitive,
    timeouts: DriverTimeouts,
}

impl BmcLifecycleDriver {
    pub fn new(client: Arc<dyn ClusterClientTrait>, helper_namespace: &str, timeouts: DriverTimeouts) -> Self {
        let nodes = NodeStateReader::new(client.clone());
        let executor = CommandExecutor::new(client.clone(), helper_namespace);

        Self {
            inspector: KernelModuleInspector::new(executor.clone()),
            waiter: TransitionWaiter::new(client.clone()),
            reboot: RebootPrimitive::new(nodes.clone(), executor.clone(), timeouts.reboot),
            client,
            nodes,
            executor,
            timeouts,
        }
    }

    /// Run the whole lifecycle for `scenario`.
    pub async fn run(&self, scenario: &BmcScenario) -> Result<ScenarioReport, EngineError> {
        let started = Instant::now();
        let node = self.select_target_node(scenario).await?;
        info!(
            bmc = %scenario.name,
            namespace = %scenario.namespace,
            node = %node,
            machine_config = scenario.machine_config(),
            pool = scenario.pool(),
            "Starting BootModuleConfig lifecycle"
        );

        self.client
            .create_boot_module_config(&scenario.resource())
            .await?;
        info!(bmc = %scenario.name, "Created BootModuleConfig");

        let (pending, reboot) = match self.exercise(scenario, &node).await {
            Ok(observed) => observed,
            Err(e) => {
                warn!(bmc = %scenario.name, error = %e, "Lifecycle failed, cleaning up");
                self.cleanup(scenario).await;
                return Err(e);
            }
        };

        self.teardown(scenario, &node).await?;

        let elapsed = started.elapsed();
        info!(bmc = %scenario.name, node = %node, ?elapsed, "BootModuleConfig lifecycle passed");

        Ok(ScenarioReport {
            bmc: scenario.name.clone(),
            node,
            machine_config: scenario.machine_config().to_string(),
            pending,
            reboot,
            elapsed,
        })
    }

    /// The configured node, or the first node of the pool by name.
    pub async fn select_target_node(&self, scenario: &BmcScenario) -> Result<String, EngineError> {
        if let Some(node) = &scenario.target_node {
            return Ok(self.nodes.get_node(node).await?.name);
        }

        self.nodes
            .pool_nodes(scenario.pool())
            .await?
            .into_iter()
            .next()
            .map(|node| node.name)
            .ok_or_else(|| EngineError::NotFound {
                kind: "Node",
                name: format!("node-role.kubernetes.io/{}", scenario.pool()),
            })
    }

    async fn exercise(&self, scenario: &BmcScenario, node: &str) -> Result<(McoTuple, RebootReport), EngineError> {
        let stored = self
            .client
            .get_boot_module_config(&scenario.namespace, &scenario.name)
            .await?;
        if stored.spec != scenario.spec {
            return Err(EngineError::assertion(
                "create",
                format!("BootModuleConfig {} was stored with a different spec", scenario.name),
            ));
        }

        let mc = self
            .waiter
            .wait_for_machine_config_present(scenario.machine_config(), self.timeouts.machine_config_present)
            .await?;
        verify_env(&mc, &scenario.spec)?;
        info!(machine_config = scenario.machine_config(), "MachineConfig environment verified");

        let pending = self
            .waiter
            .wait_for_pending_ready(node, self.timeouts.pending_ready)
            .await?;

        let reboot = self.reboot.reboot(node).await?;

        let helper = self
            .executor
            .acquire_helper(node, self.timeouts.helper_after_reboot)
            .await?;
        info!(node, pod = %helper.name, "Helper pod ready after reboot");

        self.verify_modules(scenario, node).await?;

        Ok((pending, reboot))
    }

    async fn verify_modules(&self, scenario: &BmcScenario, node: &str) -> Result<(), EngineError> {
        for module in scenario.spec.in_tree_modules() {
            if !self
                .inspector
                .is_not_loaded(module, node, self.timeouts.module_unload)
                .await?
            {
                return Err(EngineError::assertion(
                    "verify_modules",
                    format!("in-tree module {} still loaded on {}", module, node),
                ));
            }
            info!(node, module = %module, "In-tree module removed");
        }

        let module = &scenario.spec.kernel_module_name;
        if !self
            .inspector
            .is_loaded(module, node, self.timeouts.module_load)
            .await?
        {
            return Err(EngineError::assertion(
                "verify_modules",
                format!("module {} not loaded on {}", module, node),
            ));
        }
        info!(node, module = %module, "Module loaded");

        if scenario.spec.wants_firmware() {
            if !self
                .inspector
                .dmesg_contains(&scenario.firmware_marker, node, self.timeouts.dmesg)
                .await?
            {
                return Err(EngineError::assertion(
                    "verify_modules",
                    format!("dmesg on {} never showed {:?}", node, scenario.firmware_marker),
                ));
            }
            info!(node, marker = %scenario.firmware_marker, "Firmware marker found in dmesg");
        }

        Ok(())
    }

    async fn teardown(&self, scenario: &BmcScenario, node: &str) -> Result<(), EngineError> {
        let mc_name = scenario.machine_config();

        match self
            .client
            .delete_boot_module_config(&scenario.namespace, &scenario.name)
            .await
        {
            Ok(()) => info!(bmc = %scenario.name, "Deleted BootModuleConfig"),
            Err(e) if e.is_not_found() => warn!(bmc = %scenario.name, "BootModuleConfig already gone"),
            Err(e) => return Err(e.into()),
        }

        match self.client.get_machine_config(mc_name).await {
            Ok(_) => info!(machine_config = mc_name, "MachineConfig survived BootModuleConfig deletion"),
            Err(e) if e.is_not_found() => {
                return Err(EngineError::assertion(
                    "teardown",
                    format!("MachineConfig {} was removed with the BootModuleConfig", mc_name),
                ));
            }
            Err(e) => return Err(e.into()),
        }

        match self.client.delete_machine_config(mc_name).await {
            Ok(()) => info!(machine_config = mc_name, "Deleted MachineConfig"),
            Err(e) if e.is_not_found() => warn!(machine_config = mc_name, "MachineConfig already gone"),
            Err(e) => return Err(e.into()),
        }
        self.waiter
            .wait_for_machine_config_absent(mc_name, self.timeouts.machine_config_absent)
            .await?;

        let pool = scenario.pool();
        match self
            .waiter
            .wait_pool_stable_for(pool, self.timeouts.pool_stable_for, self.timeouts.pool_unstable_within)
            .await
        {
            Ok(()) => {
                return Err(EngineError::assertion(
                    "teardown",
                    format!(
                        "pool {} stayed stable after deleting MachineConfig {}",
                        pool, mc_name
                    ),
                ));
            }
            Err(EngineError::TransitionTimeout { .. }) => {
                info!(pool, "Pool started rolling out MachineConfig removal");
            }
            Err(e) => return Err(e),
        }

        self.waiter
            .wait_pool_updated(pool, self.timeouts.pool_restabilize)
            .await?;
        self.waiter
            .wait_for_applied(node, self.timeouts.applied)
            .await?;

        Ok(())
    }

    async fn cleanup(&self, scenario: &BmcScenario) {
        if let Err(e) = self
            .client
            .delete_boot_module_config(&scenario.namespace, &scenario.name)
            .await
        {
            warn!(bmc = %scenario.name, error = %e, "Cleanup: BootModuleConfig delete failed");
        }
        if let Err(e) = self
            .client
            .delete_machine_config(scenario.machine_config())
            .await
        {
            warn!(machine_config = scenario.machine_config(), error = %e, "Cleanup: MachineConfig delete failed");
        }
    }
}

/// Race a lifecycle run against `interrupt` (e.g. `tokio::signal::ctrl_c()`).
///
/// An interrupt is reported as [`EngineError::Interrupted`], never as a pass.
/// If the interrupt source itself fails the run continues unraced.
pub async fn run_until_interrupted<F, I>(bmc: &str, run: F, interrupt: I) -> Result<ScenarioReport, EngineError>
where
    F: Future<Output = Result<ScenarioReport, EngineError>>,
    I: Future<Output = std::io::Result<()>>,
{
    let started = Instant::now();
    tokio::pin!(run);

    tokio::select! {
        result = &mut run => result,
        signal = interrupt => match signal {
            Ok(()) => Err(EngineError::Interrupted {
                bmc: bmc.to_string(),
                elapsed: started.elapsed(),
            }),
            Err(e) => {
                warn!(error = %e, "Interrupt handler unavailable, running to completion");
                run.await
            }
        },
    }
}

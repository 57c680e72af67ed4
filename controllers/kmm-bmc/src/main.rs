//! KMM BootModuleConfig lifecycle e2e driver
//!
//! Runs one BootModuleConfig through its whole lifecycle against the cluster
//! in the current kubeconfig:
//! - create the BMC and wait for KMM to render its MachineConfig
//! - check the environment KMM rendered into it
//! - wait for the target node to be reboot-ready, reboot it, verify modules
//! - delete the BMC and the MachineConfig and follow the pool back to stable
//!
//! Configuration comes from environment variables (see `config.rs`).

mod config;
mod driver;
mod error;
mod executor;
mod kmod;
mod machine_config;
mod node_state;
mod poll;
mod reboot;
mod transition;

#[cfg(test)]
mod executor_test;
#[cfg(test)]
mod test_utils;

use crate::config::DriverConfig;
use crate::driver::{run_until_interrupted, BmcLifecycleDriver, DriverTimeouts};
use crate::error::EngineError;
use cluster_client::{ClusterClient, ClusterError};
use std::sync::Arc;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<(), EngineError> {
    // Another provider may already be installed; either way one is active
    let _ = rustls::crypto::ring::default_provider().install_default();
    tracing_subscriber::fmt::init();

    let run_id = Uuid::new_v4();
    let config = DriverConfig::from_env(&run_id)?;
    let scenario = config.scenario;

    info!("Starting KMM BootModuleConfig e2e run {}", run_id);
    info!("Configuration:");
    info!("  BootModuleConfig: {}/{}", scenario.namespace, scenario.name);
    info!("  Kernel module: {} ({})", scenario.spec.kernel_module_name, scenario.spec.kernel_module_image);
    info!("  MachineConfig: {}", scenario.spec.machine_config_name);
    info!("  Pool: {}", scenario.spec.machine_config_pool_name);
    info!("  Target node: {}", scenario.target_node.as_deref().unwrap_or("first node of pool"));
    info!("  Helper namespace: {}", config.helper_namespace);

    let kube_client = kube::Client::try_default().await.map_err(ClusterError::from)?;
    let client = Arc::new(ClusterClient::new(kube_client));
    let driver = BmcLifecycleDriver::new(client, &config.helper_namespace, DriverTimeouts::default());

    let span = info_span!("bmc_e2e", run_id = %run_id, bmc = %scenario.name);
    let run = driver.run(&scenario).instrument(span);

    match run_until_interrupted(&scenario.name, run, tokio::signal::ctrl_c()).await {
        Ok(report) => {
            info!(
                bmc = %report.bmc,
                node = %report.node,
                machine_config = %report.machine_config,
                pending = %report.pending,
                boot_id = %report.reboot.new_boot_id,
                elapsed = ?report.elapsed,
                "BootModuleConfig lifecycle passed"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "BootModuleConfig lifecycle failed");
            Err(e)
        }
    }
}

//! Kernel module inspection.
//!
//! Answers questions about a node's running kernel by running `lsmod`,
//! `modinfo` and `dmesg` in its helper pods. Every check polls at
//! [`MODULE_INTERVAL`] until it holds or the timeout passes; command failures
//! during polling count as "not yet".

use crate::error::EngineError;
use crate::executor::CommandExecutor;
use crate::poll::{poll_until, MODULE_INTERVAL};
use std::time::Duration;
use tracing::{debug, info};

/// Name as it appears in `lsmod`: dashes become underscores.
pub fn normalize_module_name(name: &str) -> String {
    name.replace('-', "_")
}

fn output_contains(output: &[u8], needle: &str) -> bool {
    String::from_utf8_lossy(output).contains(needle)
}

/// Polls helper pods for kernel module state.
#[derive(Clone)]
pub struct KernelModuleInspector {
    executor: CommandExecutor,
}

impl KernelModuleInspector {
    pub fn new(executor: CommandExecutor) -> Self {
        Self { executor }
    }

    /// True once `lsmod` in any helper pod on the node lists the module.
    pub async fn is_loaded(&self, module: &str, node: &str, timeout: Duration) -> Result<bool, EngineError> {
        let wanted = normalize_module_name(module);
        let wanted = wanted.as_str();

        let outcome = poll_until(MODULE_INTERVAL, timeout, || async move {
            for helper in self.executor.ready_helpers(node).await.unwrap_or_default() {
                match self.executor.exec_in(&helper, &["lsmod"]).await {
                    Ok(output) if output_contains(&output, wanted) => return Ok(Some(())),
                    Ok(_) => debug!(node, pod = %helper.name, module = wanted, "Module not in lsmod yet"),
                    Err(e) => debug!(node, pod = %helper.name, error = %e, "lsmod failed"),
                }
            }
            Ok(None)
        })
        .await?;

        info!(node, module, loaded = outcome.is_ready(), "Checked module is loaded");
        Ok(outcome.is_ready())
    }

    /// True once `lsmod` on the node no longer lists the module.
    ///
    /// A module that never existed is "not loaded" on the first poll.
    pub async fn is_not_loaded(&self, module: &str, node: &str, timeout: Duration) -> Result<bool, EngineError> {
        let unwanted = normalize_module_name(module);
        let unwanted = unwanted.as_str();

        let outcome = poll_until(MODULE_INTERVAL, timeout, || async move {
            match self.executor.run(node, &["lsmod"]).await {
                Ok(output) if !output_contains(&output, unwanted) => Ok(Some(())),
                Ok(_) => {
                    debug!(node, module = unwanted, "Module still loaded");
                    Ok(None)
                }
                Err(e) => {
                    debug!(node, error = %e, "lsmod failed");
                    Ok(None)
                }
            }
        })
        .await?;

        info!(node, module, unloaded = outcome.is_ready(), "Checked module is not loaded");
        Ok(outcome.is_ready())
    }

    /// True once `modinfo` on the host finds the module.
    #[allow(dead_code)] // No lifecycle step runs modinfo
    pub async fn exists(&self, module: &str, node: &str, timeout: Duration) -> Result<bool, EngineError> {
        let outcome = poll_until(MODULE_INTERVAL, timeout, || async move {
            match self
                .executor
                .run(node, &["chroot", "/host", "modinfo", module])
                .await
            {
                Ok(_) => Ok(Some(())),
                Err(e) => {
                    debug!(node, module, error = %e, "modinfo failed");
                    Ok(None)
                }
            }
        })
        .await?;

        Ok(outcome.is_ready())
    }

    /// True once the kernel ring buffer contains `text`.
    pub async fn dmesg_contains(&self, text: &str, node: &str, timeout: Duration) -> Result<bool, EngineError> {
        let outcome = poll_until(MODULE_INTERVAL, timeout, || async move {
            match self.executor.run(node, &["dmesg"]).await {
                Ok(output) => Ok(output_contains(&output, text).then_some(())),
                Err(e) => {
                    debug!(node, error = %e, "dmesg failed");
                    Ok(None)
                }
            }
        })
        .await?;

        info!(node, text, found = outcome.is_ready(), "Checked dmesg");
        Ok(outcome.is_ready())
    }
}

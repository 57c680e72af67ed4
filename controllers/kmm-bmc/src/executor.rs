//! Command execution on nodes through helper pods.
//!
//! Helper pods are privileged pods, one or more per node, labelled
//! [`HELPER_LABEL_SELECTOR`] in the helper namespace. Their `test` container
//! mounts the host root at `/host`, so `chroot /host <cmd>` runs on the node.
//! Selection is stateless: every call lists the pods again.

use crate::error::EngineError;
use crate::poll::{poll_until, PollOutcome, RESOURCE_INTERVAL};
use cluster_client::{ClusterClientTrait, ExecStatus, PodSnapshot};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Container commands are executed in
pub const HELPER_CONTAINER: &str = "test";

/// Label selector identifying helper pods
pub const HELPER_LABEL_SELECTOR: &str = "app=kmm-e2e-helper";

/// A helper pod that was Running with a ready `test` container when selected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperPod {
    pub name: String,
    pub namespace: String,
    pub node: String,
}

fn usable_on(pod: &PodSnapshot, node: &str) -> bool {
    pod.scheduled_on(node) && pod.is_running() && pod.container_ready(HELPER_CONTAINER)
}

/// Runs commands on nodes via their helper pods.
#[derive(Clone)]
pub struct CommandExecutor {
    client: Arc<dyn ClusterClientTrait>,
    namespace: String,
}

impl CommandExecutor {
    pub fn new(client: Arc<dyn ClusterClientTrait>, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Every usable helper pod on the node, in listing order.
    pub async fn ready_helpers(&self, node: &str) -> Result<Vec<HelperPod>, EngineError> {
        let pods = self
            .client
            .list_pods(&self.namespace, HELPER_LABEL_SELECTOR)
            .await?;

        Ok(pods
            .iter()
            .filter(|pod| usable_on(pod, node))
            .map(|pod| HelperPod {
                name: pod.name.clone(),
                namespace: pod.namespace.clone(),
                node: node.to_string(),
            })
            .collect())
    }

    /// First usable helper pod on the node, or `NoHelperPod`.
    pub async fn find_helper(&self, node: &str) -> Result<HelperPod, EngineError> {
        self.ready_helpers(node)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::NoHelperPod {
                node: node.to_string(),
            })
    }

    /// Wait up to `timeout` for a usable helper pod on the node.
    ///
    /// Listing errors are retried; they are common while a node is coming back.
    pub async fn acquire_helper(&self, node: &str, timeout: Duration) -> Result<HelperPod, EngineError> {
        let outcome = poll_until(RESOURCE_INTERVAL, timeout, || async move {
            match self.ready_helpers(node).await {
                Ok(helpers) => Ok(helpers.into_iter().next()),
                Err(e) => {
                    warn!(node, namespace = self.namespace(), error = %e, "Listing helper pods failed, retrying");
                    Ok(None)
                }
            }
        })
        .await?;

        match outcome {
            PollOutcome::Ready(helper) => Ok(helper),
            PollOutcome::TimedOut { elapsed, .. } => Err(EngineError::HelperNotReady {
                node: node.to_string(),
                elapsed,
            }),
        }
    }

    /// Run `command` in the helper's `test` container.
    ///
    /// Returns stdout followed by stderr on success.
    pub async fn exec_in(&self, helper: &HelperPod, command: &[&str]) -> Result<Vec<u8>, EngineError> {
        if command.is_empty() {
            return Err(EngineError::ExecFailed {
                node: helper.node.clone(),
                message: "empty command".to_string(),
            });
        }

        let argv: Vec<String> = command.iter().map(|arg| arg.to_string()).collect();
        debug!(node = %helper.node, pod = %helper.name, command = %argv.join(" "), "Running command");

        let output = self
            .client
            .exec(&helper.namespace, &helper.name, HELPER_CONTAINER, &argv)
            .await
            .map_err(|e| EngineError::ExecFailed {
                node: helper.node.clone(),
                message: e.to_string(),
            })?;

        match output.status {
            ExecStatus::Success => Ok(output.combined()),
            ExecStatus::NonZeroExit(code) => Err(EngineError::NonZeroExit {
                node: helper.node.clone(),
                command: argv.join(" "),
                code,
                output: String::from_utf8_lossy(&output.combined()).into_owned(),
            }),
            ExecStatus::Failure(message) => Err(EngineError::ExecFailed {
                node: helper.node.clone(),
                message: format!(
                    "{}: {}",
                    message,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            }),
        }
    }

    /// Run `command` on the node through its first usable helper pod.
    pub async fn run(&self, node: &str, command: &[&str]) -> Result<Vec<u8>, EngineError> {
        if command.is_empty() {
            return Err(EngineError::ExecFailed {
                node: node.to_string(),
                message: "empty command".to_string(),
            });
        }

        let helper = self.find_helper(node).await?;
        self.exec_in(&helper, command).await
    }
}

//! Verified node reboot.
//!
//! `chroot /host reboot` through a helper pod, then wait for the kubelet to
//! report a new boot id and for the node to come back Ready. The exec error
//! from the reboot command itself is ignored (the reboot severs the session),
//! and so are node-fetch errors while the node is down. The reboot exec gets
//! one poll interval to return before the watch starts anyway.

use crate::error::EngineError;
use crate::executor::CommandExecutor;
use crate::node_state::NodeStateReader;
use crate::poll::{poll_until, PollOutcome, REBOOT_INTERVAL};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Command issued on the host to reboot it
pub const REBOOT_COMMAND: [&str; 3] = ["chroot", "/host", "reboot"];

/// Deadlines for each reboot phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebootTimeouts {
    /// Wait for a usable helper pod before issuing the reboot
    pub helper: Duration,
    /// Wait for the boot id to change
    pub boot_id: Duration,
    /// Wait for Ready after the boot id changed
    pub ready: Duration,
}

impl Default for RebootTimeouts {
    fn default() -> Self {
        Self {
            helper: Duration::from_secs(60),
            boot_id: Duration::from_secs(10 * 60),
            ready: Duration::from_secs(10 * 60),
        }
    }
}

/// In-memory record of one driven reboot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRecord {
    pub node_name: String,
    pub original_boot_id: String,
    pub begin_time: DateTime<Utc>,
}

impl TransitionRecord {
    fn begin(node_name: &str, original_boot_id: String) -> Self {
        Self {
            node_name: node_name.to_string(),
            original_boot_id,
            begin_time: Utc::now(),
        }
    }
}

/// Outcome of a successful reboot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebootReport {
    pub record: TransitionRecord,
    pub new_boot_id: String,
    pub elapsed: Duration,
}

/// Reboots a node and waits until it is back.
#[derive(Clone)]
pub struct RebootPrimitive {
    nodes: NodeStateReader,
    executor: CommandExecutor,
    timeouts: RebootTimeouts,
}

impl RebootPrimitive {
    pub fn new(nodes: NodeStateReader, executor: CommandExecutor, timeouts: RebootTimeouts) -> Self {
        Self {
            nodes,
            executor,
            timeouts,
        }
    }

    /// Reboot `node` and return once its boot id changed and it is Ready.
    ///
    /// The boot id is compared against the snapshot taken on entry, so a
    /// reboot triggered by someone else after entry also satisfies the wait.
    pub async fn reboot(&self, node: &str) -> Result<RebootReport, EngineError> {
        let original_boot_id = self.nodes.boot_id(node).await?;
        let helper = self.executor.acquire_helper(node, self.timeouts.helper).await?;

        let record = TransitionRecord::begin(node, original_boot_id);
        let started = Instant::now();
        info!(node, pod = %helper.name, boot_id = %record.original_boot_id, "Rebooting node");

        // A session the reboot leaves half-open must not stall the boot id watch
        match tokio::time::timeout(REBOOT_INTERVAL, self.executor.exec_in(&helper, &REBOOT_COMMAND)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => debug!(node, error = %e, "Reboot command returned an error (expected)"),
            Err(_) => debug!(node, timeout = ?REBOOT_INTERVAL, "Reboot command did not return, watching boot id"),
        }

        let original = record.original_boot_id.as_str();
        let watch = poll_until(REBOOT_INTERVAL, self.timeouts.boot_id, || async move {
            match self.nodes.get_node(node).await {
                Ok(snapshot) if snapshot.boot_id != original => Ok(Some(snapshot.boot_id)),
                Ok(_) => Ok(None),
                Err(e) => {
                    debug!(node, error = %e, "Node fetch failed during reboot");
                    Ok(None)
                }
            }
        })
        .await?;

        let new_boot_id = match watch {
            PollOutcome::Ready(boot_id) => boot_id,
            PollOutcome::TimedOut { elapsed, .. } => {
                return Err(EngineError::BootIdUnchanged {
                    node: node.to_string(),
                    boot_id: record.original_boot_id,
                    elapsed,
                });
            }
        };
        info!(node, boot_id = %new_boot_id, "Node boot id changed");

        let ready = poll_until(REBOOT_INTERVAL, self.timeouts.ready, || async move {
            match self.nodes.is_ready(node).await {
                Ok(ready) => Ok(ready.then_some(())),
                Err(e) => {
                    debug!(node, error = %e, "Node fetch failed while waiting for Ready");
                    Ok(None)
                }
            }
        })
        .await?;

        if let PollOutcome::TimedOut { elapsed, .. } = ready {
            return Err(EngineError::NodeNotReady {
                node: node.to_string(),
                elapsed,
            });
        }

        let elapsed = started.elapsed();
        info!(node, ?elapsed, since = %record.begin_time, "Node is Ready after reboot");

        Ok(RebootReport {
            record,
            new_boot_id,
            elapsed,
        })
    }
}

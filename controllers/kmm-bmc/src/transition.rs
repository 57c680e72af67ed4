//! MCO transition waiters.
//!
//! BMC-driven changes need a manual reboot: the MCO renders the new config,
//! sets `desiredConfig`, reports `Done` and stops. The waiters here tell that
//! PENDING-READY point apart from the APPLIED point after the reboot, and
//! watch MachineConfig presence and pool rollouts.

use crate::error::EngineError;
use crate::node_state::{McoTuple, NodeStateReader};
use crate::poll::{poll_until, PollOutcome, RESOURCE_INTERVAL, TRANSITION_INTERVAL};
use cluster_client::ClusterClientTrait;
use crds::{MachineConfig, MachineConfigPool};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Stable: nothing degraded, every machine updated and ready, not `Updating`.
pub fn pool_is_stable(pool: &MachineConfigPool) -> bool {
    pool.status.as_ref().is_some_and(|status| {
        status.degraded_machine_count == 0
            && status.counts_converged()
            && !status.condition_is_true("Updating")
    })
}

/// Updated: the `Updated` condition is true and every machine caught up.
pub fn pool_is_updated(pool: &MachineConfigPool) -> bool {
    pool.status
        .as_ref()
        .is_some_and(|status| status.condition_is_true("Updated") && status.counts_converged())
}

/// Blocks on node, MachineConfig and pool state.
#[derive(Clone)]
pub struct TransitionWaiter {
    client: Arc<dyn ClusterClientTrait>,
    nodes: NodeStateReader,
}

impl TransitionWaiter {
    pub fn new(client: Arc<dyn ClusterClientTrait>) -> Self {
        Self {
            nodes: NodeStateReader::new(client.clone()),
            client,
        }
    }

    /// Poll the node's annotation tuple until `predicate` holds.
    ///
    /// A missing node is fatal; other fetch errors are retried.
    async fn wait_for_tuple(
        &self,
        primitive: &'static str,
        node: &str,
        predicate: &'static str,
        holds: fn(&McoTuple) -> bool,
        timeout: Duration,
    ) -> Result<McoTuple, EngineError> {
        let last_seen: Mutex<Option<McoTuple>> = Mutex::new(None);
        let last_seen_ref = &last_seen;

        let outcome = poll_until(TRANSITION_INTERVAL, timeout, || async move {
            match self.nodes.mco_tuple(node).await {
                Ok(tuple) => {
                    debug!(node, %tuple, state = %tuple.classify(), "Observed MCO tuple");
                    let done = holds(&tuple);
                    if let Ok(mut last) = last_seen_ref.lock() {
                        *last = Some(tuple.clone());
                    }
                    Ok(done.then_some(tuple))
                }
                Err(e) if e.is_not_found() => Err(e),
                Err(e) => {
                    warn!(node, error = %e, "Node fetch failed, retrying");
                    Ok(None)
                }
            }
        })
        .await?;

        match outcome {
            PollOutcome::Ready(tuple) => {
                info!(node, %tuple, primitive, "Node reached {}", predicate);
                Ok(tuple)
            }
            PollOutcome::TimedOut { elapsed, .. } => {
                let last = last_seen
                    .lock()
                    .ok()
                    .and_then(|last| last.as_ref().map(ToString::to_string))
                    .unwrap_or_else(|| "never observed".to_string());
                Err(EngineError::TransitionTimeout {
                    primitive,
                    target: format!("node {} (last seen {})", node, last),
                    predicate: predicate.to_string(),
                    elapsed,
                })
            }
        }
    }

    /// Wait until the node has a rendered config pending a reboot.
    pub async fn wait_for_pending_ready(&self, node: &str, timeout: Duration) -> Result<McoTuple, EngineError> {
        self.wait_for_tuple(
            "wait_for_pending_ready",
            node,
            "current != desired && state == Done",
            McoTuple::is_pending_ready,
            timeout,
        )
        .await
    }

    /// Wait until the node runs its desired config and the MCO is done.
    pub async fn wait_for_applied(&self, node: &str, timeout: Duration) -> Result<McoTuple, EngineError> {
        self.wait_for_tuple(
            "wait_for_applied",
            node,
            "current == desired && state == Done",
            McoTuple::is_applied,
            timeout,
        )
        .await
    }

    /// Wait until the named MachineConfig exists and return it.
    pub async fn wait_for_machine_config_present(&self, name: &str, timeout: Duration) -> Result<MachineConfig, EngineError> {
        let outcome = poll_until(TRANSITION_INTERVAL, timeout, || async move {
            match self.client.get_machine_config(name).await {
                Ok(mc) => Ok(Some(mc)),
                Err(e) if e.is_not_found() => {
                    debug!(machine_config = name, "MachineConfig not rendered yet");
                    Ok(None)
                }
                Err(e) => {
                    warn!(machine_config = name, error = %e, "MachineConfig fetch failed, retrying");
                    Ok(None)
                }
            }
        })
        .await?;

        match outcome {
            PollOutcome::Ready(mc) => {
                info!(machine_config = name, "MachineConfig is present");
                Ok(mc)
            }
            PollOutcome::TimedOut { elapsed, .. } => Err(EngineError::ResourceAbsent {
                primitive: "wait_for_machine_config_present",
                kind: "MachineConfig",
                name: name.to_string(),
                elapsed,
            }),
        }
    }

    /// Wait until the named MachineConfig is gone.
    pub async fn wait_for_machine_config_absent(&self, name: &str, timeout: Duration) -> Result<(), EngineError> {
        let outcome = poll_until(TRANSITION_INTERVAL, timeout, || async move {
            match self.client.get_machine_config(name).await {
                Ok(_) => Ok(None),
                Err(e) if e.is_not_found() => Ok(Some(())),
                Err(e) => {
                    warn!(machine_config = name, error = %e, "MachineConfig fetch failed, retrying");
                    Ok(None)
                }
            }
        })
        .await?;

        match outcome {
            PollOutcome::Ready(()) => Ok(()),
            PollOutcome::TimedOut { elapsed, .. } => Err(EngineError::TransitionTimeout {
                primitive: "wait_for_machine_config_absent",
                target: format!("MachineConfig {}", name),
                predicate: "absent".to_string(),
                elapsed,
            }),
        }
    }

    /// Wait until the pool has been stable for `stable_for` without a break.
    ///
    /// Any unstable observation restarts the window.
    pub async fn wait_pool_stable_for(&self, pool: &str, stable_for: Duration, timeout: Duration) -> Result<(), EngineError> {
        let stable_since: Mutex<Option<Instant>> = Mutex::new(None);
        let stable_since_ref = &stable_since;

        let outcome = poll_until(RESOURCE_INTERVAL, timeout, || async move {
            let stable = match self.client.get_machine_config_pool(pool).await {
                Ok(mcp) => pool_is_stable(&mcp),
                Err(e) if e.is_not_found() => return Err(EngineError::from(e)),
                Err(e) => {
                    warn!(pool, error = %e, "Pool fetch failed, treating as unstable");
                    false
                }
            };

            let now = Instant::now();
            let mut since = match stable_since_ref.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if !stable {
                debug!(pool, "Pool is not stable");
                *since = None;
                return Ok(None);
            }
            let began = *since.get_or_insert(now);
            Ok((now - began >= stable_for).then_some(()))
        })
        .await?;

        match outcome {
            PollOutcome::Ready(()) => {
                info!(pool, ?stable_for, "Pool is stable");
                Ok(())
            }
            PollOutcome::TimedOut { elapsed, .. } => Err(EngineError::TransitionTimeout {
                primitive: "wait_pool_stable_for",
                target: format!("MachineConfigPool {}", pool),
                predicate: format!("stable for {:?}", stable_for),
                elapsed,
            }),
        }
    }

    /// Wait until the pool reports `Updated` with every machine caught up.
    pub async fn wait_pool_updated(&self, pool: &str, timeout: Duration) -> Result<(), EngineError> {
        let outcome = poll_until(TRANSITION_INTERVAL, timeout, || async move {
            match self.client.get_machine_config_pool(pool).await {
                Ok(mcp) => Ok(pool_is_updated(&mcp).then_some(())),
                Err(e) if e.is_not_found() => Err(EngineError::from(e)),
                Err(e) => {
                    warn!(pool, error = %e, "Pool fetch failed, retrying");
                    Ok(None)
                }
            }
        })
        .await?;

        match outcome {
            PollOutcome::Ready(()) => {
                info!(pool, "Pool is updated");
                Ok(())
            }
            PollOutcome::TimedOut { elapsed, .. } => Err(EngineError::TransitionTimeout {
                primitive: "wait_pool_updated",
                target: format!("MachineConfigPool {}", pool),
                predicate: "Updated".to_string(),
                elapsed,
            }),
        }
    }
}

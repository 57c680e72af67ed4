//! Node state reading.
//!
//! Reads the MCO per-node annotation tuple `(current, desired, state)`, the
//! boot id and the Ready condition, and classifies the tuple into the
//! transition states the waiters block on.

use crate::error::EngineError;
use cluster_client::{ClusterClientTrait, NodeSnapshot};
use std::fmt;
use std::sync::Arc;

pub const CURRENT_CONFIG_ANNOTATION: &str = "machineconfiguration.openshift.io/currentConfig";
pub const DESIRED_CONFIG_ANNOTATION: &str = "machineconfiguration.openshift.io/desiredConfig";
pub const STATE_ANNOTATION: &str = "machineconfiguration.openshift.io/state";

/// MCO daemon state meaning "finished the current work item"
pub const MCO_STATE_DONE: &str = "Done";

fn annotation<'a>(node: &'a NodeSnapshot, key: &str) -> &'a str {
    node.annotations.get(key).map(String::as_str).unwrap_or("")
}

/// `machineconfiguration.openshift.io/currentConfig`, empty when missing
pub fn current_config(node: &NodeSnapshot) -> &str {
    annotation(node, CURRENT_CONFIG_ANNOTATION)
}

/// `machineconfiguration.openshift.io/desiredConfig`, empty when missing
pub fn desired_config(node: &NodeSnapshot) -> &str {
    annotation(node, DESIRED_CONFIG_ANNOTATION)
}

/// `machineconfiguration.openshift.io/state`, empty when missing
pub fn state(node: &NodeSnapshot) -> &str {
    annotation(node, STATE_ANNOTATION)
}

/// True iff the `Ready` condition has status `True`.
pub fn is_ready(node: &NodeSnapshot) -> bool {
    node.conditions
        .iter()
        .any(|c| c.type_ == "Ready" && c.status == "True")
}

/// Where a node is in an MCO config transition.
///
/// `Idle` and "applied" share a predicate; which one a caller observes is a
/// matter of context (before or after a reboot).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionState {
    /// current = desired, state = Done
    Idle,
    /// current != desired, state = Done: rendered, waiting for a reboot
    PendingReady,
    /// current != desired, state != Done: the MCO daemon is working
    InProgress,
    /// Anything else, e.g. annotations missing or the daemon degraded
    Unknown,
}

impl fmt::Display for TransitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "IDLE",
            Self::PendingReady => "PENDING-READY",
            Self::InProgress => "IN-PROGRESS",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(label)
    }
}

/// Owned copy of the annotation tuple, for logging and error messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McoTuple {
    pub current: String,
    pub desired: String,
    pub state: String,
}

impl McoTuple {
    pub fn of(node: &NodeSnapshot) -> Self {
        Self {
            current: current_config(node).to_string(),
            desired: desired_config(node).to_string(),
            state: state(node).to_string(),
        }
    }

    /// current != desired, state = Done, and a desired config exists
    pub fn is_pending_ready(&self) -> bool {
        !self.desired.is_empty() && self.current != self.desired && self.state == MCO_STATE_DONE
    }

    /// current = desired, state = Done
    pub fn is_applied(&self) -> bool {
        self.current == self.desired && self.state == MCO_STATE_DONE
    }

    pub fn classify(&self) -> TransitionState {
        if self.is_applied() {
            TransitionState::Idle
        } else if self.is_pending_ready() {
            TransitionState::PendingReady
        } else if self.current != self.desired {
            TransitionState::InProgress
        } else {
            TransitionState::Unknown
        }
    }
}

impl fmt::Display for McoTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(current={:?}, desired={:?}, state={:?})",
            self.current, self.desired, self.state
        )
    }
}

/// Snapshots nodes through the cluster client.
#[derive(Clone)]
pub struct NodeStateReader {
    client: Arc<dyn ClusterClientTrait>,
}

impl NodeStateReader {
    pub fn new(client: Arc<dyn ClusterClientTrait>) -> Self {
        Self { client }
    }

    /// Fetch the node; `NotFound` when it does not exist.
    pub async fn get_node(&self, name: &str) -> Result<NodeSnapshot, EngineError> {
        Ok(self.client.get_node(name).await?)
    }

    pub async fn mco_tuple(&self, name: &str) -> Result<McoTuple, EngineError> {
        Ok(McoTuple::of(&self.get_node(name).await?))
    }

    pub async fn boot_id(&self, name: &str) -> Result<String, EngineError> {
        Ok(self.get_node(name).await?.boot_id)
    }

    pub async fn is_ready(&self, name: &str) -> Result<bool, EngineError> {
        Ok(is_ready(&self.get_node(name).await?))
    }

    /// Nodes labelled `node-role.kubernetes.io/<pool>`, sorted by name
    pub async fn pool_nodes(&self, pool: &str) -> Result<Vec<NodeSnapshot>, EngineError> {
        let mut nodes = self
            .client
            .list_nodes(&format!("node-role.kubernetes.io/{}", pool))
            .await?;
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(nodes)
    }
}

//! Engine error types.
//!
//! Every failure names the primitive that raised it and, for the waiting
//! primitives, the target, the predicate that never held and the elapsed time.

use cluster_client::ClusterError;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the BMC lifecycle engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Node or resource missing
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    /// No Running helper pod with a ready `test` container on the node
    #[error("no ready helper pod on node {node}")]
    NoHelperPod { node: String },

    /// The exec API failed, or the command vector was unusable
    #[error("exec on node {node} failed: {message}")]
    ExecFailed { node: String, message: String },

    /// The command ran and exited non-zero
    #[error("command `{command}` on node {node} exited {code:?}: {output}")]
    NonZeroExit {
        node: String,
        command: String,
        code: Option<i32>,
        output: String,
    },

    /// A waiter's predicate never held before its deadline
    #[error("{primitive}: {target} did not reach `{predicate}` within {elapsed:?}")]
    TransitionTimeout {
        primitive: &'static str,
        target: String,
        predicate: String,
        elapsed: Duration,
    },

    /// A resource never appeared before its deadline
    #[error("{primitive}: {kind} {name} still absent after {elapsed:?}")]
    ResourceAbsent {
        primitive: &'static str,
        kind: &'static str,
        name: String,
        elapsed: Duration,
    },

    /// No helper pod became ready in time to carry a reboot
    #[error("reboot: no ready helper pod on node {node} after {elapsed:?}")]
    HelperNotReady { node: String, elapsed: Duration },

    /// The node kept its pre-reboot boot id
    #[error("reboot: node {node} kept boot id {boot_id} for {elapsed:?}")]
    BootIdUnchanged {
        node: String,
        boot_id: String,
        elapsed: Duration,
    },

    /// The node rebooted but never reported Ready
    #[error("reboot: node {node} not Ready {elapsed:?} after rebooting")]
    NodeNotReady { node: String, elapsed: Duration },

    /// A post-condition of the lifecycle did not hold
    #[error("assertion failed in {step}: {message}")]
    AssertionFailed { step: &'static str, message: String },

    /// The run was interrupted before it finished
    #[error("interrupted after {elapsed:?}; {bmc} and its MachineConfig may need manual cleanup")]
    Interrupted { bmc: String, elapsed: Duration },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Any other cluster API error
    #[error(transparent)]
    Cluster(ClusterError),
}

impl From<ClusterError> for EngineError {
    fn from(err: ClusterError) -> Self {
        match err {
            ClusterError::NotFound { kind, name } => Self::NotFound { kind, name },
            other => Self::Cluster(other),
        }
    }
}

impl EngineError {
    pub fn assertion(step: &'static str, message: impl Into<String>) -> Self {
        Self::AssertionFailed {
            step,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

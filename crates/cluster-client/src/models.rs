//! Snapshot models
//!
//! Flattened, owned views of the Kubernetes objects the engine reads. They are
//! built from `k8s-openapi` types by the real client and constructed directly
//! by the mock, so the engine never touches raw API objects.

use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use std::collections::BTreeMap;

/// Node condition as reported in `.status.conditions[]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConditionSnapshot {
    pub type_: String,
    pub status: String,
}

/// Point-in-time view of a node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeSnapshot {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub conditions: Vec<NodeConditionSnapshot>,
    /// `.status.nodeInfo.bootID`, empty when the kubelet has not reported it
    pub boot_id: String,
}

impl From<&Node> for NodeSnapshot {
    fn from(node: &Node) -> Self {
        let status = node.status.as_ref();

        Self {
            name: node.metadata.name.clone().unwrap_or_default(),
            labels: node.metadata.labels.clone().unwrap_or_default(),
            annotations: node.metadata.annotations.clone().unwrap_or_default(),
            conditions: status
                .and_then(|s| s.conditions.as_ref())
                .map(|conditions| {
                    conditions
                        .iter()
                        .map(|c| NodeConditionSnapshot {
                            type_: c.type_.clone(),
                            status: c.status.clone(),
                        })
                        .collect()
                })
                .unwrap_or_default(),
            boot_id: status
                .and_then(|s| s.node_info.as_ref())
                .map(|info| info.boot_id.clone())
                .unwrap_or_default(),
        }
    }
}

/// Readiness of one container in a pod
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerReadiness {
    pub name: String,
    pub ready: bool,
}

/// Point-in-time view of a pod
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodSnapshot {
    pub name: String,
    pub namespace: String,
    /// `.spec.nodeName`
    pub node_name: Option<String>,
    /// `.status.phase`
    pub phase: Option<String>,
    pub containers: Vec<ContainerReadiness>,
}

impl PodSnapshot {
    /// True when `.status.phase` is `Running`.
    pub fn is_running(&self) -> bool {
        self.phase.as_deref() == Some("Running")
    }

    /// Readiness of the named container; `false` when it has no status yet.
    pub fn container_ready(&self, container: &str) -> bool {
        self.containers
            .iter()
            .any(|c| c.name == container && c.ready)
    }

    pub fn scheduled_on(&self, node: &str) -> bool {
        self.node_name.as_deref() == Some(node)
    }
}

impl From<&Pod> for PodSnapshot {
    fn from(pod: &Pod) -> Self {
        let status = pod.status.as_ref();

        Self {
            name: pod.metadata.name.clone().unwrap_or_default(),
            namespace: pod.metadata.namespace.clone().unwrap_or_default(),
            node_name: pod.spec.as_ref().and_then(|s| s.node_name.clone()),
            phase: status.and_then(|s| s.phase.clone()),
            containers: status
                .and_then(|s| s.container_statuses.as_ref())
                .map(|statuses| {
                    statuses
                        .iter()
                        .map(|c| ContainerReadiness {
                            name: c.name.clone(),
                            ready: c.ready,
                        })
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

/// How an exec session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecStatus {
    Success,
    /// The command ran and exited non-zero (exit code when the API reported it)
    NonZeroExit(Option<i32>),
    /// The exec API itself reported a failure
    Failure(String),
}

impl From<Option<Status>> for ExecStatus {
    fn from(status: Option<Status>) -> Self {
        let Some(status) = status else {
            // Session closed without a status frame (typical when the node reboots)
            return Self::Failure("exec session closed without status".to_string());
        };

        if status.status.as_deref() == Some("Success") {
            return Self::Success;
        }

        if status.reason.as_deref() == Some("NonZeroExitCode") {
            let code = status
                .details
                .as_ref()
                .and_then(|d| d.causes.as_ref())
                .and_then(|causes| {
                    causes
                        .iter()
                        .find(|c| c.reason.as_deref() == Some("ExitCode"))
                })
                .and_then(|c| c.message.as_deref())
                .and_then(|m| m.parse().ok());
            return Self::NonZeroExit(code);
        }

        Self::Failure(
            status
                .message
                .unwrap_or_else(|| "exec failed without message".to_string()),
        )
    }
}

/// Output of a command run through the exec subresource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub status: ExecStatus,
}

impl ExecOutput {
    pub fn success(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: Vec::new(),
            status: ExecStatus::Success,
        }
    }

    pub fn exit_code(code: i32, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            stdout: Vec::new(),
            stderr: stderr.into(),
            status: ExecStatus::NonZeroExit(Some(code)),
        }
    }

    /// stdout followed by stderr
    pub fn combined(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.stdout.len() + self.stderr.len());
        buf.extend_from_slice(&self.stdout);
        buf.extend_from_slice(&self.stderr);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{
        ContainerStatus, NodeCondition, NodeStatus, NodeSystemInfo, PodSpec, PodStatus,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, StatusCause, StatusDetails};

    #[test]
    fn test_node_snapshot_from_api_object() {
        let node = Node {
            metadata: ObjectMeta {
                name: Some("worker-0".to_string()),
                annotations: Some(BTreeMap::from([(
                    "machineconfiguration.openshift.io/state".to_string(),
                    "Done".to_string(),
                )])),
                ..Default::default()
            },
            status: Some(NodeStatus {
                conditions: Some(vec![NodeCondition {
                    type_: "Ready".to_string(),
                    status: "True".to_string(),
                    ..Default::default()
                }]),
                node_info: Some(NodeSystemInfo {
                    boot_id: "boot-a".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };

        let snapshot = NodeSnapshot::from(&node);
        assert_eq!(snapshot.name, "worker-0");
        assert_eq!(snapshot.boot_id, "boot-a");
        assert!(snapshot.labels.is_empty());
        assert_eq!(snapshot.conditions[0].type_, "Ready");
        assert_eq!(
            snapshot.annotations["machineconfiguration.openshift.io/state"],
            "Done"
        );
    }

    #[test]
    fn test_node_snapshot_without_status() {
        let node = Node {
            metadata: ObjectMeta {
                name: Some("worker-1".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        let snapshot = NodeSnapshot::from(&node);
        assert_eq!(snapshot.boot_id, "");
        assert!(snapshot.conditions.is_empty());
    }

    #[test]
    fn test_pod_snapshot_readiness() {
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some("helper-x".to_string()),
                namespace: Some("kmm-e2e-helpers".to_string()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                node_name: Some("worker-0".to_string()),
                ..Default::default()
            }),
            status: Some(PodStatus {
                phase: Some("Running".to_string()),
                container_statuses: Some(vec![ContainerStatus {
                    name: "test".to_string(),
                    ready: true,
                    ..Default::default()
                }]),
                ..Default::default()
            }),
        };

        let snapshot = PodSnapshot::from(&pod);
        assert!(snapshot.is_running());
        assert!(snapshot.scheduled_on("worker-0"));
        assert!(snapshot.container_ready("test"));
        assert!(!snapshot.container_ready("other"));
    }

    #[test]
    fn test_exec_status_decoding() {
        assert_eq!(
            ExecStatus::from(Some(Status {
                status: Some("Success".to_string()),
                ..Default::default()
            })),
            ExecStatus::Success
        );

        let non_zero = Status {
            status: Some("Failure".to_string()),
            reason: Some("NonZeroExitCode".to_string()),
            details: Some(StatusDetails {
                causes: Some(vec![StatusCause {
                    reason: Some("ExitCode".to_string()),
                    message: Some("2".to_string()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(ExecStatus::from(Some(non_zero)), ExecStatus::NonZeroExit(Some(2)));

        assert!(matches!(ExecStatus::from(None), ExecStatus::Failure(_)));
    }

    #[test]
    fn test_combined_output_orders_stdout_first() {
        let output = ExecOutput {
            stdout: b"out\n".to_vec(),
            stderr: b"err\n".to_vec(),
            status: ExecStatus::Success,
        };
        assert_eq!(output.combined(), b"out\nerr\n".to_vec());
    }
}

//! MachineConfigPool CRD
//!
//! Groups nodes that share a rendered MachineConfig. The engine only reads the
//! rollout counters and conditions to decide whether a pool is stable.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[kube(
    group = "machineconfiguration.openshift.io",
    version = "v1",
    kind = "MachineConfigPool",
    status = "MachineConfigPoolStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfigPoolSpec {
    /// Whether the MCO is allowed to roll out changes to this pool
    #[serde(default)]
    pub paused: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfigPoolStatus {
    #[serde(default)]
    pub machine_count: i64,

    #[serde(default)]
    pub updated_machine_count: i64,

    #[serde(default)]
    pub ready_machine_count: i64,

    #[serde(default)]
    pub unavailable_machine_count: i64,

    #[serde(default)]
    pub degraded_machine_count: i64,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<PoolCondition>,
}

/// One `status.conditions[]` entry (`Updated`, `Updating`, `Degraded`, ...)
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PoolCondition {
    #[serde(rename = "type")]
    pub type_: String,

    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl MachineConfigPoolStatus {
    /// True when the condition of the given type reports `True`.
    pub fn condition_is_true(&self, type_: &str) -> bool {
        self.conditions
            .iter()
            .any(|c| c.type_ == type_ && c.status == "True")
    }

    /// All machines are updated and ready.
    pub fn counts_converged(&self) -> bool {
        self.machine_count == self.updated_machine_count
            && self.machine_count == self.ready_machine_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_cluster_json() {
        let status: MachineConfigPoolStatus = serde_json::from_value(serde_json::json!({
            "machineCount": 3,
            "updatedMachineCount": 2,
            "readyMachineCount": 2,
            "degradedMachineCount": 0,
            "conditions": [
                {"type": "Updating", "status": "True"},
                {"type": "Updated", "status": "False", "reason": ""}
            ]
        }))
        .unwrap();

        assert!(status.condition_is_true("Updating"));
        assert!(!status.condition_is_true("Updated"));
        assert!(!status.counts_converged());
        assert_eq!(status.unavailable_machine_count, 0);
    }
}

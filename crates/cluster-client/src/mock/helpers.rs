//! Helper functions for building snapshot and CR fixtures

use crate::models::*;
use crds::{
    MachineConfig, MachineConfigPool, MachineConfigPoolSpec, MachineConfigPoolStatus,
    MachineConfigSpec, PoolCondition,
};
use std::collections::BTreeMap;

pub const CURRENT_CONFIG_ANNOTATION: &str = "machineconfiguration.openshift.io/currentConfig";
pub const DESIRED_CONFIG_ANNOTATION: &str = "machineconfiguration.openshift.io/desiredConfig";
pub const STATE_ANNOTATION: &str = "machineconfiguration.openshift.io/state";

/// Ready node with the given boot id and no MCO annotations
pub fn ready_node(name: &str, boot_id: &str) -> NodeSnapshot {
    NodeSnapshot {
        name: name.to_string(),
        labels: BTreeMap::from([(
            "node-role.kubernetes.io/worker".to_string(),
            String::new(),
        )]),
        annotations: BTreeMap::new(),
        conditions: vec![NodeConditionSnapshot {
            type_: "Ready".to_string(),
            status: "True".to_string(),
        }],
        boot_id: boot_id.to_string(),
    }
}

/// Same node with the Ready condition flipped to `False`
pub fn not_ready(mut node: NodeSnapshot) -> NodeSnapshot {
    for condition in &mut node.conditions {
        if condition.type_ == "Ready" {
            condition.status = "False".to_string();
        }
    }
    node
}

/// Set the three MCO per-node annotations
pub fn with_mco(mut node: NodeSnapshot, current: &str, desired: &str, state: &str) -> NodeSnapshot {
    node.annotations
        .insert(CURRENT_CONFIG_ANNOTATION.to_string(), current.to_string());
    node.annotations
        .insert(DESIRED_CONFIG_ANNOTATION.to_string(), desired.to_string());
    node.annotations
        .insert(STATE_ANNOTATION.to_string(), state.to_string());
    node
}

/// Running helper pod whose `test` container is ready
pub fn helper_pod(name: &str, namespace: &str, node: &str) -> PodSnapshot {
    PodSnapshot {
        name: name.to_string(),
        namespace: namespace.to_string(),
        node_name: Some(node.to_string()),
        phase: Some("Running".to_string()),
        containers: vec![ContainerReadiness {
            name: "test".to_string(),
            ready: true,
        }],
    }
}

/// MachineConfig whose ignition carries a single systemd unit with `contents`
pub fn machine_config(name: &str, unit_contents: &str) -> MachineConfig {
    MachineConfig::new(
        name,
        MachineConfigSpec {
            config: Some(serde_json::json!({
                "ignition": {"version": "3.2.0"},
                "systemd": {
                    "units": [{
                        "name": "kmm-boot.service",
                        "enabled": true,
                        "contents": unit_contents,
                    }]
                }
            })),
            ..Default::default()
        },
    )
}

/// Pool with the given counters; `Updated` is derived from them
pub fn pool(name: &str, machines: i64, updated: i64, ready: i64, degraded: i64) -> MachineConfigPool {
    let converged = machines == updated && machines == ready && degraded == 0;
    let flag = |on: bool| (if on { "True" } else { "False" }).to_string();

    let mut pool = MachineConfigPool::new(name, MachineConfigPoolSpec::default());
    pool.status = Some(MachineConfigPoolStatus {
        machine_count: machines,
        updated_machine_count: updated,
        ready_machine_count: ready,
        unavailable_machine_count: machines - ready,
        degraded_machine_count: degraded,
        conditions: vec![
            PoolCondition {
                type_: "Updated".to_string(),
                status: flag(converged),
                ..Default::default()
            },
            PoolCondition {
                type_: "Updating".to_string(),
                status: flag(!converged),
                ..Default::default()
            },
        ],
    });
    pool
}

/// Minimal equality-based label selector matching (`k=v`, `k`, comma-joined)
pub fn selector_matches(selector: &str, labels: &BTreeMap<String, String>) -> bool {
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((key, value)) => labels.get(key.trim()).map(String::as_str) == Some(value.trim()),
            None => labels.contains_key(term),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_matches() {
        let labels = BTreeMap::from([
            ("app".to_string(), "kmm-e2e-helper".to_string()),
            ("node-role.kubernetes.io/worker".to_string(), String::new()),
        ]);

        assert!(selector_matches("app=kmm-e2e-helper", &labels));
        assert!(selector_matches("node-role.kubernetes.io/worker", &labels));
        assert!(selector_matches("", &labels));
        assert!(!selector_matches("app=other", &labels));
        assert!(!selector_matches("node-role.kubernetes.io/master", &labels));
    }

    #[test]
    fn test_pool_fixture_conditions() {
        let stable = pool("worker", 2, 2, 2, 0);
        let status = stable.status.unwrap();
        assert!(status.condition_is_true("Updated"));
        assert!(!status.condition_is_true("Updating"));

        let rolling = pool("worker", 2, 1, 1, 0).status.unwrap();
        assert!(rolling.condition_is_true("Updating"));
        assert_eq!(rolling.unavailable_machine_count, 1);
    }
}

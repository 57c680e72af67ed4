//! BootModuleConfig CRD
//!
//! Asks KMM to load an out-of-tree kernel module at boot on every node of a
//! MachineConfigPool. KMM answers by rendering a MachineConfig; the node only
//! picks it up after a reboot.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// API group served by the Kernel Module Management operator.
pub const KMM_API_GROUP: &str = "kmm.sigs.x-k8s.io";

/// Placeholder KMM expands on the node with the running kernel's version.
pub const KERNEL_FULL_VERSION_PLACEHOLDER: &str = "$KERNEL_FULL_VERSION";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[kube(
    group = "kmm.sigs.x-k8s.io",
    version = "v1beta1",
    kind = "BootModuleConfig",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct BootModuleConfigSpec {
    /// Kernel module container image (may contain `$KERNEL_FULL_VERSION`)
    pub kernel_module_image: String,

    /// Name of the out-of-tree kernel module to load
    pub kernel_module_name: String,

    /// Name of the MachineConfig KMM renders for this BMC
    pub machine_config_name: String,

    /// MachineConfigPool whose nodes receive the module
    pub machine_config_pool_name: String,

    /// Worker image override (KMM picks its own default when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_image: Option<String>,

    /// Host path firmware files are copied into before the module loads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_files_path: Option<String>,

    /// In-tree modules unloaded before the out-of-tree module is loaded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_tree_modules_to_remove: Option<Vec<String>>,
}

impl BootModuleConfigSpec {
    /// In-tree modules to remove, empty when the field is unset.
    pub fn in_tree_modules(&self) -> &[String] {
        self.in_tree_modules_to_remove.as_deref().unwrap_or_default()
    }

    /// Whether the spec asks KMM to stage firmware.
    /// Whether the image reference is resolved per node kernel
    pub fn image_tracks_kernel(&self) -> bool {
        self.kernel_module_image.contains(KERNEL_FULL_VERSION_PLACEHOLDER)
    }

    pub fn wants_firmware(&self) -> bool {
        self.firmware_files_path
            .as_deref()
            .is_some_and(|path| !path.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_serializes_camel_case_and_skips_unset() {
        let spec = BootModuleConfigSpec {
            kernel_module_image: "quay.io/kmm/simple-kmod:$KERNEL_FULL_VERSION".to_string(),
            kernel_module_name: "simple-kmod".to_string(),
            machine_config_name: "10-kmod".to_string(),
            machine_config_pool_name: "worker".to_string(),
            ..Default::default()
        };

        let value = serde_json::to_value(&spec).unwrap();
        assert_eq!(value["kernelModuleName"], "simple-kmod");
        assert_eq!(value["machineConfigPoolName"], "worker");
        assert!(value.get("firmwareFilesPath").is_none());
        assert!(value.get("inTreeModulesToRemove").is_none());
        assert!(spec.in_tree_modules().is_empty());
        assert!(!spec.wants_firmware());
        assert!(spec.image_tracks_kernel());
    }

    #[test]
    fn test_resource_group_and_pinned_image() {
        assert_eq!(<BootModuleConfig as kube::Resource>::group(&()), KMM_API_GROUP);

        let spec = BootModuleConfigSpec {
            kernel_module_image: "quay.io/kmm/simple-kmod:5.14.0-284".to_string(),
            ..Default::default()
        };
        assert!(!spec.image_tracks_kernel());
    }

    #[test]
    fn test_in_tree_modules_roundtrip_from_cluster_json() {
        let spec: BootModuleConfigSpec = serde_json::from_value(serde_json::json!({
            "kernelModuleImage": "img",
            "kernelModuleName": "simple-kmod",
            "machineConfigName": "10-kmod",
            "machineConfigPoolName": "worker",
            "inTreeModulesToRemove": ["ib_ipoib"],
            "firmwareFilesPath": "/var/lib/firmware"
        }))
        .unwrap();

        assert_eq!(spec.in_tree_modules(), ["ib_ipoib".to_string()]);
        assert!(spec.wants_firmware());
    }
}

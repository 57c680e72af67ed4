//! Scenario configuration from environment variables.

use crate::driver::{BmcScenario, DEFAULT_FIRMWARE_MARKER};
use crate::error::EngineError;
use crds::BootModuleConfigSpec;
use std::env;
use tracing::warn;
use uuid::Uuid;

const DEFAULT_NAMESPACE: &str = "openshift-kmm";
const DEFAULT_POOL: &str = "worker";
const DEFAULT_HELPER_NAMESPACE: &str = "kmm-e2e-helpers";

/// Everything one run of the driver needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    pub scenario: BmcScenario,
    pub helper_namespace: String,
}

impl DriverConfig {
    /// Read the configuration from the process environment.
    pub fn from_env(run_id: &Uuid) -> Result<Self, EngineError> {
        Self::from_lookup(|key| env::var(key).ok(), run_id)
    }

    /// Read the configuration through `lookup`; empty values count as unset.
    pub fn from_lookup<F>(lookup: F, run_id: &Uuid) -> Result<Self, EngineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let required = |key: &str| {
            get(key).ok_or_else(|| {
                EngineError::InvalidConfig(format!("{} environment variable is required", key))
            })
        };

        let spec = BootModuleConfigSpec {
            kernel_module_image: required("KERNEL_MODULE_IMAGE")?,
            kernel_module_name: required("KERNEL_MODULE")?,
            machine_config_name: required("MACHINE_CONFIG_NAME")?,
            machine_config_pool_name: get("MACHINE_CONFIG_POOL").unwrap_or_else(|| DEFAULT_POOL.to_string()),
            worker_image: get("WORKER_IMAGE"),
            firmware_files_path: get("FIRMWARE_FILES_PATH"),
            in_tree_modules_to_remove: get("IN_TREE_MODULES_TO_REMOVE").map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|module| !module.is_empty())
                    .map(String::from)
                    .collect()
            }),
        };

        if !spec.image_tracks_kernel() {
            warn!(
                image = %spec.kernel_module_image,
                placeholder = crds::KERNEL_FULL_VERSION_PLACEHOLDER,
                "Kernel module image is pinned, it will not follow the node kernel"
            );
        }

        let name = get("BMC_NAME").unwrap_or_else(|| {
            let simple = run_id.simple().to_string();
            format!("bmc-e2e-{}", &simple[..8])
        });
        let namespace = get("BMC_NAMESPACE").unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

        let mut scenario = BmcScenario::new(name, namespace, spec);
        scenario.target_node = get("TARGET_NODE");
        scenario.firmware_marker =
            get("FIRMWARE_DMESG_MARKER").unwrap_or_else(|| DEFAULT_FIRMWARE_MARKER.to_string());

        Ok(Self {
            scenario,
            helper_namespace: get("HELPER_NAMESPACE").unwrap_or_else(|| DEFAULT_HELPER_NAMESPACE.to_string()),
        })
    }
}

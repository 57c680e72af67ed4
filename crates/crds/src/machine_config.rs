//! MachineConfig CRD
//!
//! Cluster-scoped rendered node configuration owned by the Machine Config
//! Operator. Only the fields the e2e engine reads are modelled; the ignition
//! payload is kept as opaque JSON.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// API group of the Machine Config Operator.
pub const MCO_API_GROUP: &str = "machineconfiguration.openshift.io";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "machineconfiguration.openshift.io",
    version = "v1",
    kind = "MachineConfig"
)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfigSpec {
    /// Ignition payload, never parsed structurally
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,

    /// Extra kernel arguments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel_arguments: Option<Vec<String>>,

    /// OS image override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "osImageURL")]
    pub os_image_url: Option<String>,
}

impl MachineConfig {
    /// The ignition payload as the bytes the API server returned.
    ///
    /// An absent payload is an empty buffer.
    pub fn payload(&self) -> Vec<u8> {
        self.spec
            .config
            .as_ref()
            .and_then(|config| serde_json::to_vec(config).ok())
            .unwrap_or_default()
    }
}

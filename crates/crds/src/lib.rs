//! KMM e2e CRD Definitions
//!
//! Typed Kubernetes custom resources the BMC lifecycle engine creates or
//! observes. None of them are owned by this repository: BootModuleConfig
//! belongs to KMM, MachineConfig and MachineConfigPool to the MCO.

pub mod boot_module_config;
pub mod machine_config;
pub mod machine_config_pool;

pub use boot_module_config::*;
pub use machine_config::*;
pub use machine_config_pool::*;

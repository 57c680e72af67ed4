//! Cluster substrate for the KMM BootModuleConfig e2e engine
//!
//! Everything the engine needs from the cluster goes through
//! [`ClusterClientTrait`]: node snapshots, helper-pod discovery, the pod exec
//! subresource, MachineConfig/MachineConfigPool reads and BootModuleConfig
//! CRUD.
//!
//! # Example
//!
//! ```no_run
//! use cluster_client::{ClusterClient, ClusterClientTrait};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ClusterClient::try_default().await?;
//!
//! let node = client.get_node("worker-0").await?;
//! println!("boot id: {}", node.boot_id);
//!
//! let output = client
//!     .exec("kmm-e2e-helpers", "helper-abcde", "test", &["lsmod".to_string()])
//!     .await?;
//! println!("{}", String::from_utf8_lossy(&output.stdout));
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - `test-util`: enables [`MockClusterClient`], an in-memory cluster with
//!   scriptable node/pool reads and exec handlers

pub mod client;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod cluster_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::ClusterClient;
pub use error::ClusterError;
pub use models::*;
pub use cluster_trait::ClusterClientTrait;
#[cfg(feature = "test-util")]
pub use mock::{ExecCall, MockClusterClient};

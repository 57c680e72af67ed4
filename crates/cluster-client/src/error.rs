//! Cluster client errors

use thiserror::Error;

/// Errors that can occur when talking to the cluster API
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Kubernetes API request/response error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// The named object does not exist
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    /// The exec subresource failed before the command produced a status
    #[error("Exec error: {0}")]
    Exec(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The API server could not be reached (used by the mock to script
    /// transient failures)
    #[error("Cluster unavailable: {0}")]
    Unavailable(String),
}

impl ClusterError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// True for `NotFound`, whatever the kind.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

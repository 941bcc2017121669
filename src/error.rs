//! Error types for the pgfleet operation core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// A referenced resource does not exist
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    /// The requested operation is not in the known set
    #[error("unknown database operation: {0}")]
    InvalidOperation(String),

    /// Another holder owns the cluster lock
    #[error("cluster {cluster} is locked by {holder}")]
    LockConflict { cluster: String, holder: String },

    /// The cluster lock was taken over while the operation was running
    #[error("lock on cluster {0} was lost while the operation was running")]
    LockLost(String),

    /// A watch subscription terminated with an error
    #[error("watch subscription error: {0}")]
    WatchError(String),

    /// A database operation executor failed
    #[error("operation failed: {0}")]
    OperationFailure(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl Error {
    pub fn not_found(kind: &'static str, namespace: &str, name: &str) -> Self {
        Error::NotFound {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Whether the API server rejected a conditional write because the
    /// resource version was stale
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::KubeError(kube::Error::Api(resp)) if resp.code == 409)
    }

    /// Whether retrying the same call later could succeed
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Error::KubeError(_) | Error::LockConflict { .. } | Error::LockLost(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

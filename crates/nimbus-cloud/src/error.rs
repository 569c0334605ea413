//! Error types for transport and reconciliation failures

use crate::model::ServerRecord;
use thiserror::Error;

/// Failures reported by a [`ComputeClient`](crate::ComputeClient) implementation
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Command execution failed: {0}")]
    CommandFailed(String),

    #[error("Floating IP pool exhausted: {0}")]
    PoolExhausted(String),

    #[error("Floating IP not available: {0}")]
    AddressUnavailable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;

/// Kind of catalog entry a reference failed to resolve against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Image,
    Flavor,
    Network,
    Port,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Image => write!(f, "image"),
            ResourceKind::Flavor => write!(f, "flavor"),
            ResourceKind::Network => write!(f, "network"),
            ResourceKind::Port => write!(f, "port"),
        }
    }
}

/// Reconciliation failures
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Conflicting server specification: {0}")]
    SpecConflict(String),

    #[error("Could not resolve {kind} '{reference}': {reason}")]
    NotFound {
        kind: ResourceKind,
        reference: String,
        reason: String,
    },

    #[error("Server '{name}' is in {status} state and needs manual intervention")]
    InstanceInErrorState { name: String, status: String },

    #[error("Server '{name}' did not become ACTIVE within {timeout_secs}s (last status: {status})")]
    ProvisioningTimeout {
        name: String,
        status: String,
        timeout_secs: u64,
    },

    #[error("Server '{name}' was still present {timeout_secs}s after deletion was requested")]
    DeletionTimeout { name: String, timeout_secs: u64 },

    #[error("Floating IP allocation failed for server '{name}': {reason}")]
    AllocationFailed { name: String, reason: String },

    #[error("Every floating IP pool is exhausted: {}", pools.join(", "))]
    PoolExhausted { pools: Vec<String> },

    #[error(transparent)]
    Cloud(#[from] CloudError),
}

impl ReconcileError {
    pub(crate) fn not_found(
        kind: ResourceKind,
        reference: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            kind,
            reference: reference.into(),
            reason: reason.into(),
        }
    }

    /// Whether re-invoking reconciliation later may succeed without changing the spec
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReconcileError::ProvisioningTimeout { .. }
                | ReconcileError::DeletionTimeout { .. }
                | ReconcileError::Cloud(_)
        )
    }
}

/// A failed reconciliation together with the last record observed before the failure.
///
/// When an instance was created but a later step failed, `record` still carries it so the
/// caller does not lose track of the resource.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct ReconcileFailure {
    #[source]
    pub error: ReconcileError,
    pub record: Option<Box<ServerRecord>>,
}

impl ReconcileFailure {
    pub fn new(error: ReconcileError) -> Self {
        Self {
            error,
            record: None,
        }
    }

    pub fn with_record(error: ReconcileError, record: ServerRecord) -> Self {
        Self {
            error,
            record: Some(Box::new(record)),
        }
    }
}

impl From<ReconcileError> for ReconcileFailure {
    fn from(error: ReconcileError) -> Self {
        Self::new(error)
    }
}

impl From<CloudError> for ReconcileFailure {
    fn from(error: CloudError) -> Self {
        Self::new(ReconcileError::Cloud(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_exhausted_message_lists_pools() {
        let err = ReconcileError::PoolExhausted {
            pools: vec!["public".to_string(), "backup".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Every floating IP pool is exhausted: public, backup"
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(
            ReconcileError::DeletionTimeout {
                name: "vm1".to_string(),
                timeout_secs: 10,
            }
            .is_retryable()
        );
        assert!(!ReconcileError::SpecConflict("image and root_volume".to_string()).is_retryable());
    }
}

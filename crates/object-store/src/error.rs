//! Object store errors

use thiserror::Error;

/// Errors that can occur when talking to the object store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Object does not exist
    #[error("{kind} {key} not found")]
    NotFound {
        /// Resource kind
        kind: String,
        /// namespace/name
        key: String,
    },

    /// Optimistic concurrency failure or concurrent create
    #[error("conflict writing {kind} {key}")]
    Conflict {
        /// Resource kind
        kind: String,
        /// namespace/name
        key: String,
    },

    /// Transport or client error from kube
    #[error("Kubernetes client error: {0}")]
    Kube(#[from] kube::Error),

    /// API server rejected the request
    #[error("API error: {0}")]
    Api(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Call aborted before completion (deadline exceeded)
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// Object is missing identity or otherwise unusable
    #[error("invalid object: {0}")]
    InvalidObject(String),
}

impl StoreError {
    /// True for [`StoreError::NotFound`]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// True for [`StoreError::Conflict`]
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    pub(crate) fn not_found(kind: &str, key: impl std::fmt::Display) -> Self {
        StoreError::NotFound {
            kind: kind.to_string(),
            key: key.to_string(),
        }
    }

    pub(crate) fn conflict(kind: &str, key: impl std::fmt::Display) -> Self {
        StoreError::Conflict {
            kind: kind.to_string(),
            key: key.to_string(),
        }
    }
}

//! Controller-specific error types.
//!
//! Every error carries a class that decides what the reconcile loop does
//! with it: transient errors are retried with backoff, configuration errors
//! are reported on the HostedCluster and not retried until the spec changes,
//! and fatal errors are logged loudly.

use std::time::Duration;

use kube::Error as KubeError;
use object_store::StoreError;
use thiserror::Error;

/// Errors that can occur in the HostedCluster controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Object store error
    #[error("Object store error: {0}")]
    Store(#[from] StoreError),

    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A referenced object does not exist yet
    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    /// A desired object could not be built
    #[error("Failed to build {0}")]
    Build(String),

    /// Certificate generation failed
    #[error("PKI error: {0}")]
    Pki(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Probe/metrics server failed
    #[error("Server error: {0}")]
    Server(String),

    /// Reconcile deadline exceeded
    #[error("Reconcile timed out after {0:?}")]
    Timeout(Duration),

    /// Error annotated with what was being done
    #[error("{context}: {source}")]
    Context {
        /// What failed
        context: String,
        /// Underlying error
        #[source]
        source: Box<ControllerError>,
    },
}

/// How the reconcile loop treats an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retry with backoff
    Transient,
    /// Report on the resource, wait for a spec change
    Configuration,
    /// Programmer error
    Fatal,
}

impl ControllerError {
    /// Classify the error
    pub fn class(&self) -> ErrorClass {
        match self {
            ControllerError::Store(StoreError::Serialization(_) | StoreError::InvalidObject(_)) => {
                ErrorClass::Fatal
            }
            ControllerError::Store(_)
            | ControllerError::Kube(_)
            | ControllerError::MissingDependency(_)
            | ControllerError::Watch(_)
            | ControllerError::Server(_)
            | ControllerError::Timeout(_) => ErrorClass::Transient,
            ControllerError::InvalidConfig(_) => ErrorClass::Configuration,
            ControllerError::Build(_) | ControllerError::Pki(_) => ErrorClass::Fatal,
            ControllerError::Context { source, .. } => source.class(),
        }
    }

    /// True when the underlying failure is an optimistic concurrency conflict
    pub fn is_conflict(&self) -> bool {
        match self {
            ControllerError::Store(e) => e.is_conflict(),
            ControllerError::Context { source, .. } => source.is_conflict(),
            _ => false,
        }
    }

    /// Wrap with a description of the failed step
    #[must_use]
    pub fn context(self, context: impl Into<String>) -> Self {
        ControllerError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Attach context to fallible results
pub trait ResultExt<T> {
    /// Wrap the error, if any, with a lazily built description
    fn with_context<F>(self, f: F) -> Result<T, ControllerError>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<ControllerError>,
{
    fn with_context<F>(self, f: F) -> Result<T, ControllerError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().context(f()))
    }
}

//! Error types for run-level failures of the reconciler.
//!
//! Failures of individual actions are recorded in the
//! [`ReconcileReport`](crate::ReconcileReport) instead of being returned.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;

/// Errors that abort a reconciler operation.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// Invalid executor or job configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Reason for invalidity.
        reason: String,
    },

    /// A replication rule names a registry outside the fleet.
    #[error("registry '{name}' is not part of the fleet")]
    UnknownRegistry {
        /// Registry name.
        name: String,
    },

    /// A core operation failed.
    #[error(transparent)]
    Core(#[from] regfleet_core::Error),

    /// Writing or removing a manifest failed.
    #[error("failed to access {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A resource could not be serialized.
    #[error("failed to serialize {resource}: {reason}")]
    Serialization {
        /// Resource description.
        resource: String,
        /// Failure reason.
        reason: String,
    },

    /// The Kubernetes API rejected a request.
    #[error("kubernetes request for {resource} failed: {source}")]
    Kube {
        /// Resource description.
        resource: String,
        /// Underlying error.
        #[source]
        source: kube::Error,
    },
}

impl ReconcileError {
    /// Creates an [`ReconcileError::InvalidConfig`] error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}

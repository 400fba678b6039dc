//! Error types for the operator.
//!
//! Only transient failures are errors here. Schedule rejections and ownership
//! conflicts are reconcile outcomes and never reach the controller's error
//! policy.

/// The result type used throughout cronprimer-operator.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reconciling.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A Kubernetes API call failed.
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// A core operation failed.
    #[error(transparent)]
    Core(#[from] cronprimer_core::Error),

    /// An object lacks a field the operator relies on.
    #[error("{kind} {name:?} has no {field}")]
    MissingField {
        /// Object kind.
        kind: &'static str,
        /// Object name, if known.
        name: String,
        /// The missing field.
        field: &'static str,
    },

    /// The in-memory cluster rejected an operation.
    #[error("cluster error: {message}")]
    Cluster {
        /// Description of the failure.
        message: String,
    },
}

impl Error {
    /// Creates a missing-field error.
    #[must_use]
    pub fn missing(kind: &'static str, name: impl Into<String>, field: &'static str) -> Self {
        Self::MissingField {
            kind,
            name: name.into(),
            field,
        }
    }

    /// Creates a cluster error.
    #[must_use]
    pub fn cluster(message: impl Into<String>) -> Self {
        Self::Cluster {
            message: message.into(),
        }
    }
}

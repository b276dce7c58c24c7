//! Error types for crane pipeline operations.

use crate::annotations::CranePipelineAction;
use thiserror::Error;

/// Errors that can occur while loading, creating or mutating pipeline resources.
#[derive(Debug, Error)]
pub enum CraneError {
    /// Kubernetes API error.
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// Resource not found.
    #[error("Resource not found: {kind}/{name} in namespace {namespace}")]
    NotFound {
        /// Resource kind.
        kind: String,
        /// Resource name.
        name: String,
        /// Resource namespace.
        namespace: String,
    },

    /// The group has no run for the requested action, so nothing can be started or cloned.
    #[error("Pipeline group {group} has no {action} PipelineRun to start")]
    NoPipelineRun {
        /// Group name.
        group: String,
        /// Requested action.
        action: CranePipelineAction,
    },

    /// An object returned by the API server carries no uid and cannot own other objects.
    #[error("{kind}/{name} has no uid; cannot build an owner reference")]
    MissingUid {
        /// Resource kind.
        kind: String,
        /// Resource name.
        name: String,
    },

    /// The set of resources to import is inconsistent.
    #[error("Invalid import resources: {0}")]
    InvalidResources(String),

    /// A YAML document could not be parsed.
    #[error("Invalid YAML in {document}: {message}")]
    Yaml {
        /// Which document failed (e.g. "cutover PipelineRun").
        document: String,
        /// Parser message.
        message: String,
    },

    /// Watched state did not reach the expected condition in time.
    #[error("Timed out after {waited:?} waiting for {condition}")]
    WatchTimeout {
        /// What was being waited for.
        condition: String,
        /// How long the caller waited.
        waited: std::time::Duration,
    },

    /// The watch feeding a subscription was dropped.
    #[error("Watch closed")]
    WatchClosed,

    /// A spawned operation was cancelled before it finished.
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(String),
}

/// Result type for crane pipeline operations.
pub type CraneResult<T> = Result<T, CraneError>;

impl From<serde_json::Error> for CraneError {
    fn from(err: serde_json::Error) -> Self {
        CraneError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for CraneError {
    fn from(err: serde_yaml::Error) -> Self {
        CraneError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for CraneError {
    fn from(err: std::io::Error) -> Self {
        CraneError::IoError(err.to_string())
    }
}

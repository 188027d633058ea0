//! Error types for the opflow engine.
//!
//! The taxonomy separates storage-level failures (which the manager turns
//! into delayed retries or resolves in-process) from terminal, caller-visible
//! operation failures.

use crate::core::OperationType;
use std::time::Duration;
use thiserror::Error;

/// Boxed error used to carry the underlying cause of a step failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The main error type for opflow operations.
#[derive(Debug, Error)]
pub enum OpflowError {
    /// The storage port rejected a read or write.
    #[error("{0}")]
    Storage(#[from] StorageError),

    /// A pipeline definition is invalid.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// The operation was marked as failed.
    #[error("{description}{}", render_cause(.source))]
    OperationFailed {
        /// Human-readable failure reason, also stored as `LastError.reason`.
        description: String,
        /// The error the step observed, if any.
        #[source]
        source: Option<BoxError>,
    },

    /// The retry budget of a step was exhausted and the operation failed.
    #[error("too many retries (gave up after {max_time:?}): {source}")]
    RetriesExhausted {
        /// The budget that was exhausted.
        max_time: Duration,
        /// The failure recorded on the operation.
        #[source]
        source: Box<OpflowError>,
    },

    /// No pipeline is registered for the operation type.
    #[error("no pipeline registered for operation type '{0}'")]
    NoPipeline(OperationType),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn render_cause(source: &Option<BoxError>) -> String {
    source
        .as_ref()
        .map(|err| format!(": {err}"))
        .unwrap_or_default()
}

impl OpflowError {
    /// Creates an operation failure with an optional cause.
    #[must_use]
    pub fn operation_failed(description: impl Into<String>, cause: Option<anyhow::Error>) -> Self {
        Self::OperationFailed {
            description: description.into(),
            source: cause.map(Into::into),
        }
    }

    /// Returns the storage error, if this is one.
    #[must_use]
    pub fn as_storage(&self) -> Option<&StorageError> {
        match self {
            Self::Storage(err) => Some(err),
            _ => None,
        }
    }
}

/// Errors returned by an [`OperationStorage`](crate::storage::OperationStorage) backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// No operation matched the lookup.
    #[error("operation not found: {key}")]
    NotFound {
        /// The operation id or lookup key.
        key: String,
    },

    /// An operation with the same id is already stored.
    #[error("operation already exists: {id}")]
    AlreadyExists {
        /// The duplicated operation id.
        id: String,
    },

    /// Optimistic concurrency conflict: the stored version moved on.
    #[error("conflict on operation {id}: expected version {expected_version}, stored version {actual_version}")]
    Conflict {
        /// The operation id.
        id: String,
        /// The version carried by the rejected write.
        expected_version: u64,
        /// The version currently stored.
        actual_version: u64,
    },

    /// A backend-specific failure (connection, serialization, ...).
    #[error("storage backend error: {0}")]
    Internal(String),
}

impl StorageError {
    /// Creates a not found error.
    #[must_use]
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Creates an internal backend error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true for a missing operation.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true for a version conflict.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Error raised when a pipeline definition fails validation.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The steps involved in the error.
    pub steps: Vec<String>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            steps: Vec::new(),
        }
    }

    /// Sets the steps involved.
    #[must_use]
    pub fn with_steps(mut self, steps: Vec<String>) -> Self {
        self.steps = steps;
        self
    }

    /// A pipeline was built without steps.
    #[must_use]
    pub fn empty(pipeline: &str) -> Self {
        Self::new(format!("pipeline '{pipeline}' has no steps"))
    }

    /// Two steps of one pipeline share a name, which would break resumption.
    #[must_use]
    pub fn duplicate_step(pipeline: &str, step: &str) -> Self {
        Self::new(format!("pipeline '{pipeline}' contains step '{step}' more than once"))
            .with_steps(vec![step.to_string()])
    }
}

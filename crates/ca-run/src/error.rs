// error.rs — Error types for the run lifecycle subsystem.

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during run lifecycle operations.
#[derive(Debug, Error)]
pub enum RunError {
    /// A file I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: String,
        source: std::io::Error,
    },

    /// Failed to serialize/deserialize run data.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The requested run was not found.
    #[error("run not found: {0}")]
    NotFound(Uuid),

    /// Invalid pipeline stage transition.
    #[error("invalid transition from {from} to {to} for run {run_id}")]
    InvalidTransition {
        run_id: Uuid,
        from: String,
        to: String,
    },

    /// The run scope is missing a required element.
    #[error("invalid scope for run {run_id}: {detail}")]
    InvalidScope { run_id: Uuid, detail: String },

    /// A notification dispatch failed (non-fatal).
    #[error("notification error: {0}")]
    NotificationError(String),
}

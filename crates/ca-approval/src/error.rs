// error.rs — Error types for the approval subsystem.

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during approval operations.
#[derive(Debug, Error)]
pub enum ApprovalError {
    /// Filesystem failure in the approval store.
    #[error("io error on {path}: {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A request could not be serialized or parsed.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// No request with this id.
    #[error("approval request not found: {0}")]
    NotFound(Uuid),

    /// The request is no longer pending; decisions are final.
    #[error("approval request {request_id} already decided: {status}")]
    AlreadyDecided { request_id: Uuid, status: String },
}

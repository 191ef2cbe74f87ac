// error.rs — Error types for the evidence vault.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during evidence operations.
#[derive(Debug, Error)]
pub enum EvidenceError {
    /// An artifact already exists at this key. Evidence is write-once;
    /// a new version must be stored under a new artifact id.
    #[error("artifact already exists at '{key}'")]
    AlreadyExists { key: String },

    /// No artifact at this URI.
    #[error("no artifact at '{uri}'")]
    NotFound { uri: String },

    /// Not an `evidence://` URI, or the key is malformed.
    #[error("invalid evidence URI '{uri}'")]
    InvalidUri { uri: String },

    /// Stored bytes no longer hash to the recorded digest.
    #[error("hash mismatch for '{uri}': expected {expected}, got {actual}")]
    HashMismatch {
        uri: String,
        expected: String,
        actual: String,
    },

    /// Filesystem failure under the vault root.
    #[error("io error on {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Sidecar metadata could not be serialized or parsed.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

// store.rs — The evidence store contract.
//
// Assessors, auditors, and the pipeline all reach evidence through this
// trait. The contract is deliberately narrow: artifacts go in once, come
// out by URI, and can be re-verified against their digest at any time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EvidenceError;

/// Descriptive metadata supplied when storing an artifact.
///
/// `kind` is the artifact kind label (config_snapshot, log_export, ...)
/// and, with the system id and date, determines where the artifact
/// lands in the vault.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactMeta {
    /// System the evidence belongs to.
    pub system_id: String,

    /// Control the evidence supports.
    pub control_id: String,

    /// Artifact kind label.
    pub kind: String,

    /// Provider the evidence came from.
    pub provider: String,

    /// Caller-chosen artifact id. Defaults to a fresh v4; supplying one
    /// makes the key deterministic, which is how re-collection attempts
    /// surface as `AlreadyExists` instead of silent duplicates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_id: Option<Uuid>,
}

impl ArtifactMeta {
    pub fn new(
        system_id: impl Into<String>,
        control_id: impl Into<String>,
        kind: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            system_id: system_id.into(),
            control_id: control_id.into(),
            kind: kind.into(),
            provider: provider.into(),
            artifact_id: None,
        }
    }

    pub fn with_artifact_id(mut self, artifact_id: Uuid) -> Self {
        self.artifact_id = Some(artifact_id);
        self
    }
}

/// What the vault reports back after a successful `put`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredArtifact {
    pub artifact_id: Uuid,
    /// `evidence://{system_id}/{kind}/{date}/{artifact_id}`
    pub uri: String,
    pub sha256: String,
    pub size_bytes: u64,
    pub stored_at: DateTime<Utc>,
}

/// Write-once, content-verified artifact storage.
pub trait EvidenceStore: Send + Sync {
    /// Store an artifact. Fails with `AlreadyExists` if the key is taken.
    fn put(&self, meta: &ArtifactMeta, bytes: &[u8]) -> Result<StoredArtifact, EvidenceError>;

    /// Fetch an artifact's bytes by its `evidence://` URI.
    fn get(&self, uri: &str) -> Result<Vec<u8>, EvidenceError>;

    /// Recompute the digest of the stored bytes and compare against
    /// `expected_sha256`. A mismatch is an integrity violation.
    fn verify(&self, uri: &str, expected_sha256: &str) -> Result<(), EvidenceError>;
}

//! # ca-evidence
//!
//! Write-once evidence vault for Continuous Assurance.
//!
//! Collected artifacts (config snapshots, log exports, scan reports,
//! checklists) are stored once, addressed by `evidence://` URIs, and
//! carry SHA-256 digests that can be re-verified at assessment time.
//! Assessors cite URIs; the vault guarantees the cited bytes are the
//! collected bytes.
//!
//! ## Key components
//!
//! - [`EvidenceStore`] — the put/get/verify contract
//! - [`LocalVault`] — filesystem implementation with
//!   `{system_id}/{kind}/{date}/{artifact_id}` keys and `.meta.json`
//!   sidecars
//! - [`ArtifactMeta`] / [`StoredArtifact`] — what goes in, what comes back

pub mod error;
pub mod store;
pub mod vault;

pub use error::EvidenceError;
pub use store::{ArtifactMeta, EvidenceStore, StoredArtifact};
pub use vault::LocalVault;

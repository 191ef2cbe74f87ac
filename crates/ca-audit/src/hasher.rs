// hasher.rs — SHA-256 hashing utilities.
//
// All digests in Continuous Assurance are SHA-256, hex-encoded: tool-call
// inputs and outputs, evidence artifacts, and the audit chain links. A
// 64-character lowercase hex string is readable in JSON and greps cleanly.

use sha2::{Digest, Sha256};
use std::path::Path;

use crate::error::AuditError;

/// Hash arbitrary bytes, returning a lowercase hex-encoded SHA-256 string.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    // `format!("{:x}", ...)` produces lowercase hex
    format!("{:x}", result)
}

/// Hash a UTF-8 string, returning a lowercase hex-encoded SHA-256 string.
pub fn hash_str(s: &str) -> String {
    hash_bytes(s.as_bytes())
}

/// Digest of a JSON value in canonical form.
///
/// `serde_json` maps serialize with sorted keys (the `preserve_order`
/// feature is off in this workspace), so two values that are equal as
/// JSON always produce the same digest regardless of how their maps
/// were built.
pub fn digest_json(value: &serde_json::Value) -> Result<String, AuditError> {
    let canonical = serde_json::to_string(value)?;
    Ok(hash_str(&canonical))
}

/// Hash the contents of a file on disk.
///
/// Reads the entire file into memory; evidence artifacts are small
/// enough that streaming is not worth the complexity yet.
pub fn hash_file(path: &Path) -> Result<String, AuditError> {
    let data = std::fs::read(path).map_err(|source| AuditError::HashFileFailed {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(hash_bytes(&data))
}

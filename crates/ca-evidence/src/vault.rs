// vault.rs — Filesystem-backed evidence vault.
//
// Artifacts live under a root directory with object keys
//
//   {system_id}/{kind}/{YYYY-MM-DD}/{artifact_id}
//
// and are addressed as `evidence://{key}` URIs. Each artifact gets a
// `.meta.json` sidecar carrying its metadata and digest, so the vault
// is auditable with nothing but a file browser. Writes are write-once:
// a key, once taken, is never overwritten — corrections are new
// artifacts.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::EvidenceError;
use crate::store::{ArtifactMeta, EvidenceStore, StoredArtifact};

/// Sidecar document written next to every artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Sidecar {
    meta: ArtifactMeta,
    stored: StoredArtifact,
}

/// A local-filesystem [`EvidenceStore`].
pub struct LocalVault {
    root: PathBuf,
}

impl LocalVault {
    /// Open a vault rooted at `root`, creating the directory if needed.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, EvidenceError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|source| EvidenceError::IoError {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    /// Store a serializable value as pretty-printed JSON.
    pub fn put_json<T: Serialize>(
        &self,
        meta: &ArtifactMeta,
        value: &T,
    ) -> Result<StoredArtifact, EvidenceError> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.put(meta, &bytes)
    }

    /// Load the sidecar metadata for an artifact.
    pub fn describe(&self, uri: &str) -> Result<StoredArtifact, EvidenceError> {
        let path = self.resolve(uri)?;
        let sidecar_path = sidecar_path(&path);
        if !sidecar_path.exists() {
            return Err(EvidenceError::NotFound {
                uri: uri.to_string(),
            });
        }
        let raw = fs::read_to_string(&sidecar_path).map_err(|source| EvidenceError::IoError {
            path: sidecar_path,
            source,
        })?;
        let sidecar: Sidecar = serde_json::from_str(&raw)?;
        Ok(sidecar.stored)
    }

    /// Translate an `evidence://` URI into a path under the vault root.
    fn resolve(&self, uri: &str) -> Result<PathBuf, EvidenceError> {
        let key = uri
            .strip_prefix("evidence://")
            .ok_or_else(|| EvidenceError::InvalidUri {
                uri: uri.to_string(),
            })?;
        // Keys never escape the root.
        if key.is_empty() || key.contains("..") {
            return Err(EvidenceError::InvalidUri {
                uri: uri.to_string(),
            });
        }
        Ok(self.root.join(key))
    }
}

impl EvidenceStore for LocalVault {
    fn put(&self, meta: &ArtifactMeta, bytes: &[u8]) -> Result<StoredArtifact, EvidenceError> {
        let artifact_id = meta.artifact_id.unwrap_or_else(Uuid::new_v4);
        let stored_at = Utc::now();
        let key = format!(
            "{}/{}/{}/{}",
            meta.system_id,
            meta.kind,
            stored_at.format("%Y-%m-%d"),
            artifact_id
        );
        let path = self.root.join(&key);

        if path.exists() {
            return Err(EvidenceError::AlreadyExists { key });
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| EvidenceError::IoError {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let stored = StoredArtifact {
            artifact_id,
            uri: format!("evidence://{}", key),
            sha256: hash_hex(bytes),
            size_bytes: bytes.len() as u64,
            stored_at,
        };

        fs::write(&path, bytes).map_err(|source| EvidenceError::IoError {
            path: path.clone(),
            source,
        })?;

        let sidecar = Sidecar {
            meta: meta.clone(),
            stored: stored.clone(),
        };
        let sidecar_file = sidecar_path(&path);
        fs::write(&sidecar_file, serde_json::to_vec_pretty(&sidecar)?).map_err(|source| {
            EvidenceError::IoError {
                path: sidecar_file,
                source,
            }
        })?;

        Ok(stored)
    }

    fn get(&self, uri: &str) -> Result<Vec<u8>, EvidenceError> {
        let path = self.resolve(uri)?;
        if !path.exists() {
            return Err(EvidenceError::NotFound {
                uri: uri.to_string(),
            });
        }
        fs::read(&path).map_err(|source| EvidenceError::IoError { path, source })
    }

    fn verify(&self, uri: &str, expected_sha256: &str) -> Result<(), EvidenceError> {
        let bytes = self.get(uri)?;
        let actual = hash_hex(&bytes);
        if actual != expected_sha256 {
            return Err(EvidenceError::HashMismatch {
                uri: uri.to_string(),
                expected: expected_sha256.to_string(),
                actual,
            });
        }
        Ok(())
    }
}

fn sidecar_path(artifact_path: &Path) -> PathBuf {
    let mut name = artifact_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(".meta.json");
    artifact_path.with_file_name(name)
}

fn hash_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_meta() -> ArtifactMeta {
        ArtifactMeta::new("SYS-17", "AC-2", "config_snapshot", "aws")
    }

    #[test]
    fn put_then_get_round_trips_bytes() {
        let dir = tempdir().unwrap();
        let vault = LocalVault::open(dir.path()).unwrap();

        let body = br#"{"iam": {"mfa_enforced": true}}"#;
        let stored = vault.put(&test_meta(), body).unwrap();

        assert!(stored.uri.starts_with("evidence://SYS-17/config_snapshot/"));
        assert_eq!(stored.size_bytes, body.len() as u64);

        let fetched = vault.get(&stored.uri).unwrap();
        assert_eq!(fetched, body);
        // The returned digest matches the stored bytes.
        vault.verify(&stored.uri, &stored.sha256).unwrap();
    }

    #[test]
    fn keys_are_write_once() {
        let dir = tempdir().unwrap();
        let vault = LocalVault::open(dir.path()).unwrap();

        let id = Uuid::new_v4();
        let meta = test_meta().with_artifact_id(id);
        vault.put(&meta, b"first").unwrap();

        match vault.put(&meta, b"second") {
            Err(EvidenceError::AlreadyExists { key }) => {
                assert!(key.ends_with(&id.to_string()));
            }
            other => panic!("expected AlreadyExists, got {:?}", other),
        }
        // The original bytes are untouched.
        let stored = vault.describe(&format!(
            "evidence://SYS-17/config_snapshot/{}/{}",
            Utc::now().format("%Y-%m-%d"),
            id
        ));
        assert_eq!(stored.unwrap().size_bytes, 5);
    }

    #[test]
    fn verify_detects_tampering() {
        let dir = tempdir().unwrap();
        let vault = LocalVault::open(dir.path()).unwrap();

        let stored = vault.put(&test_meta(), b"original evidence").unwrap();

        // Overwrite the artifact behind the vault's back.
        let key = stored.uri.strip_prefix("evidence://").unwrap();
        fs::write(dir.path().join(key), b"tampered evidence").unwrap();

        match vault.verify(&stored.uri, &stored.sha256) {
            Err(EvidenceError::HashMismatch { expected, actual, .. }) => {
                assert_eq!(expected, stored.sha256);
                assert_ne!(actual, expected);
            }
            other => panic!("expected HashMismatch, got {:?}", other),
        }
    }

    #[test]
    fn sidecar_describes_the_artifact() {
        let dir = tempdir().unwrap();
        let vault = LocalVault::open(dir.path()).unwrap();

        let stored = vault.put(&test_meta(), b"evidence body").unwrap();
        let described = vault.describe(&stored.uri).unwrap();

        assert_eq!(described.artifact_id, stored.artifact_id);
        assert_eq!(described.sha256, stored.sha256);
    }

    #[test]
    fn put_json_stores_canonical_documents() {
        let dir = tempdir().unwrap();
        let vault = LocalVault::open(dir.path()).unwrap();

        let snapshot = serde_json::json!({"s3": {"encryption": "aes256"}});
        let stored = vault.put_json(&test_meta(), &snapshot).unwrap();

        let bytes = vault.get(&stored.uri).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed, snapshot);
    }

    #[test]
    fn bad_uris_are_rejected() {
        let dir = tempdir().unwrap();
        let vault = LocalVault::open(dir.path()).unwrap();

        match vault.get("file:///etc/passwd") {
            Err(EvidenceError::InvalidUri { .. }) => {}
            other => panic!("expected InvalidUri, got {:?}", other),
        }
        match vault.get("evidence://../../etc/passwd") {
            Err(EvidenceError::InvalidUri { .. }) => {}
            other => panic!("expected InvalidUri, got {:?}", other),
        }
        match vault.get("evidence://SYS-17/config_snapshot/2026-01-01/missing") {
            Err(EvidenceError::NotFound { .. }) => {}
            other => panic!("expected NotFound, got {:?}", other),
        }
    }
}

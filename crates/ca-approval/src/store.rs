// store.rs — Durable storage for approval requests.
//
// One JSON file per request under a spool directory, mirroring the run
// store. Requests outlive the process that raised them — a reviewer may
// decide days later, possibly through a different surface (CLI vs API),
// so the file on disk is the single source of truth.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::ApprovalError;
use crate::request::{ApprovalRequest, ApprovalStatus};

/// Directory-backed store for [`ApprovalRequest`] values.
pub struct ApprovalStore {
    dir: PathBuf,
}

impl ApprovalStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, ApprovalError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| ApprovalError::IoError {
            path: dir.display().to_string(),
            source,
        })?;
        Ok(Self { dir })
    }

    fn request_file(&self, request_id: &Uuid) -> PathBuf {
        self.dir.join(format!("{request_id}.json"))
    }

    /// Persist a request, replacing any previous version.
    pub fn save(&self, request: &ApprovalRequest) -> Result<(), ApprovalError> {
        let path = self.request_file(&request.request_id);
        let json = serde_json::to_string_pretty(request)?;
        fs::write(&path, json).map_err(|source| ApprovalError::IoError {
            path: path.display().to_string(),
            source,
        })
    }

    /// Load a request by id.
    pub fn get(&self, request_id: &Uuid) -> Result<ApprovalRequest, ApprovalError> {
        let path = self.request_file(request_id);
        if !path.exists() {
            return Err(ApprovalError::NotFound(*request_id));
        }
        let json = fs::read_to_string(&path).map_err(|source| ApprovalError::IoError {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    /// All stored requests, newest first.
    pub fn list(&self) -> Result<Vec<ApprovalRequest>, ApprovalError> {
        let entries = fs::read_dir(&self.dir).map_err(|source| ApprovalError::IoError {
            path: self.dir.display().to_string(),
            source,
        })?;

        let mut requests = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| ApprovalError::IoError {
                path: self.dir.display().to_string(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let json = fs::read_to_string(&path).map_err(|source| ApprovalError::IoError {
                path: path.display().to_string(),
                source,
            })?;
            match serde_json::from_str::<ApprovalRequest>(&json) {
                Ok(request) => requests.push(request),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable approval file");
                }
            }
        }

        requests.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        Ok(requests)
    }

    /// Requests still waiting for a reviewer, newest first.
    pub fn list_pending(&self) -> Result<Vec<ApprovalRequest>, ApprovalError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|r| r.is_pending())
            .collect())
    }

    /// All requests raised by one run, newest first.
    pub fn list_for_run(&self, run_id: &Uuid) -> Result<Vec<ApprovalRequest>, ApprovalError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|r| r.run_id == *run_id)
            .collect())
    }

    /// Apply a decision and persist it. Returns the decided request.
    pub fn decide(
        &self,
        request_id: &Uuid,
        approved: bool,
        reviewer: &str,
        notes: Option<String>,
    ) -> Result<ApprovalRequest, ApprovalError> {
        let mut request = self.get(request_id)?;
        request.apply_decision(approved, reviewer, notes)?;
        self.save(&request)?;
        Ok(request)
    }

    /// Expire a pending request and persist it.
    pub fn expire(&self, request_id: &Uuid) -> Result<ApprovalRequest, ApprovalError> {
        let mut request = self.get(request_id)?;
        request.expire()?;
        self.save(&request)?;
        Ok(request)
    }

    /// Pending requests raised before `cutoff` — the overdue set the
    /// notification sweeper escalates.
    pub fn stale_pending(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ApprovalRequest>, ApprovalError> {
        Ok(self
            .list_pending()?
            .into_iter()
            .filter(|r| r.requested_at < cutoff)
            .collect())
    }
}

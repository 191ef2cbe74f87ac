// store.rs — Durable storage for run contexts.
//
// One JSON file per run under a spool directory. Writing the whole
// context on every save keeps the format trivially inspectable (`cat`
// the file) and makes suspension durable: a run suspended for approval
// is nothing more than its file on disk with status
// "suspended_for_approval".

use std::fs;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::context::RunContext;
use crate::error::RunError;

/// Directory-backed store for [`RunContext`] values.
pub struct RunStore {
    dir: PathBuf,
}

impl RunStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, RunError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| RunError::IoError {
            path: dir.display().to_string(),
            source: e,
        })?;
        Ok(Self { dir })
    }

    /// Path of the file backing a run.
    fn run_file(&self, run_id: &Uuid) -> PathBuf {
        self.dir.join(format!("{run_id}.json"))
    }

    /// Persist a run context, replacing any previous version.
    pub fn save(&self, ctx: &RunContext) -> Result<(), RunError> {
        let path = self.run_file(&ctx.run_id);
        let json = serde_json::to_string_pretty(ctx)?;
        fs::write(&path, json).map_err(|e| RunError::IoError {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Load a run by id.
    pub fn get(&self, run_id: &Uuid) -> Result<RunContext, RunError> {
        let path = self.run_file(run_id);
        if !path.exists() {
            return Err(RunError::NotFound(*run_id));
        }
        let json = fs::read_to_string(&path).map_err(|e| RunError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    /// All stored runs, newest first.
    pub fn list(&self) -> Result<Vec<RunContext>, RunError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| RunError::IoError {
            path: self.dir.display().to_string(),
            source: e,
        })?;

        let mut runs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| RunError::IoError {
                path: self.dir.display().to_string(),
                source: e,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let json = fs::read_to_string(&path).map_err(|e| RunError::IoError {
                path: path.display().to_string(),
                source: e,
            })?;
            match serde_json::from_str::<RunContext>(&json) {
                Ok(ctx) => runs.push(ctx),
                Err(e) => {
                    // A corrupt file should not hide every other run.
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable run file");
                }
            }
        }

        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(runs)
    }

    /// Runs whose status label matches, newest first. The label is the
    /// serialized status tag (`running`, `suspended_for_approval`,
    /// `completed`, `failed`); for failed runs the reason is ignored.
    pub fn list_by_status(&self, status: &str) -> Result<Vec<RunContext>, RunError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|run| run.status.to_string() == status)
            .collect())
    }

    /// Remove a run's file.
    pub fn delete(&self, run_id: &Uuid) -> Result<(), RunError> {
        let path = self.run_file(run_id);
        if !path.exists() {
            return Err(RunError::NotFound(*run_id));
        }
        fs::remove_file(&path).map_err(|e| RunError::IoError {
            path: path.display().to_string(),
            source: e,
        })
    }
}

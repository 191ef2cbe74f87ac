// events.rs — Run lifecycle events and notification dispatch.
//
// The orchestrator emits an event at every externally interesting
// lifecycle point. Notification sinks (log files, webhook scripts,
// chat integrations) subscribe to these events; the dispatcher is
// synchronous and sink failures never disturb the run itself.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RunError;
use crate::stage::PipelineStage;

/// Events emitted at key points of a run's life.
///
/// These are the stable types sinks can depend on. Every variant
/// carries the run id and a timestamp so a sink can correlate events
/// without extra lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum RunEvent {
    /// A run was triggered and persisted.
    RunStarted {
        run_id: Uuid,
        system_id: String,
        question: String,
        timestamp: DateTime<Utc>,
    },

    /// A pipeline stage finished and the context was committed.
    StageCompleted {
        run_id: Uuid,
        stage: String,
        timestamp: DateTime<Utc>,
    },

    /// The run parked itself waiting for human approval.
    RunSuspended {
        run_id: Uuid,
        pending_approvals: Vec<Uuid>,
        timestamp: DateTime<Utc>,
    },

    /// An approval request was created.
    ApprovalRequested {
        run_id: Uuid,
        request_id: Uuid,
        summary: String,
        timestamp: DateTime<Utc>,
    },

    /// A reviewer decided an approval request.
    ApprovalDecided {
        run_id: Uuid,
        request_id: Uuid,
        approved: bool,
        decided_by: String,
        timestamp: DateTime<Utc>,
    },

    /// An approval request exceeded its review window.
    ApprovalOverdue {
        run_id: Uuid,
        request_id: Uuid,
        waiting_hours: i64,
        timestamp: DateTime<Utc>,
    },

    /// A suspended run picked back up.
    RunResumed {
        run_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// The run reached the completed stage.
    RunCompleted {
        run_id: Uuid,
        score: f64,
        posture: String,
        timestamp: DateTime<Utc>,
    },

    /// The run hit a fatal error or was cancelled.
    RunFailed {
        run_id: Uuid,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl RunEvent {
    /// Get the event type name as a string.
    pub fn event_type(&self) -> &str {
        match self {
            RunEvent::RunStarted { .. } => "run_started",
            RunEvent::StageCompleted { .. } => "stage_completed",
            RunEvent::RunSuspended { .. } => "run_suspended",
            RunEvent::ApprovalRequested { .. } => "approval_requested",
            RunEvent::ApprovalDecided { .. } => "approval_decided",
            RunEvent::ApprovalOverdue { .. } => "approval_overdue",
            RunEvent::RunResumed { .. } => "run_resumed",
            RunEvent::RunCompleted { .. } => "run_completed",
            RunEvent::RunFailed { .. } => "run_failed",
        }
    }

    /// Helper to create a RunStarted event.
    pub fn run_started(run_id: Uuid, system_id: &str, question: &str) -> Self {
        RunEvent::RunStarted {
            run_id,
            system_id: system_id.to_string(),
            question: question.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Helper to create a StageCompleted event.
    pub fn stage_completed(run_id: Uuid, stage: &PipelineStage) -> Self {
        RunEvent::StageCompleted {
            run_id,
            stage: stage.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Helper to create a RunSuspended event.
    pub fn run_suspended(run_id: Uuid, pending_approvals: Vec<Uuid>) -> Self {
        RunEvent::RunSuspended {
            run_id,
            pending_approvals,
            timestamp: Utc::now(),
        }
    }

    /// Helper to create an ApprovalRequested event.
    pub fn approval_requested(run_id: Uuid, request_id: Uuid, summary: &str) -> Self {
        RunEvent::ApprovalRequested {
            run_id,
            request_id,
            summary: summary.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Helper to create an ApprovalDecided event.
    pub fn approval_decided(
        run_id: Uuid,
        request_id: Uuid,
        approved: bool,
        decided_by: &str,
    ) -> Self {
        RunEvent::ApprovalDecided {
            run_id,
            request_id,
            approved,
            decided_by: decided_by.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Helper to create a RunFailed event.
    pub fn run_failed(run_id: Uuid, reason: &str) -> Self {
        RunEvent::RunFailed {
            run_id,
            reason: reason.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Trait for receiving run events.
///
/// Implementations decide what to do with each event: log to a file,
/// call a webhook, post to a channel. Sinks must be infallible from
/// the run's point of view; errors are reported but swallowed.
pub trait NotificationSink: Send + Sync {
    /// Handle an event. Errors are logged but don't stop the run.
    fn send(&self, event: &RunEvent) -> Result<(), RunError>;
}

/// Logs events as JSONL to a file (always-on sink).
pub struct LogSink {
    path: PathBuf,
}

impl LogSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl NotificationSink for LogSink {
    fn send(&self, event: &RunEvent) -> Result<(), RunError> {
        // Ensure parent directory exists.
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| RunError::IoError {
                path: parent.display().to_string(),
                source,
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| RunError::IoError {
                path: self.path.display().to_string(),
                source,
            })?;

        let json = serde_json::to_string(event)?;
        writeln!(file, "{}", json).map_err(|source| RunError::IoError {
            path: self.path.display().to_string(),
            source,
        })?;

        Ok(())
    }
}

/// Dispatches events to multiple sinks.
///
/// Errors from individual sinks are logged (via tracing) but don't
/// prevent other sinks from receiving the event.
pub struct EventDispatcher {
    sinks: Vec<Box<dyn NotificationSink>>,
}

impl EventDispatcher {
    /// Create a new dispatcher with no sinks.
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    /// Add a notification sink.
    pub fn add_sink(&mut self, sink: Box<dyn NotificationSink>) {
        self.sinks.push(sink);
    }

    /// Dispatch an event to all sinks.
    pub fn dispatch(&self, event: &RunEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.send(event) {
                tracing::warn!("notification sink error: {}", e);
            }
        }
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

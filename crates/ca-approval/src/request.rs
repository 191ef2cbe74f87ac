// request.rs — Approval requests and their decisions.
//
// An approval request is how the pipeline asks a human before acting:
// the gate raises one when a run crosses its thresholds, the committee
// raises one per unresolved disagreement, and the router raises one for
// any modify-class tool call. Decisions are final — a decided request
// never goes back to pending, and deciding it again is an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ca_run::Severity;

use crate::error::ApprovalError;

/// Where a request stands.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// Waiting for a reviewer.
    Pending,
    /// A reviewer approved the action.
    Approved,
    /// A reviewer rejected the action.
    Rejected,
    /// The review window lapsed with no decision.
    Expired,
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
            ApprovalStatus::Expired => "expired",
        };
        write!(f, "{}", label)
    }
}

/// Who decided, what they decided, and when.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub approved: bool,
    pub reviewer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub decided_at: DateTime<Utc>,
}

/// A request for human sign-off on a proposed action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Unique request id.
    pub request_id: Uuid,

    /// Run that raised the request.
    pub run_id: Uuid,

    /// What kind of action is waiting: `"remediation"`,
    /// `"committee_escalation"`, or a tool name for router-raised
    /// requests.
    pub action_type: String,

    /// Controls the action touches.
    pub affected_controls: Vec<String>,

    /// Highest severity among the triggering findings.
    pub severity: Severity,

    /// Current status.
    pub status: ApprovalStatus,

    /// Agent that raised the request.
    pub requested_by: String,

    /// When the request was raised.
    pub requested_at: DateTime<Utc>,

    /// What the reviewer is looking at: failed controls, proposed
    /// actions, committee positions.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,

    /// The decision, once made.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
}

impl ApprovalRequest {
    /// Create a pending request.
    pub fn new(
        run_id: Uuid,
        action_type: impl Into<String>,
        affected_controls: Vec<String>,
        severity: Severity,
        requested_by: impl Into<String>,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            run_id,
            action_type: action_type.into(),
            affected_controls,
            severity,
            status: ApprovalStatus::Pending,
            requested_by: requested_by.into(),
            requested_at: Utc::now(),
            payload: serde_json::Value::Null,
            decision: None,
        }
    }

    /// Attach the reviewer-facing payload (builder pattern).
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending
    }

    pub fn is_approved(&self) -> bool {
        self.status == ApprovalStatus::Approved
    }

    /// Apply a reviewer's decision. Fails unless the request is pending.
    pub fn apply_decision(
        &mut self,
        approved: bool,
        reviewer: impl Into<String>,
        notes: Option<String>,
    ) -> Result<(), ApprovalError> {
        if self.status != ApprovalStatus::Pending {
            return Err(ApprovalError::AlreadyDecided {
                request_id: self.request_id,
                status: self.status.to_string(),
            });
        }
        self.status = if approved {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Rejected
        };
        self.decision = Some(Decision {
            approved,
            reviewer: reviewer.into(),
            notes,
            decided_at: Utc::now(),
        });
        Ok(())
    }

    /// Expire a request whose review window lapsed. Fails unless the
    /// request is pending.
    pub fn expire(&mut self) -> Result<(), ApprovalError> {
        if self.status != ApprovalStatus::Pending {
            return Err(ApprovalError::AlreadyDecided {
                request_id: self.request_id,
                status: self.status.to_string(),
            });
        }
        self.status = ApprovalStatus::Expired;
        Ok(())
    }
}

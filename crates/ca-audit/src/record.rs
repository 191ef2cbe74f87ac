// record.rs — The audit record for one tool invocation.
//
// Exactly one record is appended per invocation the router handles,
// whatever the outcome: a denied call is audited the same way as a
// successful one. Inputs and outputs are stored as digests, never as
// raw payloads — the params may describe production infrastructure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a routed tool call ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    /// The provider executed and returned a result.
    Success,
    /// Policy refused the call.
    Denied,
    /// The rate limiter refused the call.
    RateLimited,
    /// The call raised an approval request and did not execute.
    ApprovalPending,
    /// The provider failed.
    Error,
    /// The call exceeded its deadline.
    Timeout,
}

impl CallOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallOutcome::Success => "success",
            CallOutcome::Denied => "denied",
            CallOutcome::RateLimited => "rate_limited",
            CallOutcome::ApprovalPending => "approval_pending",
            CallOutcome::Error => "error",
            CallOutcome::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for CallOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One immutable line of the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    /// Unique id of this invocation.
    pub call_id: Uuid,

    /// Run the call belongs to.
    pub run_id: Uuid,

    /// Stage agent that made the call.
    pub agent_id: String,

    /// Fully qualified tool name.
    pub tool: String,

    /// Provider the call targeted.
    pub provider: String,

    /// Action classification label (read, evaluate, store, create,
    /// scan, modify).
    pub action: String,

    /// How the call ended.
    pub outcome: CallOutcome,

    /// SHA-256 of the canonical redacted input params.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_hash: Option<String>,

    /// SHA-256 of the canonical output, when the call produced one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_hash: Option<String>,

    /// When the router accepted the call.
    pub started_at: DateTime<Utc>,

    /// When the call finished (any outcome).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Wall time the call took.
    #[serde(default)]
    pub duration_ms: u64,

    /// Error detail for error/timeout outcomes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Approval request raised by this call, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_id: Option<Uuid>,

    /// Correlation across a stage's calls (the stage name).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    /// Hash chain link — set by the log on append, never by callers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_hash: Option<String>,

    /// Free-form extra context (e.g., `{"deduplicated": true}`).
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

impl ToolCallRecord {
    /// Create a record for a call that just started. Outcome defaults to
    /// success; the router overrides it on any other path.
    pub fn new(
        run_id: Uuid,
        agent_id: impl Into<String>,
        tool: impl Into<String>,
        provider: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            call_id: Uuid::new_v4(),
            run_id,
            agent_id: agent_id.into(),
            tool: tool.into(),
            provider: provider.into(),
            action: action.into(),
            outcome: CallOutcome::Success,
            input_hash: None,
            output_hash: None,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: 0,
            error: None,
            approval_id: None,
            correlation_id: None,
            previous_hash: None,
            metadata: serde_json::Value::Null,
        }
    }

    /// Set the outcome (builder pattern).
    pub fn with_outcome(mut self, outcome: CallOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    /// Attach the input digest.
    pub fn with_input_hash(mut self, hash: impl Into<String>) -> Self {
        self.input_hash = Some(hash.into());
        self
    }

    /// Attach the output digest.
    pub fn with_output_hash(mut self, hash: impl Into<String>) -> Self {
        self.output_hash = Some(hash.into());
        self
    }

    /// Attach error detail.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Link the approval request this call raised.
    pub fn with_approval(mut self, approval_id: Uuid) -> Self {
        self.approval_id = Some(approval_id);
        self
    }

    /// Set the correlation id (the calling stage).
    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Attach free-form metadata.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Stamp completion time and duration.
    pub fn completed(mut self, duration_ms: u64) -> Self {
        self.completed_at = Some(Utc::now());
        self.duration_ms = duration_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_fills_the_optional_fields() {
        let run_id = Uuid::new_v4();
        let approval = Uuid::new_v4();
        let record = ToolCallRecord::new(
            run_id,
            "remediation",
            "ticketing.update_ticket",
            "jira",
            "modify",
        )
        .with_outcome(CallOutcome::ApprovalPending)
        .with_input_hash("abc123")
        .with_approval(approval)
        .with_correlation("remediation")
        .with_metadata(json!({"affected_controls": ["AC-2"]}));

        assert_eq!(record.run_id, run_id);
        assert_eq!(record.outcome, CallOutcome::ApprovalPending);
        assert_eq!(record.approval_id, Some(approval));
        assert_eq!(record.metadata["affected_controls"][0], "AC-2");
        assert!(record.output_hash.is_none());
    }

    #[test]
    fn outcome_serializes_snake_case() {
        let json = serde_json::to_string(&CallOutcome::RateLimited).unwrap();
        assert_eq!(json, "\"rate_limited\"");
        let json = serde_json::to_string(&CallOutcome::ApprovalPending).unwrap();
        assert_eq!(json, "\"approval_pending\"");
    }

    #[test]
    fn record_round_trips_and_skips_empty_fields() {
        let record = ToolCallRecord::new(
            Uuid::new_v4(),
            "drift_detection",
            "assurance.detect_drift",
            "aws",
            "read",
        );
        let json = serde_json::to_string(&record).unwrap();

        // Unset optionals stay off the wire.
        assert!(!json.contains("output_hash"));
        assert!(!json.contains("approval_id"));
        assert!(!json.contains("metadata"));

        let restored: ToolCallRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.call_id, record.call_id);
        assert_eq!(restored.outcome, CallOutcome::Success);
    }
}

// context.rs — RunContext: the state threaded through one pipeline run.
//
// The context is a plain serializable value. Stages receive it mutably,
// append their results, and hand it back; the orchestrator persists it at
// every stage boundary. Because everything a run needs lives in this one
// value, a suspended run survives process restarts — resuming is just
// "load the JSON and keep going".
//
// Append-only discipline: evidence references, drift events, and stage
// issues are only ever appended. Assessments are keyed by control id and
// the latest write wins.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assessment::{AssessmentStatus, ControlAssessment, Severity};
use crate::drift::DriftEvent;
use crate::error::RunError;
use crate::evidence::{ControlMap, EvidenceRef, PlannedEvidence};
use crate::posture::PostureFinding;
use crate::remediation::{PoamItem, TicketRef};
use crate::scope::RunScope;
use crate::stage::{PipelineStage, RunStatus};

/// A recoverable problem recorded against a stage.
///
/// Stages degrade instead of failing: an unreachable provider becomes an
/// issue plus a partial result, and the run keeps going. The issue list
/// is part of the final report context, even for failed runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageIssue {
    /// Stage the issue occurred in.
    pub stage: PipelineStage,

    /// Provider involved, when the issue is provider-specific.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// What went wrong.
    pub detail: String,

    /// Whether the pipeline continued past this issue.
    pub recoverable: bool,

    /// When the issue was recorded.
    pub occurred_at: DateTime<Utc>,
}

impl StageIssue {
    /// Record a recoverable issue against a stage.
    pub fn recoverable(stage: PipelineStage, detail: impl Into<String>) -> Self {
        Self {
            stage,
            provider: None,
            detail: detail.into(),
            recoverable: true,
            occurred_at: Utc::now(),
        }
    }

    /// Attach the provider the issue relates to (builder pattern).
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }
}

/// An operator's cooperative cancellation request.
///
/// Recording the request does not stop anything by itself — the
/// orchestrator honors it at the next stage boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CancelRequest {
    pub reason: String,
    pub requested_at: DateTime<Utc>,
}

/// Aggregate control counts and the overall score.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub total_controls: usize,
    pub passed: usize,
    pub failed: usize,
    pub partial: usize,
    /// passed / total × 100, or 0 when nothing was assessed.
    pub score: f64,
}

impl RunSummary {
    /// Tally the assessment map.
    pub fn compute(assessments: &BTreeMap<String, ControlAssessment>) -> Self {
        let mut summary = Self {
            total_controls: assessments.len(),
            ..Self::default()
        };
        for assessment in assessments.values() {
            match assessment.status {
                AssessmentStatus::Pass => summary.passed += 1,
                AssessmentStatus::Fail => summary.failed += 1,
                AssessmentStatus::Partial => summary.partial += 1,
                AssessmentStatus::NotApplicable
                | AssessmentStatus::ManualReviewRequired => {}
            }
        }
        if summary.total_controls > 0 {
            summary.score = summary.passed as f64 / summary.total_controls as f64 * 100.0;
        }
        summary
    }

    /// Executive posture label for the overall score.
    pub fn posture_label(&self) -> &'static str {
        if self.score >= 90.0 {
            "Strong"
        } else if self.score >= 70.0 {
            "Moderate"
        } else if self.score >= 50.0 {
            "Needs Improvement"
        } else {
            "At Risk"
        }
    }
}

/// The mutable state of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunContext {
    /// Unique, immutable run identifier.
    pub run_id: Uuid,

    /// Resolved run boundary.
    pub scope: RunScope,

    /// Free-form intent from the trigger
    /// (e.g., "Are we still compliant today?").
    pub question: String,

    /// Coarse status.
    pub status: RunStatus,

    /// Fine-grained pipeline stage.
    pub stage: PipelineStage,

    /// When the run was triggered.
    pub started_at: DateTime<Utc>,

    /// Last mutation time.
    pub updated_at: DateTime<Utc>,

    /// Set when the run reaches a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Control-mapping output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_map: Option<ControlMap>,

    /// Evidence-planning output.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence_plan: Vec<PlannedEvidence>,

    /// Collected evidence references. Append-only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<EvidenceRef>,

    /// Control assessments keyed by control id. Latest write wins.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub assessments: BTreeMap<String, ControlAssessment>,

    /// Detected drift events. Append-only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drift_events: Vec<DriftEvent>,

    /// STIG posture findings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub posture_findings: Vec<PostureFinding>,

    /// POA&M items created by remediation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub poam_items: Vec<PoamItem>,

    /// Tickets created by remediation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tickets: Vec<TicketRef>,

    /// Approval requests the run is waiting on. Empty unless the status
    /// is suspended_for_approval.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_approvals: Vec<Uuid>,

    /// Named report documents built by the reporting stage.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub reports: BTreeMap<String, serde_json::Value>,

    /// Recoverable problems recorded per stage.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stage_issues: Vec<StageIssue>,

    /// Aggregate summary, set by reporting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<RunSummary>,

    /// Pending cooperative cancellation, if an operator requested one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel: Option<CancelRequest>,
}

impl RunContext {
    /// Create a context for a freshly triggered run: running, at the
    /// first stage.
    pub fn new(scope: RunScope, question: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            scope,
            question: question.into(),
            status: RunStatus::Running,
            stage: PipelineStage::ScopeResolution,
            started_at: now,
            updated_at: now,
            completed_at: None,
            control_map: None,
            evidence_plan: Vec::new(),
            evidence: Vec::new(),
            assessments: BTreeMap::new(),
            drift_events: Vec::new(),
            posture_findings: Vec::new(),
            poam_items: Vec::new(),
            tickets: Vec::new(),
            pending_approvals: Vec::new(),
            reports: BTreeMap::new(),
            stage_issues: Vec::new(),
            summary: None,
            cancel: None,
        }
    }

    /// Advance to the next pipeline stage. Returns an error for any edge
    /// outside the pipeline graph.
    pub fn advance_stage(&mut self, next: PipelineStage) -> Result<(), RunError> {
        if !self.stage.can_transition_to(&next) {
            return Err(RunError::InvalidTransition {
                run_id: self.run_id,
                from: self.stage.to_string(),
                to: next.to_string(),
            });
        }
        self.stage = next;
        self.touch();
        Ok(())
    }

    /// Mark the run completed.
    pub fn complete(&mut self) -> Result<(), RunError> {
        self.advance_stage(PipelineStage::Completed)?;
        self.status = RunStatus::Completed;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Mark the run failed, preserving all accumulated context.
    pub fn fail(&mut self, reason: impl Into<String>) {
        // Failed is reachable from every non-terminal stage; if the run is
        // already terminal, keep the existing terminal stage.
        if !self.stage.is_terminal() {
            self.stage = PipelineStage::Failed;
        }
        self.status = RunStatus::Failed {
            reason: reason.into(),
        };
        self.completed_at = Some(Utc::now());
        self.touch();
    }

    /// Suspend the run on the given approval requests.
    pub fn suspend_for_approval(&mut self, request_ids: Vec<Uuid>) {
        self.pending_approvals = request_ids;
        self.status = RunStatus::SuspendedForApproval;
        self.touch();
    }

    /// Clear the suspension and return to running.
    pub fn resume_running(&mut self) {
        self.pending_approvals.clear();
        self.status = RunStatus::Running;
        self.touch();
    }

    /// Record a cooperative cancellation request. The first request wins;
    /// later ones are ignored.
    pub fn request_cancel(&mut self, reason: impl Into<String>) {
        if self.cancel.is_none() {
            self.cancel = Some(CancelRequest {
                reason: reason.into(),
                requested_at: Utc::now(),
            });
            self.touch();
        }
    }

    /// Append a collected evidence reference.
    pub fn append_evidence(&mut self, evidence: EvidenceRef) {
        self.evidence.push(evidence);
        self.touch();
    }

    /// Append a drift event.
    pub fn record_drift(&mut self, event: DriftEvent) {
        self.drift_events.push(event);
        self.touch();
    }

    /// Insert or replace the assessment for a control.
    pub fn upsert_assessment(&mut self, assessment: ControlAssessment) {
        self.assessments
            .insert(assessment.control_id.clone(), assessment);
        self.touch();
    }

    /// Record a stage issue.
    pub fn record_issue(&mut self, issue: StageIssue) {
        if issue.recoverable {
            tracing::debug!(stage = %issue.stage, detail = %issue.detail, "stage issue");
        } else {
            tracing::warn!(stage = %issue.stage, detail = %issue.detail, "stage issue");
        }
        self.stage_issues.push(issue);
        self.touch();
    }

    /// Failing assessments at or above the given severity.
    pub fn assessments_failing_at(&self, min: Severity) -> Vec<&ControlAssessment> {
        self.assessments
            .values()
            .filter(|a| a.is_failing_at(min))
            .collect()
    }

    /// Whether any drift event reached the given severity.
    pub fn has_drift_at(&self, min: Severity) -> bool {
        self.drift_events.iter().any(|d| d.severity >= min)
    }

    /// Whether any open CAT I posture finding exists.
    pub fn has_open_cat_i_finding(&self) -> bool {
        self.posture_findings.iter().any(|f| f.is_open_cat_i())
    }

    /// Evidence references collected for a control.
    pub fn evidence_for(&self, control_id: &str) -> Vec<&EvidenceRef> {
        self.evidence
            .iter()
            .filter(|e| e.control_id == control_id)
            .collect()
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

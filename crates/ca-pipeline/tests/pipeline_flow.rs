// pipeline_flow.rs — End-to-end orchestrator scenarios over stub
// providers: auto-pass, suspension, approval, rejection, escalation,
// cancellation, and degraded completion when a provider fails.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;

use ca_approval::{ApprovalStatus, ApprovalStore};
use ca_audit::AuditLog;
use ca_evidence::{EvidenceStore, LocalVault};
use ca_pipeline::{
    ApprovalGate, Assessor, Committee, Orchestrator, PipelineConfig, PipelineError,
};
use ca_policy::PolicyEngine;
use ca_router::{ProviderError, ProviderRegistry, StubProvider, ToolProvider, ToolRouter};
use ca_run::{
    AssessmentStatus, ControlAssessment, LogSink, PipelineStage, RunContext, RunScope, RunStatus,
};

fn orchestrator_with(dir: &TempDir, cloud: Arc<dyn ToolProvider>) -> Orchestrator {
    let store = ca_run::RunStore::open(dir.path().join("runs")).expect("run store");
    let policy = Arc::new(PolicyEngine::default());
    let audit = AuditLog::open(dir.path().join("audit.jsonl")).expect("audit log");
    let approvals =
        Arc::new(ApprovalStore::open(dir.path().join("approvals")).expect("approval store"));

    let mut registry = ProviderRegistry::new();
    registry.register(cloud);
    registry.register(Arc::new(StubProvider::new("jira")));

    let router = Arc::new(ToolRouter::new(policy, registry, audit, approvals));
    let vault: Arc<dyn EvidenceStore> =
        Arc::new(LocalVault::open(dir.path().join("evidence")).expect("vault"));

    let mut orch = Orchestrator::new(store, router, vault, PipelineConfig::default());
    orch.add_sink(Box::new(LogSink::new(dir.path().join("events.jsonl"))));
    orch
}

fn orchestrator(dir: &TempDir) -> Orchestrator {
    orchestrator_with(dir, Arc::new(StubProvider::new("aws")))
}

fn scope() -> RunScope {
    RunScope::new("payments-prod", "Payments Platform")
}

fn start_and_execute(orch: &Orchestrator) -> RunContext {
    let run_id = orch
        .start(scope(), "Are we compliant with our FedRAMP baseline?")
        .expect("start");
    orch.execute(&run_id).expect("execute")
}

/// A cloud backend whose drift feed reports a new admin role. The
/// pipeline classifies drift itself, so the low severity claimed here
/// must be ignored.
struct CompromisedIamCloud {
    inner: StubProvider,
}

impl ToolProvider for CompromisedIamCloud {
    fn name(&self) -> &str {
        "aws"
    }

    fn call(
        &self,
        tool: &str,
        params: &serde_json::Value,
        deadline: Duration,
    ) -> Result<serde_json::Value, ProviderError> {
        if tool == "assurance.detect_drift" {
            return Ok(json!({
                "drift_events": [{
                    "resource_id": "role/breakglass-admin",
                    "resource_type": "iam",
                    "field": "new_admin_role",
                    "baseline_value": null,
                    "current_value": {"attached_policies": ["AdministratorAccess"]},
                    "severity": "low",
                }],
            }));
        }
        self.inner.call(tool, params, deadline)
    }
}

/// A cloud backend whose drift feed never answers in time.
struct DriftTimesOut {
    inner: StubProvider,
}

impl ToolProvider for DriftTimesOut {
    fn name(&self) -> &str {
        "aws"
    }

    fn call(
        &self,
        tool: &str,
        params: &serde_json::Value,
        deadline: Duration,
    ) -> Result<serde_json::Value, ProviderError> {
        if tool == "assurance.detect_drift" {
            return Err(ProviderError::Timeout {
                provider: "aws".to_string(),
                elapsed_ms: deadline.as_millis() as u64,
            });
        }
        self.inner.call(tool, params, deadline)
    }
}

struct AlwaysFails;

impl Assessor for AlwaysFails {
    fn id(&self) -> &'static str {
        "pessimist"
    }

    fn assess(&self, control_id: &str, _ctx: &RunContext) -> ControlAssessment {
        ControlAssessment::new(control_id, AssessmentStatus::Fail, 0.9)
    }
}

struct AlwaysPasses;

impl Assessor for AlwaysPasses {
    fn id(&self) -> &'static str {
        "optimist"
    }

    fn assess(&self, control_id: &str, _ctx: &RunContext) -> ControlAssessment {
        ControlAssessment::new(control_id, AssessmentStatus::Pass, 0.9)
    }
}

#[test]
fn default_run_suspends_on_high_drift() {
    let dir = TempDir::new().expect("tempdir");
    let orch = orchestrator(&dir);

    let ctx = start_and_execute(&orch);

    // The stub reports a security-group rule addition: high drift on
    // SC-7 and SC-8, which crosses the gate threshold.
    assert_eq!(ctx.status, RunStatus::SuspendedForApproval);
    assert_eq!(ctx.stage, PipelineStage::ApprovalGate);
    assert_eq!(ctx.pending_approvals.len(), 1);

    let requests = orch.approvals().list_for_run(&ctx.run_id).expect("list");
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].action_type, "remediation");
    assert_eq!(requests[0].affected_controls, vec!["SC-7", "SC-8"]);
    assert_eq!(
        requests[0].payload["proposed_actions"],
        json!(["create_poam", "create_tickets"])
    );

    let sc7 = &ctx.assessments["SC-7"];
    assert_eq!(sc7.status, AssessmentStatus::Fail);
    assert!(sc7.committee_confirmed);
}

#[test]
fn rejected_remediation_completes_without_touching_rejected_controls() {
    let dir = TempDir::new().expect("tempdir");
    let orch = orchestrator(&dir);
    let ctx = start_and_execute(&orch);
    let request_id = ctx.pending_approvals[0];

    let done = orch
        .resume(
            &ctx.run_id,
            &request_id,
            false,
            "isso@example.com",
            Some("fix the security group first".to_string()),
        )
        .expect("resume");

    assert_eq!(done.status, RunStatus::Completed);
    assert_eq!(done.stage, PipelineStage::Completed);

    // SC-7 and SC-8 were rejected: no POA&M, no ticket, an issue each.
    assert!(done.poam_items.iter().all(|p| !p.control_id.starts_with("SC-")));
    assert!(done.tickets.iter().all(|t| t.control_id.as_deref() != Some("SC-7")));
    let rejection_issues = done
        .stage_issues
        .iter()
        .filter(|i| i.detail.contains("approval rejected"))
        .count();
    assert_eq!(rejection_issues, 2);

    // Partial controls outside the rejection still get POA&Ms.
    assert!(done.poam_items.iter().any(|p| p.control_id == "CM-6"));

    // The failing assessments stay on the record for the reports.
    assert_eq!(done.assessments["SC-7"].status, AssessmentStatus::Fail);
    assert_eq!(done.reports.len(), 5);
}

#[test]
fn critical_iam_drift_is_reclassified_approved_and_remediated() {
    let dir = TempDir::new().expect("tempdir");
    let orch = orchestrator_with(
        &dir,
        Arc::new(CompromisedIamCloud {
            inner: StubProvider::new("aws"),
        }),
    );

    let ctx = start_and_execute(&orch);

    assert_eq!(ctx.status, RunStatus::SuspendedForApproval);
    assert_eq!(ctx.drift_events.len(), 1);
    // The provider said "low"; a new admin role is critical.
    assert_eq!(ctx.drift_events[0].severity, ca_run::Severity::Critical);

    let requests = orch.approvals().list_for_run(&ctx.run_id).expect("list");
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].severity, ca_run::Severity::Critical);
    assert_eq!(requests[0].payload["triggers"]["critical_drift"], true);
    let affected = &requests[0].affected_controls;
    for control in ["AC-2", "AC-3", "AC-6", "IA-2", "IA-5"] {
        assert!(affected.iter().any(|c| c == control), "missing {}", control);
    }

    let done = orch
        .resume(&ctx.run_id, &ctx.pending_approvals[0], true, "isso@example.com", None)
        .expect("resume");

    assert_eq!(done.status, RunStatus::Completed);
    assert!(done.assessments["AC-2"].committee_confirmed);
    // Five critical failures get tickets; the CAT II STIG partial on
    // CM-6 gets a POA&M but no ticket.
    assert_eq!(done.tickets.len(), 5);
    assert_eq!(done.poam_items.len(), 6);
    assert!(done
        .tickets
        .iter()
        .all(|t| t.ticket_id.starts_with("STUB-") && t.tracker == "jira"));

    // Every tool call of the run chains cleanly in the audit log.
    let intact = AuditLog::verify_chain(dir.path().join("audit.jsonl")).expect("verify");
    assert!(intact);
    assert!(dir.path().join("events.jsonl").exists());
}

#[test]
fn split_committee_escalates_each_gating_control() {
    let dir = TempDir::new().expect("tempdir");
    let gate = ApprovalGate::new(Committee::new(vec![
        Box::new(AlwaysFails),
        Box::new(AlwaysPasses),
    ]));
    let orch = orchestrator(&dir).with_gate(gate);

    let ctx = start_and_execute(&orch);

    // SC-7 and SC-8 each escalate, plus the remediation request.
    assert_eq!(ctx.status, RunStatus::SuspendedForApproval);
    assert_eq!(ctx.pending_approvals.len(), 3);

    let requests = orch.approvals().list_for_run(&ctx.run_id).expect("list");
    let escalations: Vec<_> = requests
        .iter()
        .filter(|r| r.action_type == "committee_escalation")
        .collect();
    assert_eq!(escalations.len(), 2);
    for escalation in &escalations {
        assert_eq!(
            escalation.payload["opinions"].as_array().map(|a| a.len()),
            Some(2)
        );
    }
    // Split verdicts never confirm the assessment.
    assert!(!ctx.assessments["SC-7"].committee_confirmed);
    assert!(!ctx.assessments["SC-8"].committee_confirmed);

    // Deciding one request keeps the run suspended until the last one.
    let after_first = orch
        .resume(&ctx.run_id, &ctx.pending_approvals[0], true, "isso", None)
        .expect("resume");
    assert_eq!(after_first.status, RunStatus::SuspendedForApproval);

    let after_second = orch
        .resume(&ctx.run_id, &ctx.pending_approvals[1], true, "isso", None)
        .expect("resume");
    assert_eq!(after_second.status, RunStatus::SuspendedForApproval);

    let done = orch
        .resume(&ctx.run_id, &ctx.pending_approvals[2], true, "isso", None)
        .expect("resume");
    assert_eq!(done.status, RunStatus::Completed);
}

#[test]
fn drift_timeout_degrades_the_run_but_completes() {
    let dir = TempDir::new().expect("tempdir");
    let orch = orchestrator_with(
        &dir,
        Arc::new(DriftTimesOut {
            inner: StubProvider::new("aws"),
        }),
    );

    let ctx = start_and_execute(&orch);

    // No drift signal, no failing control, nothing to approve.
    assert_eq!(ctx.status, RunStatus::Completed);
    assert!(ctx.drift_events.is_empty());
    assert!(ctx
        .stage_issues
        .iter()
        .any(|i| i.stage == PipelineStage::DriftDetection
            && i.detail.contains("drift detection unavailable")));
    assert_eq!(ctx.reports.len(), 5);
}

#[test]
fn executing_a_suspended_run_changes_nothing() {
    let dir = TempDir::new().expect("tempdir");
    let orch = orchestrator(&dir);
    let ctx = start_and_execute(&orch);
    assert_eq!(ctx.status, RunStatus::SuspendedForApproval);

    let again = orch.execute(&ctx.run_id).expect("execute");

    assert_eq!(again.status, RunStatus::SuspendedForApproval);
    assert_eq!(again.stage, PipelineStage::ApprovalGate);
    // No duplicate approval requests were filed.
    assert_eq!(
        orch.approvals()
            .list_for_run(&ctx.run_id)
            .expect("list")
            .len(),
        1
    );
}

#[test]
fn cancel_before_execute_stops_at_the_first_boundary() {
    let dir = TempDir::new().expect("tempdir");
    let orch = orchestrator(&dir);
    let run_id = orch.start(scope(), "quarterly check").expect("start");

    orch.cancel(&run_id, "duplicate trigger").expect("cancel");
    let ctx = orch.execute(&run_id).expect("execute");

    match ctx.status {
        RunStatus::Failed { reason } => {
            assert_eq!(reason, "cancelled: duplicate trigger")
        }
        other => panic!("expected failed run, got {:?}", other),
    }
    assert_eq!(ctx.stage, PipelineStage::Failed);
    // Nothing ran: no evidence, no assessments.
    assert!(ctx.evidence.is_empty());
    assert!(ctx.assessments.is_empty());
}

#[test]
fn cancelling_a_suspended_run_fails_it_and_leaves_requests_pending() {
    let dir = TempDir::new().expect("tempdir");
    let orch = orchestrator(&dir);
    let ctx = start_and_execute(&orch);
    let request_id = ctx.pending_approvals[0];

    let cancelled = orch
        .cancel(&ctx.run_id, "superseded by new baseline")
        .expect("cancel");

    assert!(matches!(cancelled.status, RunStatus::Failed { .. }));
    // The request is not auto-decided; it ages out via the sweep.
    assert_eq!(
        orch.approvals().get(&request_id).expect("get").status,
        ApprovalStatus::Pending
    );

    // Resuming a failed run is refused.
    match orch.resume(&ctx.run_id, &request_id, true, "isso", None) {
        Err(PipelineError::NotSuspended(id)) => assert_eq!(id, ctx.run_id),
        other => panic!("expected not-suspended error, got {:?}", other),
    }
}

#[test]
fn completed_run_carries_summary_and_reports() {
    let dir = TempDir::new().expect("tempdir");
    let orch = orchestrator_with(
        &dir,
        Arc::new(DriftTimesOut {
            inner: StubProvider::new("aws"),
        }),
    );
    let ctx = start_and_execute(&orch);
    assert_eq!(ctx.status, RunStatus::Completed);

    let summary = ctx.summary.as_ref().expect("summary");
    assert!(summary.total_controls > 0);
    assert_eq!(
        summary.total_controls,
        summary.passed + summary.failed + summary.partial
            + ctx.assessments
                .values()
                .filter(|a| !matches!(
                    a.status,
                    AssessmentStatus::Pass | AssessmentStatus::Fail | AssessmentStatus::Partial
                ))
                .count()
    );

    let conmon = &ctx.reports["conmon_summary"];
    assert_eq!(conmon["system_id"], "payments-prod");
    assert_eq!(
        conmon["control_summary"]["total_controls"],
        summary.total_controls
    );

    // The stored copy matches what execute() returned.
    let stored = orch.status(&ctx.run_id).expect("status");
    assert_eq!(stored.status, RunStatus::Completed);
    assert_eq!(stored.reports.len(), 5);
}

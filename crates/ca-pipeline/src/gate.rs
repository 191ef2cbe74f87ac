// gate.rs — Stage 8: the approval gate.
//
// The gate is a decision point, not an agent: it reads the assessed run,
// applies the policy thresholds, and either waves the run through or
// files the approval requests that suspend it. Failing controls get a
// committee second opinion first, so a reviewer is only interrupted for
// verdicts the assessors stand behind (or explicitly disagree on).

use serde_json::json;
use uuid::Uuid;

use ca_approval::{ApprovalRequest, ApprovalStore};
use ca_policy::GateThresholds;
use ca_run::{RunContext, Severity};

use crate::committee::{Committee, ReconcileOutcome};
use crate::error::PipelineError;

/// What the gate decided for a run.
#[derive(Debug)]
pub enum GateDecision {
    /// Nothing crossed a threshold; proceed straight to remediation.
    AutoPass,

    /// The run must suspend until every listed request is decided.
    Suspend { request_ids: Vec<Uuid> },
}

pub struct ApprovalGate {
    committee: Committee,
}

impl ApprovalGate {
    pub fn new(committee: Committee) -> Self {
        Self { committee }
    }

    /// Evaluate a run against the gate thresholds.
    ///
    /// Unanimous committee verdicts are written back onto the run's
    /// assessments; split verdicts become their own approval requests.
    /// A single remediation request covering all gating controls is
    /// filed last. The caller owns the actual suspend transition.
    pub fn evaluate(
        &self,
        ctx: &mut RunContext,
        thresholds: &GateThresholds,
        approvals: &ApprovalStore,
    ) -> Result<GateDecision, PipelineError> {
        let hits: Vec<(String, Severity, String)> = ctx
            .assessments_failing_at(thresholds.min_failing_severity)
            .into_iter()
            .map(|a| {
                (
                    a.control_id.clone(),
                    a.severity.unwrap_or(Severity::Moderate),
                    a.rationale.clone().unwrap_or_default(),
                )
            })
            .collect();

        let cat_i_trigger = thresholds.suspend_on_open_cat_i && ctx.has_open_cat_i_finding();
        let drift_trigger =
            thresholds.suspend_on_critical_drift && ctx.has_drift_at(Severity::Critical);

        if hits.is_empty() && !cat_i_trigger && !drift_trigger {
            tracing::debug!(run_id = %ctx.run_id, "gate auto-pass");
            return Ok(GateDecision::AutoPass);
        }

        let mut request_ids = Vec::new();

        for (control_id, _, _) in &hits {
            match self.committee.reconcile(control_id, ctx) {
                ReconcileOutcome::Agreed(verdict) => ctx.upsert_assessment(verdict),
                ReconcileOutcome::Escalated(escalation) => {
                    let request = ApprovalRequest::new(
                        ctx.run_id,
                        "committee_escalation",
                        vec![control_id.clone()],
                        Severity::High,
                        "committee",
                    )
                    .with_payload(json!(escalation));
                    approvals.save(&request)?;
                    request_ids.push(request.request_id);
                }
            }
        }

        let severity = if cat_i_trigger || drift_trigger {
            Severity::Critical
        } else {
            hits.iter()
                .map(|(_, severity, _)| *severity)
                .max()
                .unwrap_or(Severity::High)
        };
        let failed_controls: Vec<_> = hits
            .iter()
            .map(|(control_id, severity, rationale)| {
                json!({
                    "control_id": control_id,
                    "severity": severity.to_string(),
                    "rationale": rationale.chars().take(500).collect::<String>(),
                })
            })
            .collect();
        let affected: Vec<String> = hits.iter().map(|(control_id, _, _)| control_id.clone()).collect();

        let request = ApprovalRequest::new(ctx.run_id, "remediation", affected, severity, "gap_analysis")
            .with_payload(json!({
                "failed_controls": failed_controls,
                "proposed_actions": ["create_poam", "create_tickets"],
                "triggers": {
                    "open_cat_i": cat_i_trigger,
                    "critical_drift": drift_trigger,
                },
            }));
        approvals.save(&request)?;
        request_ids.push(request.request_id);

        tracing::debug!(
            run_id = %ctx.run_id,
            requests = request_ids.len(),
            failing = hits.len(),
            cat_i = cat_i_trigger,
            critical_drift = drift_trigger,
            "gate suspends run"
        );
        Ok(GateDecision::Suspend { request_ids })
    }
}

impl Default for ApprovalGate {
    fn default() -> Self {
        Self::new(Committee::default())
    }
}

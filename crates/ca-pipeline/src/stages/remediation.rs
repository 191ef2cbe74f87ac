// remediation.rs — Stage 9: POA&M scheduling and ticketing.
//
// Every failing or partial control gets a POA&M item on the run record;
// filing it with the provider and cutting a tracker ticket are
// best-effort tool calls on top. A reviewer's rejection is honored
// per-control: rejected controls get no POA&M and no ticket, only a
// stage issue (and optionally a manual-review downgrade) that keeps the
// decision visible on the run.

use std::collections::BTreeSet;

use chrono::Utc;
use serde_json::json;

use ca_approval::ApprovalStatus;
use ca_router::{InvokeOutcome, InvokeRequest};
use ca_run::{
    AssessmentStatus, PipelineStage, PoamItem, RunContext, Severity, StageIssue, TicketRef,
};

use crate::agent::{StageAgent, StageEnv, StageOutcome};
use crate::error::PipelineError;

pub struct RemediationAgent;

impl StageAgent for RemediationAgent {
    fn id(&self) -> &'static str {
        "remediation"
    }

    fn stage(&self) -> PipelineStage {
        PipelineStage::Remediation
    }

    fn execute(
        &self,
        ctx: &mut RunContext,
        env: &StageEnv,
    ) -> Result<StageOutcome, PipelineError> {
        let mut issues = Vec::new();

        // Controls whose remediation a reviewer rejected.
        let rejected: BTreeSet<String> = env
            .router
            .approvals()
            .list_for_run(&ctx.run_id)?
            .into_iter()
            .filter(|r| matches!(r.status, ApprovalStatus::Rejected))
            .flat_map(|r| r.affected_controls)
            .collect();

        let targets: Vec<_> = ctx
            .assessments
            .values()
            .filter(|a| {
                matches!(
                    a.status,
                    AssessmentStatus::Fail | AssessmentStatus::Partial
                )
            })
            .map(|a| {
                (
                    a.control_id.clone(),
                    a.severity.unwrap_or(Severity::Moderate),
                    a.rationale.clone().unwrap_or_default(),
                    a.evidence.clone(),
                )
            })
            .collect();

        let provider = match ctx.scope.providers.first() {
            Some(p) => p.to_string(),
            None => "aws".to_string(),
        };

        for (control_id, severity, rationale, evidence) in targets {
            if rejected.contains(&control_id) {
                issues.push(StageIssue::recoverable(
                    self.stage(),
                    format!(
                        "approval rejected; POA&M and ticket skipped for {}",
                        control_id
                    ),
                ));
                if env.config.reopen_rejected {
                    if let Some(mut reopened) = ctx.assessments.get(&control_id).cloned() {
                        reopened.status = AssessmentStatus::ManualReviewRequired;
                        reopened.rationale = Some(format!(
                            "remediation rejected by reviewer; manual follow-up required for {}",
                            control_id
                        ));
                        ctx.upsert_assessment(reopened);
                    }
                }
                continue;
            }

            let weakness = if rationale.is_empty() {
                format!("{} did not meet its assessment criteria", control_id)
            } else {
                rationale.clone()
            };

            // The POA&M lands on the run record whether or not the
            // provider accepts it; the run is the system of record.
            let item = PoamItem::schedule(&control_id, &weakness, severity, Utc::now());
            let milestones: Vec<_> = item
                .milestones
                .iter()
                .map(|m| {
                    json!({
                        "description": m.description,
                        "due": m.due.to_rfc3339(),
                    })
                })
                .collect();
            let due_date = item.scheduled_completion.to_rfc3339();
            ctx.poam_items.push(item);

            let request = InvokeRequest::new(
                ctx.run_id,
                self.id(),
                "assurance.create_poam_item",
                &provider,
            )
            .with_params(json!({
                "system_id": ctx.scope.system_id,
                "control_id": control_id,
                "weakness": weakness,
                "severity": severity.to_string(),
                "owner": env.config.poam_owner,
                "due_date": due_date,
                "milestones": milestones,
                "evidence_artifact_ids": evidence,
            }))
            .with_severity(severity)
            .with_affected_controls(vec![control_id.clone()])
            .with_correlation(self.stage().to_string())
            .with_idempotency_key(format!("poam-{}", control_id));

            match env.router.invoke(&request) {
                Ok(response) => match response.outcome {
                    InvokeOutcome::Success { .. } => {}
                    other => issues.push(
                        StageIssue::recoverable(
                            self.stage(),
                            format!(
                                "POA&M filing for {} failed: {:?}",
                                control_id, other
                            ),
                        )
                        .with_provider(&provider),
                    ),
                },
                Err(err) => issues.push(
                    StageIssue::recoverable(
                        self.stage(),
                        format!("POA&M filing for {} failed: {}", control_id, err),
                    )
                    .with_provider(&provider),
                ),
            }

            // High and critical findings also get a tracker ticket.
            if severity >= Severity::High {
                let summary = format!(
                    "[{}] {}: remediation required",
                    ctx.scope.system_id, control_id
                );
                let request = InvokeRequest::new(
                    ctx.run_id,
                    self.id(),
                    "ticketing.create_ticket",
                    &env.config.tracker,
                )
                .with_params(json!({
                    "summary": summary,
                    "description": weakness,
                    "severity": severity.to_string(),
                    "control_id": control_id,
                }))
                .with_severity(severity)
                .with_affected_controls(vec![control_id.clone()])
                .with_correlation(self.stage().to_string())
                .with_idempotency_key(format!("ticket-{}", control_id));

                match env.router.invoke(&request) {
                    Ok(response) => match response.outcome {
                        InvokeOutcome::Success { output } => {
                            match output["ticket_id"].as_str() {
                                Some(ticket_id) => ctx.tickets.push(TicketRef {
                                    ticket_id: ticket_id.to_string(),
                                    tracker: env.config.tracker.clone(),
                                    control_id: Some(control_id.clone()),
                                    summary,
                                    severity,
                                    created_at: Utc::now(),
                                }),
                                None => issues.push(StageIssue::recoverable(
                                    self.stage(),
                                    format!(
                                        "ticket created for {} but no ticket_id returned",
                                        control_id
                                    ),
                                )),
                            }
                        }
                        other => issues.push(StageIssue::recoverable(
                            self.stage(),
                            format!("ticket for {} failed: {:?}", control_id, other),
                        )),
                    },
                    Err(err) => issues.push(StageIssue::recoverable(
                        self.stage(),
                        format!("ticket for {} failed: {}", control_id, err),
                    )),
                }
            }
        }

        tracing::debug!(
            run_id = %ctx.run_id,
            poam_items = ctx.poam_items.len(),
            tickets = ctx.tickets.len(),
            "remediation scheduled"
        );

        if issues.is_empty() {
            Ok(StageOutcome::Complete)
        } else {
            Ok(StageOutcome::Partial(issues))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ca_run::{ControlAssessment, RunScope};

    fn context() -> RunContext {
        RunContext::new(
            RunScope::new("app-prod", "Payments"),
            "Are we compliant?".to_string(),
        )
    }

    #[test]
    fn failing_controls_get_poam_items_and_tickets() {
        let dir = tempfile::tempdir().expect("tempdir");
        let env = crate::stages::test_env(&dir);
        let mut ctx = context();
        ctx.upsert_assessment(
            ControlAssessment::new("SC-7", AssessmentStatus::Fail, 0.85)
                .with_severity(Severity::High)
                .with_rationale("boundary device drift"),
        );
        ctx.upsert_assessment(
            ControlAssessment::new("CM-6", AssessmentStatus::Partial, 0.7)
                .with_severity(Severity::Moderate),
        );
        ctx.upsert_assessment(ControlAssessment::new("AC-2", AssessmentStatus::Pass, 0.9));

        let outcome = RemediationAgent.execute(&mut ctx, &env).expect("remediate");

        assert!(matches!(outcome, StageOutcome::Complete));
        // Fail and partial each get a POA&M; only high+ gets a ticket.
        assert_eq!(ctx.poam_items.len(), 2);
        assert_eq!(ctx.tickets.len(), 1);
        assert_eq!(ctx.tickets[0].control_id.as_deref(), Some("SC-7"));
        assert!(ctx.tickets[0].ticket_id.starts_with("STUB-"));

        let sc7 = ctx
            .poam_items
            .iter()
            .find(|p| p.control_id == "SC-7")
            .expect("SC-7 poam");
        assert_eq!(sc7.weakness, "boundary device drift");
    }

    #[test]
    fn rejected_controls_are_skipped_with_an_issue() {
        let dir = tempfile::tempdir().expect("tempdir");
        let env = crate::stages::test_env(&dir);
        let mut ctx = context();
        ctx.upsert_assessment(
            ControlAssessment::new("SC-7", AssessmentStatus::Fail, 0.85)
                .with_severity(Severity::High),
        );

        // A reviewer rejected the remediation plan for SC-7.
        let request = ca_approval::ApprovalRequest::new(
            ctx.run_id,
            "remediation",
            vec!["SC-7".to_string()],
            Severity::High,
            "gap_analysis",
        );
        env.router.approvals().save(&request).expect("save");
        env.router
            .approvals()
            .decide(&request.request_id, false, "isso", None)
            .expect("decide");

        let outcome = RemediationAgent.execute(&mut ctx, &env).expect("remediate");

        assert!(ctx.poam_items.is_empty());
        assert!(ctx.tickets.is_empty());
        match outcome {
            StageOutcome::Partial(issues) => {
                assert_eq!(issues.len(), 1);
                assert!(issues[0].detail.contains("SC-7"));
            }
            other => panic!("expected partial outcome, got {:?}", other),
        }
    }

    #[test]
    fn reopen_rejected_downgrades_to_manual_review() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut env = crate::stages::test_env(&dir);
        env.config.reopen_rejected = true;
        let mut ctx = context();
        ctx.upsert_assessment(
            ControlAssessment::new("SC-7", AssessmentStatus::Fail, 0.85)
                .with_severity(Severity::High),
        );

        let request = ca_approval::ApprovalRequest::new(
            ctx.run_id,
            "remediation",
            vec!["SC-7".to_string()],
            Severity::High,
            "gap_analysis",
        );
        env.router.approvals().save(&request).expect("save");
        env.router
            .approvals()
            .decide(&request.request_id, false, "isso", None)
            .expect("decide");

        RemediationAgent.execute(&mut ctx, &env).expect("remediate");

        assert_eq!(
            ctx.assessments["SC-7"].status,
            AssessmentStatus::ManualReviewRequired
        );
    }
}

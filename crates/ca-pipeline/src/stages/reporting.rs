// reporting.rs — Stage 10: report generation.
//
// Pure aggregation over the finished run: no tool calls, no I/O. Each
// report is a JSON document under a stable key in ctx.reports so the
// daemon and CLI can serve them without knowing their shapes. The run
// summary computed here is also what the completion event carries.

use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::{json, Value};

use ca_run::{
    control_family, AssessmentStatus, PipelineStage, PostureSummary, RunContext, RunSummary,
    Severity,
};

use crate::agent::{StageAgent, StageEnv, StageOutcome};
use crate::error::PipelineError;

/// Cap on entries in the top-risks report.
const MAX_TOP_RISKS: usize = 10;

pub struct ReportingAgent;

impl StageAgent for ReportingAgent {
    fn id(&self) -> &'static str {
        "reporting"
    }

    fn stage(&self) -> PipelineStage {
        PipelineStage::Reporting
    }

    fn execute(
        &self,
        ctx: &mut RunContext,
        _env: &StageEnv,
    ) -> Result<StageOutcome, PipelineError> {
        let summary = RunSummary::compute(&ctx.assessments);
        let posture = PostureSummary::tally(&ctx.posture_findings);
        let top_risks = top_risks(ctx);

        ctx.reports
            .insert("conmon_summary".to_string(), conmon_summary(ctx, &summary, &posture));
        ctx.reports.insert(
            "executive_summary".to_string(),
            executive_summary(ctx, &summary, &posture, &top_risks),
        );
        ctx.reports
            .insert("family_breakdown".to_string(), family_breakdown(ctx));
        ctx.reports
            .insert("top_risks".to_string(), json!({ "risks": top_risks }));
        ctx.reports.insert("ssp_delta".to_string(), ssp_delta(ctx));

        tracing::debug!(
            run_id = %ctx.run_id,
            score = summary.score,
            posture = summary.posture_label(),
            "reports generated"
        );
        ctx.summary = Some(summary);
        Ok(StageOutcome::Complete)
    }
}

/// The monthly continuous-monitoring rollup.
fn conmon_summary(ctx: &RunContext, summary: &RunSummary, posture: &PostureSummary) -> Value {
    let now = Utc::now();
    let fresh = ctx.evidence.iter().filter(|e| !e.is_stale(now)).count();
    let tickets: Vec<_> = ctx
        .tickets
        .iter()
        .map(|t| {
            json!({
                "ticket_id": t.ticket_id,
                "tracker": t.tracker,
                "control_id": t.control_id,
            })
        })
        .collect();

    json!({
        "period": now.format("%Y-%m").to_string(),
        "system_id": ctx.scope.system_id,
        "baseline": ctx.scope.baseline.to_string(),
        "providers_assessed": ctx.scope.providers.iter().map(|p| p.to_string()).collect::<Vec<_>>(),
        "overall_compliance_score": summary.score,
        "control_summary": json!(summary),
        "drift_summary": {
            "total_events": ctx.drift_events.len(),
            "by_severity": severity_histogram(ctx.drift_events.iter().map(|d| d.severity)),
        },
        "stig_summary": {
            "total": posture.total,
            "open": posture.open,
            "cat_i_open": posture.cat_i_open,
        },
        "poam_summary": {
            "new_items": ctx.poam_items.len(),
            "by_severity": severity_histogram(ctx.poam_items.iter().map(|p| p.severity)),
        },
        "remediation_tickets": tickets,
        "evidence_freshness": {
            "total_artifacts": ctx.evidence.len(),
            "fresh": fresh,
        },
        "narrative": format!(
            "Assessed {} controls for {}: {} passed, {} failed, {} partial. {} drift event(s), {} open STIG finding(s), {} POA&M item(s) scheduled.",
            summary.total_controls,
            ctx.scope.system_id,
            summary.passed,
            summary.failed,
            summary.partial,
            ctx.drift_events.len(),
            posture.open,
            ctx.poam_items.len(),
        ),
    })
}

/// The one-page view for leadership.
fn executive_summary(
    ctx: &RunContext,
    summary: &RunSummary,
    posture: &PostureSummary,
    top_risks: &[Value],
) -> Value {
    json!({
        "compliance_posture": summary.posture_label(),
        "compliance_score": summary.score,
        "key_metrics": {
            "controls_assessed": summary.total_controls,
            "controls_passing": summary.passed,
            "controls_failing": summary.failed,
            "open_poam_items": ctx.poam_items.len(),
            "drift_events": ctx.drift_events.len(),
            "cat_i_stig_findings": posture.cat_i_open,
        },
        "top_risks": top_risks,
        "trend": "N/A",
    })
}

/// Pass/fail tallies per control family.
fn family_breakdown(ctx: &RunContext) -> Value {
    #[derive(Default)]
    struct Tally {
        total: usize,
        pass: usize,
        fail: usize,
        partial: usize,
        other: usize,
    }

    let mut families: BTreeMap<&str, Tally> = BTreeMap::new();
    for assessment in ctx.assessments.values() {
        let tally = families
            .entry(control_family(&assessment.control_id))
            .or_default();
        tally.total += 1;
        match assessment.status {
            AssessmentStatus::Pass => tally.pass += 1,
            AssessmentStatus::Fail => tally.fail += 1,
            AssessmentStatus::Partial => tally.partial += 1,
            _ => tally.other += 1,
        }
    }

    let breakdown: BTreeMap<&str, Value> = families
        .into_iter()
        .map(|(family, tally)| {
            let score = if tally.total > 0 {
                tally.pass as f64 / tally.total as f64 * 100.0
            } else {
                0.0
            };
            (
                family,
                json!({
                    "total": tally.total,
                    "pass": tally.pass,
                    "fail": tally.fail,
                    "partial": tally.partial,
                    "other": tally.other,
                    "score": score,
                }),
            )
        })
        .collect();
    json!(breakdown)
}

/// The highest-leverage problems on the run, worst first, capped.
fn top_risks(ctx: &RunContext) -> Vec<Value> {
    let mut risks = Vec::new();

    let mut failures: Vec<_> = ctx
        .assessments
        .values()
        .filter(|a| {
            a.status == AssessmentStatus::Fail
                && a.severity.map_or(false, |s| s >= Severity::High)
        })
        .collect();
    failures.sort_by(|a, b| b.severity.cmp(&a.severity));
    for assessment in failures {
        let detail: String = assessment
            .rationale
            .as_deref()
            .unwrap_or("")
            .chars()
            .take(200)
            .collect();
        risks.push(json!({
            "risk_type": "control_failure",
            "control_id": assessment.control_id,
            "severity": assessment.severity.map(|s| s.to_string()),
            "detail": detail,
        }));
    }

    for finding in ctx.posture_findings.iter().filter(|f| f.is_open_cat_i()) {
        risks.push(json!({
            "risk_type": "stig_cat_i",
            "finding_id": finding.finding_id,
            "severity": "critical",
            "detail": finding.title,
        }));
    }

    for event in ctx
        .drift_events
        .iter()
        .filter(|d| d.severity == Severity::Critical)
    {
        risks.push(json!({
            "risk_type": "critical_drift",
            "resource_id": event.resource_id,
            "severity": "critical",
            "detail": format!("critical drift on {}", event.change),
        }));
    }

    risks.truncate(MAX_TOP_RISKS);
    risks
}

fn severity_histogram(severities: impl Iterator<Item = Severity>) -> BTreeMap<String, usize> {
    let mut histogram = BTreeMap::new();
    for severity in severities {
        *histogram.entry(severity.to_string()).or_insert(0) += 1;
    }
    histogram
}

/// Deltas the system security plan needs: documented posture that the
/// run contradicted, and gaps the plan claims are implemented.
fn ssp_delta(ctx: &RunContext) -> Value {
    let mut deltas = Vec::new();
    for assessment in ctx.assessments.values() {
        if !assessment.contradictions.is_empty() {
            deltas.push(json!({
                "control_id": assessment.control_id,
                "delta_type": "contradiction",
                "details": assessment.contradictions,
            }));
        }
        if assessment.status == AssessmentStatus::Fail {
            deltas.push(json!({
                "control_id": assessment.control_id,
                "delta_type": "implementation_gap",
                "description": assessment.rationale,
            }));
        }
    }
    json!({
        "total_deltas": deltas.len(),
        "deltas": deltas,
        "generated_at": Utc::now().to_rfc3339(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ca_run::{
        CloudProvider, ControlAssessment, DriftEvent, FindingCategory, FindingStatus,
        PostureFinding, RunScope,
    };

    fn assessed_context() -> RunContext {
        let mut ctx = RunContext::new(
            RunScope::new("app-prod", "Payments"),
            "Are we compliant?".to_string(),
        );
        ctx.upsert_assessment(ControlAssessment::new("AC-2", AssessmentStatus::Pass, 0.9));
        let mut failed = ControlAssessment::new("SC-7", AssessmentStatus::Fail, 0.85)
            .with_severity(Severity::Critical)
            .with_rationale("public endpoint outside the approved boundary");
        failed.contradictions.push("policy_vs_config".to_string());
        ctx.upsert_assessment(failed);
        ctx.upsert_assessment(
            ControlAssessment::new("CM-6", AssessmentStatus::Partial, 0.7)
                .with_severity(Severity::Moderate),
        );
        ctx.record_drift(DriftEvent::new(
            CloudProvider::Aws,
            "network",
            "sg-1",
            "new_public_endpoint",
            Severity::Critical,
        ));
        ctx.posture_findings.push(PostureFinding {
            finding_id: "V-1".to_string(),
            title: "dod banner missing".to_string(),
            category: FindingCategory::CatI,
            status: FindingStatus::Open,
            related_controls: vec!["AC-8".to_string()],
        });
        ctx
    }

    #[test]
    fn all_five_reports_are_generated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let env = crate::stages::test_env(&dir);
        let mut ctx = assessed_context();

        let outcome = ReportingAgent.execute(&mut ctx, &env).expect("report");

        assert!(matches!(outcome, StageOutcome::Complete));
        for key in [
            "conmon_summary",
            "executive_summary",
            "family_breakdown",
            "top_risks",
            "ssp_delta",
        ] {
            assert!(ctx.reports.contains_key(key), "missing report {}", key);
        }

        let summary = ctx.summary.as_ref().expect("summary");
        assert_eq!(summary.total_controls, 3);
        assert_eq!(summary.passed, 1);
        // 1/3 passing puts the run At Risk.
        assert_eq!(summary.posture_label(), "At Risk");
    }

    #[test]
    fn conmon_summary_rolls_up_the_run() {
        let dir = tempfile::tempdir().expect("tempdir");
        let env = crate::stages::test_env(&dir);
        let mut ctx = assessed_context();
        ReportingAgent.execute(&mut ctx, &env).expect("report");

        let conmon = &ctx.reports["conmon_summary"];
        assert_eq!(conmon["period"], Utc::now().format("%Y-%m").to_string());
        assert_eq!(conmon["baseline"], "fedramp_mod");
        assert_eq!(conmon["drift_summary"]["total_events"], 1);
        assert_eq!(conmon["drift_summary"]["by_severity"]["critical"], 1);
        assert_eq!(conmon["stig_summary"]["cat_i_open"], 1);
        assert_eq!(conmon["evidence_freshness"]["total_artifacts"], 0);
    }

    #[test]
    fn top_risks_rank_control_failures_first() {
        let ctx = assessed_context();
        let risks = top_risks(&ctx);

        assert_eq!(risks.len(), 3);
        assert_eq!(risks[0]["risk_type"], "control_failure");
        assert_eq!(risks[0]["control_id"], "SC-7");
        assert_eq!(risks[1]["risk_type"], "stig_cat_i");
        assert_eq!(risks[2]["risk_type"], "critical_drift");
    }

    #[test]
    fn ssp_delta_counts_contradictions_and_gaps() {
        let ctx = assessed_context();
        let delta = ssp_delta(&ctx);

        // SC-7 contributes both a contradiction and an implementation gap.
        assert_eq!(delta["total_deltas"], 2);
        assert_eq!(delta["deltas"][0]["delta_type"], "contradiction");
        assert_eq!(delta["deltas"][1]["delta_type"], "implementation_gap");
    }

    #[test]
    fn family_breakdown_scores_per_family() {
        let ctx = assessed_context();
        let breakdown = family_breakdown(&ctx);

        assert_eq!(breakdown["AC"]["pass"], 1);
        assert_eq!(breakdown["AC"]["score"], 100.0);
        assert_eq!(breakdown["SC"]["fail"], 1);
        assert_eq!(breakdown["SC"]["score"], 0.0);
        assert_eq!(breakdown["CM"]["partial"], 1);
    }
}

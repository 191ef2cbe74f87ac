// gap.rs — Stage 7: gap analysis.
//
// Weighs the evidence collected for each mapped control against the
// signals gathered upstream (drift, STIG findings) and produces one
// ControlAssessment per control. Hard signals outrank evidence math:
// an open CAT I fails the control no matter how fresh the artifacts
// look. Evidence is shared family-wide because collection keys every
// artifact to the family's anchor control.

use ca_run::{
    control_family, AssessmentStatus, ControlAssessment, ControlMap, EvidenceKind, PipelineStage,
    RunContext, Severity,
};

use crate::agent::{StageAgent, StageEnv, StageOutcome};
use crate::error::PipelineError;

/// Below this sufficiency score the tool refuses to judge and asks a
/// human instead.
const MANUAL_REVIEW_FLOOR: f64 = 0.3;

/// At or above this sufficiency score, evidence alone can pass a
/// control that no signal contradicts.
const PASS_FLOOR: f64 = 0.7;

/// Families whose failures start at high severity; everything else
/// starts at moderate.
const HIGH_IMPACT_FAMILIES: [&str; 5] = ["AC", "AU", "IA", "SC", "SI"];

pub struct GapAnalysisAgent;

impl StageAgent for GapAnalysisAgent {
    fn id(&self) -> &'static str {
        "gap_analysis"
    }

    fn stage(&self) -> PipelineStage {
        PipelineStage::GapAnalysis
    }

    fn execute(
        &self,
        ctx: &mut RunContext,
        _env: &StageEnv,
    ) -> Result<StageOutcome, PipelineError> {
        let map = match ctx.control_map.clone() {
            Some(map) => map,
            None => {
                return Err(PipelineError::Fatal {
                    stage: self.stage(),
                    detail: "control map missing; control_mapping did not run".to_string(),
                })
            }
        };

        for control_id in &map.controls {
            let assessment = assess_control(ctx, &map, control_id);
            ctx.upsert_assessment(assessment);
        }

        tracing::debug!(
            run_id = %ctx.run_id,
            controls = ctx.assessments.len(),
            "gap analysis complete"
        );
        Ok(StageOutcome::Complete)
    }
}

/// Assess one control from the run's evidence and signals.
///
/// Sufficiency is a weighted blend of completeness (covered evidence
/// kinds over required kinds), freshness, and source authority. The
/// status ladder is ordered by how actionable the signal is: an open
/// CAT I beats drift beats lesser findings beats the evidence score.
pub(crate) fn assess_control(
    ctx: &RunContext,
    map: &ControlMap,
    control_id: &str,
) -> ControlAssessment {
    let family = control_family(control_id);

    let evidence: Vec<_> = ctx
        .evidence
        .iter()
        .filter(|e| control_family(&e.control_id) == family)
        .collect();

    let required = map.requirements_for(family);
    let covered = required
        .iter()
        .filter(|kind| evidence.iter().any(|e| e.kind == **kind))
        .count();
    let completeness = if required.is_empty() {
        1.0
    } else {
        covered as f64 / required.len() as f64
    };
    let freshness = if evidence.is_empty() { 0.0 } else { 0.8 };
    let authority = if evidence.is_empty() { 0.0 } else { 0.85 };
    let sufficiency = 0.4 * completeness + 0.3 * freshness + 0.3 * authority;

    let open_cat_i: Vec<&str> = ctx
        .posture_findings
        .iter()
        .filter(|f| f.is_open_cat_i() && f.touches_control(control_id))
        .map(|f| f.finding_id.as_str())
        .collect();
    let open_lesser = ctx
        .posture_findings
        .iter()
        .any(|f| f.is_open() && !f.is_open_cat_i() && f.touches_control(control_id));
    let drift: Vec<_> = ctx
        .drift_events
        .iter()
        .filter(|d| d.touches_control(control_id))
        .collect();
    let worst_drift = drift.iter().map(|d| d.severity).max();
    let critical_drift = worst_drift == Some(Severity::Critical);

    let (status, confidence, rationale) = if !open_cat_i.is_empty() {
        (
            AssessmentStatus::Fail,
            0.95,
            format!(
                "open CAT I finding(s) {}; remediation required before this control can pass",
                open_cat_i.join(", ")
            ),
        )
    } else if worst_drift.map_or(false, |s| s >= Severity::High) {
        let changes: Vec<&str> = drift.iter().map(|d| d.change.as_str()).collect();
        (
            AssessmentStatus::Fail,
            0.85,
            format!("configuration drift ({}) contradicts the approved baseline", changes.join(", ")),
        )
    } else if open_lesser {
        (
            AssessmentStatus::Partial,
            0.75,
            "open STIG finding(s) below CAT I affect this control".to_string(),
        )
    } else if sufficiency < MANUAL_REVIEW_FLOOR {
        (
            AssessmentStatus::ManualReviewRequired,
            MANUAL_REVIEW_FLOOR,
            format!(
                "evidence sufficiency {:.2} is below the assessment floor; manual review required",
                sufficiency
            ),
        )
    } else if !drift.is_empty() {
        (
            AssessmentStatus::Partial,
            0.7,
            format!(
                "moderate drift on {} resource(s) pending configuration review",
                drift.len()
            ),
        )
    } else if sufficiency >= PASS_FLOOR {
        (
            AssessmentStatus::Pass,
            sufficiency.min(0.95),
            format!(
                "{}/{} required evidence kinds present, sufficiency {:.2}",
                covered,
                required.len(),
                sufficiency
            ),
        )
    } else {
        (
            AssessmentStatus::Partial,
            0.5,
            format!(
                "partial evidence coverage, {}/{} required kinds present",
                covered,
                required.len()
            ),
        )
    };

    let citations: Vec<_> = evidence.iter().take(5).map(|e| e.artifact_id).collect();
    let mut assessment = ControlAssessment::new(control_id, status, confidence)
        .with_evidence(citations)
        .with_rationale(rationale);

    if matches!(status, AssessmentStatus::Fail | AssessmentStatus::Partial) {
        assessment = assessment.with_severity(failure_severity(
            family,
            !open_cat_i.is_empty(),
            critical_drift,
        ));
    }

    // A policy document that says one thing while the live config drifts
    // another way is a contradiction worth flagging on its own.
    let has_policy_doc = evidence.iter().any(|e| e.kind == EvidenceKind::PolicyDoc);
    if has_policy_doc && !drift.is_empty() {
        assessment
            .contradictions
            .push("policy_vs_config".to_string());
    }

    assessment
}

/// Severity of a failed or partial control. High-impact families start
/// at high and escalate to critical when a CAT I or critical drift is
/// behind the failure.
pub(crate) fn failure_severity(family: &str, cat_i: bool, critical_drift: bool) -> Severity {
    if HIGH_IMPACT_FAMILIES.contains(&family) {
        if cat_i || critical_drift {
            Severity::Critical
        } else {
            Severity::High
        }
    } else {
        Severity::Moderate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    use ca_run::{
        DriftEvent, EvidenceRef, FindingCategory, FindingStatus, PostureFinding, RunScope,
    };

    fn context() -> RunContext {
        RunContext::new(
            RunScope::new("app-prod", "Payments"),
            "Are we compliant?".to_string(),
        )
    }

    fn map() -> ControlMap {
        ControlMap {
            families: vec!["AC".to_string(), "CM".to_string()],
            controls: vec!["AC-2".to_string(), "CM-2".to_string()],
            evidence_requirements: [(
                "AC".to_string(),
                vec![
                    EvidenceKind::ConfigSnapshot,
                    EvidenceKind::LogExport,
                    EvidenceKind::PolicyDoc,
                ],
            )]
            .into_iter()
            .collect(),
        }
    }

    fn evidence(control_id: &str, kind: EvidenceKind) -> EvidenceRef {
        EvidenceRef {
            artifact_id: Uuid::new_v4(),
            control_id: control_id.to_string(),
            kind,
            uri: format!("vault://test/{}", Uuid::new_v4()),
            sha256: "0".repeat(64),
            provider: ca_run::CloudProvider::Aws,
            collected_at: Utc::now(),
        }
    }

    #[test]
    fn no_evidence_requires_manual_review() {
        let ctx = context();
        let assessment = assess_control(&ctx, &map(), "AC-2");
        assert_eq!(assessment.status, AssessmentStatus::ManualReviewRequired);
        assert!(assessment.confidence <= 0.3);
    }

    #[test]
    fn full_evidence_passes() {
        let mut ctx = context();
        for kind in [
            EvidenceKind::ConfigSnapshot,
            EvidenceKind::LogExport,
            EvidenceKind::PolicyDoc,
        ] {
            ctx.append_evidence(evidence("AC-2", kind));
        }

        let assessment = assess_control(&ctx, &map(), "AC-2");
        assert_eq!(assessment.status, AssessmentStatus::Pass);
        // 0.4 * 1.0 + 0.3 * 0.8 + 0.3 * 0.85
        assert!((assessment.confidence - 0.895).abs() < 1e-9);
        assert_eq!(assessment.evidence.len(), 3);
        assert!(assessment.severity.is_none());
    }

    #[test]
    fn evidence_is_shared_across_the_family() {
        // Evidence collected under the anchor control must count for
        // every control in the family.
        let mut ctx = context();
        for kind in [
            EvidenceKind::ConfigSnapshot,
            EvidenceKind::LogExport,
            EvidenceKind::PolicyDoc,
        ] {
            ctx.append_evidence(evidence("AC-2", kind));
        }

        let assessment = assess_control(&ctx, &map(), "AC-17");
        assert_eq!(assessment.status, AssessmentStatus::Pass);
    }

    #[test]
    fn open_cat_i_fails_despite_full_evidence() {
        let mut ctx = context();
        for kind in [
            EvidenceKind::ConfigSnapshot,
            EvidenceKind::LogExport,
            EvidenceKind::PolicyDoc,
        ] {
            ctx.append_evidence(evidence("AC-2", kind));
        }
        ctx.posture_findings.push(PostureFinding {
            finding_id: "V-254240".to_string(),
            title: "dod banner missing".to_string(),
            category: FindingCategory::CatI,
            status: FindingStatus::Open,
            related_controls: vec!["AC-2".to_string()],
        });

        let assessment = assess_control(&ctx, &map(), "AC-2");
        assert_eq!(assessment.status, AssessmentStatus::Fail);
        assert_eq!(assessment.severity, Some(Severity::Critical));
        match assessment.rationale {
            Some(r) => assert!(r.contains("V-254240")),
            None => panic!("expected a rationale"),
        }
    }

    #[test]
    fn high_drift_fails_and_flags_policy_contradiction() {
        let mut ctx = context();
        ctx.append_evidence(evidence("AC-2", EvidenceKind::PolicyDoc));
        ctx.record_drift(
            DriftEvent::new(
                ca_run::CloudProvider::Aws,
                "iam",
                "role/admin",
                "policy_change",
                Severity::High,
            )
            .with_related_controls(vec!["AC-2".to_string()]),
        );

        let assessment = assess_control(&ctx, &map(), "AC-2");
        assert_eq!(assessment.status, AssessmentStatus::Fail);
        assert_eq!(assessment.severity, Some(Severity::High));
        assert_eq!(assessment.contradictions, vec!["policy_vs_config"]);
    }

    #[test]
    fn moderate_drift_downgrades_to_partial() {
        let mut ctx = context();
        for kind in [
            EvidenceKind::ConfigSnapshot,
            EvidenceKind::LogExport,
            EvidenceKind::PolicyDoc,
        ] {
            ctx.append_evidence(evidence("AC-2", kind));
        }
        ctx.record_drift(
            DriftEvent::new(
                ca_run::CloudProvider::Aws,
                "iam",
                "user/bob",
                "new_user",
                Severity::Moderate,
            )
            .with_related_controls(vec!["AC-2".to_string()]),
        );

        let assessment = assess_control(&ctx, &map(), "AC-2");
        assert_eq!(assessment.status, AssessmentStatus::Partial);
        assert_eq!(assessment.severity, Some(Severity::High));
    }

    #[test]
    fn lesser_families_fail_at_moderate() {
        assert_eq!(failure_severity("CM", false, false), Severity::Moderate);
        assert_eq!(failure_severity("CM", true, false), Severity::Moderate);
        assert_eq!(failure_severity("SC", false, true), Severity::Critical);
        assert_eq!(failure_severity("AU", false, false), Severity::High);
    }

    #[test]
    fn agent_assesses_every_mapped_control() {
        let mut ctx = context();
        ctx.control_map = Some(map());

        let dir = tempfile::tempdir().expect("tempdir");
        let env = crate::stages::test_env(&dir);
        let outcome = GapAnalysisAgent
            .execute(&mut ctx, &env)
            .expect("gap analysis");

        assert!(matches!(outcome, StageOutcome::Complete));
        assert_eq!(ctx.assessments.len(), 2);
        assert!(ctx.assessments.contains_key("AC-2"));
        assert!(ctx.assessments.contains_key("CM-2"));
    }

    #[test]
    fn missing_control_map_is_fatal() {
        let mut ctx = context();
        let dir = tempfile::tempdir().expect("tempdir");
        let env = crate::stages::test_env(&dir);

        match GapAnalysisAgent.execute(&mut ctx, &env) {
            Err(PipelineError::Fatal { stage, .. }) => {
                assert_eq!(stage, PipelineStage::GapAnalysis)
            }
            other => panic!("expected fatal error, got {:?}", other),
        }
    }
}

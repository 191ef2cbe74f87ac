// committee.rs — Assessment committee.
//
// Controls that fail hard enough to gate a run get a second opinion
// before anyone is asked to approve a remediation plan. Each Assessor
// scores the control independently from the same run context; the
// committee accepts a unanimous verdict and escalates a split one to
// the human reviewer, attached to the approval request so the reviewer
// sees exactly where the assessors diverged.

use serde::Serialize;

use ca_run::{AssessmentStatus, ControlAssessment, RunContext, Severity};

use crate::stages::gap;

/// An independent scoring strategy for a single control.
pub trait Assessor: Send + Sync {
    /// Stable identifier, recorded on escalations.
    fn id(&self) -> &'static str;

    fn assess(&self, control_id: &str, ctx: &RunContext) -> ControlAssessment;
}

/// Scores a control from its evidence, the same way gap analysis does.
pub struct EvidenceScorer;

impl Assessor for EvidenceScorer {
    fn id(&self) -> &'static str {
        "evidence_sufficiency"
    }

    fn assess(&self, control_id: &str, ctx: &RunContext) -> ControlAssessment {
        let map = ctx.control_map.clone().unwrap_or_default();
        gap::assess_control(ctx, &map, control_id)
    }
}

/// Scores a control from operational signals alone: drift and STIG
/// findings, ignoring the evidence ledger. Catches the case where the
/// paperwork looks fine but the environment does not.
pub struct SignalScorer;

impl Assessor for SignalScorer {
    fn id(&self) -> &'static str {
        "signal_weighted"
    }

    fn assess(&self, control_id: &str, ctx: &RunContext) -> ControlAssessment {
        let family = ca_run::control_family(control_id);
        let open_cat_i = ctx
            .posture_findings
            .iter()
            .any(|f| f.is_open_cat_i() && f.touches_control(control_id));
        let worst_drift = ctx
            .drift_events
            .iter()
            .filter(|d| d.touches_control(control_id))
            .map(|d| d.severity)
            .max();
        let has_family_evidence = ctx
            .evidence
            .iter()
            .any(|e| ca_run::control_family(&e.control_id) == family);

        let (status, confidence, rationale) = if open_cat_i {
            (
                AssessmentStatus::Fail,
                0.9,
                "open CAT I finding against this control",
            )
        } else if worst_drift.map_or(false, |s| s >= Severity::High) {
            (
                AssessmentStatus::Fail,
                0.8,
                "high-severity drift against this control",
            )
        } else if worst_drift.is_some() {
            (
                AssessmentStatus::Partial,
                0.7,
                "drift observed against this control",
            )
        } else if has_family_evidence {
            (
                AssessmentStatus::Pass,
                0.75,
                "no adverse signals, family evidence on file",
            )
        } else {
            (
                AssessmentStatus::Partial,
                0.5,
                "no signals and no evidence to judge from",
            )
        };

        let mut assessment =
            ControlAssessment::new(control_id, status, confidence).with_rationale(rationale);
        if matches!(status, AssessmentStatus::Fail | AssessmentStatus::Partial) {
            assessment = assessment.with_severity(gap::failure_severity(
                family,
                open_cat_i,
                worst_drift == Some(Severity::Critical),
            ));
        }
        assessment
    }
}

/// One assessor's verdict, preserved on escalation.
#[derive(Debug, Clone, Serialize)]
pub struct AssessorOpinion {
    pub assessor_id: String,
    pub status: AssessmentStatus,
    pub confidence: f64,
}

/// A split verdict that needs a human to break the tie.
#[derive(Debug, Clone, Serialize)]
pub struct CommitteeEscalation {
    pub control_id: String,
    pub opinions: Vec<AssessorOpinion>,
}

#[derive(Debug)]
pub enum ReconcileOutcome {
    /// All assessors agreed on the status; the highest-confidence
    /// assessment carries the verdict.
    Agreed(ControlAssessment),

    /// Assessors disagreed; the reviewer decides.
    Escalated(CommitteeEscalation),
}

pub struct Committee {
    assessors: Vec<Box<dyn Assessor>>,
}

impl Committee {
    pub fn new(assessors: Vec<Box<dyn Assessor>>) -> Self {
        Self { assessors }
    }

    /// Re-score one control across all assessors and reconcile.
    pub fn reconcile(&self, control_id: &str, ctx: &RunContext) -> ReconcileOutcome {
        let mut opinions = Vec::new();
        let mut assessments = Vec::new();
        for assessor in &self.assessors {
            let assessment = assessor.assess(control_id, ctx);
            opinions.push(AssessorOpinion {
                assessor_id: assessor.id().to_string(),
                status: assessment.status,
                confidence: assessment.confidence,
            });
            assessments.push(assessment);
        }

        let unanimous = match assessments.first() {
            Some(first) => {
                let status = first.status;
                assessments.iter().all(|a| a.status == status)
            }
            // An empty committee cannot agree on anything.
            None => false,
        };

        if !unanimous {
            return ReconcileOutcome::Escalated(CommitteeEscalation {
                control_id: control_id.to_string(),
                opinions,
            });
        }

        let mut best: Option<ControlAssessment> = None;
        for assessment in assessments {
            best = match best {
                Some(current) if current.confidence >= assessment.confidence => Some(current),
                _ => Some(assessment),
            };
        }
        match best {
            Some(mut verdict) => {
                verdict.committee_confirmed = true;
                ReconcileOutcome::Agreed(verdict)
            }
            None => ReconcileOutcome::Escalated(CommitteeEscalation {
                control_id: control_id.to_string(),
                opinions,
            }),
        }
    }
}

impl Default for Committee {
    fn default() -> Self {
        Self::new(vec![Box::new(EvidenceScorer), Box::new(SignalScorer)])
    }
}

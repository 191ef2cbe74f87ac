// stage.rs — Pipeline stages and run status: the two state machines.
//
// A run advances through a fixed sequence of stages:
//   scope_resolution → control_mapping → evidence_planning
//     → evidence_collection → drift_detection → posture_assessment
//     → gap_analysis → approval_gate → remediation → reporting → completed
//   (or failed, from any non-terminal stage)
//
// The coarse RunStatus rides alongside: a run at the approval_gate stage
// is either still running (gate not yet evaluated) or suspended for
// approval (gate fired, waiting on a human).

use std::fmt;

use serde::{Deserialize, Serialize};

/// One step of the assessment pipeline.
///
/// `PartialOrd`/`Ord` derive order mirrors pipeline order, so
/// `stage >= PipelineStage::GapAnalysis` reads naturally.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    ScopeResolution,
    ControlMapping,
    EvidencePlanning,
    EvidenceCollection,
    DriftDetection,
    PostureAssessment,
    GapAnalysis,
    ApprovalGate,
    Remediation,
    Reporting,
    Completed,
    Failed,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStage::ScopeResolution => write!(f, "scope_resolution"),
            PipelineStage::ControlMapping => write!(f, "control_mapping"),
            PipelineStage::EvidencePlanning => write!(f, "evidence_planning"),
            PipelineStage::EvidenceCollection => write!(f, "evidence_collection"),
            PipelineStage::DriftDetection => write!(f, "drift_detection"),
            PipelineStage::PostureAssessment => write!(f, "posture_assessment"),
            PipelineStage::GapAnalysis => write!(f, "gap_analysis"),
            PipelineStage::ApprovalGate => write!(f, "approval_gate"),
            PipelineStage::Remediation => write!(f, "remediation"),
            PipelineStage::Reporting => write!(f, "reporting"),
            PipelineStage::Completed => write!(f, "completed"),
            PipelineStage::Failed => write!(f, "failed"),
        }
    }
}

impl PipelineStage {
    /// Whether this stage ends the run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStage::Completed | PipelineStage::Failed)
    }

    /// The next stage in pipeline order, or None for terminal stages.
    pub fn successor(&self) -> Option<PipelineStage> {
        match self {
            PipelineStage::ScopeResolution => Some(PipelineStage::ControlMapping),
            PipelineStage::ControlMapping => Some(PipelineStage::EvidencePlanning),
            PipelineStage::EvidencePlanning => Some(PipelineStage::EvidenceCollection),
            PipelineStage::EvidenceCollection => Some(PipelineStage::DriftDetection),
            PipelineStage::DriftDetection => Some(PipelineStage::PostureAssessment),
            PipelineStage::PostureAssessment => Some(PipelineStage::GapAnalysis),
            PipelineStage::GapAnalysis => Some(PipelineStage::ApprovalGate),
            PipelineStage::ApprovalGate => Some(PipelineStage::Remediation),
            PipelineStage::Remediation => Some(PipelineStage::Reporting),
            PipelineStage::Reporting => Some(PipelineStage::Completed),
            PipelineStage::Completed | PipelineStage::Failed => None,
        }
    }

    /// Check whether transitioning from this stage to `next` is valid.
    ///
    /// Only the forward edge in pipeline order is allowed, plus the edge
    /// to Failed from any non-terminal stage. No stage is skippable: the
    /// orchestrator visits every stage even when a stage has nothing to
    /// do for the current scope.
    pub fn can_transition_to(&self, next: &PipelineStage) -> bool {
        // Transition to Failed is allowed from any non-terminal stage.
        if *next == PipelineStage::Failed {
            return !self.is_terminal();
        }
        self.successor() == Some(*next)
    }
}

/// Coarse run status, persisted alongside the fine-grained stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    /// The pipeline is advancing (or ready to advance) through stages.
    Running,

    /// The approval gate fired; the run is fully serialized to disk and
    /// waiting on human decisions. No thread is parked on it.
    SuspendedForApproval,

    /// The run reached the reporting stage and finished.
    Completed,

    /// The run halted. Context is preserved; only forward progress stops.
    Failed { reason: String },
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::SuspendedForApproval => write!(f, "suspended_for_approval"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed { .. } => write!(f, "failed"),
        }
    }
}

impl RunStatus {
    /// Whether the run can still make forward progress.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed { .. })
    }
}

// mod.rs — Stage agent registry.
//
// One agent per pipeline stage, looked up by the orchestrator as it
// walks the stage machine. The approval gate and the terminal stages
// have no agent: the gate is an orchestrator decision point, and
// terminal stages do nothing.

pub mod collection;
pub mod drift;
pub mod gap;
pub mod mapping;
pub mod planning;
pub mod posture;
pub mod remediation;
pub mod reporting;
pub mod scope;

use ca_run::PipelineStage;

use crate::agent::StageAgent;

/// The agent that executes a stage, if the stage has one.
pub fn agent_for(stage: PipelineStage) -> Option<Box<dyn StageAgent>> {
    match stage {
        PipelineStage::ScopeResolution => Some(Box::new(scope::ScopeAgent)),
        PipelineStage::ControlMapping => Some(Box::new(mapping::ControlMappingAgent)),
        PipelineStage::EvidencePlanning => Some(Box::new(planning::EvidencePlanningAgent)),
        PipelineStage::EvidenceCollection => Some(Box::new(collection::EvidenceCollectionAgent)),
        PipelineStage::DriftDetection => Some(Box::new(drift::DriftDetectionAgent)),
        PipelineStage::PostureAssessment => Some(Box::new(posture::PostureAssessmentAgent)),
        PipelineStage::GapAnalysis => Some(Box::new(gap::GapAnalysisAgent)),
        PipelineStage::Remediation => Some(Box::new(remediation::RemediationAgent)),
        PipelineStage::Reporting => Some(Box::new(reporting::ReportingAgent)),
        PipelineStage::ApprovalGate | PipelineStage::Completed | PipelineStage::Failed => None,
    }
}

/// Build a StageEnv over temp stores with stub providers for the cloud
/// ("aws") and the ticket tracker ("jira").
#[cfg(test)]
pub(crate) fn test_env(dir: &tempfile::TempDir) -> crate::agent::StageEnv {
    use std::sync::Arc;

    use ca_approval::ApprovalStore;
    use ca_audit::AuditLog;
    use ca_evidence::{EvidenceStore, LocalVault};
    use ca_policy::PolicyEngine;
    use ca_router::{ProviderRegistry, StubProvider, ToolRouter};

    let policy = Arc::new(PolicyEngine::default());
    let audit = AuditLog::open(dir.path().join("audit.jsonl")).expect("audit log");
    let approvals =
        Arc::new(ApprovalStore::open(dir.path().join("approvals")).expect("approval store"));
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(StubProvider::new("aws")));
    registry.register(Arc::new(StubProvider::new("jira")));
    let router = Arc::new(ToolRouter::new(policy, registry, audit, approvals));
    let vault: Arc<dyn EvidenceStore> =
        Arc::new(LocalVault::open(dir.path().join("evidence")).expect("vault"));

    crate::agent::StageEnv {
        router,
        vault,
        config: crate::config::PipelineConfig::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_working_stage_has_a_matching_agent() {
        let mut stage = PipelineStage::ScopeResolution;
        loop {
            match agent_for(stage) {
                Some(agent) => assert_eq!(agent.stage(), stage),
                None => assert!(matches!(
                    stage,
                    PipelineStage::ApprovalGate | PipelineStage::Completed
                )),
            }
            match stage.successor() {
                Some(next) => stage = next,
                None => break,
            }
        }
    }

    #[test]
    fn terminal_stages_have_no_agent() {
        assert!(agent_for(PipelineStage::Completed).is_none());
        assert!(agent_for(PipelineStage::Failed).is_none());
    }
}

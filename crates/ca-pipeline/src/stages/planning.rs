// planning.rs — Stage 3: decide what evidence to collect.
//
// One planned item per (family requirement × provider), keyed to the
// family's anchor control, plus an asset-inventory sweep per provider
// under the synthetic control "__asset_inventory". Kinds with no
// collection tool (policy documents live in the document library;
// checklists arrive through the posture stage) simply produce no
// item — gap analysis sees the hole as reduced completeness, which
// is the honest answer.

use ca_run::{CloudProvider, EvidenceKind, PipelineStage, PlannedEvidence, RunContext};

use crate::agent::{StageAgent, StageEnv, StageOutcome};
use crate::error::PipelineError;

/// Synthetic control id for the per-provider inventory sweep.
pub const ASSET_INVENTORY_CONTROL: &str = "__asset_inventory";

/// The collection tool for an evidence kind on a provider, if one
/// exists. SCAP scanning is not offered on the gov clouds.
pub fn collection_tool(kind: EvidenceKind, provider: CloudProvider) -> Option<&'static str> {
    match kind {
        EvidenceKind::ConfigSnapshot => Some("assurance.get_config_snapshot"),
        EvidenceKind::LogExport => Some("assurance.query_audit_logs"),
        EvidenceKind::AssetInventory => Some("assurance.get_asset_inventory"),
        EvidenceKind::ScanReport => match provider {
            CloudProvider::Aws | CloudProvider::Azure | CloudProvider::Gcp => {
                Some("scap.run_scap_scan")
            }
            CloudProvider::AwsGov | CloudProvider::AzureGov | CloudProvider::GcpGov => None,
        },
        EvidenceKind::PolicyDoc | EvidenceKind::Checklist => None,
    }
}

pub struct EvidencePlanningAgent;

impl StageAgent for EvidencePlanningAgent {
    fn id(&self) -> &'static str {
        "evidence_planning"
    }

    fn stage(&self) -> PipelineStage {
        PipelineStage::EvidencePlanning
    }

    fn execute(
        &self,
        ctx: &mut RunContext,
        _env: &StageEnv,
    ) -> Result<StageOutcome, PipelineError> {
        let map = ctx.control_map.clone().ok_or(PipelineError::Fatal {
            stage: self.stage(),
            detail: "control map missing; control_mapping did not run".to_string(),
        })?;

        let mut plan = Vec::new();

        for family in &map.families {
            let anchor = match map.controls_in_family(family).first() {
                Some(control) => control.to_string(),
                None => continue,
            };

            for kind in map.requirements_for(family) {
                if has_fresh_evidence(ctx, &anchor, kind) {
                    continue;
                }
                for &provider in &ctx.scope.providers {
                    if let Some(tool) = collection_tool(kind, provider) {
                        plan.push(PlannedEvidence {
                            control_id: anchor.clone(),
                            kind,
                            provider,
                            tool: tool.to_string(),
                            freshness_sla_days: kind.freshness_sla_days(),
                        });
                    }
                }
            }
        }

        // Inventory is always swept, independent of family requirements.
        for &provider in &ctx.scope.providers {
            if has_fresh_evidence(ctx, ASSET_INVENTORY_CONTROL, EvidenceKind::AssetInventory) {
                continue;
            }
            plan.push(PlannedEvidence {
                control_id: ASSET_INVENTORY_CONTROL.to_string(),
                kind: EvidenceKind::AssetInventory,
                provider,
                tool: "assurance.get_asset_inventory".to_string(),
                freshness_sla_days: EvidenceKind::AssetInventory.freshness_sla_days(),
            });
        }

        tracing::debug!(
            run_id = %ctx.run_id,
            items = plan.len(),
            providers = ctx.scope.providers.len(),
            "evidence plan built"
        );

        ctx.evidence_plan = plan;
        Ok(StageOutcome::Complete)
    }
}

/// Whether the context already holds in-SLA evidence of this kind for
/// this control (a resumed or re-planned run skips what it has).
fn has_fresh_evidence(ctx: &RunContext, control_id: &str, kind: EvidenceKind) -> bool {
    let now = chrono::Utc::now();
    ctx.evidence
        .iter()
        .any(|e| e.control_id == control_id && e.kind == kind && !e.is_stale(now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use ca_run::{Baseline, EvidenceRef, RunScope};

    use crate::stages::mapping::ControlMappingAgent;
    use crate::stages::test_env as env;

    fn planned_context(providers: Vec<CloudProvider>) -> RunContext {
        let scope = RunScope::new("SYS-17", "Billing")
            .with_baseline(Baseline::FedrampMod)
            .with_providers(providers);
        RunContext::new(scope, "q")
    }

    #[test]
    fn plan_covers_requirements_and_inventory() {
        let dir = tempfile::tempdir().unwrap();
        let env = env(&dir);
        let mut ctx = planned_context(vec![CloudProvider::Aws]);
        ControlMappingAgent.execute(&mut ctx, &env).unwrap();
        EvidencePlanningAgent.execute(&mut ctx, &env).unwrap();

        // AC anchor gets config + logs (policy_doc has no tool).
        let ac_items: Vec<_> = ctx
            .evidence_plan
            .iter()
            .filter(|p| p.control_id == "AC-2")
            .collect();
        assert_eq!(ac_items.len(), 2);
        assert!(ac_items.iter().all(|p| p.kind != EvidenceKind::PolicyDoc));

        // One inventory sweep for the single provider.
        let inventory: Vec<_> = ctx
            .evidence_plan
            .iter()
            .filter(|p| p.control_id == ASSET_INVENTORY_CONTROL)
            .collect();
        assert_eq!(inventory.len(), 1);
        assert_eq!(inventory[0].tool, "assurance.get_asset_inventory");
    }

    #[test]
    fn every_provider_multiplies_the_plan() {
        let dir = tempfile::tempdir().unwrap();
        let env = env(&dir);
        let mut ctx = planned_context(vec![CloudProvider::Aws, CloudProvider::Gcp]);
        ControlMappingAgent.execute(&mut ctx, &env).unwrap();
        EvidencePlanningAgent.execute(&mut ctx, &env).unwrap();

        let au_items: Vec<_> = ctx
            .evidence_plan
            .iter()
            .filter(|p| p.control_id == "AU-2")
            .collect();
        // Two kinds (config, logs) × two providers.
        assert_eq!(au_items.len(), 4);
    }

    #[test]
    fn gov_clouds_get_no_scan_items() {
        let dir = tempfile::tempdir().unwrap();
        let env = env(&dir);
        let mut ctx = planned_context(vec![CloudProvider::AwsGov]);
        ControlMappingAgent.execute(&mut ctx, &env).unwrap();
        EvidencePlanningAgent.execute(&mut ctx, &env).unwrap();

        assert!(ctx
            .evidence_plan
            .iter()
            .all(|p| p.kind != EvidenceKind::ScanReport));
        // Config snapshots still planned.
        assert!(ctx
            .evidence_plan
            .iter()
            .any(|p| p.kind == EvidenceKind::ConfigSnapshot));
    }

    #[test]
    fn fresh_evidence_is_not_replanned() {
        let dir = tempfile::tempdir().unwrap();
        let env = env(&dir);
        let mut ctx = planned_context(vec![CloudProvider::Aws]);
        ControlMappingAgent.execute(&mut ctx, &env).unwrap();

        ctx.append_evidence(EvidenceRef {
            artifact_id: Uuid::new_v4(),
            control_id: "AU-2".to_string(),
            kind: EvidenceKind::LogExport,
            uri: "evidence://SYS-17/log_export/2026-08-20/x".to_string(),
            sha256: "cafe".to_string(),
            provider: CloudProvider::Aws,
            collected_at: Utc::now() - Duration::days(1),
        });

        EvidencePlanningAgent.execute(&mut ctx, &env).unwrap();
        assert!(!ctx
            .evidence_plan
            .iter()
            .any(|p| p.control_id == "AU-2" && p.kind == EvidenceKind::LogExport));
        assert!(ctx
            .evidence_plan
            .iter()
            .any(|p| p.control_id == "AU-2" && p.kind == EvidenceKind::ConfigSnapshot));
    }

    #[test]
    fn missing_control_map_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let env = env(&dir);
        let mut ctx = planned_context(vec![CloudProvider::Aws]);
        match EvidencePlanningAgent.execute(&mut ctx, &env) {
            Err(PipelineError::Fatal { stage, .. }) => {
                assert_eq!(stage, PipelineStage::EvidencePlanning);
            }
            other => panic!("expected Fatal, got {:?}", other),
        }
    }
}

// collection.rs — Stage 4: execute the evidence plan.
//
// Every fetch goes through the router (policy, audit, redaction); every
// artifact lands in the write-once vault; only then does the context
// get an EvidenceRef. A provider that is down degrades the item, not
// the run: the miss is recorded as a stage issue and gap analysis later
// prices the gap in as reduced sufficiency.

use chrono::{Duration, Utc};
use serde_json::json;

use ca_evidence::ArtifactMeta;
use ca_router::{InvokeOutcome, InvokeRequest};
use ca_run::{control_family, EvidenceRef, PipelineStage, PlannedEvidence, RunContext, StageIssue};

use crate::agent::{StageAgent, StageEnv, StageOutcome};
use crate::error::PipelineError;

pub struct EvidenceCollectionAgent;

impl StageAgent for EvidenceCollectionAgent {
    fn id(&self) -> &'static str {
        "evidence_collection"
    }

    fn stage(&self) -> PipelineStage {
        PipelineStage::EvidenceCollection
    }

    fn execute(
        &self,
        ctx: &mut RunContext,
        env: &StageEnv,
    ) -> Result<StageOutcome, PipelineError> {
        let mut issues = Vec::new();
        let plan = ctx.evidence_plan.clone();

        for item in &plan {
            let provider = item.provider.to_string();
            let request = InvokeRequest::new(ctx.run_id, self.id(), &item.tool, &provider)
                .with_params(tool_params(item, &ctx.scope.system_id))
                .with_correlation(self.stage().to_string());

            let output = match env.router.invoke(&request)?.outcome {
                InvokeOutcome::Success { output } => output,
                InvokeOutcome::TimedOut { elapsed_ms } => {
                    issues.push(
                        StageIssue::recoverable(
                            self.stage(),
                            format!(
                                "{} for {} timed out after {}ms",
                                item.tool, item.control_id, elapsed_ms
                            ),
                        )
                        .with_provider(&provider),
                    );
                    continue;
                }
                other => {
                    issues.push(
                        StageIssue::recoverable(
                            self.stage(),
                            format!(
                                "{} for {} not collected: {}",
                                item.tool,
                                item.control_id,
                                describe_failure(&other)
                            ),
                        )
                        .with_provider(&provider),
                    );
                    continue;
                }
            };

            // Vault first, context second: an EvidenceRef must never
            // point at bytes that were not durably stored.
            let meta = ArtifactMeta::new(
                &ctx.scope.system_id,
                &item.control_id,
                item.kind.as_str(),
                &provider,
            );
            let bytes = match serde_json::to_vec_pretty(&output) {
                Ok(bytes) => bytes,
                Err(e) => {
                    issues.push(
                        StageIssue::recoverable(
                            self.stage(),
                            format!("artifact for {} not serializable: {}", item.control_id, e),
                        )
                        .with_provider(&provider),
                    );
                    continue;
                }
            };
            match env.vault.put(&meta, &bytes) {
                Ok(stored) => {
                    ctx.append_evidence(EvidenceRef {
                        artifact_id: stored.artifact_id,
                        control_id: item.control_id.clone(),
                        kind: item.kind,
                        uri: stored.uri,
                        sha256: stored.sha256,
                        provider: item.provider,
                        collected_at: stored.stored_at,
                    });
                }
                Err(e) => {
                    issues.push(
                        StageIssue::recoverable(
                            self.stage(),
                            format!("vault rejected artifact for {}: {}", item.control_id, e),
                        )
                        .with_provider(&provider),
                    );
                }
            }
        }

        tracing::debug!(
            run_id = %ctx.run_id,
            planned = plan.len(),
            collected = ctx.evidence.len(),
            misses = issues.len(),
            "evidence collection finished"
        );

        if issues.is_empty() {
            Ok(StageOutcome::Complete)
        } else {
            Ok(StageOutcome::Partial(issues))
        }
    }
}

/// Tool parameters per planned item. Config snapshots narrow to the
/// resource type the control family watches; log queries cover the
/// trailing week.
fn tool_params(item: &PlannedEvidence, system_id: &str) -> serde_json::Value {
    let provider = item.provider.to_string();
    let mut params = json!({
        "provider": provider,
        "system_id": system_id,
    });

    if item.tool.ends_with("get_config_snapshot") {
        params["resource_type"] = json!(resource_type_for(control_family(&item.control_id)));
    } else if item.tool.ends_with("query_audit_logs") {
        let now = Utc::now();
        params["time_range"] = json!({
            "start": (now - Duration::days(7)).to_rfc3339(),
            "end": now.to_rfc3339(),
        });
    } else if item.tool.ends_with("get_asset_inventory") {
        params["time"] = json!({ "as_of": Utc::now().to_rfc3339() });
    }

    params
}

/// Which resource type a control family's configuration lives in.
fn resource_type_for(family: &str) -> &'static str {
    match family {
        "AC" | "IA" => "iam",
        "AU" => "logging",
        "SC" => "network",
        _ => "compute",
    }
}

fn describe_failure(outcome: &InvokeOutcome) -> String {
    match outcome {
        InvokeOutcome::Denied { reason } => format!("denied ({reason})"),
        InvokeOutcome::RateLimited { retry_after_secs } => {
            format!("rate limited, retry after {retry_after_secs}s")
        }
        InvokeOutcome::ApprovalPending { request_id } => {
            format!("unexpectedly raised approval request {request_id}")
        }
        InvokeOutcome::Failed { error } => error.clone(),
        InvokeOutcome::TimedOut { elapsed_ms } => format!("timed out after {elapsed_ms}ms"),
        InvokeOutcome::Success { .. } => "success".to_string(),
    }
}

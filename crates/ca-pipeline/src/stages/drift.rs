// drift.rs — Stage 5: configuration drift against the attested baseline.
//
// Providers report raw change events; severity and control impact are
// assigned here, from fixed tables, so a provider cannot understate
// the blast radius of its own drift. The tables cover the changes an
// assessor cares about: privilege grants, exposure, encryption,
// logging. Unknown change kinds are moderate, never ignored.

use serde_json::json;

use ca_router::{InvokeOutcome, InvokeRequest};
use ca_run::{DriftEvent, PipelineStage, RunContext, Severity, StageIssue};

use crate::agent::{StageAgent, StageEnv, StageOutcome};
use crate::error::PipelineError;

/// Severity of a change on a resource type.
pub fn classify_drift(resource_type: &str, change: &str) -> Severity {
    match (resource_type, change) {
        ("iam", "new_admin_role") => Severity::Critical,
        ("iam", "policy_change") => Severity::High,
        ("iam", "new_user") => Severity::Moderate,
        ("network", "new_public_endpoint") => Severity::Critical,
        ("network", "sg_rule_added") => Severity::High,
        ("storage", "public_access_enabled") => Severity::Critical,
        ("storage", "encryption_disabled") => Severity::Critical,
        ("encryption", "key_deleted") => Severity::Critical,
        ("encryption", "key_rotation_disabled") => Severity::High,
        ("logging", "trail_disabled") => Severity::Critical,
        ("logging", "log_retention_reduced") => Severity::High,
        _ => Severity::Moderate,
    }
}

/// Controls implicated by drift on a resource type.
pub fn controls_for_resource(resource_type: &str) -> Vec<String> {
    let controls: &[&str] = match resource_type {
        "iam" => &["AC-2", "AC-3", "AC-6", "IA-2", "IA-5"],
        "network" => &["SC-7", "SC-8", "AC-4"],
        "storage" => &["SC-28", "AC-3"],
        "encryption" => &["SC-12", "SC-13", "SC-28"],
        "logging" => &["AU-2", "AU-3", "AU-6", "AU-12"],
        "compute" => &["CM-2", "CM-6", "CM-7"],
        _ => &["CM-3", "CM-6"],
    };
    controls.iter().map(|c| c.to_string()).collect()
}

pub struct DriftDetectionAgent;

impl StageAgent for DriftDetectionAgent {
    fn id(&self) -> &'static str {
        "drift_detection"
    }

    fn stage(&self) -> PipelineStage {
        PipelineStage::DriftDetection
    }

    fn execute(
        &self,
        ctx: &mut RunContext,
        env: &StageEnv,
    ) -> Result<StageOutcome, PipelineError> {
        let mut issues = Vec::new();

        for &provider in &ctx.scope.providers.clone() {
            let provider_name = provider.to_string();
            let request = InvokeRequest::new(
                ctx.run_id,
                self.id(),
                "assurance.detect_drift",
                &provider_name,
            )
            .with_params(json!({
                "provider": provider_name,
                "system_id": ctx.scope.system_id,
                "baseline": ctx.scope.baseline.to_string(),
            }))
            .with_correlation(self.stage().to_string());

            let output = match env.router.invoke(&request)?.outcome {
                InvokeOutcome::Success { output } => output,
                other => {
                    issues.push(
                        StageIssue::recoverable(
                            self.stage(),
                            format!("drift detection unavailable: {}", outcome_tag(&other)),
                        )
                        .with_provider(&provider_name),
                    );
                    continue;
                }
            };

            let events = output["drift_events"].as_array().cloned().unwrap_or_default();
            for raw in &events {
                let resource_type = raw["resource_type"].as_str().unwrap_or("unknown");
                let resource_id = raw["resource_id"].as_str().unwrap_or("unknown");
                let change = raw["field"]
                    .as_str()
                    .or_else(|| raw["change"].as_str())
                    .unwrap_or("unknown_change");

                let severity = classify_drift(resource_type, change);
                let mut event =
                    DriftEvent::new(provider, resource_type, resource_id, change, severity)
                        .with_related_controls(controls_for_resource(resource_type));
                if !raw["baseline_value"].is_null() {
                    event.previous_value = Some(raw["baseline_value"].clone());
                }
                if !raw["current_value"].is_null() {
                    event.current_value = Some(raw["current_value"].clone());
                }

                if severity >= Severity::High {
                    tracing::warn!(
                        run_id = %ctx.run_id,
                        provider = %provider_name,
                        resource = resource_id,
                        change = change,
                        severity = %severity,
                        "drift detected"
                    );
                }
                ctx.record_drift(event);
            }
        }

        if issues.is_empty() {
            Ok(StageOutcome::Complete)
        } else {
            Ok(StageOutcome::Partial(issues))
        }
    }
}

fn outcome_tag(outcome: &InvokeOutcome) -> String {
    match outcome {
        InvokeOutcome::Denied { reason } => format!("denied: {reason}"),
        InvokeOutcome::Failed { error } => error.clone(),
        InvokeOutcome::TimedOut { elapsed_ms } => format!("timed out after {elapsed_ms}ms"),
        InvokeOutcome::RateLimited { retry_after_secs } => {
            format!("rate limited for {retry_after_secs}s")
        }
        InvokeOutcome::ApprovalPending { request_id } => {
            format!("approval pending: {request_id}")
        }
        InvokeOutcome::Success { .. } => "success".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn privilege_and_exposure_changes_are_critical() {
        assert_eq!(classify_drift("iam", "new_admin_role"), Severity::Critical);
        assert_eq!(
            classify_drift("network", "new_public_endpoint"),
            Severity::Critical
        );
        assert_eq!(
            classify_drift("storage", "public_access_enabled"),
            Severity::Critical
        );
        assert_eq!(classify_drift("logging", "trail_disabled"), Severity::Critical);
    }

    #[test]
    fn lesser_known_changes_are_graded() {
        assert_eq!(classify_drift("iam", "new_user"), Severity::Moderate);
        assert_eq!(classify_drift("network", "sg_rule_added"), Severity::High);
        assert_eq!(
            classify_drift("encryption", "key_rotation_disabled"),
            Severity::High
        );
    }

    #[test]
    fn unknown_changes_default_to_moderate() {
        assert_eq!(classify_drift("compute", "ami_updated"), Severity::Moderate);
        assert_eq!(classify_drift("dns", "zone_transfer"), Severity::Moderate);
    }

    #[test]
    fn resource_types_map_to_control_sets() {
        assert!(controls_for_resource("iam").contains(&"AC-2".to_string()));
        assert!(controls_for_resource("network").contains(&"SC-7".to_string()));
        assert_eq!(controls_for_resource("something_else"), vec!["CM-3", "CM-6"]);
    }
}

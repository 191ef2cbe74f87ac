// scope.rs — Stage 1: resolve the run boundary.
//
// The trigger gives us a claimed scope; the system registry is the
// authority. When a registry entry exists, its name, baseline,
// frameworks, boundary, and active cloud accounts replace the
// trigger's guesses. When it does not (or the lookup fails), the run
// proceeds on the trigger's scope — a missing registry entry is an
// issue, not a reason to refuse the assessment.

use std::str::FromStr;

use serde_json::json;

use ca_router::{InvokeOutcome, InvokeRequest};
use ca_run::{Baseline, CloudProvider, Framework, PipelineStage, RunContext, StageIssue};

use crate::agent::{StageAgent, StageEnv, StageOutcome};
use crate::error::PipelineError;

pub struct ScopeAgent;

impl StageAgent for ScopeAgent {
    fn id(&self) -> &'static str {
        "scope_resolution"
    }

    fn stage(&self) -> PipelineStage {
        PipelineStage::ScopeResolution
    }

    fn execute(
        &self,
        ctx: &mut RunContext,
        env: &StageEnv,
    ) -> Result<StageOutcome, PipelineError> {
        let mut issues = Vec::new();

        // A trigger with no providers still gets a run.
        if ctx.scope.providers.is_empty() {
            ctx.scope.providers.push(CloudProvider::Aws);
        }
        let lookup_provider = ctx.scope.providers[0].to_string();

        let request = InvokeRequest::new(
            ctx.run_id,
            self.id(),
            "assurance.get_system_registry",
            &lookup_provider,
        )
        .with_params(json!({
            "provider": lookup_provider,
            "system_id": ctx.scope.system_id,
        }))
        .with_correlation(self.stage().to_string());

        match env.router.invoke(&request)?.outcome {
            InvokeOutcome::Success { output } => apply_registry_entry(ctx, &output),
            other => {
                issues.push(
                    StageIssue::recoverable(
                        self.stage(),
                        format!(
                            "system registry lookup failed ({}); continuing on trigger scope",
                            outcome_label(&other)
                        ),
                    )
                    .with_provider(&lookup_provider),
                );
            }
        }

        // Registry accounts may all be inactive; the run still needs
        // at least one provider to assess.
        if ctx.scope.providers.is_empty() {
            ctx.scope.providers.push(CloudProvider::Aws);
        }

        tracing::debug!(
            run_id = %ctx.run_id,
            system_id = %ctx.scope.system_id,
            providers = ?ctx.scope.providers,
            baseline = %ctx.scope.baseline,
            "scope resolved"
        );

        if issues.is_empty() {
            Ok(StageOutcome::Complete)
        } else {
            Ok(StageOutcome::Partial(issues))
        }
    }
}

/// Overlay a registry entry onto the trigger scope. Absent or
/// unparseable fields leave the trigger's value in place.
fn apply_registry_entry(ctx: &mut RunContext, entry: &serde_json::Value) {
    if let Some(name) = entry["system_name"].as_str() {
        if !name.is_empty() {
            ctx.scope.system_name = name.to_string();
        }
    }

    if let Some(label) = entry["baseline"].as_str() {
        if let Some(baseline) = parse_baseline(label) {
            ctx.scope.baseline = baseline;
        }
    }

    if let Some(env_label) = entry["environment"].as_str() {
        if !env_label.is_empty() {
            ctx.scope.environment = env_label.to_string();
        }
    }

    if let Some(frameworks) = entry["frameworks"].as_array() {
        let parsed: Vec<Framework> = frameworks
            .iter()
            .filter_map(|v| v.as_str())
            .filter_map(|s| Framework::from_str(s).ok())
            .collect();
        if !parsed.is_empty() {
            ctx.scope.frameworks = parsed;
        }
    }

    match &entry["boundary"] {
        serde_json::Value::String(s) if !s.is_empty() => {
            ctx.scope.boundary = Some(s.clone());
        }
        v @ serde_json::Value::Object(_) => {
            ctx.scope.boundary = Some(v.to_string());
        }
        _ => {}
    }

    // Providers come from the registry's active cloud accounts, not
    // from the trigger, when any are listed.
    if let Some(accounts) = entry["cloud_accounts"].as_array() {
        let mut providers: Vec<CloudProvider> = Vec::new();
        for account in accounts {
            if account["is_active"].as_bool() != Some(true) {
                continue;
            }
            if let Some(label) = account["provider"].as_str() {
                if let Ok(provider) = CloudProvider::from_str(label) {
                    if !providers.contains(&provider) {
                        providers.push(provider);
                    }
                }
            }
        }
        if !providers.is_empty() {
            ctx.scope.providers = providers;
        }
    }
}

/// Registry baseline labels are looser than ours ("moderate" as well
/// as "fedramp_mod").
fn parse_baseline(label: &str) -> Option<Baseline> {
    match label {
        "low" => Some(Baseline::FedrampLow),
        "moderate" => Some(Baseline::FedrampMod),
        "high" => Some(Baseline::FedrampHigh),
        other => Baseline::from_str(other).ok(),
    }
}

fn outcome_label(outcome: &InvokeOutcome) -> &'static str {
    match outcome {
        InvokeOutcome::Success { .. } => "success",
        InvokeOutcome::Denied { .. } => "denied",
        InvokeOutcome::RateLimited { .. } => "rate limited",
        InvokeOutcome::ApprovalPending { .. } => "approval pending",
        InvokeOutcome::Failed { .. } => "provider failure",
        InvokeOutcome::TimedOut { .. } => "timeout",
    }
}

// config.rs — Policy configuration: the central table everything reads.
//
// A single PolicyConfig covers the four concerns the engine enforces:
// agent allowlists, tool→action classification, approval rules, and
// rate limits — plus the gate thresholds the approval gate consumes.
// Deployments override it with a `policy.toml`; `Default` reproduces
// the built-in posture, which is what the stage agents run with when
// no file is present.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use glob::Pattern;
use serde::{Deserialize, Serialize};

use ca_run::Severity;

use crate::access::AccessRule;
use crate::action::ToolAction;
use crate::error::PolicyError;
use crate::rate::RateLimitConfig;

/// When a tool action requires human approval.
///
/// A rule matches its action; `min_severity` narrows it to calls whose
/// severity context reaches the bar. A rule with no `min_severity`
/// always matches its action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApprovalRule {
    pub action: ToolAction,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_severity: Option<Severity>,
}

/// Thresholds the approval gate applies to a run's gap-analysis output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GateThresholds {
    /// Failing controls at or above this severity suspend the run.
    pub min_failing_severity: Severity,

    /// Suspend when any critical drift event was detected.
    pub suspend_on_critical_drift: bool,

    /// Suspend when any CAT I posture finding is open.
    pub suspend_on_open_cat_i: bool,
}

impl Default for GateThresholds {
    fn default() -> Self {
        Self {
            min_failing_severity: Severity::High,
            suspend_on_critical_drift: true,
            suspend_on_open_cat_i: true,
        }
    }
}

/// The complete policy table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Agent allowlist rows. Default deny: no row, no access.
    pub access_rules: Vec<AccessRule>,

    /// Fully qualified tool name → action class. Unknown tools classify
    /// as read; the allowlist has already refused anything ungranted.
    pub tool_actions: BTreeMap<String, ToolAction>,

    /// Which action classes require human approval.
    pub approval_rules: Vec<ApprovalRule>,

    /// Token-bucket sizing for every (tool, provider) pair.
    pub rate_limit: RateLimitConfig,

    /// Thresholds for the run-level approval gate.
    pub gate: GateThresholds,
}

/// The six cloud provider names the assurance tools accept.
const CLOUD_PROVIDERS: [&str; 6] = ["aws", "aws_gov", "azure", "azure_gov", "gcp", "gcp_gov"];

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            access_rules: default_access_rules(),
            tool_actions: default_tool_actions(),
            approval_rules: vec![ApprovalRule {
                action: ToolAction::Modify,
                min_severity: None,
            }],
            rate_limit: RateLimitConfig::default(),
            gate: GateThresholds::default(),
        }
    }
}

impl PolicyConfig {
    /// Load a policy file. Missing keys fall back to the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| PolicyError::IoError {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = toml::from_str(&raw)?;
        config.validate()?;
        tracing::debug!(
            path = %path.display(),
            access_rules = config.access_rules.len(),
            tool_actions = config.tool_actions.len(),
            "policy configuration loaded"
        );
        Ok(config)
    }

    /// Reject rules whose tool patterns cannot parse as globs. Invalid
    /// patterns would otherwise silently never match, which reads as a
    /// mysterious deny at run time.
    pub fn validate(&self) -> Result<(), PolicyError> {
        for rule in &self.access_rules {
            for pattern in &rule.tool_patterns {
                if let Err(e) = Pattern::new(pattern) {
                    return Err(PolicyError::InvalidPattern {
                        agent_id: rule.agent_id.clone(),
                        pattern: pattern.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Allowlist rows for the stage agents that make tool calls. Stages that
/// work purely on the run context (control mapping, evidence planning,
/// reporting) have no row and therefore no tool access.
fn default_access_rules() -> Vec<AccessRule> {
    let clouds: Vec<&str> = CLOUD_PROVIDERS.to_vec();
    vec![
        AccessRule::new(
            "scope_resolution",
            vec!["assurance.get_system_registry"],
            clouds.clone(),
        ),
        AccessRule::new(
            "evidence_collection",
            vec![
                "assurance.get_asset_inventory",
                "assurance.get_config_snapshot",
                "assurance.query_audit_logs",
                "scap.run_scap_scan",
            ],
            clouds.clone(),
        ),
        AccessRule::new("drift_detection", vec!["assurance.detect_drift"], clouds.clone()),
        AccessRule::new("posture_assessment", vec!["scap.*"], clouds.clone()),
        AccessRule::new(
            "gap_analysis",
            vec!["assurance.evaluate_control_rule"],
            clouds,
        ),
        AccessRule::new(
            "remediation",
            vec!["assurance.create_poam_item", "ticketing.*"],
            vec!["*"],
        ),
    ]
}

/// The built-in tool → action classification table.
fn default_tool_actions() -> BTreeMap<String, ToolAction> {
    let entries = [
        ("assurance.get_system_registry", ToolAction::Read),
        ("assurance.get_asset_inventory", ToolAction::Read),
        ("assurance.get_config_snapshot", ToolAction::Read),
        ("assurance.query_audit_logs", ToolAction::Read),
        ("assurance.evaluate_control_rule", ToolAction::Evaluate),
        ("assurance.store_evidence_artifact", ToolAction::Store),
        ("assurance.detect_drift", ToolAction::Read),
        ("assurance.create_poam_item", ToolAction::Create),
        ("scap.ingest_checklist", ToolAction::Store),
        ("scap.run_scap_scan", ToolAction::Scan),
        ("scap.map_stig_controls", ToolAction::Read),
        ("scap.get_benchmark_info", ToolAction::Read),
        ("ticketing.create_ticket", ToolAction::Create),
        ("ticketing.query_tickets", ToolAction::Read),
        ("ticketing.update_ticket", ToolAction::Modify),
    ];
    entries
        .into_iter()
        .map(|(tool, action)| (tool.to_string(), action))
        .collect()
}

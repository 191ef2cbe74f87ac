// engine.rs — Policy evaluation engine.
//
// The PolicyEngine is the single chokepoint in front of every tool call.
// `evaluate()` applies the checks in a fixed order:
//
// 1. Is the tool allowlisted for this agent on this provider? → No → Deny
// 2. Is the (tool, provider) bucket empty? → Yes → RateLimited
// 3. Does the tool's action class require approval? → Yes → RequireApproval
// 4. Otherwise → Allow
//
// Default deny: an agent with no allowlist row can call nothing. The
// decision is a value, never an error — the router records denials in
// the audit log exactly like successes.

use serde::{Deserialize, Serialize};

use ca_run::Severity;

use crate::action::ToolAction;
use crate::config::{GateThresholds, PolicyConfig};
use crate::rate::{RateDecision, RateLimiter};

/// A tool call submitted to the policy engine for evaluation.
#[derive(Debug, Clone)]
pub struct PolicyRequest {
    /// Which stage agent is calling.
    pub agent_id: String,
    /// Fully qualified tool name (e.g., "assurance.get_config_snapshot").
    pub tool: String,
    /// Target provider (cloud name, or a tracker like "jira").
    pub provider: String,
    /// Severity context of the call, when the caller has one (e.g., the
    /// severity of the finding a ticket update is about).
    pub severity: Option<Severity>,
}

impl PolicyRequest {
    pub fn new(
        agent_id: impl Into<String>,
        tool: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            tool: tool.into(),
            provider: provider.into(),
            severity: None,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }
}

/// The result of a policy evaluation.
///
/// `#[derive(PartialEq)]` lets us use `==` to compare decisions in tests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum PolicyDecision {
    /// The call may proceed.
    Allow,
    /// The call is refused — not allowlisted.
    Deny { reason: String },
    /// The call needs an approved request before it can execute.
    RequireApproval { reason: String },
    /// The (tool, provider) bucket is drained; retry later.
    RateLimited { retry_after_secs: u64 },
}

/// The policy engine — evaluates tool calls against the policy table.
pub struct PolicyEngine {
    config: PolicyConfig,
    limiter: RateLimiter,
}

impl PolicyEngine {
    /// Create an engine over a policy table.
    pub fn new(config: PolicyConfig) -> Self {
        let limiter = RateLimiter::new(config.rate_limit.clone());
        Self { config, limiter }
    }

    /// Whether the allowlist permits `agent_id` to call `tool` against
    /// `provider`. Default deny: no matching rule → false.
    pub fn is_tool_allowed(&self, agent_id: &str, tool: &str, provider: &str) -> bool {
        self.config
            .access_rules
            .iter()
            .any(|rule| rule.permits(agent_id, tool, provider))
    }

    /// Action class of a tool. Unknown tools classify as read; the
    /// allowlist has already refused anything ungranted.
    pub fn classify(&self, tool: &str) -> ToolAction {
        self.config
            .tool_actions
            .get(tool)
            .copied()
            .unwrap_or(ToolAction::Read)
    }

    /// Whether a call with this action class and severity context needs
    /// human approval.
    pub fn requires_approval(&self, action: ToolAction, severity: Option<Severity>) -> bool {
        self.config.approval_rules.iter().any(|rule| {
            rule.action == action
                && match rule.min_severity {
                    None => true,
                    Some(min) => severity.map_or(false, |s| s >= min),
                }
        })
    }

    /// Consume a token from the (tool, provider) bucket.
    pub fn check_rate_limit(&self, tool: &str, provider: &str) -> RateDecision {
        self.limiter.check(tool, provider)
    }

    /// Evaluate a tool call and return a decision.
    pub fn evaluate(&self, request: &PolicyRequest) -> PolicyDecision {
        self.evaluate_at(request, chrono::Utc::now())
    }

    /// Same as [`evaluate`](Self::evaluate) with an explicit instant for
    /// the rate-limit check, so tests control refill.
    pub fn evaluate_at(
        &self,
        request: &PolicyRequest,
        now: chrono::DateTime<chrono::Utc>,
    ) -> PolicyDecision {
        // Step 1: allowlist. Checked first so an unlisted call never
        // consumes rate-limit tokens.
        if !self.is_tool_allowed(&request.agent_id, &request.tool, &request.provider) {
            return PolicyDecision::Deny {
                reason: format!(
                    "tool '{}' is not allowlisted for agent '{}' on provider '{}'",
                    request.tool, request.agent_id, request.provider
                ),
            };
        }

        // Step 2: rate limit.
        if let RateDecision::Limited { retry_after_secs } =
            self.limiter.check_at(&request.tool, &request.provider, now)
        {
            return PolicyDecision::RateLimited { retry_after_secs };
        }

        // Step 3: approval classification.
        let action = self.classify(&request.tool);
        if self.requires_approval(action, request.severity) {
            return PolicyDecision::RequireApproval {
                reason: format!(
                    "action '{}' on tool '{}' requires human approval",
                    action, request.tool
                ),
            };
        }

        PolicyDecision::Allow
    }

    /// Thresholds the run-level approval gate applies.
    pub fn gate_thresholds(&self) -> &GateThresholds {
        &self.config.gate
    }
}

/// Default engine runs the built-in policy table.
impl Default for PolicyEngine {
    fn default() -> Self {
        Self::new(PolicyConfig::default())
    }
}

// access.rs — Agent tool allowlists.
//
// An access rule grants one agent a set of tool patterns on a set of
// providers. Patterns are globs over the fully qualified tool name
// (e.g., "assurance.*" or "ticketing.create_ticket"); providers are
// literal names with "*" as the any-provider wildcard.
//
// Default deny: an agent with no matching rule gets nothing.

use glob::Pattern;
use serde::{Deserialize, Serialize};

/// One allowlist row: agent × tool patterns × providers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessRule {
    /// Agent the rule applies to.
    pub agent_id: String,

    /// Glob patterns over fully qualified tool names.
    pub tool_patterns: Vec<String>,

    /// Providers the agent may reach with these tools. `"*"` matches any.
    pub providers: Vec<String>,
}

impl AccessRule {
    pub fn new(
        agent_id: impl Into<String>,
        tool_patterns: Vec<&str>,
        providers: Vec<&str>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            tool_patterns: tool_patterns.into_iter().map(String::from).collect(),
            providers: providers.into_iter().map(String::from).collect(),
        }
    }

    /// Whether this rule permits `agent_id` to call `tool` against
    /// `provider`.
    pub fn permits(&self, agent_id: &str, tool: &str, provider: &str) -> bool {
        if self.agent_id != agent_id {
            return false;
        }
        if !self.provider_allowed(provider) {
            return false;
        }
        self.tool_patterns
            .iter()
            .any(|pattern| matches_tool_pattern(pattern, tool))
    }

    fn provider_allowed(&self, provider: &str) -> bool {
        self.providers
            .iter()
            .any(|p| p == "*" || p == provider)
    }
}

/// Check if a glob pattern matches a tool name.
///
/// Uses the `glob` crate. If the pattern is invalid, it does not match
/// (fail-closed, not fail-open).
fn matches_tool_pattern(pattern: &str, tool: &str) -> bool {
    match Pattern::new(pattern) {
        Ok(p) => p.matches(tool),
        Err(_) => false, // Invalid patterns never match (fail-closed)
    }
}

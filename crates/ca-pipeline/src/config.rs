// config.rs — Pipeline-level configuration.
//
// Policy knobs (allowlists, thresholds, rate limits) live in
// ca-policy's PolicyConfig; this covers the handful of orchestration
// choices that are not policy: which tracker receives remediation
// tickets, who owns new POA&M items, and what happens to a control
// whose remediation was rejected.

use serde::{Deserialize, Serialize};

/// Orchestration settings, deserializable from the daemon's config
/// file. Every field has a default so an empty table works.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Provider name remediation tickets are routed to. Must match a
    /// registered ToolProvider (e.g. "jira", "servicenow").
    pub tracker: String,

    /// Owner recorded on POA&M items pushed to the provider.
    pub poam_owner: String,

    /// When true, a control whose remediation request was rejected is
    /// marked manual_review_required in the final context so the next
    /// run re-evaluates it. When false the assessment stands and only
    /// a stage issue records the rejection.
    pub reopen_rejected: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tracker: "jira".to_string(),
            poam_owner: "system-owner@example.com".to_string(),
            reopen_rejected: false,
        }
    }
}

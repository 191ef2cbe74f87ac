// error.rs — Error types for the policy subsystem.
//
// Policy decisions (deny, rate-limited, approval-required) are values,
// not errors — callers must treat them as normal outcomes. Errors here
// only cover loading and validating policy configuration.

use thiserror::Error;

/// Errors that can occur while loading or validating policy.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Reading the policy file failed.
    #[error("io error on {path}: {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The policy file is not valid TOML.
    #[error("failed to parse policy config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// A tool pattern in an access rule cannot be parsed as a glob.
    #[error("invalid tool pattern '{pattern}' in rule for agent '{agent_id}': {reason}")]
    InvalidPattern {
        agent_id: String,
        pattern: String,
        reason: String,
    },
}

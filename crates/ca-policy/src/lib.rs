//! # ca-policy
//!
//! Central policy table and evaluation engine for Continuous Assurance.
//!
//! Every tool call in the system flows through the [`PolicyEngine`],
//! which applies allowlisting, rate limiting, and approval
//! classification in a fixed order and returns a [`PolicyDecision`].
//!
//! ## Key invariants
//!
//! - **Default deny**: an agent with no allowlist row can call nothing.
//! - **Decisions are values**: deny and rate-limited are normal
//!   outcomes the caller records, never panics or errors.
//! - **Modify is gated**: the default table requires human approval for
//!   every modify-class call.

pub mod access;
pub mod action;
pub mod config;
pub mod engine;
pub mod error;
pub mod rate;

pub use access::AccessRule;
pub use action::ToolAction;
pub use config::{ApprovalRule, GateThresholds, PolicyConfig};
pub use engine::{PolicyDecision, PolicyEngine, PolicyRequest};
pub use error::PolicyError;
pub use rate::{RateDecision, RateLimitConfig, RateLimiter};

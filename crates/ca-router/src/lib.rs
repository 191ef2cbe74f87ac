//! # ca-router
//!
//! The mediated tool-call router for Continuous Assurance.
//!
//! Stage agents never talk to a cloud, scanner, or tracker directly.
//! They build an [`InvokeRequest`] and hand it to [`ToolRouter::invoke`],
//! which classifies the call, evaluates policy, replays idempotent
//! writes, dispatches to the registered [`ToolProvider`], and appends
//! exactly one audit record — whatever the outcome.
//!
//! ## Key components
//!
//! - [`ToolRouter`] — the chokepoint; policy → replay → dispatch → audit
//! - [`ToolProvider`] / [`ProviderRegistry`] — pluggable backends
//! - [`StubProvider`] — canned responses for development and tests
//! - [`sanitize::redact`] — strips credentials before anything is recorded

pub mod error;
pub mod idempotency;
pub mod provider;
pub mod router;
pub mod sanitize;
pub mod stub;

pub use error::RouterError;
pub use idempotency::IdempotencyCache;
pub use provider::{ProviderError, ProviderRegistry, ToolProvider};
pub use router::{InvokeOutcome, InvokeRequest, RouterResponse, ToolRouter};
pub use stub::StubProvider;

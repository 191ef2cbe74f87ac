//! # ca-approval
//!
//! Human approval requests and decisions for Continuous Assurance.
//!
//! Approval is how a human stays in the loop: the run-level gate, the
//! assessment committee, and the tool router all raise
//! [`ApprovalRequest`]s, and reviewers decide them through the CLI or
//! the API. Requests are durable — a suspended run and its pending
//! requests survive restarts — and decisions are final.
//!
//! ## Key components
//!
//! - [`ApprovalRequest`] / [`ApprovalStatus`] / [`Decision`]
//! - [`ApprovalStore`] — JSON file-based persistence with pending and
//!   per-run views

pub mod error;
pub mod request;
pub mod store;

pub use error::ApprovalError;
pub use request::{ApprovalRequest, ApprovalStatus, Decision};
pub use store::ApprovalStore;

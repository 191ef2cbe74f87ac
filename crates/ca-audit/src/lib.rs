//! # ca-audit
//!
//! Hash-chained audit trail for Continuous Assurance tool calls.
//!
//! Every tool invocation the router mediates produces exactly one
//! [`ToolCallRecord`], appended to an [`AuditLog`] — a JSONL file whose
//! lines are linked by SHA-256 hashes. Tampering with any line breaks
//! the chain and is caught by [`AuditLog::verify_chain`].
//!
//! ## Key components
//!
//! - [`ToolCallRecord`] / [`CallOutcome`] — one record per invocation,
//!   whatever the outcome
//! - [`AuditLog`] — append-only JSONL writer that maintains the chain
//! - [`AuditFilter`] — run/time bounds plus pagination for exports
//! - [`hasher`] — SHA-256 helpers shared across the workspace

pub mod error;
pub mod hasher;
pub mod log;
pub mod record;

pub use error::AuditError;
pub use log::{AuditFilter, AuditLog};
pub use record::{CallOutcome, ToolCallRecord};

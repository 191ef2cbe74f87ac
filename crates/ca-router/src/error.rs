// error.rs — Error types for the tool-call router.
//
// Provider failures are NOT errors at the router level: a provider that
// times out or rejects a call still produces a RouterResponse (with a
// TimedOut or Failed outcome) and an audit record. RouterError is
// reserved for infrastructure the router cannot work without — the
// audit log and the approval store.

use thiserror::Error;

use ca_approval::ApprovalError;
use ca_audit::AuditError;

#[derive(Debug, Error)]
pub enum RouterError {
    /// The audit log could not be written. The router never swallows
    /// this: a call whose record cannot be appended must not proceed.
    #[error("audit log failure: {0}")]
    Audit(#[from] AuditError),

    /// The approval request could not be persisted.
    #[error("approval store failure: {0}")]
    Approval(#[from] ApprovalError),
}

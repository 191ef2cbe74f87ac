// error.rs — Pipeline error taxonomy.
//
// A PipelineError ending up at the orchestrator is fatal for the run:
// the context is persisted as-is and the run transitions to failed.
// Everything recoverable (an unreachable provider, a denied tool call,
// a timed-out scan) never becomes an error at this level — stages turn
// those into StageIssues and keep going.

use thiserror::Error;
use uuid::Uuid;

use ca_approval::ApprovalError;
use ca_router::RouterError;
use ca_run::{PipelineStage, RunError};

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Run persistence or lifecycle failure (store I/O, invalid
    /// stage transition).
    #[error(transparent)]
    Run(#[from] RunError),

    /// The router could not record an invocation (audit or approval
    /// persistence failure). Provider failures are not errors; they
    /// arrive as outcomes.
    #[error(transparent)]
    Router(#[from] RouterError),

    /// Approval store failure outside the router (gate persistence,
    /// review decisions).
    #[error(transparent)]
    Approval(#[from] ApprovalError),

    /// A decision was submitted for a run that is not waiting on one.
    #[error("run {0} is not suspended for approval")]
    NotSuspended(Uuid),

    /// A decision referenced a request the run is not linked to.
    #[error("approval request {request_id} is not linked to run {run_id}")]
    UnknownApproval { run_id: Uuid, request_id: Uuid },

    /// A stage hit a condition it cannot degrade around.
    #[error("fatal error in {stage}: {detail}")]
    Fatal {
        stage: PipelineStage,
        detail: String,
    },
}

// agent.rs — The StageAgent seam between the orchestrator and stages.
//
// Each pipeline stage is one agent: a small value that reads and
// mutates the RunContext and reaches the outside world only through
// the StageEnv (the mediated router and the evidence vault). Agents
// return their recoverable problems instead of recording them; the
// orchestrator is the single writer of the issue list, which keeps
// the commit point obvious.

use std::sync::Arc;

use ca_evidence::EvidenceStore;
use ca_router::ToolRouter;
use ca_run::{PipelineStage, RunContext, StageIssue};

use crate::config::PipelineConfig;
use crate::error::PipelineError;

/// Everything a stage may touch besides the run context.
///
/// All tool calls go through the router (policy, audit, approvals,
/// idempotency); artifact bytes go through the vault. Stages get no
/// other I/O handles.
#[derive(Clone)]
pub struct StageEnv {
    pub router: Arc<ToolRouter>,
    pub vault: Arc<dyn EvidenceStore>,
    pub config: PipelineConfig,
}

/// How a stage finished.
#[derive(Debug)]
pub enum StageOutcome {
    /// Everything the stage set out to do succeeded.
    Complete,

    /// The stage did what it could; the issues say what it could not.
    /// The run continues either way.
    Partial(Vec<StageIssue>),
}

/// One pipeline stage.
///
/// `id` doubles as the agent identity the policy engine sees on every
/// tool call, so the allowlist rows in PolicyConfig and the agents
/// here must stay in step.
pub trait StageAgent {
    /// Agent identity for policy and audit attribution.
    fn id(&self) -> &'static str;

    /// The stage this agent implements.
    fn stage(&self) -> PipelineStage;

    /// Run the stage against the context.
    ///
    /// `Err` is fatal for the run. Anything the run can survive must
    /// come back as `StageOutcome::Partial` instead.
    fn execute(
        &self,
        ctx: &mut RunContext,
        env: &StageEnv,
    ) -> Result<StageOutcome, PipelineError>;
}

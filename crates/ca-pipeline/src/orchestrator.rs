// orchestrator.rs — The run driver.
//
// Owns the walk through the stage machine: load the run, execute the
// stage agent, persist, advance, repeat. The approval gate is handled
// inline as a decision point, and a suspended run simply returns — the
// next resume() picks it up where the stage machine left it. Every
// state change is saved before the corresponding event is dispatched,
// so a crashed process can always be restarted from the store without
// losing more than the stage in flight.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use ca_approval::ApprovalStore;
use ca_evidence::EvidenceStore;
use ca_router::ToolRouter;
use ca_run::{
    EventDispatcher, NotificationSink, PipelineStage, RunContext, RunEvent, RunScope, RunStatus,
    RunStore,
};

use crate::agent::{StageEnv, StageOutcome};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::gate::{ApprovalGate, GateDecision};
use crate::stages;

pub struct Orchestrator {
    store: RunStore,
    events: EventDispatcher,
    env: StageEnv,
    gate: ApprovalGate,
}

impl Orchestrator {
    pub fn new(
        store: RunStore,
        router: Arc<ToolRouter>,
        vault: Arc<dyn EvidenceStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            events: EventDispatcher::new(),
            env: StageEnv {
                router,
                vault,
                config,
            },
            gate: ApprovalGate::default(),
        }
    }

    /// Replace the approval gate (builder pattern).
    pub fn with_gate(mut self, gate: ApprovalGate) -> Self {
        self.gate = gate;
        self
    }

    /// Attach a notification sink for run events.
    pub fn add_sink(&mut self, sink: Box<dyn NotificationSink>) {
        self.events.add_sink(sink);
    }

    pub fn approvals(&self) -> &ApprovalStore {
        self.env.router.approvals()
    }

    /// Create and persist a new run. The caller drives it with
    /// execute(); splitting the two keeps the trigger surface (HTTP,
    /// CLI) free to acknowledge before the pipeline starts working.
    pub fn start(
        &self,
        scope: RunScope,
        question: impl Into<String>,
    ) -> Result<Uuid, PipelineError> {
        let ctx = RunContext::new(scope, question.into());
        self.store.save(&ctx)?;
        self.events.dispatch(&RunEvent::run_started(
            ctx.run_id,
            &ctx.scope.system_id,
            &ctx.question,
        ));
        Ok(ctx.run_id)
    }

    /// Drive a run forward until it completes, suspends, or fails.
    /// Suspended and terminal runs are returned unchanged.
    pub fn execute(&self, run_id: &Uuid) -> Result<RunContext, PipelineError> {
        let ctx = self.store.get(run_id)?;
        if !matches!(ctx.status, RunStatus::Running) {
            return Ok(ctx);
        }
        self.drive(ctx)
    }

    fn drive(&self, mut ctx: RunContext) -> Result<RunContext, PipelineError> {
        loop {
            // Cancellation is cooperative: another handle records it on
            // the stored run, and the driver honors it at the next stage
            // boundary.
            let fresh = self.store.get(&ctx.run_id)?;
            if ctx.cancel.is_none() {
                ctx.cancel = fresh.cancel;
            }
            if let Some(cancel) = &ctx.cancel {
                let reason = format!("cancelled: {}", cancel.reason);
                ctx.fail(reason.clone());
                self.store.save(&ctx)?;
                self.events
                    .dispatch(&RunEvent::run_failed(ctx.run_id, &reason));
                return Ok(ctx);
            }

            if ctx.stage.is_terminal() {
                return Ok(ctx);
            }

            if ctx.stage == PipelineStage::ApprovalGate {
                let thresholds = self.env.router.policy().gate_thresholds();
                match self.gate.evaluate(&mut ctx, thresholds, self.approvals())? {
                    GateDecision::AutoPass => {
                        self.events
                            .dispatch(&RunEvent::stage_completed(ctx.run_id, &ctx.stage));
                        ctx.advance_stage(PipelineStage::Remediation)?;
                        self.store.save(&ctx)?;
                        continue;
                    }
                    GateDecision::Suspend { request_ids } => {
                        ctx.suspend_for_approval(request_ids.clone());
                        self.store.save(&ctx)?;
                        for request_id in &request_ids {
                            let request = self.approvals().get(request_id)?;
                            let summary = format!(
                                "{} ({} control(s))",
                                request.action_type,
                                request.affected_controls.len()
                            );
                            self.events.dispatch(&RunEvent::approval_requested(
                                ctx.run_id,
                                *request_id,
                                &summary,
                            ));
                        }
                        self.events
                            .dispatch(&RunEvent::run_suspended(ctx.run_id, request_ids));
                        return Ok(ctx);
                    }
                }
            }

            let agent = match stages::agent_for(ctx.stage) {
                Some(agent) => agent,
                None => {
                    return Err(PipelineError::Fatal {
                        stage: ctx.stage,
                        detail: "no agent registered for stage".to_string(),
                    })
                }
            };

            match agent.execute(&mut ctx, &self.env) {
                Ok(StageOutcome::Complete) => {}
                Ok(StageOutcome::Partial(issues)) => {
                    for issue in issues {
                        ctx.record_issue(issue);
                    }
                }
                Err(err) => {
                    let reason = err.to_string();
                    ctx.fail(reason.clone());
                    self.store.save(&ctx)?;
                    self.events
                        .dispatch(&RunEvent::run_failed(ctx.run_id, &reason));
                    return Ok(ctx);
                }
            }

            self.events
                .dispatch(&RunEvent::stage_completed(ctx.run_id, &ctx.stage));

            if ctx.stage == PipelineStage::Reporting {
                ctx.complete()?;
                self.store.save(&ctx)?;
                let (score, posture) = match &ctx.summary {
                    Some(summary) => (summary.score, summary.posture_label().to_string()),
                    None => (0.0, "At Risk".to_string()),
                };
                self.events.dispatch(&RunEvent::RunCompleted {
                    run_id: ctx.run_id,
                    score,
                    posture,
                    timestamp: Utc::now(),
                });
                return Ok(ctx);
            }

            match ctx.stage.successor() {
                Some(next) => ctx.advance_stage(next)?,
                None => {
                    return Err(PipelineError::Fatal {
                        stage: ctx.stage,
                        detail: "stage has no successor".to_string(),
                    })
                }
            }
            self.store.save(&ctx)?;
        }
    }

    /// Record a reviewer decision and, once no request is left pending,
    /// resume the run into remediation. Approve and reject both resume:
    /// the remediation stage honors rejections per-control.
    pub fn resume(
        &self,
        run_id: &Uuid,
        request_id: &Uuid,
        approved: bool,
        reviewer: &str,
        notes: Option<String>,
    ) -> Result<RunContext, PipelineError> {
        let mut ctx = self.store.get(run_id)?;
        if !matches!(ctx.status, RunStatus::SuspendedForApproval) {
            return Err(PipelineError::NotSuspended(*run_id));
        }
        if !ctx.pending_approvals.contains(request_id) {
            return Err(PipelineError::UnknownApproval {
                run_id: *run_id,
                request_id: *request_id,
            });
        }

        self.approvals().decide(request_id, approved, reviewer, notes)?;
        self.events.dispatch(&RunEvent::approval_decided(
            ctx.run_id, *request_id, approved, reviewer,
        ));

        let mut still_pending = false;
        for pending_id in &ctx.pending_approvals {
            if pending_id == request_id {
                continue;
            }
            if self.approvals().get(pending_id)?.is_pending() {
                still_pending = true;
            }
        }
        if still_pending {
            return Ok(ctx);
        }

        ctx.resume_running();
        ctx.advance_stage(PipelineStage::Remediation)?;
        self.store.save(&ctx)?;
        self.events.dispatch(&RunEvent::RunResumed {
            run_id: ctx.run_id,
            timestamp: Utc::now(),
        });
        self.drive(ctx)
    }

    /// Request cancellation. A running run stops at its next stage
    /// boundary; a suspended run fails immediately (there is no driver
    /// to notice the flag); terminal runs are left alone.
    pub fn cancel(
        &self,
        run_id: &Uuid,
        reason: impl Into<String>,
    ) -> Result<RunContext, PipelineError> {
        let mut ctx = self.store.get(run_id)?;
        let reason = reason.into();
        match ctx.status {
            RunStatus::Running => {
                ctx.request_cancel(reason);
                self.store.save(&ctx)?;
                Ok(ctx)
            }
            RunStatus::SuspendedForApproval => {
                ctx.request_cancel(reason.clone());
                let detail = format!("cancelled: {}", reason);
                ctx.fail(detail.clone());
                self.store.save(&ctx)?;
                self.events
                    .dispatch(&RunEvent::run_failed(ctx.run_id, &detail));
                Ok(ctx)
            }
            RunStatus::Completed | RunStatus::Failed { .. } => Ok(ctx),
        }
    }

    pub fn status(&self, run_id: &Uuid) -> Result<RunContext, PipelineError> {
        Ok(self.store.get(run_id)?)
    }

    /// All runs, newest first.
    pub fn list(&self) -> Result<Vec<RunContext>, PipelineError> {
        Ok(self.store.list()?)
    }

    /// Flag approval requests that have been waiting longer than
    /// `max_wait`. They are reported, never auto-decided: an expired
    /// authorization decision still belongs to a human.
    pub fn sweep_stale_approvals(
        &self,
        max_wait: chrono::Duration,
    ) -> Result<Vec<Uuid>, PipelineError> {
        let now = Utc::now();
        let stale = self.approvals().stale_pending(now - max_wait)?;
        for request in &stale {
            let waiting_hours = (now - request.requested_at).num_hours();
            tracing::warn!(
                run_id = %request.run_id,
                request_id = %request.request_id,
                waiting_hours,
                "approval request overdue"
            );
            self.events.dispatch(&RunEvent::ApprovalOverdue {
                run_id: request.run_id,
                request_id: request.request_id,
                waiting_hours,
                timestamp: now,
            });
        }
        Ok(stale.iter().map(|r| r.request_id).collect())
    }
}

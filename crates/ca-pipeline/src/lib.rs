//! # ca-pipeline
//!
//! Stage agents, approval gate, and orchestrator for Continuous
//! Assurance runs.
//!
//! The [`Orchestrator`] walks a run through the stage machine defined
//! in `ca-run`, executing one [`StageAgent`] per stage. Agents reach
//! the outside world only through the tool router in their
//! [`StageEnv`], so every provider call is policy-checked and audited.
//! The approval gate between gap analysis and remediation has no agent:
//! the orchestrator evaluates it as a decision point and either
//! advances the run or suspends it on filed approval requests.
//!
//! ## Key components
//!
//! - [`Orchestrator`] — drives runs: start, execute, resume, cancel
//! - [`StageAgent`] / [`StageEnv`] — the per-stage execution contract
//! - [`ApprovalGate`] / [`GateDecision`] — the suspend-or-proceed call
//! - [`Committee`] / [`Assessor`] — second opinions on gating controls
//! - [`stages::agent_for`] — the stage → agent registry

pub mod agent;
pub mod committee;
pub mod config;
pub mod error;
pub mod gate;
pub mod orchestrator;
pub mod stages;

pub use agent::{StageAgent, StageEnv, StageOutcome};
pub use committee::{
    Assessor, AssessorOpinion, Committee, CommitteeEscalation, EvidenceScorer, ReconcileOutcome,
    SignalScorer,
};
pub use config::PipelineConfig;
pub use error::PipelineError;
pub use gate::{ApprovalGate, GateDecision};
pub use orchestrator::Orchestrator;
pub use stages::agent_for;

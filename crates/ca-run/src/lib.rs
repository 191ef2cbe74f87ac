//! # ca-run
//!
//! Run context, assessment data model, and pipeline lifecycle for
//! Continuous Assurance.
//!
//! A [`RunContext`] is the top-level execution unit: the scope under
//! assessment, the stage machine position, and everything the pipeline
//! has produced so far (evidence, assessments, drift, findings, POA&M
//! items). The context is a plain serializable value, which is what
//! makes durable suspension work — a parked run is just its JSON file.
//!
//! ## Key components
//!
//! - [`RunContext`] — serializable state of one run
//! - [`PipelineStage`] / [`RunStatus`] — the stage machine (ScopeResolution
//!   → ControlMapping → … → Reporting → Completed, with Failed reachable
//!   from any non-terminal stage)
//! - [`RunStore`] — JSON file-based persistence for run contexts
//! - [`ControlAssessment`] / [`EvidenceRef`] / [`DriftEvent`] — the
//!   assessment vocabulary shared by every stage
//! - [`RunEvent`] / [`EventDispatcher`] — lifecycle events and
//!   notification sinks

pub mod assessment;
pub mod context;
pub mod drift;
pub mod error;
pub mod events;
pub mod evidence;
pub mod posture;
pub mod remediation;
pub mod scope;
pub mod stage;
pub mod store;

pub use assessment::{control_family, AssessmentStatus, ControlAssessment, Severity};
pub use context::{CancelRequest, RunContext, RunSummary, StageIssue};
pub use drift::DriftEvent;
pub use error::RunError;
pub use events::{EventDispatcher, LogSink, NotificationSink, RunEvent};
pub use evidence::{ControlMap, EvidenceKind, EvidenceRef, PlannedEvidence};
pub use posture::{FindingCategory, FindingStatus, PostureFinding, PostureSummary};
pub use remediation::{remediation_window_days, PoamItem, PoamMilestone, PoamStatus, TicketRef};
pub use scope::{Baseline, CloudProvider, Framework, RunScope};
pub use stage::{PipelineStage, RunStatus};
pub use store::RunStore;

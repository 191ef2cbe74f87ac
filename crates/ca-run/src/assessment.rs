// assessment.rs — Control assessments and the severity scale.
//
// A ControlAssessment is the verdict for one control in one run: status,
// confidence, the evidence it rests on, and any contradiction flags the
// gap analysis raised. Assessments are keyed by control identifier in the
// run context; re-assessing a control replaces the earlier entry.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scope::CloudProvider;

/// Ordinal severity scale driving approval and escalation thresholds.
///
/// Deriving `Ord` gives us `severity >= Severity::High` for threshold
/// checks — the variant order below is the ordering, so keep it
/// low-to-critical.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Moderate,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Moderate => write!(f, "moderate"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Severity::Low),
            "moderate" => Ok(Severity::Moderate),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

/// The verdict for a single control.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentStatus {
    Pass,
    Fail,
    Partial,
    NotApplicable,
    ManualReviewRequired,
}

impl fmt::Display for AssessmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssessmentStatus::Pass => write!(f, "pass"),
            AssessmentStatus::Fail => write!(f, "fail"),
            AssessmentStatus::Partial => write!(f, "partial"),
            AssessmentStatus::NotApplicable => write!(f, "not_applicable"),
            AssessmentStatus::ManualReviewRequired => write!(f, "manual_review_required"),
        }
    }
}

/// Extract the control family from a control identifier.
///
/// "AC-2" → "AC", "SC-7(3)" → "SC". Identifiers without a dash are
/// returned whole (synthetic controls like "__asset_inventory").
pub fn control_family(control_id: &str) -> &str {
    control_id.split('-').next().unwrap_or(control_id)
}

/// Serde helper: omit boolean flags that are false.
fn is_false(b: &bool) -> bool {
    !*b
}

/// One control's assessment outcome within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlAssessment {
    /// Control identifier (e.g., "AC-2", "SC-7(3)").
    pub control_id: String,

    /// The verdict.
    pub status: AssessmentStatus,

    /// Assessor confidence in [0, 1].
    pub confidence: f64,

    /// Severity of the finding. Set for fail/partial verdicts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,

    /// Artifact identifiers of the evidence this verdict rests on.
    /// Many assessments may reference the same artifact; its SHA-256 hash
    /// is the shared integrity anchor.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<Uuid>,

    /// Contradiction flags raised during gap analysis
    /// (e.g., "policy_vs_config").
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contradictions: Vec<String>,

    /// Provider the evidence came from, when single-sourced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<CloudProvider>,

    /// Short assessor rationale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,

    /// Set when two independent assessors agreed and the verdict was merged.
    #[serde(default, skip_serializing_if = "is_false")]
    pub committee_confirmed: bool,

    /// When the verdict was produced.
    pub assessed_at: DateTime<Utc>,
}

impl ControlAssessment {
    /// Create an assessment with the current timestamp. Confidence is
    /// clamped into [0, 1].
    pub fn new(
        control_id: impl Into<String>,
        status: AssessmentStatus,
        confidence: f64,
    ) -> Self {
        Self {
            control_id: control_id.into(),
            status,
            confidence: confidence.clamp(0.0, 1.0),
            severity: None,
            evidence: Vec::new(),
            contradictions: Vec::new(),
            provider: None,
            rationale: None,
            committee_confirmed: false,
            assessed_at: Utc::now(),
        }
    }

    /// Set the finding severity (builder pattern).
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    /// Attach evidence artifact ids (builder pattern).
    pub fn with_evidence(mut self, evidence: Vec<Uuid>) -> Self {
        self.evidence = evidence;
        self
    }

    /// Set the rationale (builder pattern).
    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }

    /// The control family this assessment belongs to.
    pub fn family(&self) -> &str {
        control_family(&self.control_id)
    }

    /// Whether this assessment crosses an approval threshold at `min`.
    pub fn is_failing_at(&self, min: Severity) -> bool {
        self.status == AssessmentStatus::Fail
            && self.severity.is_some_and(|s| s >= min)
    }
}

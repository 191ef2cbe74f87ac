// posture.rs — STIG posture findings.
//
// When the scope includes the STIG or RMF framework, the posture stage
// ingests checklist results and SCAP scans. Each finding carries a
// category (CAT I is the most severe) and an open/closed status; open
// CAT I findings force failing assessments on their related controls and
// trip the approval gate.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::assessment::Severity;

/// STIG finding category. CAT I is the most severe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FindingCategory {
    CatI,
    CatIi,
    CatIii,
}

impl FindingCategory {
    /// Map the category onto the shared severity scale.
    pub fn severity(&self) -> Severity {
        match self {
            FindingCategory::CatI => Severity::Critical,
            FindingCategory::CatIi => Severity::High,
            FindingCategory::CatIii => Severity::Moderate,
        }
    }
}

impl fmt::Display for FindingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FindingCategory::CatI => write!(f, "CAT I"),
            FindingCategory::CatIi => write!(f, "CAT II"),
            FindingCategory::CatIii => write!(f, "CAT III"),
        }
    }
}

/// Review status of one checklist item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FindingStatus {
    Open,
    NotAFinding,
    NotApplicable,
    NotReviewed,
}

/// One STIG checklist finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostureFinding {
    /// Vulnerability identifier from the benchmark (e.g., "V-254239").
    pub finding_id: String,

    /// Benchmark rule title.
    pub title: String,

    /// Finding category.
    pub category: FindingCategory,

    /// Review status.
    pub status: FindingStatus,

    /// Controls this finding maps onto.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_controls: Vec<String>,
}

impl PostureFinding {
    /// Whether this finding is open (needs remediation).
    pub fn is_open(&self) -> bool {
        self.status == FindingStatus::Open
    }

    /// Whether this is an open CAT I finding — the condition that forces
    /// a fail on related controls.
    pub fn is_open_cat_i(&self) -> bool {
        self.is_open() && self.category == FindingCategory::CatI
    }

    /// Whether this finding names the given control.
    pub fn touches_control(&self, control_id: &str) -> bool {
        self.related_controls.iter().any(|c| c == control_id)
    }
}

/// Aggregate counts over a set of findings, used by reporting.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PostureSummary {
    pub total: usize,
    pub open: usize,
    pub not_a_finding: usize,
    pub cat_i_open: usize,
    pub cat_ii_open: usize,
}

impl PostureSummary {
    /// Tally a slice of findings.
    pub fn tally(findings: &[PostureFinding]) -> Self {
        let mut summary = Self {
            total: findings.len(),
            ..Self::default()
        };
        for finding in findings {
            match finding.status {
                FindingStatus::Open => {
                    summary.open += 1;
                    match finding.category {
                        FindingCategory::CatI => summary.cat_i_open += 1,
                        FindingCategory::CatIi => summary.cat_ii_open += 1,
                        FindingCategory::CatIii => {}
                    }
                }
                FindingStatus::NotAFinding => summary.not_a_finding += 1,
                FindingStatus::NotApplicable | FindingStatus::NotReviewed => {}
            }
        }
        summary
    }
}

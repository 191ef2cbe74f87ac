// remediation.rs — POA&M items and ticket references.
//
// Failing or partial controls produce Plan of Action & Milestones entries
// with completion dates scheduled from the finding severity. High and
// critical findings additionally get tracker tickets. Both records live in
// the run context; creating the external ticket itself is a mediated,
// idempotent tool call.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assessment::Severity;

/// Days allowed to close a weakness at each severity.
pub fn remediation_window_days(severity: Severity) -> i64 {
    match severity {
        Severity::Critical => 30,
        Severity::High => 90,
        Severity::Moderate => 180,
        Severity::Low => 365,
    }
}

/// One milestone inside a POA&M item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoamMilestone {
    pub description: String,
    pub due: DateTime<Utc>,
}

/// Lifecycle of a POA&M item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PoamStatus {
    Open,
    InProgress,
    Completed,
}

/// One Plan of Action & Milestones entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoamItem {
    /// Unique identifier for this item.
    pub poam_id: Uuid,

    /// The control the weakness was found in.
    pub control_id: String,

    /// Description of the weakness.
    pub weakness: String,

    /// Severity inherited from the originating assessment.
    pub severity: Severity,

    /// Scheduled completion, derived from the severity window.
    pub scheduled_completion: DateTime<Utc>,

    /// Standard three-milestone plan.
    pub milestones: Vec<PoamMilestone>,

    /// Item status. New items start open.
    pub status: PoamStatus,

    /// When this item was created.
    pub created_at: DateTime<Utc>,
}

impl PoamItem {
    /// Schedule a new POA&M item from a weakness and its severity.
    ///
    /// Milestones follow the standard cadence: root-cause analysis at 14
    /// days, implementation at 60 days (capped at the due date), and
    /// verification at the due date.
    pub fn schedule(
        control_id: impl Into<String>,
        weakness: impl Into<String>,
        severity: Severity,
        now: DateTime<Utc>,
    ) -> Self {
        let due = now + Duration::days(remediation_window_days(severity));
        let implementation = std::cmp::min(now + Duration::days(60), due);
        let milestones = vec![
            PoamMilestone {
                description: "Complete root cause analysis and remediation plan".to_string(),
                due: now + Duration::days(14),
            },
            PoamMilestone {
                description: "Implement remediation".to_string(),
                due: implementation,
            },
            PoamMilestone {
                description: "Verify and close".to_string(),
                due,
            },
        ];
        Self {
            poam_id: Uuid::new_v4(),
            control_id: control_id.into(),
            weakness: weakness.into(),
            severity,
            scheduled_completion: due,
            milestones,
            status: PoamStatus::Open,
            created_at: now,
        }
    }
}

/// Reference to a ticket created in an external tracker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TicketRef {
    /// Tracker-side ticket identifier.
    pub ticket_id: String,

    /// Which tracker holds the ticket (jira, servicenow, github).
    pub tracker: String,

    /// The control the ticket remediates, when control-specific.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_id: Option<String>,

    /// Ticket summary line.
    pub summary: String,

    /// Severity carried over from the finding.
    pub severity: Severity,

    /// When the ticket was created.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_shrink_with_severity() {
        assert_eq!(remediation_window_days(Severity::Critical), 30);
        assert_eq!(remediation_window_days(Severity::High), 90);
        assert_eq!(remediation_window_days(Severity::Moderate), 180);
        assert_eq!(remediation_window_days(Severity::Low), 365);
    }

    #[test]
    fn scheduled_item_has_three_milestones_in_order() {
        let now = Utc::now();
        let item = PoamItem::schedule("AC-2", "Stale admin accounts", Severity::High, now);

        assert_eq!(item.milestones.len(), 3);
        assert_eq!(item.status, PoamStatus::Open);
        assert_eq!(item.scheduled_completion, now + Duration::days(90));
        assert!(item.milestones[0].due < item.milestones[1].due);
        assert!(item.milestones[1].due <= item.milestones[2].due);
    }

    #[test]
    fn critical_implementation_milestone_capped_at_due_date() {
        // Critical window (30d) is shorter than the 60d implementation
        // default, so the implementation milestone must cap at the due date.
        let now = Utc::now();
        let item = PoamItem::schedule("SC-7", "Public endpoint exposed", Severity::Critical, now);
        assert_eq!(item.milestones[1].due, item.scheduled_completion);
    }

    #[test]
    fn poam_serialization_round_trip() {
        let item = PoamItem::schedule("CM-6", "Config drift", Severity::Moderate, Utc::now());
        let json = serde_json::to_string(&item).unwrap();
        let restored: PoamItem = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.poam_id, item.poam_id);
        assert_eq!(restored.milestones.len(), 3);
    }
}

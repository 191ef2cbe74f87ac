// drift.rs — Configuration drift events.
//
// A DriftEvent records one detected divergence between a provider's live
// configuration and the last approved baseline: which resource changed,
// what changed about it, how severe the change is, and which controls the
// change touches. Events are appended during drift detection and drive
// both the gap analysis and the approval gate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assessment::Severity;
use crate::scope::CloudProvider;

/// One detected configuration divergence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftEvent {
    /// Unique identifier for this event.
    pub event_id: Uuid,

    /// Provider the drift was detected in.
    pub provider: CloudProvider,

    /// Resource category (iam, network, storage, encryption, logging,
    /// compute, ...).
    pub resource_type: String,

    /// Provider-side resource identifier.
    pub resource_id: String,

    /// What changed (e.g., "new_admin_role", "sg_rule_added").
    pub change: String,

    /// Value before the change, when the detector captured one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_value: Option<serde_json::Value>,

    /// Value after the change, when the detector captured one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_value: Option<serde_json::Value>,

    /// Classified severity of the change.
    pub severity: Severity,

    /// Controls this change bears on (e.g., ["SC-7", "AC-4"]).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_controls: Vec<String>,

    /// When the drift was detected.
    pub detected_at: DateTime<Utc>,
}

impl DriftEvent {
    /// Create a drift event with a fresh id and the current timestamp.
    pub fn new(
        provider: CloudProvider,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        change: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            provider,
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            change: change.into(),
            previous_value: None,
            current_value: None,
            severity,
            related_controls: Vec::new(),
            detected_at: Utc::now(),
        }
    }

    /// Attach the related controls (builder pattern).
    pub fn with_related_controls(mut self, controls: Vec<String>) -> Self {
        self.related_controls = controls;
        self
    }

    /// Whether this event names the given control.
    pub fn touches_control(&self, control_id: &str) -> bool {
        self.related_controls.iter().any(|c| c == control_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drift_event_carries_severity_and_controls() {
        let event = DriftEvent::new(
            CloudProvider::Aws,
            "network",
            "sg-0a1b2c",
            "new_public_endpoint",
            Severity::Critical,
        )
        .with_related_controls(vec!["SC-7".to_string(), "AC-4".to_string()]);

        assert_eq!(event.severity, Severity::Critical);
        assert!(event.touches_control("SC-7"));
        assert!(!event.touches_control("AU-2"));
    }

    #[test]
    fn optional_values_omitted_from_json() {
        let event = DriftEvent::new(
            CloudProvider::Gcp,
            "iam",
            "role/admin",
            "new_admin_role",
            Severity::Critical,
        );
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("previous_value"));
        assert!(!json.contains("related_controls"));
    }

    #[test]
    fn serialization_round_trip() {
        let mut event = DriftEvent::new(
            CloudProvider::Azure,
            "storage",
            "bucket-7",
            "public_access_enabled",
            Severity::Critical,
        );
        event.previous_value = Some(serde_json::json!(false));
        event.current_value = Some(serde_json::json!(true));

        let json = serde_json::to_string(&event).unwrap();
        let restored: DriftEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.event_id, event.event_id);
        assert_eq!(restored.change, "public_access_enabled");
        assert_eq!(restored.current_value, Some(serde_json::json!(true)));
    }
}

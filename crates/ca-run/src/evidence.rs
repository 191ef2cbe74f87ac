// evidence.rs — Evidence references and the collection plan.
//
// Evidence never lives inside the run context — only references do. The
// actual bytes sit in the content-addressed vault; the reference carries
// the artifact's SHA-256 hash, which is the integrity anchor every
// assessment citing that artifact shares.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scope::CloudProvider;

/// Kinds of evidence the pipeline knows how to collect.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    ConfigSnapshot,
    LogExport,
    ScanReport,
    AssetInventory,
    PolicyDoc,
    Checklist,
}

impl EvidenceKind {
    /// Freshness SLA in days. Evidence older than this counts as stale
    /// for continuous-monitoring purposes.
    pub fn freshness_sla_days(&self) -> i64 {
        match self {
            EvidenceKind::ConfigSnapshot => 1,
            EvidenceKind::LogExport => 7,
            EvidenceKind::ScanReport => 30,
            EvidenceKind::AssetInventory => 7,
            EvidenceKind::PolicyDoc => 365,
            EvidenceKind::Checklist => 30,
        }
    }

    /// Stable string form, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceKind::ConfigSnapshot => "config_snapshot",
            EvidenceKind::LogExport => "log_export",
            EvidenceKind::ScanReport => "scan_report",
            EvidenceKind::AssetInventory => "asset_inventory",
            EvidenceKind::PolicyDoc => "policy_doc",
            EvidenceKind::Checklist => "checklist",
        }
    }
}

impl fmt::Display for EvidenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EvidenceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "config_snapshot" => Ok(EvidenceKind::ConfigSnapshot),
            "log_export" => Ok(EvidenceKind::LogExport),
            "scan_report" => Ok(EvidenceKind::ScanReport),
            "asset_inventory" => Ok(EvidenceKind::AssetInventory),
            "policy_doc" => Ok(EvidenceKind::PolicyDoc),
            "checklist" => Ok(EvidenceKind::Checklist),
            other => Err(format!("unknown evidence kind '{}'", other)),
        }
    }
}

/// Reference to one collected, content-addressed evidence artifact.
///
/// Appended to the run context during evidence collection and never
/// mutated or removed afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvidenceRef {
    /// Vault-assigned artifact identifier.
    pub artifact_id: Uuid,

    /// Control this evidence was collected for.
    pub control_id: String,

    /// What kind of evidence this is.
    pub kind: EvidenceKind,

    /// Vault URI the bytes can be fetched from.
    pub uri: String,

    /// SHA-256 of the stored bytes — the integrity anchor.
    pub sha256: String,

    /// Provider the evidence came from.
    pub provider: CloudProvider,

    /// When the evidence was collected.
    pub collected_at: DateTime<Utc>,
}

impl EvidenceRef {
    /// Whether this evidence is older than its kind's freshness SLA.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.collected_at);
        age.num_days() > self.kind.freshness_sla_days()
    }
}

/// One planned collection item: what to fetch, from where, with what tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlannedEvidence {
    /// Control the item satisfies. Synthetic controls use a `__` prefix
    /// (e.g., "__asset_inventory").
    pub control_id: String,

    /// Evidence kind to collect.
    pub kind: EvidenceKind,

    /// Provider to collect from.
    pub provider: CloudProvider,

    /// Canonical tool name to invoke (e.g., "assurance.get_config_snapshot").
    pub tool: String,

    /// Freshness SLA carried alongside so reporting can flag stale items
    /// without re-deriving it.
    pub freshness_sla_days: i64,
}

/// Output of the control-mapping stage: which families are in scope,
/// which concrete controls get assessed, and what evidence each family
/// requires.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ControlMap {
    /// Control families selected for the baseline (e.g., "AC", "AU").
    pub families: Vec<String>,

    /// Concrete controls to assess, drawn from the selected families
    /// (e.g., "AC-2", "SC-7"), in catalog order.
    #[serde(default)]
    pub controls: Vec<String>,

    /// Evidence kinds required per family.
    pub evidence_requirements: BTreeMap<String, Vec<EvidenceKind>>,
}

impl ControlMap {
    /// Evidence kinds required for a family, falling back to the default
    /// requirement (a config snapshot) for unmapped families.
    pub fn requirements_for(&self, family: &str) -> Vec<EvidenceKind> {
        self.evidence_requirements
            .get(family)
            .cloned()
            .unwrap_or_else(|| vec![EvidenceKind::ConfigSnapshot])
    }

    /// Controls belonging to one family, in map order.
    pub fn controls_in_family(&self, family: &str) -> Vec<&str> {
        self.controls
            .iter()
            .filter(|c| crate::assessment::control_family(c) == family)
            .map(String::as_str)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn evidence_ref(kind: EvidenceKind, age_days: i64) -> EvidenceRef {
        EvidenceRef {
            artifact_id: Uuid::new_v4(),
            control_id: "AC-2".to_string(),
            kind,
            uri: "evidence://SYS-1/config_snapshot/2026-08-01/abc".to_string(),
            sha256: "deadbeef".to_string(),
            provider: CloudProvider::Aws,
            collected_at: Utc::now() - Duration::days(age_days),
        }
    }

    #[test]
    fn freshness_slas_match_monitoring_cadence() {
        assert_eq!(EvidenceKind::ConfigSnapshot.freshness_sla_days(), 1);
        assert_eq!(EvidenceKind::LogExport.freshness_sla_days(), 7);
        assert_eq!(EvidenceKind::ScanReport.freshness_sla_days(), 30);
        assert_eq!(EvidenceKind::PolicyDoc.freshness_sla_days(), 365);
    }

    #[test]
    fn staleness_uses_the_kind_sla() {
        let now = Utc::now();
        assert!(evidence_ref(EvidenceKind::ConfigSnapshot, 3).is_stale(now));
        assert!(!evidence_ref(EvidenceKind::LogExport, 3).is_stale(now));
        assert!(!evidence_ref(EvidenceKind::PolicyDoc, 300).is_stale(now));
    }

    #[test]
    fn kind_round_trips_through_strings() {
        for kind in [
            EvidenceKind::ConfigSnapshot,
            EvidenceKind::LogExport,
            EvidenceKind::ScanReport,
            EvidenceKind::AssetInventory,
            EvidenceKind::PolicyDoc,
            EvidenceKind::Checklist,
        ] {
            assert_eq!(kind.as_str().parse::<EvidenceKind>().unwrap(), kind);
        }
    }

    #[test]
    fn unmapped_family_defaults_to_config_snapshot() {
        let map = ControlMap::default();
        assert_eq!(
            map.requirements_for("XX"),
            vec![EvidenceKind::ConfigSnapshot]
        );
    }

    #[test]
    fn mapped_family_returns_its_requirements() {
        let mut map = ControlMap::default();
        map.families.push("AU".to_string());
        map.evidence_requirements.insert(
            "AU".to_string(),
            vec![EvidenceKind::ConfigSnapshot, EvidenceKind::LogExport],
        );
        assert_eq!(map.requirements_for("AU").len(), 2);
    }

    #[test]
    fn controls_filter_by_family() {
        let mut map = ControlMap::default();
        map.controls = vec![
            "AC-2".to_string(),
            "AC-6".to_string(),
            "SC-7".to_string(),
        ];
        assert_eq!(map.controls_in_family("AC"), vec!["AC-2", "AC-6"]);
        assert_eq!(map.controls_in_family("SC"), vec!["SC-7"]);
        assert!(map.controls_in_family("IA").is_empty());
    }
}

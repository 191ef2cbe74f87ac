// mapping.rs — Stage 2: select control families and concrete controls.
//
// Pure computation: the FedRAMP baseline picks the family set, a
// built-in catalog picks the controls assessed within each family,
// and the evidence-requirement table says what artifact kinds each
// family needs. The catalog is the continuous-monitoring core set —
// the controls cloud drift, audit logs, and STIG checklists can
// actually speak to — not the full 800-53 catalog.

use std::collections::BTreeMap;

use ca_run::{Baseline, ControlMap, EvidenceKind, PipelineStage, RunContext};

use crate::agent::{StageAgent, StageEnv, StageOutcome};
use crate::error::PipelineError;

/// Families assessed at the FedRAMP Low baseline.
const LOW_FAMILIES: [&str; 17] = [
    "AC", "AT", "AU", "CA", "CM", "CP", "IA", "IR", "MA", "MP", "PE", "PL", "PS", "RA", "SA",
    "SC", "SI",
];

/// Moderate and High add program management and supply chain.
const MOD_HIGH_FAMILIES: [&str; 19] = [
    "AC", "AT", "AU", "CA", "CM", "CP", "IA", "IR", "MA", "MP", "PE", "PL", "PM", "PS", "RA",
    "SA", "SC", "SI", "SR",
];

/// The monitored controls per family. The first entry of each family
/// is its anchor: planned evidence is keyed to it and shared across
/// the family at assessment time.
pub fn controls_for_family(family: &str) -> &'static [&'static str] {
    match family {
        "AC" => &["AC-2", "AC-3", "AC-6", "AC-17"],
        "AT" => &["AT-2"],
        "AU" => &["AU-2", "AU-6", "AU-12"],
        "CA" => &["CA-7"],
        "CM" => &["CM-2", "CM-6", "CM-7"],
        "CP" => &["CP-9"],
        "IA" => &["IA-2", "IA-5"],
        "IR" => &["IR-4"],
        "MA" => &["MA-4"],
        "MP" => &["MP-2"],
        "PE" => &["PE-3"],
        "PL" => &["PL-2"],
        "PM" => &["PM-9"],
        "PS" => &["PS-3"],
        "RA" => &["RA-5"],
        "SA" => &["SA-11"],
        "SC" => &["SC-7", "SC-8", "SC-12", "SC-13", "SC-28"],
        "SI" => &["SI-2", "SI-4"],
        "SR" => &["SR-3"],
        _ => &[],
    }
}

/// Evidence kinds each family must produce. Families not listed fall
/// back to a config snapshot (ControlMap::requirements_for).
fn evidence_requirements() -> BTreeMap<String, Vec<EvidenceKind>> {
    let entries: [(&str, &[EvidenceKind]); 6] = [
        (
            "AC",
            &[
                EvidenceKind::ConfigSnapshot,
                EvidenceKind::LogExport,
                EvidenceKind::PolicyDoc,
            ],
        ),
        ("AU", &[EvidenceKind::ConfigSnapshot, EvidenceKind::LogExport]),
        ("CM", &[EvidenceKind::ConfigSnapshot, EvidenceKind::ScanReport]),
        ("IA", &[EvidenceKind::ConfigSnapshot, EvidenceKind::PolicyDoc]),
        ("SC", &[EvidenceKind::ConfigSnapshot, EvidenceKind::ScanReport]),
        ("SI", &[EvidenceKind::ScanReport, EvidenceKind::LogExport]),
    ];
    entries
        .into_iter()
        .map(|(family, kinds)| (family.to_string(), kinds.to_vec()))
        .collect()
}

pub struct ControlMappingAgent;

impl StageAgent for ControlMappingAgent {
    fn id(&self) -> &'static str {
        "control_mapping"
    }

    fn stage(&self) -> PipelineStage {
        PipelineStage::ControlMapping
    }

    fn execute(
        &self,
        ctx: &mut RunContext,
        _env: &StageEnv,
    ) -> Result<StageOutcome, PipelineError> {
        let families: Vec<String> = match ctx.scope.baseline {
            Baseline::FedrampLow => LOW_FAMILIES.iter().map(|f| f.to_string()).collect(),
            Baseline::FedrampMod | Baseline::FedrampHigh | Baseline::Custom => {
                MOD_HIGH_FAMILIES.iter().map(|f| f.to_string()).collect()
            }
        };

        let mut controls = Vec::new();
        for family in &families {
            controls.extend(
                controls_for_family(family)
                    .iter()
                    .map(|c| c.to_string()),
            );
        }

        tracing::debug!(
            run_id = %ctx.run_id,
            families = families.len(),
            controls = controls.len(),
            baseline = %ctx.scope.baseline,
            "control map built"
        );

        ctx.control_map = Some(ControlMap {
            families,
            controls,
            evidence_requirements: evidence_requirements(),
        });

        Ok(StageOutcome::Complete)
    }
}

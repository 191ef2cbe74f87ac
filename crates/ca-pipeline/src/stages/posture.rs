// posture.rs — Stage 6: STIG checklist posture.
//
// Only runs when the scope assesses against stig or rmf; other runs
// pass straight through (the stage machine still visits every stage).
// Checklist findings are ingested per provider, then open findings are
// crosswalked to NIST controls so gap analysis can hold the right
// control accountable for an open CAT I.

use std::collections::BTreeMap;

use serde_json::json;

use ca_router::{InvokeOutcome, InvokeRequest};
use ca_run::{
    FindingCategory, FindingStatus, Framework, PipelineStage, PostureFinding, PostureSummary,
    RunContext, StageIssue,
};

use crate::agent::{StageAgent, StageEnv, StageOutcome};
use crate::error::PipelineError;

pub struct PostureAssessmentAgent;

impl StageAgent for PostureAssessmentAgent {
    fn id(&self) -> &'static str {
        "posture_assessment"
    }

    fn stage(&self) -> PipelineStage {
        PipelineStage::PostureAssessment
    }

    fn execute(
        &self,
        ctx: &mut RunContext,
        env: &StageEnv,
    ) -> Result<StageOutcome, PipelineError> {
        if !ctx.scope.has_framework(Framework::Stig) && !ctx.scope.has_framework(Framework::Rmf)
        {
            tracing::debug!(run_id = %ctx.run_id, "stig not in scope, posture skipped");
            return Ok(StageOutcome::Complete);
        }

        let mut issues = Vec::new();
        let provider = match ctx.scope.providers.first() {
            Some(p) => p.to_string(),
            None => "aws".to_string(),
        };

        let request = InvokeRequest::new(
            ctx.run_id,
            self.id(),
            "scap.ingest_checklist",
            &provider,
        )
        .with_params(json!({
            "provider": provider,
            "system_id": ctx.scope.system_id,
        }))
        .with_correlation(self.stage().to_string());

        let mut findings = match env.router.invoke(&request)?.outcome {
            InvokeOutcome::Success { output } => parse_findings(&output),
            other => {
                issues.push(
                    StageIssue::recoverable(
                        self.stage(),
                        format!("checklist ingestion failed: {:?}", other),
                    )
                    .with_provider(&provider),
                );
                Vec::new()
            }
        };

        // Crosswalk open findings to NIST controls.
        let open_rules: Vec<&str> = findings
            .iter()
            .filter(|(_, finding)| finding.is_open())
            .map(|(rule_id, _)| rule_id.as_str())
            .collect();
        if !open_rules.is_empty() {
            let request = InvokeRequest::new(
                ctx.run_id,
                self.id(),
                "scap.map_stig_controls",
                &provider,
            )
            .with_params(json!({ "stig_rule_ids": open_rules }))
            .with_correlation(self.stage().to_string());

            match env.router.invoke(&request)?.outcome {
                InvokeOutcome::Success { output } => {
                    let crosswalk = parse_crosswalk(&output);
                    for (rule_id, finding) in &mut findings {
                        if let Some(controls) = crosswalk.get(rule_id.as_str()) {
                            finding.related_controls = controls.clone();
                        }
                    }
                }
                other => {
                    issues.push(
                        StageIssue::recoverable(
                            self.stage(),
                            format!("stig control crosswalk failed: {:?}", other),
                        )
                        .with_provider(&provider),
                    );
                }
            }
        }

        for (_, finding) in findings {
            ctx.posture_findings.push(finding);
        }

        let summary = PostureSummary::tally(&ctx.posture_findings);
        tracing::debug!(
            run_id = %ctx.run_id,
            total = summary.total,
            open = summary.open,
            cat_i_open = summary.cat_i_open,
            "posture assessed"
        );

        if issues.is_empty() {
            Ok(StageOutcome::Complete)
        } else {
            Ok(StageOutcome::Partial(issues))
        }
    }
}

/// Parse checklist findings, keyed by their benchmark rule id (the
/// crosswalk key). Unparseable entries are dropped.
fn parse_findings(output: &serde_json::Value) -> Vec<(String, PostureFinding)> {
    let raw = match output["findings"].as_array() {
        Some(raw) => raw,
        None => return Vec::new(),
    };

    raw.iter()
        .filter_map(|entry| {
            let vuln_id = entry["vuln_id"].as_str()?;
            let rule_id = entry["rule_id"].as_str().unwrap_or(vuln_id).to_string();
            let title = ["finding_details", "stig_id", "comments"]
                .iter()
                .filter_map(|key| entry[*key].as_str())
                .find(|s| !s.is_empty())
                .unwrap_or(vuln_id)
                .to_string();

            Some((
                rule_id,
                PostureFinding {
                    finding_id: vuln_id.to_string(),
                    title,
                    category: parse_category(entry["severity"].as_str().unwrap_or("")),
                    status: parse_status(entry["status"].as_str().unwrap_or("")),
                    related_controls: Vec::new(),
                },
            ))
        })
        .collect()
}

/// rule id → NIST controls, from a crosswalk response.
fn parse_crosswalk(output: &serde_json::Value) -> BTreeMap<String, Vec<String>> {
    let mut index = BTreeMap::new();
    if let Some(mappings) = output["mappings"].as_array() {
        for mapping in mappings {
            if let Some(rule_id) = mapping["stig_rule_id"].as_str() {
                let controls: Vec<String> = mapping["nist_controls"]
                    .as_array()
                    .map(|arr| {
                        arr.iter()
                            .filter_map(|v| v.as_str())
                            .map(|s| s.to_string())
                            .collect()
                    })
                    .unwrap_or_default();
                index.insert(rule_id.to_string(), controls);
            }
        }
    }
    index
}

fn parse_category(label: &str) -> FindingCategory {
    match label {
        "CAT_I" | "CAT I" | "high" => FindingCategory::CatI,
        "CAT_II" | "CAT II" | "medium" => FindingCategory::CatIi,
        _ => FindingCategory::CatIii,
    }
}

fn parse_status(label: &str) -> FindingStatus {
    match label {
        "Open" | "open" => FindingStatus::Open,
        "Not_A_Finding" | "NotAFinding" => FindingStatus::NotAFinding,
        "Not_Applicable" | "NotApplicable" => FindingStatus::NotApplicable,
        _ => FindingStatus::NotReviewed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn findings_parse_with_categories_and_status() {
        let output = json!({
            "findings": [
                {
                    "vuln_id": "V-1",
                    "rule_id": "SV-1_rule",
                    "severity": "CAT_I",
                    "status": "Open",
                    "finding_details": "password policy unset"
                },
                {
                    "vuln_id": "V-2",
                    "rule_id": "SV-2_rule",
                    "severity": "CAT_III",
                    "status": "Not_A_Finding",
                    "finding_details": ""
                }
            ]
        });

        let findings = parse_findings(&output);
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].1.category, FindingCategory::CatI);
        assert!(findings[0].1.is_open_cat_i());
        assert_eq!(findings[0].1.title, "password policy unset");
        assert_eq!(findings[1].1.status, FindingStatus::NotAFinding);
    }

    #[test]
    fn unknown_labels_degrade_conservatively() {
        // An unknown status must not read as open, and an unknown
        // severity must not read as CAT I.
        assert_eq!(parse_status("Reviewed_Later"), FindingStatus::NotReviewed);
        assert_eq!(parse_category("CAT_IV"), FindingCategory::CatIii);
    }

    #[test]
    fn crosswalk_indexes_by_rule_id() {
        let output = json!({
            "mappings": [
                {"stig_rule_id": "SV-1_rule", "cci_ids": ["CCI-000366"], "nist_controls": ["CM-6"]},
                {"stig_rule_id": "SV-2_rule", "cci_ids": [], "nist_controls": ["AC-3", "IA-7"]}
            ],
            "unmapped_rules": []
        });

        let index = parse_crosswalk(&output);
        assert_eq!(index["SV-1_rule"], vec!["CM-6"]);
        assert_eq!(index["SV-2_rule"], vec!["AC-3", "IA-7"]);
    }

    #[test]
    fn missing_findings_array_parses_empty() {
        assert!(parse_findings(&json!({"summary": {}})).is_empty());
    }
}

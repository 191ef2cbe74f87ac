// stub.rs — Canned-data provider for development and tests.
//
// StubProvider answers every canonical tool with a plausible response
// shape: the same field names a real cloud connector or tracker
// adapter would return, filled with fixed demo data. One instance is
// registered per provider name, so a registry of stubs exercises the
// whole pipeline end to end without any cloud credentials.

use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use ca_audit::hasher;

use crate::provider::{ProviderError, ToolProvider};

/// A provider backend that fabricates responses instead of calling out.
pub struct StubProvider {
    name: String,
}

impl StubProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn registry_entry(&self, params: &Value) -> Value {
        json!({
            "system_id": str_param(params, "system_id"),
            "system_name": "payments-prod",
            "baseline": "moderate",
            "environment": "production",
            "frameworks": ["nist_800_53_r5"],
            "boundary": { "regions": ["us-east-1"], "tags": { "ato": "payments" } },
            "cloud_accounts": [
                { "provider": self.name, "account_id": "123456789012", "is_active": true }
            ],
            "is_active": true,
        })
    }

    fn asset_inventory(&self, params: &Value) -> Value {
        json!({
            "provider": self.name,
            "system_id": str_param(params, "system_id"),
            "assets": [
                {
                    "asset_id": format!("{}-vm-001", self.name),
                    "resource_type": "compute",
                    "name": "app server",
                    "region": "us-east-1",
                    "tags": { "ato": "payments" },
                    "provider_native_id": "i-0a1b2c3d4e5f6",
                    "status": "active",
                },
                {
                    "asset_id": format!("{}-bucket-001", self.name),
                    "resource_type": "storage",
                    "name": "evidence artifacts",
                    "region": "us-east-1",
                    "tags": { "ato": "payments" },
                    "provider_native_id": "payments-artifacts",
                    "status": "active",
                },
                {
                    "asset_id": format!("{}-role-001", self.name),
                    "resource_type": "iam",
                    "name": "deploy role",
                    "region": "us-east-1",
                    "tags": {},
                    "provider_native_id": "arn:stub:iam::role/deploy",
                    "status": "active",
                },
            ],
            "collected_at": Utc::now(),
        })
    }

    fn config_snapshot(&self, params: &Value) -> Value {
        let resource_type = str_param(params, "resource_type");
        json!({
            "provider": self.name,
            "system_id": str_param(params, "system_id"),
            "resource_type": resource_type,
            "resources": [
                {
                    "resource_id": format!("{}-{}-001", self.name, resource_type),
                    "config": { "resource_type": resource_type, "encrypted": true, "public_access": false },
                    "last_modified": Utc::now(),
                    "provider_native_id": format!("{}-native-001", resource_type),
                }
            ],
            "collected_at": Utc::now(),
        })
    }

    fn audit_log_events(&self, params: &Value) -> Value {
        json!({
            "provider": self.name,
            "system_id": str_param(params, "system_id"),
            "events": [
                {
                    "event_id": "evt-0001",
                    "timestamp": Utc::now(),
                    "actor": "deploy-bot",
                    "action": "PutBucketPolicy",
                    "resource": "payments-artifacts",
                    "result": "Success",
                    "source_ip": "10.0.4.7",
                }
            ],
            "total_count": 1,
            "truncated": false,
        })
    }

    fn control_evaluation(&self, params: &Value) -> Value {
        let control_id = str_param(params, "control_id");
        json!({
            "control_id": control_id,
            "framework": params.get("framework").cloned().unwrap_or_else(|| json!("nist_800_53_r5")),
            "status": "manual_review_required",
            "confidence": 0.0,
            "rationale": format!("stub evaluation for {} on {}", control_id, self.name),
            "evidence_citations": [],
            "evaluated_at": Utc::now(),
        })
    }

    fn drift_report(&self) -> Value {
        json!({
            "provider": self.name,
            "drift_detected": true,
            "drift_events": [
                {
                    "resource_id": format!("{}-sg-12345", self.name),
                    "resource_type": "network",
                    "field": "sg_rule_added",
                    "baseline_value": { "inbound_rules": 3 },
                    "current_value": { "inbound_rules": 5 },
                    "changed_by": "admin@example.com",
                    "changed_at": Utc::now(),
                    "severity": "high",
                    "affected_controls": ["SC-7", "AC-4"],
                    "provider": self.name,
                }
            ],
        })
    }

    fn poam_created(&self, params: &Value) -> Value {
        json!({
            "poam_id": format!("POAM-{}", short_id()),
            "system_id": str_param(params, "system_id"),
            "control_id": str_param(params, "control_id"),
            "status": "open",
            "created_at": Utc::now(),
        })
    }

    fn artifact_stored(&self, params: &Value) -> Result<Value, ProviderError> {
        let sha256 = hasher::digest_json(params)
            .map_err(|e| ProviderError::BadRequest {
                detail: e.to_string(),
            })?;
        let artifact_id = Uuid::new_v4();
        Ok(json!({
            "artifact_id": artifact_id,
            "uri": format!("evidence://stub/{}", artifact_id),
            "sha256": sha256,
            "stored_at": Utc::now(),
        }))
    }

    fn scap_scan(&self, params: &Value) -> Value {
        let formats = params
            .get("output_formats")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_else(|| vec![json!("xccdf"), json!("json")]);
        let result_artifacts: Vec<Value> = formats
            .iter()
            .map(|fmt| json!({ "format": fmt, "artifact_id": Uuid::new_v4() }))
            .collect();
        json!({
            "scan_id": Uuid::new_v4(),
            "system_id": str_param(params, "system_id"),
            "asset_id": str_param(params, "asset_id"),
            "profile": str_param(params, "profile"),
            "scan_status": "completed",
            "summary": {
                "pass": 212, "fail": 9, "error": 0,
                "not_applicable": 31, "not_checked": 4, "score": 0.92,
            },
            "result_artifacts": result_artifacts,
            "scanned_at": Utc::now(),
        })
    }

    fn checklist_ingested(&self, params: &Value) -> Value {
        json!({
            "ingest_id": Uuid::new_v4(),
            "system_id": str_param(params, "system_id"),
            "asset_id": str_param(params, "asset_id"),
            "stig_name": "Microsoft Windows Server 2022 STIG",
            "stig_version": "V1R4",
            "total_checks": 2,
            "summary": { "not_a_finding": 1, "open": 1, "not_applicable": 0, "not_reviewed": 0 },
            "findings": [
                {
                    "vuln_id": "V-254239",
                    "rule_id": "SV-254239r848544_rule",
                    "stig_id": "WN22-DC-000010",
                    "severity": "CAT_II",
                    "status": "Open",
                    "finding_details": "account lockout threshold exceeds policy",
                    "comments": "",
                },
                {
                    "vuln_id": "V-254240",
                    "rule_id": "SV-254240r848547_rule",
                    "stig_id": "WN22-DC-000020",
                    "severity": "CAT_I",
                    "status": "Not_A_Finding",
                    "finding_details": "",
                    "comments": "verified via group policy",
                },
            ],
            "ingested_at": Utc::now(),
        })
    }

    fn stig_mappings(&self, params: &Value) -> Value {
        let rule_ids = params
            .get("stig_rule_ids")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let mappings: Vec<Value> = rule_ids
            .iter()
            .filter_map(Value::as_str)
            .map(|rule_id| {
                // CCI crosswalk: STIG rule → CCI → NIST control.
                let (cci_ids, controls) = match rule_id {
                    "SV-254239r848544_rule" => (vec!["CCI-000366"], vec!["CM-6"]),
                    "SV-254240r848547_rule" => {
                        (vec!["CCI-000213", "CCI-000803"], vec!["AC-3", "IA-7"])
                    }
                    _ => (vec!["CCI-000366"], vec!["CM-6"]),
                };
                json!({
                    "stig_rule_id": rule_id,
                    "cci_ids": cci_ids,
                    "nist_controls": controls,
                })
            })
            .collect();
        json!({ "mappings": mappings, "unmapped_rules": [] })
    }

    fn benchmark_info(&self, params: &Value) -> Value {
        json!({
            "stig_name": str_param(params, "stig_name"),
            "version": "V1R4",
            "release_date": "2024-01-24",
            "total_checks": 257,
            "checks_by_severity": { "CAT_I": 12, "CAT_II": 221, "CAT_III": 24 },
            "checks": [],
        })
    }

    fn ticket_created(&self) -> Value {
        let ticket_id = format!("STUB-{}", short_id());
        json!({
            "ticket_id": ticket_id,
            "ticket_url": format!("https://{}.example.com/ticket/{}", self.name, ticket_id),
            "created_at": Utc::now(),
            "status": "open",
        })
    }

    fn ticket_updated(&self, params: &Value) -> Value {
        json!({
            "ticket_id": str_param(params, "ticket_id"),
            "updated_at": Utc::now(),
            "status": params.get("status").cloned().unwrap_or_else(|| json!("updated")),
        })
    }
}

impl ToolProvider for StubProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn call(
        &self,
        tool: &str,
        params: &Value,
        _deadline: Duration,
    ) -> Result<Value, ProviderError> {
        match tool {
            "assurance.get_system_registry" => Ok(self.registry_entry(params)),
            "assurance.get_asset_inventory" => Ok(self.asset_inventory(params)),
            "assurance.get_config_snapshot" => Ok(self.config_snapshot(params)),
            "assurance.query_audit_logs" => Ok(self.audit_log_events(params)),
            "assurance.evaluate_control_rule" => Ok(self.control_evaluation(params)),
            "assurance.detect_drift" => Ok(self.drift_report()),
            "assurance.create_poam_item" => Ok(self.poam_created(params)),
            "assurance.store_evidence_artifact" => self.artifact_stored(params),
            "scap.run_scap_scan" => Ok(self.scap_scan(params)),
            "scap.ingest_checklist" => Ok(self.checklist_ingested(params)),
            "scap.map_stig_controls" => Ok(self.stig_mappings(params)),
            "scap.get_benchmark_info" => Ok(self.benchmark_info(params)),
            "ticketing.create_ticket" => Ok(self.ticket_created()),
            "ticketing.update_ticket" => Ok(self.ticket_updated(params)),
            "ticketing.query_tickets" => Ok(json!({ "tickets": [], "total_count": 0 })),
            other => Err(ProviderError::NotSupported {
                provider: self.name.clone(),
                tool: other.to_string(),
            }),
        }
    }
}

fn str_param(params: &Value, key: &str) -> String {
    params
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// 8 uppercase hex chars, the shape trackers use for demo ids.
fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_uppercase()
}

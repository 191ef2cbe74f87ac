// router.rs — The mediated tool-call chokepoint.
//
// Every tool call a stage agent makes goes through `ToolRouter::invoke`,
// which applies the full mediation chain:
//
//   classify → policy evaluate → idempotency replay → dispatch → audit
//
// Two invariants hold on every path out of `invoke`:
//
//   1. Exactly one audit record is appended per invocation — denials,
//      rate limits, pending approvals, timeouts, and provider failures
//      are recorded the same as successes.
//   2. Anything recorded (input hashes, approval payloads) is redacted
//      first. The provider gets the raw params; the logs never do.
//
// Provider trouble is an outcome, not an error: callers get a
// RouterResponse either way and decide for themselves whether a failed
// evidence fetch sinks the stage. RouterError is reserved for the audit
// log and approval store themselves.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ca_approval::{ApprovalRequest, ApprovalStore};
use ca_audit::hasher;
use ca_audit::{AuditLog, CallOutcome, ToolCallRecord};
use ca_policy::{PolicyDecision, PolicyEngine, PolicyRequest};
use ca_run::Severity;

use crate::error::RouterError;
use crate::idempotency::IdempotencyCache;
use crate::provider::{ProviderError, ProviderRegistry};
use crate::sanitize::redact;

/// One tool call as submitted by a stage agent.
#[derive(Debug, Clone)]
pub struct InvokeRequest {
    /// The run this call belongs to (audit and idempotency scope).
    pub run_id: Uuid,
    /// The calling stage agent, e.g. "evidence_collection".
    pub agent_id: String,
    /// Fully qualified tool name, e.g. "assurance.get_config_snapshot".
    pub tool: String,
    /// Provider registry key: a cloud ("aws") or a tracker ("jira").
    pub provider: String,
    /// Tool parameters, forwarded to the provider unmodified.
    pub params: serde_json::Value,
    /// Caller-side correlation id threaded into the audit record.
    pub correlation_id: Option<String>,
    /// Severity context, when the call is about a specific finding.
    /// Drives severity-scoped approval rules.
    pub severity: Option<Severity>,
    /// Controls a reviewer would want to see on an approval request.
    pub affected_controls: Vec<String>,
    /// Per-call deadline override.
    pub deadline: Option<Duration>,
    /// Replay key for write-class calls. Same key within the same run
    /// returns the first result instead of re-executing.
    pub idempotency_key: Option<String>,
}

impl InvokeRequest {
    pub fn new(
        run_id: Uuid,
        agent_id: impl Into<String>,
        tool: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            run_id,
            agent_id: agent_id.into(),
            tool: tool.into(),
            provider: provider.into(),
            params: serde_json::Value::Null,
            correlation_id: None,
            severity: None,
            affected_controls: Vec::new(),
            deadline: None,
            idempotency_key: None,
        }
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_affected_controls(mut self, controls: Vec<String>) -> Self {
        self.affected_controls = controls;
        self
    }

    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// What happened to the call. Mirrors the audit record's outcome but
/// carries the data the caller acts on (output, retry hint, request id).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InvokeOutcome {
    Success { output: serde_json::Value },
    Denied { reason: String },
    RateLimited { retry_after_secs: u64 },
    ApprovalPending { request_id: Uuid },
    Failed { error: String },
    TimedOut { elapsed_ms: u64 },
}

/// Per-invocation result handed back to the calling agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterResponse {
    /// Matches the audit record's call_id.
    pub call_id: Uuid,
    pub outcome: InvokeOutcome,
    /// SHA-256 of the output, present on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_hash: Option<String>,
    /// True when the outcome was served from the idempotency cache.
    #[serde(default)]
    pub deduplicated: bool,
}

impl RouterResponse {
    fn new(call_id: Uuid, outcome: InvokeOutcome) -> Self {
        Self {
            call_id,
            outcome,
            output_hash: None,
            deduplicated: false,
        }
    }
}

/// The chokepoint. Shared by every stage agent in a daemon process.
pub struct ToolRouter {
    policy: Arc<PolicyEngine>,
    registry: ProviderRegistry,
    audit: Mutex<AuditLog>,
    approvals: Arc<ApprovalStore>,
    cache: IdempotencyCache,
    default_deadline: Duration,
}

impl ToolRouter {
    pub fn new(
        policy: Arc<PolicyEngine>,
        registry: ProviderRegistry,
        audit: AuditLog,
        approvals: Arc<ApprovalStore>,
    ) -> Self {
        Self {
            policy,
            registry,
            audit: Mutex::new(audit),
            approvals,
            cache: IdempotencyCache::new(),
            default_deadline: Duration::from_secs(30),
        }
    }

    /// Override the 30s default per-call deadline.
    pub fn with_default_deadline(mut self, deadline: Duration) -> Self {
        self.default_deadline = deadline;
        self
    }

    /// The policy engine behind this router. The pipeline gate reads
    /// its thresholds from here so there is a single policy source.
    pub fn policy(&self) -> &PolicyEngine {
        &self.policy
    }

    /// The approval store behind this router.
    pub fn approvals(&self) -> &ApprovalStore {
        &self.approvals
    }

    /// Run one tool call through the full mediation chain.
    pub fn invoke(&self, request: &InvokeRequest) -> Result<RouterResponse, RouterError> {
        let action = self.policy.classify(&request.tool);
        let redacted = redact(&request.params);
        let input_hash = hasher::digest_json(&redacted)?;

        let mut record = ToolCallRecord::new(
            request.run_id,
            &request.agent_id,
            &request.tool,
            &request.provider,
            action.as_str(),
        )
        .with_input_hash(&input_hash);
        if let Some(correlation_id) = &request.correlation_id {
            record = record.with_correlation(correlation_id);
        }

        let mut policy_request =
            PolicyRequest::new(&request.agent_id, &request.tool, &request.provider);
        if let Some(severity) = request.severity {
            policy_request = policy_request.with_severity(severity);
        }

        match self.policy.evaluate(&policy_request) {
            PolicyDecision::Allow => {}
            PolicyDecision::Deny { reason } => {
                tracing::warn!(
                    agent = %request.agent_id,
                    tool = %request.tool,
                    provider = %request.provider,
                    %reason,
                    "tool call denied"
                );
                let mut record = record.with_outcome(CallOutcome::Denied).with_error(&reason);
                self.append(&mut record)?;
                return Ok(RouterResponse::new(
                    record.call_id,
                    InvokeOutcome::Denied { reason },
                ));
            }
            PolicyDecision::RateLimited { retry_after_secs } => {
                let mut record = record
                    .with_outcome(CallOutcome::RateLimited)
                    .with_error(format!("rate limited, retry after {}s", retry_after_secs));
                self.append(&mut record)?;
                return Ok(RouterResponse::new(
                    record.call_id,
                    InvokeOutcome::RateLimited { retry_after_secs },
                ));
            }
            PolicyDecision::RequireApproval { reason } => {
                // Persist the request before recording it, so a crash
                // between the two leaves a reviewable request rather
                // than an audit line pointing at nothing.
                let approval = ApprovalRequest::new(
                    request.run_id,
                    &request.tool,
                    request.affected_controls.clone(),
                    request.severity.unwrap_or(Severity::Moderate),
                    &request.agent_id,
                )
                .with_payload(serde_json::json!({
                    "tool": request.tool,
                    "provider": request.provider,
                    "params": redacted,
                    "reason": reason,
                }));
                self.approvals.save(&approval)?;

                let mut record = record
                    .with_outcome(CallOutcome::ApprovalPending)
                    .with_approval(approval.request_id);
                self.append(&mut record)?;
                return Ok(RouterResponse::new(
                    record.call_id,
                    InvokeOutcome::ApprovalPending {
                        request_id: approval.request_id,
                    },
                ));
            }
        }

        // Replay check. Read-class calls are safe to repeat, so only
        // writes consult the cache.
        if action.is_write() {
            if let Some(key) = &request.idempotency_key {
                if let Some((output, output_hash)) = self.cache.get(&request.run_id, key) {
                    tracing::debug!(
                        tool = %request.tool,
                        idempotency_key = %key,
                        "write replayed from idempotency cache"
                    );
                    let mut record = record.with_output_hash(&output_hash).with_metadata(
                        serde_json::json!({
                            "deduplicated": true,
                            "idempotency_key": key,
                        }),
                    );
                    self.append(&mut record)?;
                    let mut response = RouterResponse::new(
                        record.call_id,
                        InvokeOutcome::Success { output },
                    );
                    response.output_hash = Some(output_hash);
                    response.deduplicated = true;
                    return Ok(response);
                }
            }
        }

        let Some(provider) = self.registry.get(&request.provider) else {
            let error = format!("no provider registered under \"{}\"", request.provider);
            let mut record = record.with_outcome(CallOutcome::Error).with_error(&error);
            self.append(&mut record)?;
            return Ok(RouterResponse::new(
                record.call_id,
                InvokeOutcome::Failed { error },
            ));
        };

        let deadline = request.deadline.unwrap_or(self.default_deadline);
        let started = Instant::now();
        let result = provider.call(&request.tool, &request.params, deadline);
        let elapsed = started.elapsed();
        let elapsed_ms = elapsed.as_millis() as u64;

        match result {
            Ok(output) => {
                if elapsed > deadline {
                    // The provider answered, but too late to trust; a
                    // late result is dropped, not passed downstream.
                    let error =
                        format!("completed after the {}ms deadline", deadline.as_millis());
                    let mut record = record
                        .with_outcome(CallOutcome::Timeout)
                        .with_error(&error)
                        .completed(elapsed_ms);
                    self.append(&mut record)?;
                    return Ok(RouterResponse::new(
                        record.call_id,
                        InvokeOutcome::TimedOut { elapsed_ms },
                    ));
                }

                let output_hash = hasher::digest_json(&output)?;
                if action.is_write() {
                    if let Some(key) = &request.idempotency_key {
                        self.cache.put(
                            request.run_id,
                            key.clone(),
                            output.clone(),
                            output_hash.clone(),
                        );
                    }
                }

                let mut record = record.with_output_hash(&output_hash).completed(elapsed_ms);
                self.append(&mut record)?;
                let mut response =
                    RouterResponse::new(record.call_id, InvokeOutcome::Success { output });
                response.output_hash = Some(output_hash);
                Ok(response)
            }
            Err(err) => {
                let message = err.to_string();
                tracing::warn!(
                    tool = %request.tool,
                    provider = %request.provider,
                    error = %message,
                    "provider call failed"
                );
                match err {
                    ProviderError::Timeout {
                        elapsed_ms: timed_out_after,
                        ..
                    } => {
                        let mut record = record
                            .with_outcome(CallOutcome::Timeout)
                            .with_error(&message)
                            .completed(elapsed_ms);
                        self.append(&mut record)?;
                        Ok(RouterResponse::new(
                            record.call_id,
                            InvokeOutcome::TimedOut {
                                elapsed_ms: timed_out_after,
                            },
                        ))
                    }
                    _ => {
                        let mut record = record
                            .with_outcome(CallOutcome::Error)
                            .with_error(&message)
                            .completed(elapsed_ms);
                        self.append(&mut record)?;
                        Ok(RouterResponse::new(
                            record.call_id,
                            InvokeOutcome::Failed { error: message },
                        ))
                    }
                }
            }
        }
    }

    fn append(&self, record: &mut ToolCallRecord) -> Result<(), RouterError> {
        let mut audit = self.audit.lock().unwrap_or_else(|e| e.into_inner());
        audit.append(record)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    use ca_policy::PolicyConfig;

    use crate::stub::StubProvider;

    fn test_router(dir: &TempDir) -> ToolRouter {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(StubProvider::new("aws")));
        registry.register(Arc::new(StubProvider::new("jira")));

        let audit = AuditLog::open(dir.path().join("audit.jsonl")).unwrap();
        let approvals = Arc::new(ApprovalStore::open(dir.path().join("approvals")).unwrap());
        let policy = Arc::new(PolicyEngine::new(PolicyConfig::default()));
        ToolRouter::new(policy, registry, audit, approvals)
    }

    fn read_records(dir: &TempDir) -> Vec<ToolCallRecord> {
        AuditLog::read_all(dir.path().join("audit.jsonl")).unwrap()
    }

    struct NeverFinishes;

    impl crate::provider::ToolProvider for NeverFinishes {
        fn name(&self) -> &str {
            "slow_cloud"
        }

        fn call(
            &self,
            _tool: &str,
            _params: &serde_json::Value,
            deadline: Duration,
        ) -> Result<serde_json::Value, ProviderError> {
            Err(ProviderError::Timeout {
                provider: "slow_cloud".to_string(),
                elapsed_ms: deadline.as_millis() as u64,
            })
        }
    }

    #[test]
    fn allowed_read_returns_output_and_one_record() {
        let dir = TempDir::new().unwrap();
        let router = test_router(&dir);
        let run_id = Uuid::new_v4();

        let request = InvokeRequest::new(
            run_id,
            "evidence_collection",
            "assurance.get_asset_inventory",
            "aws",
        )
        .with_params(json!({"system_id": "sys-1"}));

        let response = router.invoke(&request).unwrap();
        match response.outcome {
            InvokeOutcome::Success { output } => {
                assert_eq!(output["provider"], "aws");
                assert!(output["assets"].as_array().is_some());
            }
            other => panic!("expected Success, got {:?}", other),
        }
        assert!(response.output_hash.is_some());
        assert!(!response.deduplicated);

        let records = read_records(&dir);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, CallOutcome::Success);
        assert_eq!(records[0].run_id, run_id);
        assert!(records[0].output_hash.is_some());
    }

    #[test]
    fn denied_call_is_audited_not_executed() {
        let dir = TempDir::new().unwrap();
        let router = test_router(&dir);

        // drift_detection may only call assurance.detect_drift.
        let request = InvokeRequest::new(
            Uuid::new_v4(),
            "drift_detection",
            "assurance.get_asset_inventory",
            "aws",
        );

        let response = router.invoke(&request).unwrap();
        match response.outcome {
            InvokeOutcome::Denied { .. } => {}
            other => panic!("expected Denied, got {:?}", other),
        }

        let records = read_records(&dir);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, CallOutcome::Denied);
        assert!(records[0].error.is_some());
    }

    #[test]
    fn modify_call_raises_approval_and_suspends_nothing_else() {
        let dir = TempDir::new().unwrap();
        let router = test_router(&dir);
        let run_id = Uuid::new_v4();

        let request = InvokeRequest::new(run_id, "remediation", "ticketing.update_ticket", "jira")
            .with_params(json!({
                "ticket_id": "STUB-1",
                "status": "closed",
                "credential_ref": "vault://jira-token",
            }))
            .with_severity(Severity::High)
            .with_affected_controls(vec!["AC-2".to_string()]);

        let response = router.invoke(&request).unwrap();
        let request_id = match response.outcome {
            InvokeOutcome::ApprovalPending { request_id } => request_id,
            other => panic!("expected ApprovalPending, got {:?}", other),
        };

        // The request is durable and carries a redacted payload.
        let pending = router.approvals().get(&request_id).unwrap();
        assert!(pending.is_pending());
        assert_eq!(pending.run_id, run_id);
        assert_eq!(pending.action_type, "ticketing.update_ticket");
        assert_eq!(pending.affected_controls, vec!["AC-2".to_string()]);
        assert_eq!(pending.payload["params"]["credential_ref"], "***REDACTED***");

        let records = read_records(&dir);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, CallOutcome::ApprovalPending);
        assert_eq!(records[0].approval_id, Some(request_id));
    }

    #[test]
    fn idempotent_write_executes_once() {
        let dir = TempDir::new().unwrap();
        let router = test_router(&dir);
        let run_id = Uuid::new_v4();

        let request = InvokeRequest::new(run_id, "remediation", "ticketing.create_ticket", "jira")
            .with_params(json!({"title": "Remediate AC-2", "severity": "high"}))
            .with_idempotency_key("remediate-AC-2");

        let first = router.invoke(&request).unwrap();
        let second = router.invoke(&request).unwrap();

        let first_ticket = match first.outcome {
            InvokeOutcome::Success { output } => output["ticket_id"].clone(),
            other => panic!("expected Success, got {:?}", other),
        };
        let second_ticket = match second.outcome {
            InvokeOutcome::Success { output } => output["ticket_id"].clone(),
            other => panic!("expected Success, got {:?}", other),
        };

        // Same ticket came back, and only the first call reached the
        // provider; both calls are still audited.
        assert_eq!(first_ticket, second_ticket);
        assert!(!first.deduplicated);
        assert!(second.deduplicated);
        assert_eq!(first.output_hash, second.output_hash);

        let records = read_records(&dir);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].metadata["deduplicated"], true);
    }

    #[test]
    fn reads_are_not_deduplicated() {
        let dir = TempDir::new().unwrap();
        let router = test_router(&dir);
        let run_id = Uuid::new_v4();

        let request = InvokeRequest::new(
            run_id,
            "evidence_collection",
            "assurance.query_audit_logs",
            "aws",
        )
        .with_params(json!({"system_id": "sys-1"}))
        .with_idempotency_key("same-key");

        let first = router.invoke(&request).unwrap();
        let second = router.invoke(&request).unwrap();
        assert!(!first.deduplicated);
        assert!(!second.deduplicated);
    }

    #[test]
    fn provider_timeout_becomes_timed_out_outcome() {
        let dir = TempDir::new().unwrap();
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(NeverFinishes));

        let audit = AuditLog::open(dir.path().join("audit.jsonl")).unwrap();
        let approvals = Arc::new(ApprovalStore::open(dir.path().join("approvals")).unwrap());
        // slow_cloud is not a known cloud, so grant an explicit row.
        let mut config = PolicyConfig::default();
        config.access_rules.push(ca_policy::AccessRule::new(
            "evidence_collection",
            vec!["assurance.*"],
            vec!["slow_cloud"],
        ));
        let router = ToolRouter::new(
            Arc::new(PolicyEngine::new(config)),
            registry,
            audit,
            approvals,
        );

        let request = InvokeRequest::new(
            Uuid::new_v4(),
            "evidence_collection",
            "assurance.get_config_snapshot",
            "slow_cloud",
        )
        .with_deadline(Duration::from_millis(50));

        let response = router.invoke(&request).unwrap();
        match response.outcome {
            InvokeOutcome::TimedOut { elapsed_ms } => assert_eq!(elapsed_ms, 50),
            other => panic!("expected TimedOut, got {:?}", other),
        }

        let records = read_records(&dir);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, CallOutcome::Timeout);
    }

    #[test]
    fn unknown_provider_is_a_failed_outcome() {
        let dir = TempDir::new().unwrap();
        let router = test_router(&dir);

        let request = InvokeRequest::new(
            Uuid::new_v4(),
            "evidence_collection",
            "assurance.get_asset_inventory",
            "gcp",
        );

        let response = router.invoke(&request).unwrap();
        match response.outcome {
            InvokeOutcome::Failed { error } => assert!(error.contains("gcp")),
            other => panic!("expected Failed, got {:?}", other),
        }

        let records = read_records(&dir);
        assert_eq!(records[0].outcome, CallOutcome::Error);
    }

    #[test]
    fn input_hash_covers_redacted_params_only() {
        let dir = TempDir::new().unwrap();
        let router = test_router(&dir);

        let params = json!({
            "system_id": "sys-1",
            "credential_ref": "vault://aws-readonly",
        });
        let request = InvokeRequest::new(
            Uuid::new_v4(),
            "evidence_collection",
            "assurance.get_config_snapshot",
            "aws",
        )
        .with_params(params.clone());

        router.invoke(&request).unwrap();

        let records = read_records(&dir);
        let expected = hasher::digest_json(&redact(&params)).unwrap();
        let raw = hasher::digest_json(&params).unwrap();
        assert_eq!(records[0].input_hash.as_deref(), Some(expected.as_str()));
        assert_ne!(records[0].input_hash.as_deref(), Some(raw.as_str()));
    }

    #[test]
    fn every_outcome_chains_in_the_audit_log() {
        let dir = TempDir::new().unwrap();
        let router = test_router(&dir);
        let run_id = Uuid::new_v4();

        // success, denial, approval-pending, unknown provider
        let calls = vec![
            InvokeRequest::new(
                run_id,
                "evidence_collection",
                "assurance.get_asset_inventory",
                "aws",
            ),
            InvokeRequest::new(run_id, "drift_detection", "scap.run_scap_scan", "aws"),
            InvokeRequest::new(run_id, "remediation", "ticketing.update_ticket", "jira"),
            InvokeRequest::new(
                run_id,
                "evidence_collection",
                "assurance.get_asset_inventory",
                "azure",
            ),
        ];
        for call in &calls {
            router.invoke(call).unwrap();
        }

        assert_eq!(read_records(&dir).len(), calls.len());
        assert!(AuditLog::verify_chain(dir.path().join("audit.jsonl")).unwrap());
    }

    #[test]
    fn correlation_id_lands_in_the_record() {
        let dir = TempDir::new().unwrap();
        let router = test_router(&dir);

        let request = InvokeRequest::new(
            Uuid::new_v4(),
            "evidence_collection",
            "assurance.get_asset_inventory",
            "aws",
        )
        .with_correlation("evidence_plan/AC-2/aws");

        router.invoke(&request).unwrap();
        let records = read_records(&dir);
        assert_eq!(
            records[0].correlation_id.as_deref(),
            Some("evidence_plan/AC-2/aws")
        );
    }
}

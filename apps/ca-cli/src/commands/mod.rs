// mod.rs — Shared wiring for CLI commands.
//
// Every command works against one data directory, in the same layout
// the daemon serves. That makes the CLI usable both standalone and
// next to a daemon: a reviewer can decide on a run the daemon
// suspended, and the daemon will see the decision.

pub mod approvals;
pub mod audit;
pub mod run;

use std::path::PathBuf;
use std::sync::Arc;

use ca_approval::ApprovalStore;
use ca_audit::AuditLog;
use ca_evidence::{EvidenceStore, LocalVault};
use ca_pipeline::{Orchestrator, PipelineConfig};
use ca_policy::{PolicyConfig, PolicyEngine};
use ca_router::{ProviderRegistry, StubProvider, ToolRouter};
use ca_run::{LogSink, RunStore};

/// Data directory layout shared with the daemon.
pub struct DataPaths {
    pub data_dir: PathBuf,
}

impl DataPaths {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.data_dir.join("runs")
    }

    pub fn approvals_dir(&self) -> PathBuf {
        self.data_dir.join("approvals")
    }

    pub fn evidence_dir(&self) -> PathBuf {
        self.data_dir.join("evidence")
    }

    pub fn audit_log(&self) -> PathBuf {
        self.data_dir.join("audit.jsonl")
    }

    pub fn event_log(&self) -> PathBuf {
        self.data_dir.join("events.jsonl")
    }

    pub fn policy_file(&self) -> PathBuf {
        self.data_dir.join("policy.toml")
    }
}

/// Build an orchestrator over the data directory. A policy.toml in the
/// data directory overrides the built-in defaults; providers are stubs
/// until real cloud connectors are configured in.
pub fn orchestrator(paths: &DataPaths) -> anyhow::Result<Orchestrator> {
    let store = RunStore::open(paths.runs_dir())?;
    let policy_file = paths.policy_file();
    let policy = if policy_file.exists() {
        Arc::new(PolicyEngine::new(PolicyConfig::load(&policy_file)?))
    } else {
        Arc::new(PolicyEngine::default())
    };
    let audit = AuditLog::open(paths.audit_log())?;
    let approvals = Arc::new(ApprovalStore::open(paths.approvals_dir())?);

    let mut registry = ProviderRegistry::new();
    for provider in ["aws", "aws_gov", "azure", "azure_gov", "gcp", "gcp_gov"] {
        registry.register(Arc::new(StubProvider::new(provider)));
    }
    registry.register(Arc::new(StubProvider::new("jira")));
    registry.register(Arc::new(StubProvider::new("servicenow")));

    let router = Arc::new(ToolRouter::new(policy, registry, audit, approvals));
    let vault: Arc<dyn EvidenceStore> = Arc::new(LocalVault::open(paths.evidence_dir())?);

    let mut orch = Orchestrator::new(store, router, vault, PipelineConfig::default());
    orch.add_sink(Box::new(LogSink::new(paths.event_log())));
    Ok(orch)
}

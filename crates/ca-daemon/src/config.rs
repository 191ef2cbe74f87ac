// config.rs — Daemon configuration.
//
// One TOML file covers the daemon: listener address, data directory,
// an optional policy file, and the pipeline's orchestration knobs
// under a [pipeline] table. Every field defaults so the daemon runs
// with no config file at all.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use ca_pipeline::PipelineConfig;

/// Top-level daemon settings, loadable from TOML.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Address the HTTP listener binds, host:port.
    pub listen: String,

    /// Root directory for run state, approvals, evidence, and logs.
    pub data_dir: PathBuf,

    /// Policy file path. When absent the built-in defaults apply:
    /// read-only tools allowlisted for every stage agent, modify
    /// actions gated on approval.
    pub policy_file: Option<PathBuf>,

    /// Hours a pending approval may sit before the background sweeper
    /// flags it as overdue.
    pub approval_sweep_hours: i64,

    /// Orchestration settings forwarded to the pipeline.
    pub pipeline: PipelineConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:7870".to_string(),
            data_dir: PathBuf::from("./data"),
            policy_file: None,
            approval_sweep_hours: 24,
            pipeline: PipelineConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Load a config file. Missing keys fall back to the defaults.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config = toml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }

    /// Directory holding run context JSON files.
    pub fn runs_dir(&self) -> PathBuf {
        self.data_dir.join("runs")
    }

    /// Directory holding approval request JSON files.
    pub fn approvals_dir(&self) -> PathBuf {
        self.data_dir.join("approvals")
    }

    /// Directory holding the local evidence vault.
    pub fn evidence_dir(&self) -> PathBuf {
        self.data_dir.join("evidence")
    }

    /// Hash-chained audit log of every tool call.
    pub fn audit_log(&self) -> PathBuf {
        self.data_dir.join("audit.jsonl")
    }

    /// Append-only run lifecycle event log.
    pub fn event_log(&self) -> PathBuf {
        self.data_dir.join("events.jsonl")
    }
}

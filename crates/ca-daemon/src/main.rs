//! # ca-daemon
//!
//! Continuous Assurance HTTP daemon.
//!
//! Hosts the assessment pipeline behind a REST API: runs are triggered
//! with POST /api/runs, suspend at the approval gate, and resume when
//! a reviewer decides through POST /api/approvals/{id}/review. All
//! state lives under one data directory, so the daemon can be stopped
//! and restarted without losing suspended runs.
//!
//! ## Usage
//!
//! ```text
//! ca-daemon --config /etc/ca/daemon.toml
//! ca-daemon --listen 0.0.0.0:7870 --data-dir /var/lib/ca
//! ```

mod config;
mod http;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ca_approval::ApprovalStore;
use ca_audit::AuditLog;
use ca_evidence::{EvidenceStore, LocalVault};
use ca_pipeline::Orchestrator;
use ca_policy::{PolicyConfig, PolicyEngine};
use ca_router::{ProviderRegistry, StubProvider, ToolRouter};
use ca_run::{LogSink, RunStore};

use config::DaemonConfig;
use http::AppState;

/// Continuous Assurance daemon.
#[derive(Parser)]
#[command(name = "ca-daemon", about = "Continuous Assurance HTTP daemon")]
struct Cli {
    /// Config file path.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address, overrides the config file.
    #[arg(long)]
    listen: Option<String>,

    /// Data directory, overrides the config file.
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("ca_daemon=info".parse()?)
                .add_directive("ca_pipeline=info".parse()?)
                .add_directive("ca_router=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => DaemonConfig::load(path)?,
        None => DaemonConfig::default(),
    };
    if let Some(listen) = cli.listen {
        config.listen = listen;
    }
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    tracing::info!("Starting Continuous Assurance daemon");
    tracing::info!("Data directory: {}", config.data_dir.display());

    let state = build_state(&config)?;

    // Background sweeper: flag approvals that sat pending longer than
    // the configured window. It only raises events; expiry stays a
    // human decision.
    let sweeper = state.orch.clone();
    let max_wait = chrono::Duration::hours(config.approval_sweep_hours);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
        loop {
            interval.tick().await;
            let orch = sweeper.clone();
            let swept =
                tokio::task::spawn_blocking(move || orch.sweep_stale_approvals(max_wait)).await;
            match swept {
                Ok(Ok(stale)) if !stale.is_empty() => {
                    tracing::warn!(count = stale.len(), "approvals waiting past the window");
                }
                Ok(Ok(_)) => {}
                Ok(Err(err)) => tracing::error!(error = %err, "approval sweep failed"),
                Err(err) => tracing::error!(error = %err, "approval sweep panicked"),
            }
        }
    });

    let app = http::router(state);
    let listener = tokio::net::TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("binding {}", config.listen))?;
    tracing::info!("Listening on {}", config.listen);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Daemon shutting down");
    Ok(())
}

/// Wire the stores, policy engine, router, and orchestrator from the
/// config. Every provider in the registry is a stub until real cloud
/// connectors are configured in.
fn build_state(config: &DaemonConfig) -> Result<AppState> {
    let store = RunStore::open(config.runs_dir())?;
    let policy = match &config.policy_file {
        Some(path) => Arc::new(PolicyEngine::new(PolicyConfig::load(path)?)),
        None => Arc::new(PolicyEngine::default()),
    };
    let audit_path = config.audit_log();
    let audit = AuditLog::open(&audit_path)?;
    let approvals = Arc::new(ApprovalStore::open(config.approvals_dir())?);

    let mut registry = ProviderRegistry::new();
    for provider in ["aws", "aws_gov", "azure", "azure_gov", "gcp", "gcp_gov"] {
        registry.register(Arc::new(StubProvider::new(provider)));
    }
    registry.register(Arc::new(StubProvider::new("jira")));
    registry.register(Arc::new(StubProvider::new("servicenow")));

    let router = Arc::new(ToolRouter::new(policy, registry, audit, approvals));
    let vault: Arc<dyn EvidenceStore> = Arc::new(LocalVault::open(config.evidence_dir())?);

    let mut orch = Orchestrator::new(store, router, vault, config.pipeline.clone());
    orch.add_sink(Box::new(LogSink::new(config.event_log())));

    Ok(AppState {
        orch: Arc::new(orch),
        audit_path,
    })
}

/// Resolve on Ctrl+C or SIGTERM so in-flight requests finish before
/// the process exits.
async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Received shutdown signal");
}

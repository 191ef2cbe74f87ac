//! # ca-cli
//!
//! Command-line interface for Continuous Assurance.
//!
//! Drives assessment runs and the human review loop from a terminal:
//! - `ca run trigger/list/status/cancel/report` — start and inspect runs
//! - `ca approvals list/approve/reject` — decide gated remediations
//! - `ca audit verify/tail/export` — inspect the tamper-evident audit trail
//!
//! The CLI works on the same data directory as `ca-daemon`, so either
//! surface can pick up runs the other started.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::DataPaths;

/// Continuous Assurance CLI — trigger, review, and audit assessment runs.
#[derive(Parser)]
#[command(name = "ca", version, about)]
struct Cli {
    /// Data directory (defaults to $CA_DATA_DIR, then ./data).
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start and inspect assessment runs.
    Run {
        #[command(subcommand)]
        command: commands::run::RunCommands,
    },
    /// Decide approval requests.
    Approvals {
        #[command(subcommand)]
        command: commands::approvals::ApprovalCommands,
    },
    /// Inspect the audit trail.
    Audit {
        #[command(subcommand)]
        command: commands::audit::AuditCommands,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let data_dir = cli
        .data_dir
        .or_else(|| std::env::var_os("CA_DATA_DIR").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("./data"));
    let paths = DataPaths::new(data_dir);

    match &cli.command {
        Commands::Run { command } => commands::run::execute(command, &paths),
        Commands::Approvals { command } => commands::approvals::execute(command, &paths),
        Commands::Audit { command } => commands::audit::execute(command, &paths),
    }
}

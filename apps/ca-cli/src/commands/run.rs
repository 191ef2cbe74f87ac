// run.rs — Run subcommands: trigger, list, status, cancel, report.

use clap::Subcommand;
use uuid::Uuid;

use ca_pipeline::Orchestrator;
use ca_run::{Baseline, CloudProvider, Framework, RunContext, RunScope, RunStatus};

use super::DataPaths;

#[derive(Subcommand)]
pub enum RunCommands {
    /// Trigger an assessment run and drive it until it completes or
    /// suspends at the approval gate.
    Trigger {
        /// System identifier (e.g. "payments-prod").
        system_id: String,
        /// Human-readable system name (defaults to the identifier).
        #[arg(long)]
        system_name: Option<String>,
        /// Question the run should answer.
        #[arg(long, default_value = "Are we compliant with our baseline today?")]
        question: String,
        /// Cloud provider in scope (repeatable).
        #[arg(long = "provider")]
        providers: Vec<String>,
        /// Control baseline (fedramp_low, fedramp_mod, fedramp_high, custom).
        #[arg(long)]
        baseline: Option<String>,
        /// Framework in scope (repeatable).
        #[arg(long = "framework")]
        frameworks: Vec<String>,
        /// Deployment environment label.
        #[arg(long)]
        environment: Option<String>,
    },
    /// List runs, newest first.
    List {
        /// Filter on a status label (running, suspended_for_approval,
        /// completed, failed).
        #[arg(long)]
        status: Option<String>,
    },
    /// Show one run in detail.
    Status {
        /// Run ID.
        run_id: String,
    },
    /// Cancel a run.
    Cancel {
        /// Run ID.
        run_id: String,
        /// Reason recorded on the run.
        #[arg(long, default_value = "cancelled via cli")]
        reason: String,
    },
    /// Print a report document from a completed run.
    Report {
        /// Run ID.
        run_id: String,
        /// Report name. Omit to list what is available.
        #[arg(long)]
        name: Option<String>,
    },
}

pub fn execute(cmd: &RunCommands, paths: &DataPaths) -> anyhow::Result<()> {
    let orch = super::orchestrator(paths)?;
    match cmd {
        RunCommands::Trigger {
            system_id,
            system_name,
            question,
            providers,
            baseline,
            frameworks,
            environment,
        } => trigger(
            &orch,
            system_id,
            system_name.as_deref(),
            question,
            providers,
            baseline.as_deref(),
            frameworks,
            environment.as_deref(),
        ),
        RunCommands::List { status } => list(&orch, status.as_deref()),
        RunCommands::Status { run_id } => status(&orch, run_id),
        RunCommands::Cancel { run_id, reason } => cancel(&orch, run_id, reason),
        RunCommands::Report { run_id, name } => report(&orch, run_id, name.as_deref()),
    }
}

#[allow(clippy::too_many_arguments)]
fn trigger(
    orch: &Orchestrator,
    system_id: &str,
    system_name: Option<&str>,
    question: &str,
    providers: &[String],
    baseline: Option<&str>,
    frameworks: &[String],
    environment: Option<&str>,
) -> anyhow::Result<()> {
    let mut scope = RunScope::new(system_id, system_name.unwrap_or(system_id));
    if !providers.is_empty() {
        let providers: Vec<CloudProvider> = providers
            .iter()
            .map(|p| p.parse().map_err(|err: String| anyhow::anyhow!(err)))
            .collect::<Result<_, _>>()?;
        scope = scope.with_providers(providers);
    }
    if let Some(baseline) = baseline {
        let baseline: Baseline = baseline
            .parse()
            .map_err(|err: String| anyhow::anyhow!(err))?;
        scope = scope.with_baseline(baseline);
    }
    if !frameworks.is_empty() {
        let frameworks: Vec<Framework> = frameworks
            .iter()
            .map(|f| f.parse().map_err(|err: String| anyhow::anyhow!(err)))
            .collect::<Result<_, _>>()?;
        scope = scope.with_frameworks(frameworks);
    }
    if let Some(environment) = environment {
        scope.environment = environment.to_string();
    }

    let run_id = orch.start(scope, question)?;
    println!("Run {} started", run_id);

    let ctx = orch.execute(&run_id)?;
    print_outcome(&ctx);
    Ok(())
}

fn print_outcome(ctx: &RunContext) {
    match &ctx.status {
        RunStatus::Completed => {
            println!("Run {} completed", ctx.run_id);
            if let Some(summary) = &ctx.summary {
                println!(
                    "  {}/{} controls passing ({:.1}%), {} failed, {} partial",
                    summary.passed,
                    summary.total_controls,
                    summary.score,
                    summary.failed,
                    summary.partial
                );
            }
        }
        RunStatus::SuspendedForApproval => {
            println!("Run {} suspended for approval", ctx.run_id);
            for request_id in &ctx.pending_approvals {
                println!("  pending request: {}", request_id);
            }
            println!("Decide with: ca approvals approve|reject <request_id>");
        }
        RunStatus::Failed { reason } => println!("Run {} failed: {}", ctx.run_id, reason),
        RunStatus::Running => println!("Run {} still running", ctx.run_id),
    }
}

fn list(orch: &Orchestrator, status: Option<&str>) -> anyhow::Result<()> {
    let mut runs = orch.list()?;
    if let Some(status) = status {
        runs.retain(|run| run.status.to_string() == status);
    }
    if runs.is_empty() {
        println!("No runs.");
        return Ok(());
    }

    println!(
        "{:<36} {:<20} {:<24} {:<22} SCORE",
        "RUN", "SYSTEM", "STATUS", "STAGE"
    );
    println!("{}", "-".repeat(112));
    for run in &runs {
        let score = run
            .summary
            .as_ref()
            .map(|s| format!("{:.1}", s.score))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<36} {:<20} {:<24} {:<22} {}",
            run.run_id, run.scope.system_id, run.status, run.stage, score
        );
    }
    Ok(())
}

fn status(orch: &Orchestrator, run_id: &str) -> anyhow::Result<()> {
    let run_id = Uuid::parse_str(run_id)?;
    let ctx = orch.status(&run_id)?;

    println!("Run       {}", ctx.run_id);
    println!(
        "System    {} ({})",
        ctx.scope.system_id, ctx.scope.system_name
    );
    println!("Question  {}", ctx.question);
    println!("Status    {}", ctx.status);
    println!("Stage     {}", ctx.stage);
    println!("Started   {}", ctx.started_at.format("%Y-%m-%d %H:%M:%S"));
    println!("Updated   {}", ctx.updated_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(summary) = &ctx.summary {
        println!(
            "Summary   {}/{} passing ({:.1}%), {} failed, {} partial",
            summary.passed, summary.total_controls, summary.score, summary.failed, summary.partial
        );
    }
    if !ctx.pending_approvals.is_empty() {
        println!("Pending approvals:");
        for request_id in &ctx.pending_approvals {
            println!("  {}", request_id);
        }
    }
    if !ctx.stage_issues.is_empty() {
        println!("Issues:");
        for issue in &ctx.stage_issues {
            println!("  [{}] {}", issue.stage, issue.detail);
        }
    }
    Ok(())
}

fn cancel(orch: &Orchestrator, run_id: &str, reason: &str) -> anyhow::Result<()> {
    let run_id = Uuid::parse_str(run_id)?;
    let ctx = orch.cancel(&run_id, reason)?;
    println!("Run {} is now {}", ctx.run_id, ctx.status);
    Ok(())
}

fn report(orch: &Orchestrator, run_id: &str, name: Option<&str>) -> anyhow::Result<()> {
    let run_id = Uuid::parse_str(run_id)?;
    let ctx = orch.status(&run_id)?;
    if ctx.reports.is_empty() {
        anyhow::bail!(
            "Run {} has no reports (it has not reached the reporting stage)",
            run_id
        );
    }
    match name {
        Some(name) => {
            let report = ctx.reports.get(name).ok_or_else(|| {
                anyhow::anyhow!(
                    "No report named {:?}; available: {}",
                    name,
                    report_names(&ctx)
                )
            })?;
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        None => println!("Available reports: {}", report_names(&ctx)),
    }
    Ok(())
}

fn report_names(ctx: &RunContext) -> String {
    ctx.reports.keys().cloned().collect::<Vec<_>>().join(", ")
}

// approvals.rs — Approval subcommands: list, approve, reject.

use clap::Subcommand;
use uuid::Uuid;

use ca_pipeline::Orchestrator;
use ca_run::RunStatus;

use super::DataPaths;

#[derive(Subcommand)]
pub enum ApprovalCommands {
    /// List approval requests.
    List {
        /// Only show requests still waiting on a decision.
        #[arg(long)]
        pending: bool,
        /// Only show requests raised by one run.
        #[arg(long)]
        run: Option<String>,
    },
    /// Approve a request. If the run is parked on it, the run resumes.
    Approve {
        /// Request ID.
        id: String,
        /// Name recorded as the reviewer.
        #[arg(long, default_value = "human-reviewer")]
        reviewer: String,
        /// Free-form notes attached to the decision.
        #[arg(long)]
        notes: Option<String>,
    },
    /// Reject a request. The reason is recorded on the decision.
    Reject {
        /// Request ID.
        id: String,
        /// Why the request was rejected.
        #[arg(long)]
        reason: String,
        /// Name recorded as the reviewer.
        #[arg(long, default_value = "human-reviewer")]
        reviewer: String,
    },
}

pub fn execute(cmd: &ApprovalCommands, paths: &DataPaths) -> anyhow::Result<()> {
    let orch = super::orchestrator(paths)?;
    match cmd {
        ApprovalCommands::List { pending, run } => list(&orch, *pending, run.as_deref()),
        ApprovalCommands::Approve {
            id,
            reviewer,
            notes,
        } => decide(&orch, id, true, reviewer, notes.clone()),
        ApprovalCommands::Reject {
            id,
            reason,
            reviewer,
        } => decide(&orch, id, false, reviewer, Some(reason.clone())),
    }
}

fn list(orch: &Orchestrator, pending: bool, run: Option<&str>) -> anyhow::Result<()> {
    let mut requests = match run {
        Some(run) => {
            let run_id = Uuid::parse_str(run)?;
            orch.approvals().list_for_run(&run_id)?
        }
        None => orch.approvals().list()?,
    };
    if pending {
        requests.retain(|r| r.is_pending());
    }
    requests.sort_by(|a, b| a.requested_at.cmp(&b.requested_at));

    if requests.is_empty() {
        println!("No approval requests.");
        return Ok(());
    }

    println!(
        "{:<36} {:<22} {:<10} {:<10} CONTROLS",
        "REQUEST", "ACTION", "SEVERITY", "STATUS"
    );
    println!("{}", "-".repeat(100));
    for request in &requests {
        println!(
            "{:<36} {:<22} {:<10} {:<10} {}",
            request.request_id,
            request.action_type,
            request.severity,
            request.status,
            request.affected_controls.join(", ")
        );
    }
    Ok(())
}

fn decide(
    orch: &Orchestrator,
    id: &str,
    approved: bool,
    reviewer: &str,
    notes: Option<String>,
) -> anyhow::Result<()> {
    let request_id = Uuid::parse_str(id)?;
    let request = orch.approvals().get(&request_id)?;
    let verdict = if approved { "approved" } else { "rejected" };

    // Requests a suspended run is parked on resume the pipeline;
    // anything else is a plain store decision.
    let suspended_on_request = orch
        .status(&request.run_id)
        .map(|ctx| ctx.pending_approvals.contains(&request_id))
        .unwrap_or(false);

    if suspended_on_request {
        let ctx = orch.resume(&request.run_id, &request_id, approved, reviewer, notes)?;
        println!("Request {} {}", request_id, verdict);
        if matches!(ctx.status, RunStatus::SuspendedForApproval) {
            println!("Run {} still waiting on other approvals", ctx.run_id);
        } else {
            println!("Run {} resumed; now {}", ctx.run_id, ctx.status);
        }
    } else {
        orch.approvals().decide(&request_id, approved, reviewer, notes)?;
        println!("Request {} {}", request_id, verdict);
    }
    Ok(())
}

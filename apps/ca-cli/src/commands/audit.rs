// audit.rs — Audit subcommands: verify, tail, export.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use uuid::Uuid;

use ca_audit::{AuditError, AuditFilter, AuditLog};

use super::DataPaths;

#[derive(Subcommand)]
pub enum AuditCommands {
    /// Verify the audit log hash chain integrity.
    Verify,
    /// Show recent audit records.
    Tail {
        /// Number of records to show.
        #[arg(short, default_value = "10")]
        n: usize,
    },
    /// Export audit records as pretty-printed JSON.
    Export {
        /// Only export records from one run.
        #[arg(long)]
        run: Option<String>,
        /// Write to a file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

pub fn execute(cmd: &AuditCommands, paths: &DataPaths) -> anyhow::Result<()> {
    let path = paths.audit_log();
    match cmd {
        AuditCommands::Verify => verify(&path),
        AuditCommands::Tail { n } => tail(&path, *n),
        AuditCommands::Export { run, output } => export(&path, run.as_deref(), output.as_deref()),
    }
}

fn verify(path: &Path) -> anyhow::Result<()> {
    if !path.exists() {
        println!("No audit log found at {}", path.display());
        return Ok(());
    }

    // Verification recomputes every line hash, not just the stored chain.
    match AuditLog::verify_chain(path) {
        Ok(_) => {
            let records = AuditLog::read_all(path)?;
            println!(
                "Audit log verified: {} record(s), hash chain intact.",
                records.len()
            );
            Ok(())
        }
        Err(AuditError::IntegrityViolation {
            line,
            expected,
            actual,
        }) => {
            println!("INTEGRITY VIOLATION at line {}:", line);
            println!("  Expected previous_hash: {}", expected);
            println!("  Actual previous_hash:   {}", actual);
            println!();
            println!("The audit log may have been tampered with.");
            anyhow::bail!("Audit log integrity check failed");
        }
        Err(e) => Err(e.into()),
    }
}

fn tail(path: &Path, n: usize) -> anyhow::Result<()> {
    if !path.exists() {
        println!("No audit log found at {}", path.display());
        return Ok(());
    }

    let records = AuditLog::read_all(path)?;
    let start = records.len().saturating_sub(n);
    let recent = &records[start..];

    if recent.is_empty() {
        println!("No audit records.");
        return Ok(());
    }

    println!(
        "{:<21} {:<22} {:<24} {:<16} RUN",
        "TIMESTAMP", "AGENT", "TOOL", "OUTCOME"
    );
    println!("{}", "-".repeat(122));

    for record in recent {
        println!(
            "{:<21} {:<22} {:<24} {:<16} {}",
            record.started_at.format("%Y-%m-%d %H:%M:%S"),
            record.agent_id,
            record.tool,
            format!("{:?}", record.outcome),
            record.run_id,
        );
    }
    Ok(())
}

fn export(path: &Path, run: Option<&str>, output: Option<&Path>) -> anyhow::Result<()> {
    if !path.exists() {
        println!("No audit log found at {}", path.display());
        return Ok(());
    }

    let filter = match run {
        Some(run) => AuditFilter::for_run(Uuid::parse_str(run)?),
        None => AuditFilter::default(),
    };
    let records = AuditLog::query(path, &filter)?;
    let rendered = serde_json::to_string_pretty(&records)?;

    match output {
        Some(output) => {
            std::fs::write(output, rendered)?;
            println!("Exported {} record(s) to {}", records.len(), output.display());
        }
        None => println!("{}", rendered),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ca_run::RunScope;
    use tempfile::TempDir;

    fn run_once(paths: &DataPaths) -> Uuid {
        let orch = super::super::orchestrator(paths).unwrap();
        let run_id = orch
            .start(RunScope::new("payments-prod", "Payments"), "Compliant?")
            .unwrap();
        orch.execute(&run_id).unwrap();
        run_id
    }

    #[test]
    fn verify_passes_on_an_untouched_log() {
        let dir = TempDir::new().unwrap();
        let paths = DataPaths::new(dir.path().to_path_buf());
        run_once(&paths);

        verify(&paths.audit_log()).unwrap();
    }

    #[test]
    fn verify_fails_after_tampering() {
        let dir = TempDir::new().unwrap();
        let paths = DataPaths::new(dir.path().to_path_buf());
        run_once(&paths);

        // The scoping stage's registry lookup is always the first record;
        // rewriting its tool name breaks the hash of line one.
        let path = paths.audit_log();
        let contents = std::fs::read_to_string(&path).unwrap();
        let tampered = contents.replacen("get_system_registry", "get_system_inventory", 1);
        assert_ne!(contents, tampered);
        std::fs::write(&path, tampered).unwrap();

        let err = verify(&path).unwrap_err();
        assert!(err.to_string().contains("integrity"));
    }

    #[test]
    fn export_filters_on_the_run() {
        let dir = TempDir::new().unwrap();
        let paths = DataPaths::new(dir.path().to_path_buf());
        let run_id = run_once(&paths);

        let out = dir.path().join("export.json");
        export(&paths.audit_log(), Some(&run_id.to_string()), Some(&out)).unwrap();

        let exported: Vec<serde_json::Value> =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert!(!exported.is_empty());
        for record in &exported {
            assert_eq!(record["run_id"], serde_json::json!(run_id.to_string()));
        }
    }
}

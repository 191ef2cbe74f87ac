// log.rs — Append-only JSONL audit log.
//
// The audit trail is a JSONL file: one tool-call record per line. The
// format is append-friendly and easy to work with using standard tools
// (jq, grep, etc.).
//
// Each record is linked to the previous one via `previous_hash`, forming
// a hash chain. Inserting, deleting, or modifying a line breaks the
// chain, and `verify_chain` reports the first line where it breaks.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AuditError;
use crate::hasher;
use crate::record::ToolCallRecord;

/// Bounds for querying the audit trail.
///
/// All fields are optional; an empty filter returns everything. Offset
/// and limit paginate after the other bounds have been applied, so the
/// export surface never has to load an unbounded trail into a response.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub run_id: Option<Uuid>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl AuditFilter {
    pub fn for_run(run_id: Uuid) -> Self {
        Self {
            run_id: Some(run_id),
            ..Self::default()
        }
    }

    pub fn with_page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }

    fn matches(&self, record: &ToolCallRecord) -> bool {
        if let Some(run_id) = self.run_id {
            if record.run_id != run_id {
                return false;
            }
        }
        if let Some(since) = self.since {
            if record.started_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if record.started_at > until {
                return false;
            }
        }
        true
    }
}

/// An append-only audit log backed by a JSONL file.
///
/// `BufWriter` batches writes; we flush after each record so a crash
/// never loses an acknowledged append.
pub struct AuditLog {
    writer: BufWriter<File>,
    path: PathBuf,
    /// Hash of the last record written — becomes `previous_hash` on the next one.
    last_hash: Option<String>,
}

impl AuditLog {
    /// Open (or create) an audit log at the given path.
    ///
    /// If the file already exists, the last line is read back to recover
    /// the hash chain state so new records link correctly.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();

        let last_hash = if path.exists() {
            Self::read_last_hash(&path)?
        } else {
            None
        };

        // Append mode — existing data is never overwritten.
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| AuditError::OpenFailed {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            writer: BufWriter::new(file),
            path,
            last_hash,
        })
    }

    /// Append a record to the log.
    ///
    /// Sets `previous_hash` to chain the record to the last one, then
    /// flushes to disk.
    pub fn append(&mut self, record: &mut ToolCallRecord) -> Result<(), AuditError> {
        record.previous_hash = self.last_hash.clone();

        // One JSON line per record, no pretty-printing.
        let json = serde_json::to_string(record)?;

        self.last_hash = Some(hasher::hash_str(&json));

        writeln!(self.writer, "{}", json)?;
        self.writer.flush()?;

        Ok(())
    }

    /// Read all records from a log file, oldest first. Blank lines are
    /// skipped.
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<ToolCallRecord>, AuditError> {
        let file = File::open(path.as_ref()).map_err(|source| AuditError::OpenFailed {
            path: path.as_ref().to_path_buf(),
            source,
        })?;
        let reader = BufReader::new(file);
        let mut records = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: ToolCallRecord = serde_json::from_str(&line)?;
            records.push(record);
        }

        Ok(records)
    }

    /// Query a log file with run/time bounds and pagination.
    pub fn query(
        path: impl AsRef<Path>,
        filter: &AuditFilter,
    ) -> Result<Vec<ToolCallRecord>, AuditError> {
        let records = Self::read_all(path)?;
        let filtered = records.into_iter().filter(|r| filter.matches(r));

        let paged: Vec<ToolCallRecord> = match filter.limit {
            Some(limit) => filtered.skip(filter.offset).take(limit).collect(),
            None => filtered.skip(filter.offset).collect(),
        };
        Ok(paged)
    }

    /// Verify the integrity of a log file's hash chain.
    ///
    /// Checks that each record's `previous_hash` matches the hash of the
    /// preceding raw line. Returns `Ok(true)` if valid, or an
    /// `IntegrityViolation` error pointing at the first bad line.
    pub fn verify_chain(path: impl AsRef<Path>) -> Result<bool, AuditError> {
        let file = File::open(path.as_ref()).map_err(|source| AuditError::OpenFailed {
            path: path.as_ref().to_path_buf(),
            source,
        })?;
        let reader = BufReader::new(file);
        let mut previous_hash: Option<String> = None;

        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let record: ToolCallRecord = serde_json::from_str(&line)?;

            if record.previous_hash != previous_hash {
                return Err(AuditError::IntegrityViolation {
                    line: line_num + 1,
                    expected: previous_hash.unwrap_or_else(|| "None".to_string()),
                    actual: record.previous_hash.unwrap_or_else(|| "None".to_string()),
                });
            }

            // Hash the raw line, not the re-serialized record —
            // re-serialization might change field order.
            previous_hash = Some(hasher::hash_str(&line));
        }

        Ok(true)
    }

    /// Return the path to the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the hash of the last record in an existing log file.
    fn read_last_hash(path: &Path) -> Result<Option<String>, AuditError> {
        let file = File::open(path).map_err(|source| AuditError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let reader = BufReader::new(file);
        let mut last_line: Option<String> = None;

        for line in reader.lines() {
            let line = line?;
            if !line.trim().is_empty() {
                last_line = Some(line);
            }
        }

        Ok(last_line.map(|line| hasher::hash_str(&line)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::CallOutcome;
    use chrono::Duration;
    use tempfile::tempdir;

    fn test_record(run_id: Uuid, tool: &str) -> ToolCallRecord {
        ToolCallRecord::new(run_id, "evidence_collection", tool, "aws", "read")
    }

    #[test]
    fn append_and_read_round_trip() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("audit.jsonl");
        let run_id = Uuid::new_v4();

        // Write two records
        {
            let mut log = AuditLog::open(&log_path).unwrap();
            let mut r1 = test_record(run_id, "assurance.get_config_snapshot");
            let mut r2 = test_record(run_id, "assurance.query_audit_logs")
                .with_outcome(CallOutcome::Denied);
            log.append(&mut r1).unwrap();
            log.append(&mut r2).unwrap();
        }

        // Read them back
        let records = AuditLog::read_all(&log_path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].tool, "assurance.get_config_snapshot");
        assert_eq!(records[1].outcome, CallOutcome::Denied);
    }

    #[test]
    fn hash_chain_is_valid() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("audit.jsonl");

        {
            let mut log = AuditLog::open(&log_path).unwrap();
            for i in 0..5 {
                let mut record =
                    test_record(Uuid::new_v4(), &format!("assurance.tool_{}", i));
                log.append(&mut record).unwrap();
            }
        }

        // Chain verification should succeed
        assert!(AuditLog::verify_chain(&log_path).unwrap());
    }

    #[test]
    fn first_record_has_no_previous_hash() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("audit.jsonl");

        {
            let mut log = AuditLog::open(&log_path).unwrap();
            let mut record = test_record(Uuid::new_v4(), "assurance.detect_drift");
            log.append(&mut record).unwrap();
        }

        let records = AuditLog::read_all(&log_path).unwrap();
        assert!(records[0].previous_hash.is_none());
    }

    #[test]
    fn second_record_links_to_first() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("audit.jsonl");

        {
            let mut log = AuditLog::open(&log_path).unwrap();
            let mut r1 = test_record(Uuid::new_v4(), "assurance.detect_drift");
            let mut r2 = test_record(Uuid::new_v4(), "scap.run_scap_scan");
            log.append(&mut r1).unwrap();
            log.append(&mut r2).unwrap();
        }

        let records = AuditLog::read_all(&log_path).unwrap();
        assert!(records[1].previous_hash.is_some());
    }

    #[test]
    fn reopen_log_continues_chain() {
        // Closing and reopening the log must maintain the hash chain.
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("audit.jsonl");

        {
            let mut log = AuditLog::open(&log_path).unwrap();
            let mut record = test_record(Uuid::new_v4(), "assurance.detect_drift");
            log.append(&mut record).unwrap();
        }

        {
            let mut log = AuditLog::open(&log_path).unwrap();
            let mut record = test_record(Uuid::new_v4(), "scap.run_scap_scan");
            log.append(&mut record).unwrap();
        }

        assert!(AuditLog::verify_chain(&log_path).unwrap());
        assert_eq!(AuditLog::read_all(&log_path).unwrap().len(), 2);
    }

    #[test]
    fn tampered_line_breaks_the_chain() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("audit.jsonl");

        {
            let mut log = AuditLog::open(&log_path).unwrap();
            for _ in 0..3 {
                let mut record = test_record(Uuid::new_v4(), "assurance.detect_drift");
                log.append(&mut record).unwrap();
            }
        }

        // Rewrite the middle line with a modified provider.
        let content = std::fs::read_to_string(&log_path).unwrap();
        let mut lines: Vec<String> = content.lines().map(String::from).collect();
        lines[1] = lines[1].replace("\"aws\"", "\"gcp\"");
        std::fs::write(&log_path, lines.join("\n") + "\n").unwrap();

        match AuditLog::verify_chain(&log_path) {
            Err(AuditError::IntegrityViolation { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected IntegrityViolation, got {:?}", other),
        }
    }

    #[test]
    fn query_filters_by_run() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("audit.jsonl");
        let run_a = Uuid::new_v4();
        let run_b = Uuid::new_v4();

        {
            let mut log = AuditLog::open(&log_path).unwrap();
            for _ in 0..3 {
                log.append(&mut test_record(run_a, "assurance.detect_drift"))
                    .unwrap();
            }
            log.append(&mut test_record(run_b, "scap.run_scap_scan"))
                .unwrap();
        }

        let records = AuditLog::query(&log_path, &AuditFilter::for_run(run_a)).unwrap();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.run_id == run_a));
    }

    #[test]
    fn query_applies_time_bounds() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("audit.jsonl");
        let run_id = Uuid::new_v4();
        let now = Utc::now();

        {
            let mut log = AuditLog::open(&log_path).unwrap();
            let mut old = test_record(run_id, "assurance.detect_drift");
            old.started_at = now - Duration::hours(3);
            let mut recent = test_record(run_id, "scap.run_scap_scan");
            recent.started_at = now;
            log.append(&mut old).unwrap();
            log.append(&mut recent).unwrap();
        }

        let filter = AuditFilter {
            since: Some(now - Duration::hours(1)),
            ..AuditFilter::default()
        };
        let records = AuditLog::query(&log_path, &filter).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].tool, "scap.run_scap_scan");
    }

    #[test]
    fn query_paginates_after_filtering() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("audit.jsonl");
        let run_id = Uuid::new_v4();

        {
            let mut log = AuditLog::open(&log_path).unwrap();
            for i in 0..10 {
                log.append(&mut test_record(run_id, &format!("assurance.tool_{}", i)))
                    .unwrap();
            }
        }

        let page = AuditLog::query(&log_path, &AuditFilter::for_run(run_id).with_page(4, 3))
            .unwrap();
        assert_eq!(page.len(), 3);
        assert_eq!(page[0].tool, "assurance.tool_4");
        assert_eq!(page[2].tool, "assurance.tool_6");
    }
}

// idempotency.rs — Replay cache for write-class tool calls.
//
// A run that resumes after a suspension can re-issue the same ticket
// or POA&M creation. When the caller supplies an idempotency key, the
// router returns the cached first result instead of calling the
// provider again — one ticket, not two. Keys are scoped per run so two
// runs remediating the same control do not collide.
//
// The cache is in-memory and lives as long as the router. That is
// enough for resume-within-process; a restarted daemon replays against
// provider-side idempotency (tracker dedup keys) instead.

use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

#[derive(Debug, Clone)]
struct CachedCall {
    output: serde_json::Value,
    output_hash: String,
}

/// (run, key) → first successful result.
#[derive(Default)]
pub struct IdempotencyCache {
    entries: Mutex<HashMap<(Uuid, String), CachedCall>>,
}

impl IdempotencyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a previous result for this (run, key).
    pub fn get(&self, run_id: &Uuid, key: &str) -> Option<(serde_json::Value, String)> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .get(&(*run_id, key.to_string()))
            .map(|cached| (cached.output.clone(), cached.output_hash.clone()))
    }

    /// Record the first successful result for this (run, key). First
    /// write wins; a second put for the same key is ignored.
    pub fn put(&self, run_id: Uuid, key: impl Into<String>, output: serde_json::Value, output_hash: impl Into<String>) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.entry((run_id, key.into())).or_insert(CachedCall {
            output,
            output_hash: output_hash.into(),
        });
    }
}

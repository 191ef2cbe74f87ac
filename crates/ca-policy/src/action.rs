// action.rs — Action classification for tools.
//
// Every tool name resolves to exactly one action class. The class drives
// two policy behaviors downstream: which calls require human approval
// before execution (modify, by default) and which calls participate in
// idempotency deduplication (the write classes).

use serde::{Deserialize, Serialize};

/// What a tool call does, from the policy engine's point of view.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ToolAction {
    /// Config snapshots, asset inventory, audit-log queries.
    Read,
    /// Control rule evaluation.
    Evaluate,
    /// Evidence artifact storage.
    Store,
    /// POA&M items, tickets.
    Create,
    /// SCAP scans.
    Scan,
    /// Changes to existing external state (gated).
    Modify,
}

impl ToolAction {
    /// Write classes have external side effects and are deduplicated
    /// when the caller supplies an idempotency key.
    pub fn is_write(&self) -> bool {
        matches!(self, ToolAction::Store | ToolAction::Create | ToolAction::Modify)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolAction::Read => "read",
            ToolAction::Evaluate => "evaluate",
            ToolAction::Store => "store",
            ToolAction::Create => "create",
            ToolAction::Scan => "scan",
            ToolAction::Modify => "modify",
        }
    }
}

impl std::fmt::Display for ToolAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_classes_are_store_create_modify() {
        assert!(ToolAction::Store.is_write());
        assert!(ToolAction::Create.is_write());
        assert!(ToolAction::Modify.is_write());
        assert!(!ToolAction::Read.is_write());
        assert!(!ToolAction::Evaluate.is_write());
        assert!(!ToolAction::Scan.is_write());
    }

    #[test]
    fn serializes_as_snake_case() {
        let json = serde_json::to_string(&ToolAction::Evaluate).unwrap();
        assert_eq!(json, "\"evaluate\"");
        let restored: ToolAction = serde_json::from_str("\"modify\"").unwrap();
        assert_eq!(restored, ToolAction::Modify);
    }
}

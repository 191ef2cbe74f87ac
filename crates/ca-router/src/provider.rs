// provider.rs — ToolProvider trait and provider registry.
//
// A ToolProvider is one backend the router can dispatch to: a cloud
// account ("aws", "azure_gov"), a scanner, or a ticket tracker
// ("jira"). Providers take and return plain JSON so the router stays
// agnostic about each tool's payload; typed views live with the
// callers that need them.
//
// Generic over nothing and object-safe on purpose: the registry holds
// `Arc<dyn ToolProvider>` so stub and real backends mix freely.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Failures a backend can report for a single tool call.
///
/// These map onto router outcomes: `Timeout` becomes `TimedOut`,
/// everything else becomes `Failed`. None of them abort the router.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider {provider} unreachable: {detail}")]
    Unreachable { provider: String, detail: String },

    #[error("provider {provider} timed out after {elapsed_ms}ms")]
    Timeout { provider: String, elapsed_ms: u64 },

    #[error("bad request: {detail}")]
    BadRequest { detail: String },

    #[error("provider {provider} does not support tool {tool}")]
    NotSupported { provider: String, tool: String },
}

/// One backend that can execute canonical tool calls.
///
/// `call` receives the raw (unredacted) params — backends need real
/// credential references. Redaction applies only to what the router
/// records. The deadline is advisory: a provider that cannot enforce
/// it internally will still be cut off by the router's elapsed check.
pub trait ToolProvider: Send + Sync {
    /// Registry key, e.g. "aws" or "jira".
    fn name(&self) -> &str;

    /// Execute one tool call against this backend.
    fn call(
        &self,
        tool: &str,
        params: &serde_json::Value,
        deadline: Duration,
    ) -> Result<serde_json::Value, ProviderError>;
}

/// Name → provider lookup used by the router at dispatch time.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn ToolProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its own name. Re-registering a name
    /// replaces the previous backend.
    pub fn register(&mut self, provider: Arc<dyn ToolProvider>) {
        self.providers
            .insert(provider.name().to_string(), provider);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolProvider>> {
        self.providers.get(name).cloned()
    }

    /// Registered provider names, sorted for stable output.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }
}

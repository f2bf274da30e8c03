//! Per-host and aggregated task results (§3 "Result" / "Aggregated Result").

use serde_json::Value;

/// Per-host outcome of one task invocation.
#[derive(Debug, Clone)]
pub struct HostResult {
    pub host: String,
    pub task: String,
    pub failed: bool,
    pub exception: Option<String>,
    pub payload: Option<Value>,
    pub changed: bool,
    pub dry_run: Option<bool>,
}

impl HostResult {
    pub fn ok(host: impl Into<String>, task: impl Into<String>, payload: Value) -> Self {
        Self {
            host: host.into(),
            task: task.into(),
            failed: false,
            exception: None,
            payload: Some(payload),
            changed: false,
            dry_run: None,
        }
    }

    pub fn failed(host: impl Into<String>, task: impl Into<String>, exception: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            task: task.into(),
            failed: true,
            exception: Some(exception.into()),
            payload: None,
            changed: false,
            dry_run: None,
        }
    }

    pub fn with_changed(mut self, changed: bool) -> Self {
        self.changed = changed;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = Some(dry_run);
        self
    }
}

/// Host-keyed results for one task invocation. Iteration order equals the
/// candidate host list order, not completion order (§5).
pub type AggregatedResult = Vec<HostResult>;

/// Looks up a host's result within an aggregated result, by name.
pub fn result_for_host<'a>(aggregated: &'a AggregatedResult, host: &str) -> Option<&'a HostResult> {
    aggregated.iter().find(|r| r.host == host)
}

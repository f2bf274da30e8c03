//! # Processor Chain (C4)
//!
//! Observers invoked around every task's lifecycle. Exactly one processor —
//! the variable-resolving one — is load-bearing: it is the thing that turns
//! declared (possibly templated) task args into concrete per-host values,
//! via a deferred-template table keyed by `(task name, host name)` so a
//! template is rendered once per host invocation, not once per access.
//!
//! Grounded on `examples/supernovae-st-nika/src/runner.rs`'s event-callback
//! shape (`on_task_start`/`on_task_complete` invoked around DAG node
//! execution) generalized from single-context DAG events to per-host task
//! instance events, and on
//! `examples/original_source/tests/unit/vars/test_processors.py` for the
//! deferred-template-rendering contract and `supports_shush_hook` capability
//! flag (§4.4).

use std::sync::Mutex;

use dashmap::DashMap;
use serde_json::{Map, Value};

use crate::error::NornFlowError;
use crate::result::AggregatedResult;
use crate::vars::VariableStore;

/// Observer invoked at four points around a task's execution. Default
/// no-op bodies let a processor implement only what it needs.
pub trait Processor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Declares whether this processor understands the `shush` hook's
    /// suppression convention — queried by the Task Runner, never by `shush`
    /// itself (§4.4/§4.5).
    fn supports_shush_hook(&self) -> bool {
        false
    }

    /// Once per task, before any host fan-out begins.
    fn task_started(&self, _task_name: &str, _task_args: &Map<String, Value>) {}

    /// Once per host, before that host's task body runs.
    fn task_instance_started(&self, _task_name: &str, _host: &str) {}

    /// Once per host, after that host's task body returns (success or
    /// failure both reach here).
    fn task_instance_completed(&self, _task_name: &str, _host: &str, _failed: bool) {}

    /// Once per task, after every host's instance has completed.
    fn task_completed(&self, _task_name: &str, _aggregated: &AggregatedResult) {}
}

/// An ordered, append-only sequence of processors. Frozen at construction —
/// the Orchestrator builds one chain per run from the workflow's declared
/// `processors:` list plus the built-in variable-resolving processor, which
/// always runs first (§4.4).
pub struct ProcessorChain {
    processors: Vec<Box<dyn Processor>>,
}

impl ProcessorChain {
    /// Builds a chain with the variable-resolving processor first, followed
    /// by `extra` in declaration order.
    pub fn new(variable_resolver: VariableResolvingProcessor, extra: Vec<Box<dyn Processor>>) -> Self {
        let mut processors: Vec<Box<dyn Processor>> = vec![Box::new(variable_resolver)];
        processors.extend(extra);
        Self { processors }
    }

    pub fn any_supports_shush_hook(&self) -> bool {
        self.processors.iter().any(|p| p.supports_shush_hook())
    }

    pub fn task_started(&self, task_name: &str, task_args: &Map<String, Value>) {
        for p in &self.processors {
            p.task_started(task_name, task_args);
        }
    }

    pub fn task_instance_started(&self, task_name: &str, host: &str) {
        for p in &self.processors {
            p.task_instance_started(task_name, host);
        }
    }

    pub fn task_instance_completed(&self, task_name: &str, host: &str, failed: bool) {
        for p in &self.processors {
            p.task_instance_completed(task_name, host, failed);
        }
    }

    pub fn task_completed(&self, task_name: &str, aggregated: &AggregatedResult) {
        for p in &self.processors {
            p.task_completed(task_name, aggregated);
        }
    }
}

/// The always-first, built-in processor that renders a task's declared args
/// once per `(task, host)` pair and caches the result for the duration of
/// that host's instance, so task bodies and hooks referencing the same
/// rendered args don't re-render them.
pub struct VariableResolvingProcessor {
    store: std::sync::Arc<VariableStore>,
    /// Keyed by `"{task_name}\u{0}{host}"` — deferred-render cache.
    deferred: DashMap<String, Map<String, Value>>,
    /// Set while a `(task, host)` render is in flight, to catch accidental
    /// re-entrant resolution attempts during development/testing.
    in_flight: Mutex<()>,
}

fn deferred_key(task_name: &str, host: &str) -> String {
    format!("{task_name}\u{0}{host}")
}

impl VariableResolvingProcessor {
    pub fn new(store: std::sync::Arc<VariableStore>) -> Self {
        Self {
            store,
            deferred: DashMap::new(),
            in_flight: Mutex::new(()),
        }
    }

    /// Renders `args` against `host`'s device context and stores the result
    /// under `(task_name, host)`, ready for [`Self::resolve_deferred_params`].
    pub fn resolve_for_host(
        &self,
        task_name: &str,
        host: &str,
        args: &Map<String, Value>,
    ) -> Result<(), NornFlowError> {
        let _guard = self.in_flight.lock().unwrap();
        let rendered = self.store.resolve_data(&Value::Object(args.clone()), host)?;
        let Value::Object(rendered_map) = rendered else {
            unreachable!("render_data preserves the Object shape of its input");
        };
        self.deferred.insert(deferred_key(task_name, host), rendered_map);
        Ok(())
    }

    /// Retrieves the already-rendered args for `(task_name, host)`. Panics
    /// (a programmer error, not a runtime fault) if called before
    /// `resolve_for_host` — the Task Runner always calls the former first.
    pub fn resolve_deferred_params(&self, task_name: &str, host: &str) -> Map<String, Value> {
        self.deferred
            .get(&deferred_key(task_name, host))
            .unwrap_or_else(|| panic!("no deferred params resolved for task '{task_name}' host '{host}'"))
            .clone()
    }

    /// Drops the cached render for `(task_name, host)` once that host's
    /// instance has completed, bounding the cache to one task's lifetime.
    pub fn clear(&self, task_name: &str, host: &str) {
        self.deferred.remove(&deferred_key(task_name, host));
    }
}

impl Processor for VariableResolvingProcessor {
    fn name(&self) -> &'static str {
        "variable_resolver"
    }
}

/// Ambient second built-in processor: structured `tracing` events around
/// each task's lifecycle, and the one processor in this crate that declares
/// `supports_shush_hook`.
pub struct LoggingProcessor;

impl Processor for LoggingProcessor {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn supports_shush_hook(&self) -> bool {
        true
    }

    fn task_started(&self, task_name: &str, _task_args: &Map<String, Value>) {
        tracing::info!(task = task_name, "task started");
    }

    fn task_instance_started(&self, task_name: &str, host: &str) {
        tracing::debug!(task = task_name, host, "task instance started");
    }

    fn task_instance_completed(&self, task_name: &str, host: &str, failed: bool) {
        if failed {
            tracing::warn!(task = task_name, host, "task instance failed");
        } else {
            tracing::debug!(task = task_name, host, "task instance completed");
        }
    }

    fn task_completed(&self, task_name: &str, aggregated: &AggregatedResult) {
        let failures = aggregated.iter().filter(|r| r.failed).count();
        tracing::info!(task = task_name, hosts = aggregated.len(), failures, "task completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::Inventory;
    use crate::template::TemplateService;
    use serde_json::json;
    use std::sync::Arc;

    fn store() -> Arc<VariableStore> {
        let inv = Arc::new(Inventory::from_yaml("hosts:\n  r1: {}\n").unwrap());
        Arc::new(
            VariableStore::new(
                inv,
                Arc::new(TemplateService::new()),
                Default::default(),
                Default::default(),
                Default::default(),
                None,
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_resolve_for_host_then_read_back() {
        let vrp = VariableResolvingProcessor::new(store());
        let mut args = Map::new();
        args.insert("msg".into(), json!("hi {{ host.name }}"));

        vrp.resolve_for_host("echo", "r1", &args).unwrap();
        let resolved = vrp.resolve_deferred_params("echo", "r1");
        assert_eq!(resolved["msg"], json!("hi r1"));
    }

    #[test]
    fn test_clear_removes_cached_render() {
        let vrp = VariableResolvingProcessor::new(store());
        vrp.resolve_for_host("echo", "r1", &Map::new()).unwrap();
        vrp.clear("echo", "r1");
        assert!(vrp.deferred.get(&deferred_key("echo", "r1")).is_none());
    }

    #[test]
    fn test_chain_runs_variable_resolver_first() {
        let chain = ProcessorChain::new(VariableResolvingProcessor::new(store()), vec![Box::new(LoggingProcessor)]);
        assert_eq!(chain.processors[0].name(), "variable_resolver");
        assert_eq!(chain.processors[1].name(), "logging");
    }

    #[test]
    fn test_logging_processor_supports_shush() {
        let chain = ProcessorChain::new(VariableResolvingProcessor::new(store()), vec![Box::new(LoggingProcessor)]);
        assert!(chain.any_supports_shush_hook());
    }

    #[test]
    fn test_chain_without_logging_does_not_support_shush() {
        let chain = ProcessorChain::new(VariableResolvingProcessor::new(store()), vec![]);
        assert!(!chain.any_supports_shush_hook());
    }
}

//! # Task Runner (C6)
//!
//! Runs one task across its candidate hosts concurrently, while keeping
//! tasks themselves strictly sequential — the Orchestrator drives task
//! order; this module only ever fans a *single* task out across hosts.
//!
//! Grounded on `examples/supernovae-st-nika/src/runner/core.rs`'s bounded
//! concurrency idiom (`tokio::sync::Semaphore` gating a `tokio::task::JoinSet`)
//! generalized from "N DAG nodes, shared context" to "N hosts, one task,
//! isolated per-host views," and on `examples/supernovae-st-nika/src/limits.rs`
//! for the `ResourceLimits`-driven cap on in-flight host instances.

use std::sync::Arc;

use serde_json::Map;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::NornFlowError;
use crate::hooks::{HookEnv, HookInstance};
use crate::host_runner::HostRunner;
use crate::inventory::Inventory;
use crate::processor::{ProcessorChain, VariableResolvingProcessor};
use crate::result::{AggregatedResult, HostResult};
use crate::task_catalog::{TaskCatalog, TaskContext};
use crate::vars::VariableStore;
use crate::workflow::TaskEntry;

/// Runs a single task across a set of candidate hosts, honoring that task's
/// pre/post hooks and a shared cooperative-cancellation token.
pub struct TaskRunner {
    pub catalog: Arc<TaskCatalog>,
    pub variable_resolver: Arc<VariableResolvingProcessor>,
    pub processors: Arc<ProcessorChain>,
    pub store: Arc<VariableStore>,
    pub inventory: Arc<Inventory>,
    pub host_runner: Arc<dyn HostRunner>,
    pub worker_cap: usize,
    pub dry_run: bool,
}

impl TaskRunner {
    /// Fan-out algorithm (§4.6):
    /// 1. `task_started` fires on the processor chain.
    /// 2. Run-once-per-task pre-hooks (`shush`) get their `task_started` call.
    /// 3. Host-filtering pre-hooks narrow the candidate list in declaration order.
    /// 4. Remaining hosts run concurrently, bounded by `worker_cap`.
    /// 5. `task_completed` fires on the processor chain with the aggregated result.
    /// 6. Result-processing post-hooks (`set_to`) run against the aggregated result.
    /// 7. Run-once-per-task hooks get their `task_completed` call.
    pub async fn run_task(
        &self,
        task: &TaskEntry,
        candidate_hosts: &[String],
        pre_hooks: &[HookInstance],
        post_hooks: &[HookInstance],
        cancel: &CancellationToken,
    ) -> Result<AggregatedResult, NornFlowError> {
        if cancel.is_cancelled() {
            return Err(NornFlowError::Cancellation);
        }

        self.processors.task_started(&task.name, &task.args);

        let env = HookEnv {
            store: &self.store,
            inventory: &self.inventory,
            any_processor_supports_shush: self.processors.any_supports_shush_hook(),
        };

        for hook in pre_hooks.iter().filter(|h| h.run_once_per_task()) {
            hook.task_started(&task.name, &env)?;
        }

        let mut hosts = candidate_hosts.to_vec();
        for hook in pre_hooks.iter().filter(|h| h.capabilities().filters_hosts) {
            hosts = hook.filter_hosts(&hosts, &env);
        }

        let aggregated = self.fan_out(task, &hosts, cancel).await?;

        self.processors.task_completed(&task.name, &aggregated);

        for hook in post_hooks.iter().filter(|h| h.capabilities().processes_results) {
            hook.process_results(&aggregated, &env)?;
        }

        for hook in pre_hooks
            .iter()
            .chain(post_hooks.iter())
            .filter(|h| h.run_once_per_task())
        {
            hook.task_completed(&task.name, &env);
        }

        Ok(aggregated)
    }

    async fn fan_out(
        &self,
        task: &TaskEntry,
        hosts: &[String],
        cancel: &CancellationToken,
    ) -> Result<AggregatedResult, NornFlowError> {
        let semaphore = Arc::new(Semaphore::new(self.worker_cap.max(1)));
        let mut joinset: JoinSet<(usize, HostResult)> = JoinSet::new();

        for (idx, host) in hosts.iter().cloned().enumerate() {
            let permit = semaphore.clone();
            let catalog = self.catalog.clone();
            let variable_resolver = self.variable_resolver.clone();
            let processors = self.processors.clone();
            let store = self.store.clone();
            let host_runner = self.host_runner.clone();
            let task_name = task.name.clone();
            let task_args = task.args.clone();
            let dry_run = self.dry_run;
            let cancel = cancel.clone();

            joinset.spawn(async move {
                let _permit = permit.acquire_owned().await.expect("semaphore never closed");
                let result = run_one_host(
                    &task_name,
                    &task_args,
                    &host,
                    dry_run,
                    &catalog,
                    &variable_resolver,
                    &processors,
                    &store,
                    host_runner.as_ref(),
                    &cancel,
                )
                .await;
                (idx, result)
            });
        }

        let mut slots: Vec<Option<HostResult>> = (0..hosts.len()).map(|_| None).collect();
        while let Some(joined) = joinset.join_next().await {
            let (idx, result) = joined.map_err(|e| NornFlowError::HostRunner {
                host: task.name.clone(),
                message: format!("task instance panicked: {e}"),
            })?;
            slots[idx] = Some(result);
        }

        Ok(slots.into_iter().flatten().collect())
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_one_host(
    task_name: &str,
    task_args: &Map<String, serde_json::Value>,
    host: &str,
    dry_run: bool,
    catalog: &TaskCatalog,
    variable_resolver: &VariableResolvingProcessor,
    processors: &ProcessorChain,
    store: &Arc<VariableStore>,
    _host_runner: &dyn HostRunner,
    cancel: &CancellationToken,
) -> HostResult {
    if cancel.is_cancelled() {
        return HostResult::failed(host, task_name, "run cancelled");
    }

    processors.task_instance_started(task_name, host);

    let render_result = variable_resolver.resolve_for_host(task_name, host, task_args);
    let outcome = match render_result {
        Err(e) => Err(e.to_string()),
        Ok(()) => {
            let rendered_args = variable_resolver.resolve_deferred_params(task_name, host);
            match catalog.get(task_name) {
                Some(task) => {
                    let ctx = TaskContext {
                        host: host.to_string(),
                        dry_run,
                        store: store.clone(),
                    };
                    task.run(&rendered_args, &ctx)
                }
                None => Err(format!("task not found: '{task_name}'")),
            }
        }
    };
    variable_resolver.clear(task_name, host);

    let result = match outcome {
        Ok(payload) => {
            let changed = payload.get("changed").and_then(serde_json::Value::as_bool).unwrap_or(false);
            HostResult::ok(host, task_name, payload)
                .with_dry_run(dry_run)
                .with_changed(changed)
        }
        Err(message) => HostResult::failed(host, task_name, message),
    };

    processors.task_instance_completed(task_name, host, result.failed);
    result
}

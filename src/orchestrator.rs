//! # Workflow Orchestrator (C7)
//!
//! Owns a loaded workflow's lifecycle end-to-end: eager load-time
//! validation (every task/hook name must resolve against the catalogs
//! before a single task runs), inventory filtering, processor-chain and
//! hook-instance construction, sequential task iteration, and
//! `failure_strategy` enforcement between tasks.
//!
//! Grounded on `examples/supernovae-st-nika/src/runner/core.rs`'s
//! validate-then-execute split (the teacher rejects a malformed DAG before
//! running any node) generalized from DAG validation to task/hook catalog
//! resolution, and on `examples/original_source/nornflow/nornflow.py` for
//! the eager "resolve every task and hook name before running anything"
//! discipline and per-task summary reporting shape.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::error::NornFlowError;
use crate::hooks::{HookInstance, HookRegistry};
use crate::host_runner::HostRunner;
use crate::inventory::Inventory;
use crate::processor::{LoggingProcessor, Processor, ProcessorChain, VariableResolvingProcessor};
use crate::result::AggregatedResult;
use crate::runner::TaskRunner;
use crate::task_catalog::TaskCatalog;
use crate::vars::VariableStore;
use crate::workflow::{FailureStrategy, TaskEntry, Workflow};

/// Per-task outcome surfaced to the CLI layer.
pub struct TaskSummary {
    pub task: TaskEntry,
    pub aggregated: AggregatedResult,
    /// True if this task never ran because an earlier task failed under
    /// `stop_on_first_error`, or a cancellation fired before its turn (§4.7).
    pub skipped: bool,
}

/// Outcome of a full workflow run.
pub struct RunSummary {
    pub workflow_name: String,
    pub task_summaries: Vec<TaskSummary>,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn any_failures(&self) -> bool {
        self.task_summaries
            .iter()
            .any(|s| s.aggregated.iter().any(|r| r.failed))
    }
}

/// Validates and runs one [`Workflow`] against an [`Inventory`].
pub struct Orchestrator {
    workflow: Workflow,
    inventory: Arc<Inventory>,
    task_catalog: Arc<TaskCatalog>,
    hook_registry: HookRegistry,
    store: Arc<VariableStore>,
    host_runner: Arc<dyn HostRunner>,
    worker_cap: usize,
    dry_run_override: Option<bool>,
}

impl Orchestrator {
    pub fn new(
        workflow: Workflow,
        inventory: Arc<Inventory>,
        task_catalog: Arc<TaskCatalog>,
        hook_registry: HookRegistry,
        store: Arc<VariableStore>,
        host_runner: Arc<dyn HostRunner>,
        worker_cap: usize,
    ) -> Self {
        Self {
            workflow,
            inventory,
            task_catalog,
            hook_registry,
            store,
            host_runner,
            worker_cap,
            dry_run_override: None,
        }
    }

    pub fn with_dry_run_override(mut self, dry_run: bool) -> Self {
        self.dry_run_override = Some(dry_run);
        self
    }

    /// Eagerly resolves every task name and every hook name declared in the
    /// workflow against the catalogs, and validates each hook's parameter.
    /// Fatal on the first unresolved name — no task runs otherwise (§4.7).
    pub fn validate(&self) -> Result<(), NornFlowError> {
        for entry in &self.workflow.tasks {
            if !self.task_catalog.is_known(&entry.name) {
                return Err(NornFlowError::TaskNotFound(entry.name.clone()));
            }
            for (hook_name, param) in &entry.hooks {
                self.hook_registry.instantiate(hook_name, param.clone())?;
            }
        }
        Ok(())
    }

    fn dry_run(&self) -> bool {
        self.dry_run_override.unwrap_or(self.workflow.dry_run)
    }

    fn candidate_hosts(&self) -> Vec<String> {
        self.inventory.filtered_host_names_with_extra(
            &self.workflow.inventory_filters.hosts,
            &self.workflow.inventory_filters.groups,
            &self.workflow.inventory_filters.extra,
        )
    }

    fn build_processor_chain(&self) -> (Arc<ProcessorChain>, Arc<VariableResolvingProcessor>) {
        let mut extra: Vec<Box<dyn Processor>> = Vec::new();
        for decl in &self.workflow.processors {
            if decl.class == "logging" {
                extra.push(Box::new(LoggingProcessor));
            }
            // Unknown processor classes are intentionally ignored rather
            // than fatal: a declared processor a deployment hasn't wired a
            // constructor for yet shouldn't block every other workflow.
        }
        let variable_resolver = Arc::new(VariableResolvingProcessor::new(self.store.clone()));
        let chain_resolver = VariableResolvingProcessor::new(self.store.clone());
        (Arc::new(ProcessorChain::new(chain_resolver, extra)), variable_resolver)
    }

    fn split_hooks(&self, entry: &TaskEntry) -> Result<(Vec<HookInstance>, Vec<HookInstance>), NornFlowError> {
        let mut pre = Vec::new();
        let mut post = Vec::new();
        for (hook_name, param) in &entry.hooks {
            let instance = self.hook_registry.instantiate(hook_name, param.clone())?;
            if instance.capabilities().processes_results {
                post.push(instance);
            } else {
                pre.push(instance);
            }
        }
        Ok((pre, post))
    }

    /// Runs the workflow end to end: validates, then runs each task in
    /// declared order, stopping early under `StopOnFirstError` if any host
    /// failed, or a cooperative cancellation fires.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<RunSummary, NornFlowError> {
        self.validate()?;

        let hosts = self.candidate_hosts();
        let (processors, variable_resolver) = self.build_processor_chain();

        let task_runner = TaskRunner {
            catalog: self.task_catalog.clone(),
            variable_resolver,
            processors,
            store: self.store.clone(),
            inventory: self.inventory.clone(),
            host_runner: self.host_runner.clone(),
            worker_cap: self.worker_cap,
            dry_run: self.dry_run(),
        };

        let mut task_summaries = Vec::with_capacity(self.workflow.tasks.len());
        let mut cancelled = false;

        for (idx, entry) in self.workflow.tasks.iter().enumerate() {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let (pre_hooks, post_hooks) = self.split_hooks(entry)?;
            let aggregated = task_runner
                .run_task(entry, &hosts, &pre_hooks, &post_hooks, cancel)
                .await?;

            let any_failed = aggregated.iter().any(|r| r.failed);
            task_summaries.push(TaskSummary {
                task: entry.clone(),
                aggregated,
                skipped: false,
            });

            if any_failed && self.workflow.failure_strategy == FailureStrategy::StopOnFirstError {
                self.push_skipped(&mut task_summaries, idx + 1);
                break;
            }
        }

        if cancelled {
            let start_idx = task_summaries.len();
            self.push_skipped(&mut task_summaries, start_idx);
        }

        Ok(RunSummary {
            workflow_name: self.workflow.name.clone(),
            task_summaries,
            cancelled,
        })
    }

    /// Records every task from `start_idx` onward as skipped, so the summary
    /// reflects tasks that never ran (§4.7, S6).
    fn push_skipped(&self, task_summaries: &mut Vec<TaskSummary>, start_idx: usize) {
        for entry in &self.workflow.tasks[start_idx..] {
            task_summaries.push(TaskSummary {
                task: entry.clone(),
                aggregated: Vec::new(),
                skipped: true,
            });
        }
    }

    /// Read-only accessor for the CLI's `list-tasks`/`validate` subcommands.
    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }
}

/// Builds a default [`VariableStore`] from the layered sources the CLI
/// gathers (cli vars, environment vars, workflow-declared vars, domain
/// defaults dir) plus the resolved inventory.
pub fn build_store(
    inventory: Arc<Inventory>,
    templates: Arc<crate::template::TemplateService>,
    cli_vars: Map<String, Value>,
    environment: Map<String, Value>,
    workflow_vars: Map<String, Value>,
    domain_defaults_dir: Option<&std::path::Path>,
) -> Result<Arc<VariableStore>, NornFlowError> {
    Ok(Arc::new(VariableStore::new(
        inventory,
        templates,
        cli_vars,
        environment,
        workflow_vars,
        domain_defaults_dir,
    )?))
}

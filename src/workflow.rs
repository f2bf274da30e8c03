//! # Workflow Model
//!
//! Types for the `workflow:` YAML schema from §6. Deserializes to a
//! validated, load-time-checked `Workflow` that the Orchestrator drives.
//!
//! Grounded on `examples/supernovae-st-nika/src/workflow.rs`'s struct/enum
//! layout and serde attribute idiom, generalized from the teacher's
//! agent/task/flow DAG schema to NornFlow's sequential task-list schema; and
//! on `examples/original_source/nornflow/models/workflow.py` for the
//! `failure_strategy` case-insensitive parsing and `inventory_filters` shape.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::NornFlowError;

/// Orchestrator policy on per-host failure within a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureStrategy {
    #[default]
    StopOnFirstError,
    ContinueOnError,
}

impl FailureStrategy {
    /// Parses case-insensitively; unknown strings fail per §4.7.
    pub fn parse(s: &str) -> Result<Self, NornFlowError> {
        match s.to_ascii_lowercase().as_str() {
            "stop_on_first_error" => Ok(Self::StopOnFirstError),
            "continue_on_error" => Ok(Self::ContinueOnError),
            other => Err(NornFlowError::Load(format!(
                "unknown failure_strategy: '{other}'"
            ))),
        }
    }
}

/// `hosts`/`groups` are the named filters; anything else under
/// `inventory_filters` is a free-form host-data match (§6) — `#[serde(flatten)]`
/// into `extra` rather than `deny_unknown_fields` since those keys are
/// deployment-specific, not a fixed schema.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InventoryFilters {
    pub hosts: Vec<String>,
    pub groups: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessorDecl {
    pub class: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

/// A task entry as declared in YAML, before ordinal-id assignment.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct TaskEntryDecl {
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
    #[serde(default)]
    pub hooks: Map<String, Value>,
}

/// One item in a workflow's task list, after load-time ordinal assignment.
#[derive(Debug, Clone)]
pub struct TaskEntry {
    /// Strictly increasing in workflow order, assigned at load.
    pub id: usize,
    pub name: String,
    pub args: Map<String, Value>,
    pub hooks: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct WorkflowDoc {
    name: String,
    description: Option<String>,
    #[serde(default)]
    inventory_filters: InventoryFilters,
    #[serde(default)]
    processors: Vec<ProcessorDecl>,
    #[serde(default)]
    vars: Map<String, Value>,
    #[serde(default)]
    dry_run: bool,
    failure_strategy: Option<String>,
    tasks: Vec<TaskEntryDecl>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct WorkflowFile {
    workflow: WorkflowDoc,
}

/// A fully validated (load-time) workflow, ready for the Orchestrator.
#[derive(Debug, Clone)]
pub struct Workflow {
    pub name: String,
    pub description: Option<String>,
    pub inventory_filters: InventoryFilters,
    pub processors: Vec<ProcessorDecl>,
    pub vars: Map<String, Value>,
    pub dry_run: bool,
    pub failure_strategy: FailureStrategy,
    pub tasks: Vec<TaskEntry>,
}

impl Workflow {
    /// Parses and assigns ordinal task ids; does NOT resolve task/hook names
    /// against any catalog — that cross-cutting check lives in the
    /// Orchestrator, which owns both registries.
    pub fn from_yaml(text: &str) -> Result<Self, NornFlowError> {
        let file: WorkflowFile = serde_yaml::from_str(text)?;
        let doc = file.workflow;

        if doc.name.trim().is_empty() {
            return Err(NornFlowError::Load("workflow name must not be empty".into()));
        }

        let failure_strategy = match doc.failure_strategy {
            Some(s) => FailureStrategy::parse(&s)?,
            None => FailureStrategy::default(),
        };

        let tasks = doc
            .tasks
            .into_iter()
            .enumerate()
            .map(|(id, t)| TaskEntry {
                id,
                name: t.name,
                args: t.args,
                hooks: t.hooks,
            })
            .collect();

        Ok(Self {
            name: doc.name,
            description: doc.description,
            inventory_filters: doc.inventory_filters,
            processors: doc.processors,
            vars: doc.vars,
            dry_run: doc.dry_run,
            failure_strategy,
            tasks,
        })
    }
}

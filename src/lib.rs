//! # NornFlow
//!
//! A workflow engine for running declarative task sequences against a fleet
//! of network devices.
//!
//! ## Overview
//!
//! A workflow is a YAML document naming an ordered list of tasks; each task
//! runs once per selected host, concurrently across hosts but strictly in
//! order across tasks. Task arguments and hook parameters are Jinja2-style
//! templates, rendered against a layered variable store with deterministic
//! precedence (runtime > CLI > environment > workflow > domain defaults),
//! plus a per-host `host` namespace.
//!
//! ## Modules
//!
//! - [`template`] — the Jinja2-equivalent template service (C1)
//! - [`vars`] — the layered, per-host variable store (C2) and host proxy (C3)
//! - [`processor`] — the processor chain driving deferred template resolution (C4)
//! - [`hooks`] — the hook registry and built-in hooks (C5)
//! - [`runner`] — the per-task, per-host concurrent fan-out (C6)
//! - [`orchestrator`] — the whole-workflow driver (C7)
//! - [`inventory`] — the host/group fleet model (C8)
//! - [`task_catalog`] — the registry of runnable task bodies (C9)
//! - [`host_runner`] — the device-connection seam (C10)
//! - [`config`] — engine-wide configuration
//! - [`limits`] — resource limits, rate limiting, circuit breaking
//! - [`error`] — the `NornFlowError` taxonomy

pub mod config;
pub mod error;
pub mod host_runner;
pub mod hooks;
pub mod inventory;
pub mod limits;
pub mod orchestrator;
pub mod processor;
pub mod result;
pub mod runner;
pub mod task_catalog;
pub mod template;
pub mod vars;
pub mod workflow;

pub use config::EngineConfig;
pub use error::{FixSuggestion, NornFlowError};
pub use hooks::{HookCapabilities, HookInstance, HookRegistry};
pub use host_runner::{HostRunner, MockHostRunner};
pub use inventory::{Host, Inventory};
pub use orchestrator::{Orchestrator, RunSummary, TaskSummary};
pub use processor::{LoggingProcessor, Processor, ProcessorChain, VariableResolvingProcessor};
pub use result::{AggregatedResult, HostResult};
pub use runner::TaskRunner;
pub use task_catalog::{Task, TaskCatalog, TaskContext};
pub use template::TemplateService;
pub use vars::{HostProxy, VariableStore};
pub use workflow::{FailureStrategy, TaskEntry, Workflow};

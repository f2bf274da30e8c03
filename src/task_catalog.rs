//! # Task Catalog (C9, ambient)
//!
//! The registry of runnable task bodies, plus the three built-ins every
//! NornFlow install ships: `set` (variable assignment), `echo` (smoke-test
//! task), and `write_file` (the one built-in with a real, observable side
//! effect, hence the only one with dry-run reporting).
//!
//! Grounded on `examples/original_source/nornflow/builtins/tasks.py` for the
//! three built-ins' argument names and behavior, and on
//! `examples/supernovae-st-nika/src/task.rs`'s `TaskAction` trait shape
//! (a small, synchronous, object-safe trait invoked from the async runner)
//! generalized from single-context task actions to per-host task bodies.

use std::collections::HashMap;
use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::vars::VariableStore;

/// Per-invocation context a task body runs with. One instance per
/// `(task, host)` pair.
pub struct TaskContext {
    pub host: String,
    pub dry_run: bool,
    pub store: Arc<VariableStore>,
}

/// A task body's outcome: a JSON payload on success, a human-readable
/// message on failure. The Task Runner wraps either into a [`crate::result::HostResult`].
pub type TaskOutcome = Result<Value, String>;

/// A runnable task body. Deliberately synchronous and object-safe — device
/// I/O goes through [`crate::host_runner::HostRunner`], not through tasks
/// directly, so task bodies never need to be `async fn` in a trait.
pub trait Task: Send + Sync {
    fn name(&self) -> &'static str;
    fn run(&self, args: &Map<String, Value>, ctx: &TaskContext) -> TaskOutcome;
}

/// The registry of known task names, resolved against a workflow's task
/// list at load time (unknown names fail fast with `TaskNotFound`).
pub struct TaskCatalog {
    tasks: HashMap<&'static str, Arc<dyn Task>>,
}

impl Default for TaskCatalog {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl TaskCatalog {
    pub fn with_builtins() -> Self {
        let mut tasks: HashMap<&'static str, Arc<dyn Task>> = HashMap::new();
        tasks.insert("set", Arc::new(SetTask));
        tasks.insert("echo", Arc::new(EchoTask));
        tasks.insert("write_file", Arc::new(WriteFileTask));
        Self { tasks }
    }

    pub fn empty() -> Self {
        Self {
            tasks: HashMap::new(),
        }
    }

    pub fn register(&mut self, task: Arc<dyn Task>) {
        self.tasks.insert(task.name(), task);
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Task>> {
        self.tasks.get(name).cloned()
    }
}

/// `set`: writes each keyword argument into the runtime variable layer for
/// the current host, and returns the set of values it wrote — this is *not*
/// the `set_to` hook (which writes a task's *result* to one named variable);
/// `set` is the task whose whole purpose is assigning variables directly.
pub struct SetTask;

impl Task for SetTask {
    fn name(&self) -> &'static str {
        "set"
    }

    fn run(&self, args: &Map<String, Value>, ctx: &TaskContext) -> TaskOutcome {
        if args.is_empty() {
            return Ok(json!("No variables were set (no arguments provided to 'set' task)"));
        }

        for (k, v) in args {
            ctx.store.set_runtime(k, v.clone(), &ctx.host);
        }

        let mut report = format!("Set {} variable(s) for host '{}':", args.len(), ctx.host);
        for (k, v) in args {
            report.push_str(&format!("\n  \u{2022} {k} = {}", format_value_for_display(v)));
        }
        Ok(Value::String(report))
    }
}

/// Mirrors the original's display rules: strings get quotes, objects/arrays
/// get pretty-printed JSON, everything else uses its default `Display`.
fn format_value_for_display(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{s}\""),
        Value::Object(_) | Value::Array(_) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        other => other.to_string(),
    }
}

/// `echo`: returns its `msg` argument verbatim. Used in examples and tests
/// as the simplest possible task body.
pub struct EchoTask;

impl Task for EchoTask {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn run(&self, args: &Map<String, Value>, _ctx: &TaskContext) -> TaskOutcome {
        match args.get("msg") {
            Some(msg) => Ok(msg.clone()),
            None => Err("echo requires a 'msg' argument".to_string()),
        }
    }
}

/// `write_file`: writes (or appends) `content` to `filename`, creating
/// parent directories as needed. Under dry-run, simulates the operation and
/// reports what it would have done instead of touching the filesystem.
pub struct WriteFileTask;

impl Task for WriteFileTask {
    fn name(&self) -> &'static str {
        "write_file"
    }

    fn run(&self, args: &Map<String, Value>, ctx: &TaskContext) -> TaskOutcome {
        let filename = args
            .get("filename")
            .and_then(Value::as_str)
            .ok_or_else(|| "write_file requires a 'filename' string argument".to_string())?;
        let content = args
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| "write_file requires a 'content' string argument".to_string())?;
        let append = args.get("append").and_then(Value::as_bool).unwrap_or(false);
        let operation = if append { "append" } else { "write" };

        let path = Path::new(filename);
        let would_create_dirs = path
            .parent()
            .map(|p| !p.as_os_str().is_empty() && !p.exists())
            .unwrap_or(false);

        if ctx.dry_run {
            return Ok(json!({
                "operation": operation,
                "filename": filename,
                "would_create_dirs": would_create_dirs,
                "content_size_bytes": content.len(),
                "dry_run": true,
                "changed": true,
            }));
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
            }
        }

        if append {
            let mut f = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| e.to_string())?;
            f.write_all(content.as_bytes()).map_err(|e| e.to_string())?;
        } else {
            std::fs::write(path, content).map_err(|e| e.to_string())?;
        }

        Ok(json!({
            "operation": operation,
            "filename": filename,
            "content_size_bytes": content.len(),
            "changed": true,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::Inventory;
    use crate::template::TemplateService;
    use tempfile::tempdir;

    fn ctx(host: &str, dry_run: bool) -> TaskContext {
        let inv = Arc::new(Inventory::from_yaml(&format!("hosts:\n  {host}: {{}}\n")).unwrap());
        let store = Arc::new(
            VariableStore::new(
                inv,
                Arc::new(TemplateService::new()),
                Default::default(),
                Default::default(),
                Default::default(),
                None,
            )
            .unwrap(),
        );
        TaskContext {
            host: host.to_string(),
            dry_run,
            store,
        }
    }

    #[test]
    fn test_catalog_has_builtins() {
        let catalog = TaskCatalog::with_builtins();
        assert!(catalog.is_known("set"));
        assert!(catalog.is_known("echo"));
        assert!(catalog.is_known("write_file"));
        assert!(!catalog.is_known("nonexistent"));
    }

    #[test]
    fn test_echo_returns_msg() {
        let c = ctx("r1", false);
        let mut args = Map::new();
        args.insert("msg".into(), json!("hello"));
        assert_eq!(EchoTask.run(&args, &c).unwrap(), json!("hello"));
    }

    #[test]
    fn test_echo_requires_msg() {
        let c = ctx("r1", false);
        assert!(EchoTask.run(&Map::new(), &c).is_err());
    }

    #[test]
    fn test_set_writes_runtime_vars_for_current_host() {
        let c = ctx("r1", false);
        let mut args = Map::new();
        args.insert("backup".into(), json!("cfg-data"));
        SetTask.run(&args, &c).unwrap();
        assert_eq!(c.store.get("backup", "r1"), Some(json!("cfg-data")));
    }

    #[test]
    fn test_set_returns_human_readable_report() {
        let c = ctx("r1", false);
        let mut args = Map::new();
        args.insert("backup".into(), json!("cfg-data"));
        let report = SetTask.run(&args, &c).unwrap();
        let report = report.as_str().unwrap();
        assert!(report.contains("Set 1 variable(s) for host 'r1'"));
        assert!(report.contains("backup = \"cfg-data\""));
    }

    #[test]
    fn test_set_with_no_args_reports_nothing_set() {
        let c = ctx("r1", false);
        let report = SetTask.run(&Map::new(), &c).unwrap();
        assert_eq!(report, json!("No variables were set (no arguments provided to 'set' task)"));
    }

    #[test]
    fn test_write_file_dry_run_reports_without_touching_disk() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("nested").join("out.txt");
        let c = ctx("r1", true);
        let mut args = Map::new();
        args.insert("filename".into(), json!(target.to_str().unwrap()));
        args.insert("content".into(), json!("hello world"));

        let result = WriteFileTask.run(&args, &c).unwrap();
        assert_eq!(result["operation"], json!("write"));
        assert_eq!(result["would_create_dirs"], json!(true));
        assert_eq!(result["content_size_bytes"], json!(11));
        assert_eq!(result["changed"], json!(true));
        assert!(!target.exists());
    }

    #[test]
    fn test_write_file_real_write_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("nested").join("out.txt");
        let c = ctx("r1", false);
        let mut args = Map::new();
        args.insert("filename".into(), json!(target.to_str().unwrap()));
        args.insert("content".into(), json!("hello world"));

        let result = WriteFileTask.run(&args, &c).unwrap();
        assert_eq!(result["changed"], json!(true));
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "hello world");
    }

    #[test]
    fn test_write_file_append_mode() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("out.txt");
        std::fs::write(&target, "first\n").unwrap();
        let c = ctx("r1", false);
        let mut args = Map::new();
        args.insert("filename".into(), json!(target.to_str().unwrap()));
        args.insert("content".into(), json!("second\n"));
        args.insert("append".into(), json!(true));

        WriteFileTask.run(&args, &c).unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn test_write_file_missing_fields_fails() {
        let c = ctx("r1", false);
        assert!(WriteFileTask.run(&Map::new(), &c).is_err());
    }
}

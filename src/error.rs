//! # NornFlow Error Module
//!
//! Unified error handling with fix suggestions for the NornFlow CLI and engine.
//!
//! ## Design Philosophy
//!
//! The kernel (variable resolution, template rendering, task scheduling) and the
//! CLI/ambient stack share one error taxonomy. Per-host failures never bubble up
//! as exceptions — they are captured as `Failed` results (see [`crate::runner`]).
//! Only load-time validation failures and truly fatal conditions reach this type.
//!
//! ```rust,ignore
//! use nornflow::error::{NornFlowError, FixSuggestion};
//!
//! fn handle_error(err: NornFlowError) {
//!     eprintln!("Error: {}", err);
//!     if let Some(suggestion) = err.fix_suggestion() {
//!         eprintln!("  Fix: {}", suggestion);
//!     }
//! }
//! ```

use thiserror::Error;

/// Trait for errors that can provide a fix suggestion.
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// Top-level error type for the NornFlow engine and CLI.
///
/// Variant names track the error taxonomy kinds named in the specification,
/// not the implementation strategy behind them.
#[derive(Error, Debug)]
pub enum NornFlowError {
    /// Workflow schema invalid, unknown task/hook name, unknown failure strategy.
    /// Fatal; surfaced before any task runs.
    #[error("load error: {0}")]
    Load(String),

    /// Template syntax error (compile-time).
    #[error("template validation error in {source_preview:?}: {message}")]
    TemplateValidation {
        source_preview: String,
        message: String,
    },

    /// Template evaluation error (undefined name, runtime fault).
    #[error("template error in {source_preview:?}: {message}")]
    Template {
        source_preview: String,
        message: String,
    },

    /// No entry in the task catalog. Fatal for the workflow.
    #[error("task not found: '{0}'")]
    TaskNotFound(String),

    /// Hook parameter rejected at load.
    #[error("hook '{hook_name}' rejected: {message}")]
    HookValidation { hook_name: String, message: String },

    /// I/O / device error. Per-host failed result; not normally propagated here,
    /// but kept as a variant for cases the host runner itself cannot recover from.
    #[error("host runner error on '{host}': {message}")]
    HostRunner { host: String, message: String },

    /// Cooperative cancellation between tasks.
    #[error("run cancelled")]
    Cancellation,

    /// YAML parsing error.
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO error (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FixSuggestion for NornFlowError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            NornFlowError::Load(_) => {
                Some("Check the workflow YAML against the schema in the docs")
            }
            NornFlowError::TemplateValidation { .. } => {
                Some("Check template syntax: balanced {{ }}, {% %}, {# #} markers")
            }
            NornFlowError::Template { .. } => {
                Some("Every name referenced in a template must be defined in vars, CLI, environment, domain defaults, or host data")
            }
            NornFlowError::TaskNotFound(_) => {
                Some("Run `nornflow list-tasks` to see available task names")
            }
            NornFlowError::HookValidation { .. } => {
                Some("Check the hook's parameter shape against its documentation")
            }
            NornFlowError::HostRunner { .. } => {
                Some("Check connectivity and credentials for the affected host")
            }
            NornFlowError::Cancellation => None,
            NornFlowError::Yaml(_) => {
                Some("Check YAML syntax: ensure proper indentation and quoting")
            }
            NornFlowError::Io(_) => Some("Check file path exists and has correct permissions"),
        }
    }
}

/// Format an error with its fix suggestion for display.
pub fn format_error_with_suggestion<E: std::error::Error + FixSuggestion>(error: &E) -> String {
    let mut result = error.to_string();
    if let Some(suggestion) = error.fix_suggestion() {
        result.push_str("\n  Fix: ");
        result.push_str(suggestion);
    }
    result
}

/// Print an error with its fix suggestion to stderr.
pub fn print_error<E: std::error::Error + FixSuggestion>(error: &E) {
    eprintln!("Error: {}", error);
    if let Some(suggestion) = error.fix_suggestion() {
        eprintln!("  Fix: {}", suggestion);
    }
}

/// Truncates a template source for error messages, matching the original
/// implementation's 97-char-plus-ellipsis preview rule.
pub fn template_preview(source: &str) -> String {
    if source.chars().count() > 100 {
        let head: String = source.chars().take(97).collect();
        format!("{head}...")
    } else {
        source.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_not_found_has_suggestion() {
        let err = NornFlowError::TaskNotFound("bogus".into());
        assert!(err.fix_suggestion().is_some());
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn test_wraps_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: NornFlowError = io_err.into();
        assert!(err.to_string().contains("IO error"));
        assert!(err.fix_suggestion().is_some());
    }

    #[test]
    fn test_format_error_with_suggestion() {
        let err = NornFlowError::TaskNotFound("set2".into());
        let formatted = format_error_with_suggestion(&err);
        assert!(formatted.contains("Fix:"));
        assert!(formatted.contains("list-tasks"));
    }

    #[test]
    fn test_template_preview_short() {
        assert_eq!(template_preview("{{ x }}"), "{{ x }}");
    }

    #[test]
    fn test_template_preview_truncates() {
        let long = "x".repeat(150);
        let preview = template_preview(&long);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.len(), 100);
    }
}
